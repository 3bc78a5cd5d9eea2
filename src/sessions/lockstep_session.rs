use std::collections::VecDeque;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, error, info, trace, warn};
use web_time::Instant;

use crate::error::{GarrisonError, GarrisonResult};
use crate::network::codec;
use crate::network::messages::{
    AiChatPayload, BeaconPayload, Channel, ChatPayload, DataCheckPayload, Envelope,
    FileChunkPayload, FileDigest, FileRequestPayload, GameTimePayload, IntegrityChallenge,
    IntegrityResponse, KickPayload, MsgKind, PingPayload, SlotPayload, SpectatorChatPayload,
    SYSTEM_MESSAGE_SENDER,
};
use crate::network::policy::{self, MessageAction, Phase};
use crate::network::queues::{QueueSet, SlotQueues};
use crate::network::transfer::{ChunkOutcome, FileLoader, FileTransfers, RequestOutcome};
use crate::sessions::config::SessionConfig;
use crate::sessions::event_drain::EventDrain;
use crate::sessions::integrity::{
    build_response, IntegrityProbe, IntegrityTracker, Phase1Verdict, ResponseVerdict,
};
use crate::sessions::monitors::{HealthMonitors, MonitorOutcome, Outcomes, PingTracker};
use crate::sessions::roster::{ConnectionFlag, PlayerReference, PlayerSlot, Roster, SlotControl};
use crate::{
    Config, GameTime, GarrisonEvent, LeaveReason, MatchStage, NonBlockingSocket, SessionRole,
    SlotIndex,
};

/// One application-level command delivered by [`LockstepSession::poll`].
///
/// Commands are opaque to this layer. They carry the seat that issued them,
/// the kind byte the application registered for them, the game time at which
/// every endpoint delivers them, and the raw payload bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameCommand {
    /// The seat whose endpoint issued the command.
    pub origin: SlotIndex,
    /// Which command this is.
    pub kind: MsgKind,
    /// The game time at which the command takes effect.
    pub at: GameTime,
    /// The application payload. This layer never inspects it.
    pub payload: Vec<u8>,
}

/// Which health check produced a warning or a removal.
#[derive(Copy, Clone)]
enum HealthCheck {
    Lag,
    Desync,
    NotReady,
}

/// The synchronization and trust layer of one match endpoint.
///
/// A [`LockstepSession`] owns the per-seat message queues, decides which
/// inbound messages are authorized, corrects or rejects forged sender
/// claims, and, on the host, runs the health monitors and the two-phase
/// data-integrity handshake. It never advances the simulation itself:
/// call [`poll`](Self::poll) once per frame with the current game time,
/// apply the returned [`GameCommand`]s, and drain [`events`](Self::events)
/// for everything the user should see.
///
/// Sessions are built through a [`SessionBuilder`](crate::SessionBuilder).
pub struct LockstepSession<T>
where
    T: Config,
{
    /// The transport the caller handed over at build time.
    socket: Box<dyn NonBlockingSocket<T::Address>>,
    /// Transport address per seat index. `None` for the local seat, for
    /// computer seats, and for seats whose endpoint has departed.
    addresses: Vec<Option<T::Address>>,
    roster: Roster,
    /// One stable handle per seat, frozen when the occupant leaves so late
    /// readers still see who was there.
    references: Vec<PlayerReference>,
    queues: QueueSet,
    stage: MatchStage,
    role: SessionRole,
    probe: Box<dyn IntegrityProbe>,
    pings: PingTracker,
    monitors: HealthMonitors,
    integrity: IntegrityTracker,
    transfers: FileTransfers,
    events: VecDeque<GarrisonEvent>,
    max_events: usize,
    /// Set once the host endpoint is known to be gone, by message or by a
    /// relayed departure.
    host_gone: bool,
}

impl<T: Config> LockstepSession<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        socket: Box<dyn NonBlockingSocket<T::Address>>,
        addresses: Vec<Option<T::Address>>,
        roster: Roster,
        role: SessionRole,
        config: SessionConfig,
        probe: Box<dyn IntegrityProbe>,
        max_events: usize,
    ) -> Self {
        let num_slots = roster.num_slots();
        let references = roster.seats().map(PlayerReference::Live).collect();
        let host_digest = probe.content_digest();
        Self {
            socket,
            addresses,
            references,
            queues: QueueSet::new(num_slots),
            stage: MatchStage::Lobby,
            role,
            probe,
            pings: PingTracker::new(num_slots, &config.monitors),
            monitors: HealthMonitors::new(num_slots, config.monitors),
            integrity: IntegrityTracker::new(
                num_slots,
                config.integrity,
                &config.monitors,
                host_digest,
            ),
            transfers: FileTransfers::new(config.transfer),
            events: VecDeque::new(),
            max_events,
            host_gone: false,
            roster,
        }
    }

    // ###################
    // # SESSION SERVICE #
    // ###################

    /// Services the session: drains the transport, dispatches every due
    /// message through the authorization policy, runs the ping service and,
    /// on the host, the health monitors, the integrity handshake and the
    /// file-transfer pump.
    ///
    /// Net-channel messages are handled immediately. Game-channel messages
    /// are held until their stamped game time is at or before `game_now`,
    /// so every endpoint that feeds its simulation clock in here delivers
    /// them on the same tick. Call this once per frame.
    ///
    /// Application-level commands that came due are returned in seat order.
    /// Everything user-facing is queued behind [`events`](Self::events).
    ///
    /// # Errors
    ///
    /// - Returns [`GarrisonError::HostedFileUnavailable`] when a previously
    ///   advertised file can no longer be produced. A host-dropped notice
    ///   has been broadcast already; the session is over.
    /// - Returns [`GarrisonError::SerializationError`] when an outbound
    ///   payload fails to encode.
    pub fn poll(&mut self, game_now: GameTime) -> GarrisonResult<Vec<GameCommand>> {
        let now = Instant::now();
        let mut commands = Vec::new();

        self.receive_messages();

        // Net pass: immediate kinds, in seat order.
        for index in 0..self.queues.num_slots() {
            while let Some(envelope) = self.queues.slot_mut(index).and_then(SlotQueues::pop_net) {
                self.process(SlotIndex::new(index), envelope, None, game_now, now, &mut commands)?;
            }
        }
        // Game pass: stamped kinds whose time has come.
        for index in 0..self.queues.num_slots() {
            while let Some(entry) = self
                .queues
                .slot_mut(index)
                .and_then(|queues| queues.pop_game_due(game_now))
            {
                self.process(
                    SlotIndex::new(index),
                    entry.envelope,
                    Some(entry.at),
                    game_now,
                    now,
                    &mut commands,
                )?;
            }
        }

        self.check_everyone_joined(game_now)?;
        if self.role != SessionRole::Replay {
            self.run_ping_service(now)?;
        }
        if self.role.is_host() {
            self.run_monitors(now)?;
            self.run_integrity(game_now, now)?;
            self.pump_transfers()?;
        }
        Ok(commands)
    }

    fn receive_messages(&mut self) {
        for (address, envelope) in self.socket.receive_all_messages() {
            let Some(origin) = self.slot_for_address(&address) else {
                warn!("message from an address not mapped to any seat");
                continue;
            };
            if self
                .roster
                .slot(origin)
                .is_some_and(|seat| seat.kicked || seat.pending_disconnect)
            {
                debug!(%origin, "dropping a message from a quarantined seat");
                continue;
            }
            let Some(queues) = self.queues.slot_mut(origin.as_usize()) else {
                continue;
            };
            match envelope.channel() {
                Channel::Net => queues.push_net(envelope),
                Channel::Game => queues.push_game(envelope),
            }
        }
    }

    fn slot_for_address(&self, address: &T::Address) -> Option<SlotIndex> {
        self.addresses
            .iter()
            .position(|candidate| candidate.as_ref() == Some(address))
            .map(SlotIndex::new)
    }

    /// Runs one message through the policy and on to its handler.
    fn process(
        &mut self,
        origin: SlotIndex,
        envelope: Envelope,
        scheduled_at: Option<GameTime>,
        game_now: GameTime,
        now: Instant,
        commands: &mut Vec<GameCommand>,
    ) -> GarrisonResult<()> {
        let Some(kind) = envelope.kind() else {
            warn!(%origin, byte = envelope.kind_byte(), "message with an unroutable kind byte");
            return Ok(());
        };
        match policy::action_for(&self.roster, origin, kind, self.stage, self.role) {
            MessageAction::Process => {}
            MessageAction::SilentlyIgnore => {
                trace!(%origin, %kind, "message dropped by policy");
                return Ok(());
            }
            MessageAction::DisallowAndKick => {
                warn!(%origin, %kind, "unauthorized message");
                if self.role.is_host() && origin != self.roster.host_slot() {
                    let name = self.seat_name(origin);
                    self.broadcast_system_notice(&format!(
                        "Auto kicking {name}: unauthorized {kind} message."
                    ))?;
                    self.kick(origin, "Unauthorized network command.", LeaveReason::Invalid, true)?;
                }
                return Ok(());
            }
        }
        if policy::route(kind) == Phase::GameOnly && self.local_still_joining() {
            debug!(%origin, %kind, "game-only message dropped, the local join is still in progress");
            return Ok(());
        }

        let payload = envelope.payload();
        match kind {
            MsgKind::Ping => self.handle_ping(origin, payload, now),
            MsgKind::Chat => self.handle_chat(origin, payload),
            MsgKind::AiChat => self.handle_ai_chat(origin, payload),
            MsgKind::SpectatorChat => self.handle_spectator_chat(origin, payload),
            MsgKind::Beacon => self.handle_beacon(origin, payload),
            MsgKind::PlayerResponding => self.handle_player_responding(origin, payload),
            MsgKind::PlayerLeaving => self.handle_player_leaving(origin, payload),
            MsgKind::PlayerDropped => self.handle_player_dropped(origin, payload),
            MsgKind::HostDropped => self.handle_host_dropped(origin),
            MsgKind::Kick => self.handle_kick(origin, payload),
            MsgKind::DataCheck => self.handle_data_check(origin, payload),
            MsgKind::DataCheck2 => self.handle_integrity_exchange(origin, payload),
            MsgKind::FileRequested => self.handle_file_requested(origin, payload),
            MsgKind::FileCancelled => self.handle_file_cancelled(origin, payload),
            MsgKind::FilePayload => self.handle_file_payload(origin, payload),
            MsgKind::PlayerLeft => {
                self.handle_player_left(origin, payload, scheduled_at.unwrap_or(game_now))
            }
            MsgKind::GameTime => {
                // Markers are consumed at queue insertion on the game
                // channel; one reaching dispatch was missent on the net
                // channel.
                warn!(%origin, "game time marker outside the game channel");
                Ok(())
            }
            MsgKind::ReplayEnded => self.handle_replay_ended(),
            _ => {
                if kind.is_game() {
                    commands.push(GameCommand {
                        origin,
                        kind,
                        at: scheduled_at.unwrap_or(game_now),
                        payload: envelope.payload().to_vec(),
                    });
                } else {
                    self.push_event(GarrisonEvent::LobbyMessage {
                        origin,
                        kind,
                        payload: envelope.payload().to_vec(),
                    });
                }
                Ok(())
            }
        }
    }

    // ####################
    // # MESSAGE HANDLERS #
    // ####################

    fn handle_ping(&mut self, origin: SlotIndex, payload: &[u8], now: Instant) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<PingPayload>(origin, MsgKind::Ping, payload) else {
            return Ok(());
        };
        if msg.echo {
            self.pings.record_pong(origin, now);
        } else {
            let reply = codec::encode(&PingPayload { echo: true })?;
            self.send_to_slot(origin, &Envelope::net(MsgKind::Ping, reply));
        }
        Ok(())
    }

    fn handle_chat(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<ChatPayload>(origin, MsgKind::Chat, payload) else {
            return Ok(());
        };
        if msg.sender == SYSTEM_MESSAGE_SENDER && origin == self.roster.host_slot() {
            self.push_event(GarrisonEvent::SystemMessage { text: msg.text });
            return Ok(());
        }
        let Some(sender) = self.corrected_sender(origin, i64::from(msg.sender)) else {
            return Ok(());
        };
        if self.roster.slot(sender).is_some_and(|seat| seat.muted) {
            trace!(%sender, "chat from a muted seat suppressed");
            return Ok(());
        }
        self.push_event(GarrisonEvent::Chat {
            sender,
            team_only: msg.team_only,
            text: msg.text,
        });
        Ok(())
    }

    fn handle_ai_chat(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<AiChatPayload>(origin, MsgKind::AiChat, payload) else {
            return Ok(());
        };
        let Some(sender) = self.corrected_sender(origin, i64::from(msg.sender)) else {
            return Ok(());
        };
        let receiver = SlotIndex::new(msg.receiver as usize);
        if self.roster.slot(receiver).is_none() {
            debug!(%origin, receiver = msg.receiver, "ai chat for a seat outside the roster");
            return Ok(());
        }
        if !self.roster.my_responsibility(receiver) {
            trace!(%receiver, "ai chat for a seat answered elsewhere");
            return Ok(());
        }
        if self.roster.slot(sender).is_some_and(|seat| seat.muted) {
            return Ok(());
        }
        self.push_event(GarrisonEvent::AiChat {
            sender,
            receiver,
            text: msg.text,
        });
        Ok(())
    }

    fn handle_spectator_chat(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<SpectatorChatPayload>(origin, MsgKind::SpectatorChat, payload)
        else {
            return Ok(());
        };
        let Some(sender) = self.corrected_sender(origin, i64::from(msg.sender)) else {
            return Ok(());
        };
        if !self.roster.is_spectator(self.roster.local_slot()) {
            trace!(%sender, "spectator chat surfaced only on spectator seats");
            return Ok(());
        }
        if self.roster.slot(sender).is_some_and(|seat| seat.muted) {
            return Ok(());
        }
        self.push_event(GarrisonEvent::SpectatorChat {
            sender,
            text: msg.text,
        });
        Ok(())
    }

    fn handle_beacon(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<BeaconPayload>(origin, MsgKind::Beacon, payload) else {
            return Ok(());
        };
        if msg.sender < 0 || msg.target < 0 {
            debug!(%origin, sender = msg.sender, target = msg.target, "beacon with non-seat indices");
            return Ok(());
        }
        let sender = SlotIndex::new(msg.sender as usize);
        let target = SlotIndex::new(msg.target as usize);
        if self.roster.slot(sender).is_none() || self.roster.slot(target).is_none() {
            debug!(%origin, "beacon naming seats outside the roster");
            return Ok(());
        }
        if !self.roster.can_give_orders_for(origin, sender) {
            debug!(%origin, %sender, "beacon for a seat the origin cannot act for");
            return Ok(());
        }
        if !self.roster.my_responsibility(target) {
            trace!(%target, "beacon for a seat answered elsewhere");
            return Ok(());
        }
        self.push_event(GarrisonEvent::Beacon {
            sender,
            target,
            x: msg.x,
            y: msg.y,
            text: msg.text,
        });
        Ok(())
    }

    fn handle_player_responding(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<SlotPayload>(origin, MsgKind::PlayerResponding, payload)
        else {
            return Ok(());
        };
        let named = SlotIndex::new(msg.slot as usize);
        if self.roster.slot(named).is_none() || self.roster.whos_responsible(named) != origin {
            return self.reject_invalid_request(origin, "responding for a seat it does not answer for");
        }
        if let Some(seat) = self.roster.slot_mut(named) {
            seat.joining_in_progress = false;
        }
        self.push_event(GarrisonEvent::PlayerResponding { slot: named });
        Ok(())
    }

    fn handle_player_leaving(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<SlotPayload>(origin, MsgKind::PlayerLeaving, payload) else {
            return Ok(());
        };
        let named = SlotIndex::new(msg.slot as usize);
        if self.roster.slot(named).is_none() || self.roster.whos_responsible(named) != origin {
            return self.reject_invalid_request(origin, "leave notice for a seat it does not answer for");
        }
        info!(%named, "seat announced it is leaving");
        if let Some(seat) = self.roster.slot_mut(named) {
            seat.status.set(ConnectionFlag::Leaving);
        }
        self.roster.quarantine(named);
        if self.role.is_host() {
            let name = self.seat_name(named);
            self.broadcast_system_notice(&format!("{name} is leaving the match."))?;
            self.schedule_departure(named)?;
        }
        Ok(())
    }

    fn handle_player_dropped(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<SlotPayload>(origin, MsgKind::PlayerDropped, payload) else {
            return Ok(());
        };
        let named = SlotIndex::new(msg.slot as usize);
        if self.roster.slot(named).is_none() || origin != self.roster.host_slot() {
            return self.reject_invalid_request(origin, "drop notice from a seat that is not the host");
        }
        warn!(%named, "host reported a seat's link as dropped");
        self.detach_reference(named);
        if let Some(seat) = self.roster.slot_mut(named) {
            seat.joining_in_progress = false;
            seat.status.set(ConnectionFlag::Dropped);
        }
        self.roster.quarantine(named);
        self.push_event(GarrisonEvent::PlayerDropped { slot: named });
        Ok(())
    }

    fn handle_host_dropped(&mut self, origin: SlotIndex) -> GarrisonResult<()> {
        if origin != self.roster.host_slot() {
            return self.reject_invalid_request(origin, "host drop notice from a seat that is not the host");
        }
        warn!("the host endpoint is gone");
        let host = self.roster.host_slot();
        self.host_gone = true;
        self.detach_reference(host);
        if let Some(seat) = self.roster.slot_mut(host) {
            seat.status.set(ConnectionFlag::Dropped);
        }
        self.roster.quarantine(host);
        self.push_event(GarrisonEvent::HostDropped);
        Ok(())
    }

    fn handle_kick(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<KickPayload>(origin, MsgKind::Kick, payload) else {
            return Ok(());
        };
        let target = SlotIndex::new(msg.slot as usize);
        if self.roster.slot(target).is_none() {
            return self.reject_invalid_request(origin, "kick naming a seat outside the roster");
        }
        if self.role.is_host() {
            if target == self.roster.host_slot() {
                warn!(%origin, "seat tried to remove the host");
                let name = self.seat_name(origin);
                self.broadcast_system_notice(&format!("Auto kicking {name}: tried to remove the host."))?;
                return self.kick(origin, "Spoofed kick message.", LeaveReason::Invalid, true);
            }
            if self.roster.is_admin(origin) {
                // An admin asked the host to remove a seat on its behalf.
                return self.kick(target, &msg.reason, msg.code, false);
            }
            return self.reject_invalid_request(origin, "kick request without admin rights");
        }
        if origin != self.roster.host_slot() && !self.roster.is_admin(origin) {
            return self.reject_invalid_request(origin, "kick notice from a seat without authority");
        }
        if target == self.roster.local_slot() {
            warn!(reason = %msg.reason, code = ?msg.code, "we were removed from the session");
            self.roster.mark_kicked(target);
            self.push_event(GarrisonEvent::KickedFromSession {
                reason: msg.reason,
                code: msg.code,
            });
        } else {
            trace!(%target, "kick notice for another seat; the departure follows on the game channel");
        }
        Ok(())
    }

    fn handle_data_check(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        if !self.role.is_host() {
            trace!(%origin, "data report ignored on a non-host session");
            return Ok(());
        }
        let Some(msg) = decode_or_log::<DataCheckPayload>(origin, MsgKind::DataCheck, payload) else {
            return Ok(());
        };
        match self.integrity.record_phase1(&mut self.roster, origin, &msg.digest) {
            Phase1Verdict::Verified => {
                debug!(%origin, "content digest verified");
                self.push_event(GarrisonEvent::IntegrityVerified { slot: origin });
            }
            Phase1Verdict::Mismatch { first_difference } => {
                warn!(%origin, first_difference, "content digest mismatch");
                self.push_event(GarrisonEvent::IntegrityFailed { slot: origin });
                let name = self.seat_name(origin);
                self.broadcast_system_notice(&format!("{name} has the wrong game data."))?;
                self.kick(
                    origin,
                    "Your game data does not match the host's.",
                    LeaveReason::WrongData,
                    true,
                )?;
            }
        }
        Ok(())
    }

    /// Both directions of the second integrity phase: on the host, a
    /// response to validate; on a client, a challenge to answer.
    fn handle_integrity_exchange(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        if self.role.is_host() {
            let Some(msg) = decode_or_log::<IntegrityResponse>(origin, MsgKind::DataCheck2, payload)
            else {
                return Ok(());
            };
            match self.integrity.validate_response(&self.roster, origin, &msg) {
                ResponseVerdict::Clean { slot } => {
                    debug!(%slot, "state challenge answered clean");
                }
                ResponseVerdict::WrongData { slot } => {
                    self.push_event(GarrisonEvent::IntegrityFailed { slot });
                    let name = self.seat_name(slot);
                    self.broadcast_system_notice(&format!("{name} failed a game state check."))?;
                    self.kick(
                        slot,
                        "Your game state failed verification.",
                        LeaveReason::WrongData,
                        true,
                    )?;
                }
                ResponseVerdict::BadParam { offender } => {
                    self.reject_invalid_request(offender, "malformed state challenge response")?;
                }
                ResponseVerdict::Discard => {}
            }
            return Ok(());
        }
        let Some(msg) = decode_or_log::<IntegrityChallenge>(origin, MsgKind::DataCheck2, payload)
        else {
            return Ok(());
        };
        let host = self.roster.host_slot();
        if origin != host || msg.host_slot as usize != host.as_usize() {
            debug!(%origin, "state challenge not from the host");
            return Ok(());
        }
        let response = build_response(self.probe.as_ref(), &self.roster);
        let reply = codec::encode(&response)?;
        self.send_to_slot(host, &Envelope::net(MsgKind::DataCheck2, reply));
        Ok(())
    }

    fn handle_file_requested(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<FileRequestPayload>(origin, MsgKind::FileRequested, payload)
        else {
            return Ok(());
        };
        match self.transfers.handle_request(origin, &msg.digest) {
            Ok(RequestOutcome::Started) => {
                debug!(%origin, digest = %msg.digest.short_hex(), "file transfer started");
                Ok(())
            }
            Ok(
                RequestOutcome::AlreadyInFlight | RequestOutcome::Unknown | RequestOutcome::Refused,
            ) => Ok(()),
            Err(err) => {
                // An advertised file cannot be produced. Every joiner
                // depends on it, so the session cannot continue.
                error!(%err, "hosted file unavailable; abandoning the session");
                self.broadcast(&Envelope::net(MsgKind::HostDropped, Vec::new()));
                Err(err)
            }
        }
    }

    fn handle_file_cancelled(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<FileRequestPayload>(origin, MsgKind::FileCancelled, payload)
        else {
            return Ok(());
        };
        self.transfers.cancel_send(origin, &msg.digest);
        Ok(())
    }

    fn handle_file_payload(&mut self, origin: SlotIndex, payload: &[u8]) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<FileChunkPayload>(origin, MsgKind::FilePayload, payload)
        else {
            return Ok(());
        };
        match self.transfers.handle_chunk(msg) {
            ChunkOutcome::Accepted | ChunkOutcome::Ignored => {}
            ChunkOutcome::Progress { percent } => {
                self.push_event(GarrisonEvent::FileReceiveProgress { percent });
            }
            ChunkOutcome::Complete => self.push_event(GarrisonEvent::FileReceiveComplete),
        }
        Ok(())
    }

    fn handle_player_left(
        &mut self,
        origin: SlotIndex,
        payload: &[u8],
        at: GameTime,
    ) -> GarrisonResult<()> {
        let Some(msg) = decode_or_log::<SlotPayload>(origin, MsgKind::PlayerLeft, payload) else {
            return Ok(());
        };
        let named = SlotIndex::new(msg.slot as usize);
        if self.roster.slot(named).is_none() {
            return self.reject_invalid_request(origin, "departure naming a seat outside the roster");
        }
        let authorized =
            origin == self.roster.host_slot() || self.roster.whos_responsible(named) == origin;
        if !authorized {
            return self.reject_invalid_request(origin, "departure for a seat it does not answer for");
        }
        info!(%named, %at, "seat left the match");
        self.detach_reference(named);
        self.push_event(GarrisonEvent::PlayerLeft { slot: named, at });
        if named == self.roster.local_slot() {
            // Our own departure: the caller tears the session down. Leave
            // local state intact so the remaining events stay readable.
            return Ok(());
        }
        if named == self.roster.host_slot() {
            self.host_gone = true;
        }
        self.forget_endpoint(named);
        Ok(())
    }

    fn handle_replay_ended(&mut self) -> GarrisonResult<()> {
        info!("replay reached its end marker");
        self.stage = MatchStage::Ended;
        self.monitors.mark_match_ended();
        self.push_event(GarrisonEvent::ReplayEnded);
        Ok(())
    }

    // ###################
    // # PERIODIC CHECKS #
    // ###################

    /// Flips the session from loading to active once no human seat is still
    /// joining, and reports the local content digest to the host.
    fn check_everyone_joined(&mut self, game_now: GameTime) -> GarrisonResult<()> {
        if self.stage != MatchStage::Loading {
            return Ok(());
        }
        let still_joining = self
            .roster
            .human_seats()
            .any(|slot| self.roster.slot(slot).is_some_and(|seat| seat.joining_in_progress));
        if still_joining {
            return Ok(());
        }
        info!(%game_now, "every endpoint finished joining");
        self.stage = MatchStage::Active;
        self.integrity.record_everyone_joined(game_now);
        self.push_event(GarrisonEvent::EveryoneJoined { at: game_now });
        if self.role == SessionRole::Client {
            let digest = self.probe.content_digest();
            let report = codec::encode(&DataCheckPayload { digest })?;
            self.send_to_slot(self.roster.host_slot(), &Envelope::net(MsgKind::DataCheck, report));
        }
        Ok(())
    }

    fn run_ping_service(&mut self, now: Instant) -> GarrisonResult<()> {
        let due = self.pings.due_probes(&self.roster, now);
        for slot in due {
            let probe = codec::encode(&PingPayload { echo: false })?;
            self.send_to_slot(slot, &Envelope::net(MsgKind::Ping, probe));
        }
        Ok(())
    }

    fn run_monitors(&mut self, now: Instant) -> GarrisonResult<()> {
        match self.stage {
            MatchStage::Loading | MatchStage::Active => {
                let lagging = self.monitors.check_lag(&mut self.roster, &self.pings, now);
                self.apply_health_outcomes(lagging, HealthCheck::Lag)?;
                let desynced = self.monitors.check_desync(&self.roster, now);
                self.apply_health_outcomes(desynced, HealthCheck::Desync)?;
            }
            MatchStage::Lobby => {
                let idle = self.monitors.check_not_ready(&self.roster, now);
                self.apply_health_outcomes(idle, HealthCheck::NotReady)?;
            }
            MatchStage::Ended => {}
        }
        Ok(())
    }

    fn apply_health_outcomes(&mut self, outcomes: Outcomes, check: HealthCheck) -> GarrisonResult<()> {
        for outcome in outcomes {
            match outcome {
                MonitorOutcome::Warn {
                    slot,
                    seconds,
                    kick_at,
                } => self.warn_unhealthy(slot, seconds, kick_at, check)?,
                MonitorOutcome::Kick { slot } => self.kick_unhealthy(slot, check)?,
            }
        }
        Ok(())
    }

    fn warn_unhealthy(
        &mut self,
        slot: SlotIndex,
        seconds: u32,
        kick_at: u32,
        check: HealthCheck,
    ) -> GarrisonResult<()> {
        let name = self.seat_name(slot);
        match check {
            HealthCheck::Lag => {
                self.push_event(GarrisonEvent::LagWarning {
                    slot,
                    seconds,
                    kick_at,
                });
                self.broadcast_system_notice(&format!(
                    "{name} is lagging: {seconds}s of {kick_at}s before removal."
                ))
            }
            HealthCheck::Desync => {
                self.push_event(GarrisonEvent::DesyncWarning {
                    slot,
                    seconds,
                    kick_at,
                });
                self.broadcast_system_notice(&format!(
                    "{name} is out of sync: {seconds}s of {kick_at}s before removal."
                ))
            }
            HealthCheck::NotReady => {
                self.push_event(GarrisonEvent::NotReadyWarning {
                    slot,
                    seconds,
                    kick_at,
                });
                // Nagging the whole room about one idler helps nobody.
                let remaining = kick_at.saturating_sub(seconds);
                self.send_system_notice_to(
                    slot,
                    &format!("Ready up: you will be removed from the room in {remaining}s."),
                )
            }
        }
    }

    fn kick_unhealthy(&mut self, slot: SlotIndex, check: HealthCheck) -> GarrisonResult<()> {
        match check {
            HealthCheck::Lag => self.kick(
                slot,
                "Your connection was too slow to keep up.",
                LeaveReason::Connection,
                false,
            ),
            HealthCheck::Desync => self.kick(
                slot,
                "Your game simulation diverged from the host's.",
                LeaveReason::Connection,
                false,
            ),
            HealthCheck::NotReady => self.kick(
                slot,
                "You were removed from the room for being idle.",
                LeaveReason::Connection,
                false,
            ),
        }
    }

    fn run_integrity(&mut self, game_now: GameTime, now: Instant) -> GarrisonResult<()> {
        let unseen = self.integrity.sweep_unverified(&self.roster, game_now);
        for slot in unseen {
            warn!(%slot, "no data report inside the join window");
            let name = self.seat_name(slot);
            self.push_event(GarrisonEvent::IntegrityFailed { slot });
            self.broadcast_system_notice(&format!("{name} never completed the data check."))?;
            self.kick(
                slot,
                "You did not complete the data check in time.",
                LeaveReason::Invalid,
                true,
            )?;
        }
        let due = self.integrity.due_challenges(&self.roster, now);
        for slot in due {
            debug!(%slot, "issuing a game state challenge");
            let challenge = codec::encode(&IntegrityChallenge {
                host_slot: self.roster.host_slot().as_usize() as u32,
            })?;
            self.send_to_slot(slot, &Envelope::net(MsgKind::DataCheck2, challenge));
        }
        let overdue = self.integrity.check_timeouts(&self.roster, now);
        for slot in overdue {
            let name = self.seat_name(slot);
            self.push_event(GarrisonEvent::IntegrityFailed { slot });
            self.broadcast_system_notice(&format!("{name} did not answer the game state check."))?;
            self.kick(
                slot,
                "You did not answer the game state check.",
                LeaveReason::WrongData,
                true,
            )?;
        }
        Ok(())
    }

    fn pump_transfers(&mut self) -> GarrisonResult<()> {
        let (chunks, progress) = self.transfers.pump_sends();
        for (slot, chunk) in chunks {
            let bytes = codec::encode(&chunk)?;
            self.send_to_slot(slot, &Envelope::net(MsgKind::FilePayload, bytes));
        }
        for (slot, percent) in progress {
            self.push_event(GarrisonEvent::FileSendProgress { slot, percent });
        }
        Ok(())
    }

    // ##############
    // # PUBLIC API #
    // ##############

    /// Removes a seat's occupant from the match.
    ///
    /// The kicked endpoint is told why, everyone else sees a system notice
    /// unless `quiet` is set, and the departure itself is scheduled on the
    /// game channel so every endpoint applies it at the same game time.
    ///
    /// # Errors
    ///
    /// - Returns [`GarrisonError::NotHost`] on non-host sessions.
    /// - Returns [`GarrisonError::InvalidSlot`] for a seat outside the
    ///   roster.
    /// - Returns [`GarrisonError::InvalidRequest`] for the host's own seat.
    pub fn kick(
        &mut self,
        slot: SlotIndex,
        reason: &str,
        code: LeaveReason,
        quiet: bool,
    ) -> GarrisonResult<()> {
        if !self.role.is_host() {
            return Err(GarrisonError::NotHost {
                operation: "kick".to_owned(),
            });
        }
        let Some(seat) = self.roster.slot(slot) else {
            return Err(GarrisonError::InvalidSlot {
                slot,
                num_slots: self.roster.num_slots(),
            });
        };
        if slot == self.roster.host_slot() {
            return Err(GarrisonError::InvalidRequest {
                info: "the host seat cannot be kicked".to_owned(),
            });
        }
        if seat.kicked {
            return Ok(());
        }
        let name = seat.name.clone();
        info!(%slot, name = %name, reason, code = ?code, "kicking seat");
        self.detach_reference(slot);
        self.roster.mark_kicked(slot);
        if let Some(seat) = self.roster.slot_mut(slot) {
            seat.joining_in_progress = false;
        }
        let notice = codec::encode(&KickPayload {
            slot: slot.as_usize() as u32,
            reason: reason.to_owned(),
            code,
        })?;
        self.send_to_slot(slot, &Envelope::net(MsgKind::Kick, notice));
        if !quiet {
            self.broadcast_system_notice(&format!("{name} was removed from the match: {reason}"))?;
        }
        self.schedule_departure(slot)?;
        self.push_event(GarrisonEvent::KickIssued {
            slot,
            reason: reason.to_owned(),
            code,
        });
        Ok(())
    }

    /// Sends a chat line to every other endpoint, or only to teammates.
    ///
    /// The local line is not echoed back through [`events`](Self::events);
    /// the caller already knows what it said.
    ///
    /// # Errors
    ///
    /// - Returns [`GarrisonError::InvalidRequest`] for team chat from a
    ///   spectator seat.
    /// - Returns [`GarrisonError::SerializationError`] when encoding fails.
    pub fn send_chat(&mut self, text: &str, team_only: bool) -> GarrisonResult<()> {
        let local = self.roster.local_slot();
        if team_only && self.roster.is_spectator(local) {
            return Err(GarrisonError::InvalidRequest {
                info: "spectators have no team to chat with".to_owned(),
            });
        }
        let line = codec::encode(&ChatPayload {
            sender: local.as_usize() as i32,
            team_only,
            text: text.to_owned(),
        })?;
        let envelope = Envelope::net(MsgKind::Chat, line);
        if team_only {
            let my_team = self.roster.slot(local).map_or(0, |seat| seat.team);
            let teammates: Vec<SlotIndex> = self
                .roster
                .human_seats()
                .filter(|&slot| slot != local)
                .filter(|&slot| {
                    self.roster
                        .slot(slot)
                        .is_some_and(|seat| !seat.spectator && seat.team == my_team)
                })
                .collect();
            for slot in teammates {
                self.send_to_slot(slot, &envelope);
            }
        } else {
            self.broadcast(&envelope);
        }
        Ok(())
    }

    /// Broadcasts a system notice, shown without a player attribution.
    ///
    /// Receivers only trust the host's endpoint with these; from anyone
    /// else they surface as ordinary chat from the sending seat.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidRequest`] from a spectator seat once
    /// the match has started, and [`GarrisonError::SerializationError`]
    /// when encoding fails.
    pub fn send_system_message(&mut self, text: &str) -> GarrisonResult<()> {
        let local = self.roster.local_slot();
        if self.roster.is_spectator(local) && self.stage.has_started() {
            return Err(GarrisonError::InvalidRequest {
                info: "spectators cannot send system notices once the match starts".to_owned(),
            });
        }
        let notice = codec::encode(&ChatPayload {
            sender: SYSTEM_MESSAGE_SENDER,
            team_only: false,
            text: text.to_owned(),
        })?;
        self.broadcast(&Envelope::net(MsgKind::Chat, notice));
        Ok(())
    }

    /// Sends a chat line to the endpoint simulating `receiver`, typically a
    /// computer seat. Delivered locally when that endpoint is this one.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidSlot`] for a seat outside the roster
    /// and [`GarrisonError::SerializationError`] when encoding fails.
    pub fn send_ai_chat(&mut self, receiver: SlotIndex, text: &str) -> GarrisonResult<()> {
        if self.roster.slot(receiver).is_none() {
            return Err(GarrisonError::InvalidSlot {
                slot: receiver,
                num_slots: self.roster.num_slots(),
            });
        }
        let local = self.roster.local_slot();
        let handler = self.roster.whos_responsible(receiver);
        if handler == local {
            self.push_event(GarrisonEvent::AiChat {
                sender: local,
                receiver,
                text: text.to_owned(),
            });
            return Ok(());
        }
        let line = codec::encode(&AiChatPayload {
            sender: local.as_usize() as u32,
            receiver: receiver.as_usize() as u32,
            text: text.to_owned(),
        })?;
        self.send_to_slot(handler, &Envelope::net(MsgKind::AiChat, line));
        Ok(())
    }

    /// Sends a line on the spectator channel.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidRequest`] from a non-spectator seat
    /// and [`GarrisonError::SerializationError`] when encoding fails.
    pub fn send_spectator_chat(&mut self, text: &str) -> GarrisonResult<()> {
        let local = self.roster.local_slot();
        if !self.roster.is_spectator(local) {
            return Err(GarrisonError::InvalidRequest {
                info: "only spectator seats can use spectator chat".to_owned(),
            });
        }
        let line = codec::encode(&SpectatorChatPayload {
            sender: local.as_usize() as u32,
            text: text.to_owned(),
        })?;
        self.broadcast(&Envelope::net(MsgKind::SpectatorChat, line));
        Ok(())
    }

    /// Drops a map beacon for the endpoint responsible for `target`.
    /// Delivered locally when that endpoint is this one.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidRequest`] from a spectator seat,
    /// [`GarrisonError::InvalidSlot`] for a target outside the roster, and
    /// [`GarrisonError::SerializationError`] when encoding fails.
    pub fn send_beacon(
        &mut self,
        target: SlotIndex,
        x: i32,
        y: i32,
        text: &str,
    ) -> GarrisonResult<()> {
        let local = self.roster.local_slot();
        if self.roster.is_spectator(local) {
            return Err(GarrisonError::InvalidRequest {
                info: "spectators cannot place beacons".to_owned(),
            });
        }
        if self.roster.slot(target).is_none() {
            return Err(GarrisonError::InvalidSlot {
                slot: target,
                num_slots: self.roster.num_slots(),
            });
        }
        let handler = self.roster.whos_responsible(target);
        if handler == local {
            self.push_event(GarrisonEvent::Beacon {
                sender: local,
                target,
                x,
                y,
                text: text.to_owned(),
            });
            return Ok(());
        }
        let marker = codec::encode(&BeaconPayload {
            sender: local.as_usize() as i32,
            target: target.as_usize() as i32,
            x,
            y,
            text: text.to_owned(),
        })?;
        self.send_to_slot(handler, &Envelope::net(MsgKind::Beacon, marker));
        Ok(())
    }

    /// Issues an application-level game command to every endpoint,
    /// including this one: the command comes back out of
    /// [`poll`](Self::poll) here as well, stamped with the local marker, so
    /// all endpoints apply it on the same tick.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidRequest`] when `kind` is not an
    /// application command kind and
    /// [`GarrisonError::SerializationError`] when encoding fails.
    pub fn send_game_command(&mut self, kind: MsgKind, payload: Vec<u8>) -> GarrisonResult<()> {
        if !kind.is_game() || matches!(kind, MsgKind::GameTime | MsgKind::PlayerLeft) {
            return Err(GarrisonError::InvalidRequest {
                info: format!("{kind} is not an application game command"),
            });
        }
        let envelope = Envelope::game(kind, payload);
        self.broadcast(&envelope);
        self.push_to_local_queue(envelope);
        Ok(())
    }

    /// Announces that the local simulation reached `at`. Everything this
    /// endpoint sends on the game channel afterwards is stamped with it,
    /// here and on every receiver.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::SerializationError`] when encoding fails.
    pub fn send_game_time(&mut self, at: GameTime) -> GarrisonResult<()> {
        let marker = codec::encode(&GameTimePayload {
            game_time: at.as_millis(),
        })?;
        let envelope = Envelope::game(MsgKind::GameTime, marker);
        self.broadcast(&envelope);
        self.push_to_local_queue(envelope);
        Ok(())
    }

    /// Tells the other endpoints this one is about to go away. On the host
    /// this is a host-dropped notice; everywhere else a leave notice the
    /// host turns into a scheduled departure.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::SerializationError`] when encoding fails.
    pub fn announce_leaving(&mut self) -> GarrisonResult<()> {
        if self.role.is_host() {
            self.broadcast(&Envelope::net(MsgKind::HostDropped, Vec::new()));
            return Ok(());
        }
        let local = self.roster.local_slot();
        let notice = codec::encode(&SlotPayload {
            slot: local.as_usize() as u32,
        })?;
        self.broadcast(&Envelope::net(MsgKind::PlayerLeaving, notice));
        Ok(())
    }

    /// Moves the session from the lobby into loading. Every connected human
    /// seat is flagged as joining until its endpoint reports in through
    /// [`mark_loaded`](Self::mark_loaded) or a responding notice.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidRequest`] when the match already
    /// started.
    pub fn start_match(&mut self) -> GarrisonResult<()> {
        if self.stage != MatchStage::Lobby {
            return Err(GarrisonError::InvalidRequest {
                info: "the match has already started".to_owned(),
            });
        }
        self.stage = MatchStage::Loading;
        let humans: Vec<SlotIndex> = self.roster.human_seats().collect();
        for slot in humans {
            if let Some(seat) = self.roster.slot_mut(slot) {
                if seat.connected && !seat.kicked {
                    seat.joining_in_progress = true;
                }
            }
        }
        self.monitors.mark_match_started(Instant::now());
        info!("match starting; waiting for every endpoint to load");
        Ok(())
    }

    /// Reports that the local endpoint finished loading its data.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidRequest`] before
    /// [`start_match`](Self::start_match) and
    /// [`GarrisonError::SerializationError`] when encoding fails.
    pub fn mark_loaded(&mut self) -> GarrisonResult<()> {
        if !self.stage.has_started() {
            return Err(GarrisonError::InvalidRequest {
                info: "the match has not started".to_owned(),
            });
        }
        let local = self.roster.local_slot();
        if let Some(seat) = self.roster.slot_mut(local) {
            seat.joining_in_progress = false;
        }
        let notice = codec::encode(&SlotPayload {
            slot: local.as_usize() as u32,
        })?;
        self.broadcast(&Envelope::net(MsgKind::PlayerResponding, notice));
        info!(%local, "local endpoint finished loading");
        Ok(())
    }

    /// Ends the match. The session lingers for stats and chat; the health
    /// monitors stand down.
    pub fn end_match(&mut self) {
        self.stage = MatchStage::Ended;
        self.monitors.mark_match_ended();
        info!("match ended");
    }

    /// Makes a file available for download by the other endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::NotHost`] on non-host sessions.
    pub fn host_file(
        &mut self,
        digest: FileDigest,
        name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> GarrisonResult<()> {
        if !self.role.is_host() {
            return Err(GarrisonError::NotHost {
                operation: "host_file".to_owned(),
            });
        }
        self.transfers.host_file(digest, name.into(), bytes);
        Ok(())
    }

    /// Like [`host_file`](Self::host_file), but the bytes are produced by
    /// `loader` on first request instead of being held in memory up front.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::NotHost`] on non-host sessions.
    pub fn host_file_deferred(
        &mut self,
        digest: FileDigest,
        name: impl Into<String>,
        loader: FileLoader,
    ) -> GarrisonResult<()> {
        if !self.role.is_host() {
            return Err(GarrisonError::NotHost {
                operation: "host_file_deferred".to_owned(),
            });
        }
        self.transfers.host_file_deferred(digest, name.into(), loader);
        Ok(())
    }

    /// Asks the host for the file identified by `digest`. Progress arrives
    /// through [`events`](Self::events); the finished bytes through
    /// [`take_received_file`](Self::take_received_file).
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidRequest`] on the host session and
    /// [`GarrisonError::SerializationError`] when encoding fails.
    pub fn request_file(&mut self, digest: FileDigest) -> GarrisonResult<()> {
        if self.role.is_host() {
            return Err(GarrisonError::InvalidRequest {
                info: "the host already holds its hosted files".to_owned(),
            });
        }
        let request = codec::encode(&FileRequestPayload { digest })?;
        self.send_to_slot(self.roster.host_slot(), &Envelope::net(MsgKind::FileRequested, request));
        Ok(())
    }

    /// Abandons an in-flight download and tells the host to stop sending.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::SerializationError`] when encoding fails.
    pub fn cancel_file_request(&mut self, digest: &FileDigest) -> GarrisonResult<()> {
        if self.transfers.cancel_receive(digest) {
            debug!(digest = %digest.short_hex(), "partial download discarded");
        }
        let notice = codec::encode(&FileRequestPayload { digest: *digest })?;
        self.send_to_slot(self.roster.host_slot(), &Envelope::net(MsgKind::FileCancelled, notice));
        Ok(())
    }

    /// Takes the oldest fully received file, if any completed.
    pub fn take_received_file(&mut self) -> Option<(FileDigest, Vec<u8>)> {
        self.transfers.take_completed()
    }

    // ##################
    // # SEAT MUTATORS  #
    // ##################

    /// Sets a seat's lobby ready flag.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidSlot`] for a seat outside the roster.
    pub fn set_slot_ready(&mut self, slot: SlotIndex, ready: bool) -> GarrisonResult<()> {
        self.checked_slot_mut(slot)?.ready = ready;
        Ok(())
    }

    /// Sets a seat's team, used to pick the recipients of team chat.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidSlot`] for a seat outside the roster.
    pub fn set_team(&mut self, slot: SlotIndex, team: u8) -> GarrisonResult<()> {
        self.checked_slot_mut(slot)?.team = team;
        Ok(())
    }

    /// Mutes or unmutes a seat. Chat from muted seats is dropped locally;
    /// the sender is not told.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidSlot`] for a seat outside the roster.
    pub fn set_muted(&mut self, slot: SlotIndex, muted: bool) -> GarrisonResult<()> {
        self.checked_slot_mut(slot)?.muted = muted;
        Ok(())
    }

    /// Grants or revokes a seat's admin standing, which widens what the
    /// authorization policy lets it send.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidSlot`] for a seat outside the roster.
    pub fn set_admin(&mut self, slot: SlotIndex, admin: bool) -> GarrisonResult<()> {
        self.checked_slot_mut(slot)?.admin = admin;
        Ok(())
    }

    /// Records a connection-health flag on a seat, e.g. when the caller's
    /// transport observed a stall.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidSlot`] for a seat outside the roster.
    pub fn set_connection_flag(&mut self, slot: SlotIndex, flag: ConnectionFlag) -> GarrisonResult<()> {
        self.checked_slot_mut(slot)?.status.set(flag);
        Ok(())
    }

    /// Clears every connection-health flag on a seat.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidSlot`] for a seat outside the roster.
    pub fn clear_connection_flags(&mut self, slot: SlotIndex) -> GarrisonResult<()> {
        self.checked_slot_mut(slot)?.status.clear();
        Ok(())
    }

    /// Enables or disables the debug override, which lets any seat act for
    /// any game seat. Never enable it in matches that matter.
    pub fn set_debug_override(&mut self, enabled: bool) {
        self.roster.set_debug_override(enabled);
    }

    // #############
    // # ACCESSORS #
    // #############

    /// Returns all events produced since the last call, oldest first.
    pub fn events(&mut self) -> EventDrain<'_> {
        EventDrain::from_drain(self.events.drain(..))
    }

    /// The role this session was built with.
    #[must_use]
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Where the session currently is in the match lifecycle.
    #[must_use]
    pub fn current_stage(&self) -> MatchStage {
        self.stage
    }

    /// The seat registry.
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// The local seat.
    #[must_use]
    pub fn local_slot(&self) -> SlotIndex {
        self.roster.local_slot()
    }

    /// The host's seat.
    #[must_use]
    pub fn host_slot(&self) -> SlotIndex {
        self.roster.host_slot()
    }

    /// Whether the host endpoint is known to be gone.
    #[must_use]
    pub fn host_has_dropped(&self) -> bool {
        self.host_gone
    }

    /// The current ping estimate for a seat: the rolling round-trip time,
    /// or the age of the outstanding probe once that is worse.
    #[must_use]
    pub fn current_ping(&self, slot: SlotIndex) -> Duration {
        self.pings.current_ping(slot, Instant::now())
    }

    /// A stable handle on a seat: live while occupied, frozen at the
    /// occupant's last state after they leave.
    #[must_use]
    pub fn player_reference(&self, slot: SlotIndex) -> Option<&PlayerReference> {
        self.references.get(slot.as_usize())
    }

    // #############
    // # INTERNALS #
    // #############

    /// Whether the local endpoint is still joining. Game-only kinds are
    /// dropped until this clears.
    fn local_still_joining(&self) -> bool {
        self.roster
            .slot(self.roster.local_slot())
            .is_some_and(|seat| seat.joining_in_progress)
    }

    /// Logs an invalid request and, on the host, removes the offender.
    fn reject_invalid_request(&mut self, offender: SlotIndex, context: &str) -> GarrisonResult<()> {
        error!(%offender, context, "invalid request from a peer");
        if !self.role.is_host() || offender == self.roster.host_slot() {
            return Ok(());
        }
        let connected = self
            .roster
            .slot(offender)
            .is_some_and(|seat| seat.connected && !seat.kicked);
        if !connected {
            return Ok(());
        }
        let name = self.seat_name(offender);
        self.broadcast_system_notice(&format!("Auto kicking {name}: invalid request."))?;
        self.kick(offender, "Invalid request.", LeaveReason::Invalid, true)
    }

    /// Resolves a claimed sender seat against its originating endpoint.
    /// Claims the origin does not answer for are corrected to the origin;
    /// claims naming no occupied seat are dropped.
    fn corrected_sender(&self, origin: SlotIndex, claimed: i64) -> Option<SlotIndex> {
        if claimed < 0 {
            debug!(%origin, claimed, "non-seat sender claim attributed to its origin");
            return Some(origin);
        }
        let index = claimed as usize;
        let claimed = SlotIndex::new(index);
        let Some(seat) = self.roster.slot(claimed) else {
            debug!(%origin, %claimed, "sender claim outside the roster");
            return None;
        };
        if seat.control == SlotControl::Open {
            debug!(%origin, %claimed, "sender claim for an open seat");
            return None;
        }
        if self.roster.whos_responsible(claimed) == origin {
            Some(claimed)
        } else {
            debug!(%origin, %claimed, "sender claim corrected to its origin");
            Some(origin)
        }
    }

    /// Broadcasts the departure of `slot` on the game channel and feeds it
    /// into the local queue, so this endpoint applies it on the same tick
    /// as everyone else.
    fn schedule_departure(&mut self, slot: SlotIndex) -> GarrisonResult<()> {
        let notice = codec::encode(&SlotPayload {
            slot: slot.as_usize() as u32,
        })?;
        let envelope = Envelope::game(MsgKind::PlayerLeft, notice);
        self.broadcast(&envelope);
        self.push_to_local_queue(envelope);
        Ok(())
    }

    /// Clears every per-seat structure once a departure has been applied.
    fn forget_endpoint(&mut self, slot: SlotIndex) {
        self.roster.reset_slot(slot);
        self.queues.reset_slot(slot.as_usize());
        self.pings.reset_slot(slot);
        self.monitors.reset_slot(slot);
        self.integrity.reset_slot(slot);
        self.transfers.drop_slot(slot);
        if let Some(address) = self.addresses.get_mut(slot.as_usize()) {
            *address = None;
        }
    }

    fn detach_reference(&mut self, slot: SlotIndex) {
        if let Some(reference) = self.references.get_mut(slot.as_usize()) {
            reference.detach(&self.roster);
        }
    }

    fn checked_slot_mut(&mut self, slot: SlotIndex) -> GarrisonResult<&mut PlayerSlot> {
        let num_slots = self.roster.num_slots();
        self.roster
            .slot_mut(slot)
            .ok_or(GarrisonError::InvalidSlot { slot, num_slots })
    }

    fn seat_name(&self, slot: SlotIndex) -> String {
        self.roster
            .slot(slot)
            .filter(|seat| !seat.name.is_empty())
            .map_or_else(|| format!("seat {slot}"), |seat| seat.name.clone())
    }

    fn push_event(&mut self, event: GarrisonEvent) {
        if self.events.len() >= self.max_events {
            trace!("event queue full; dropping the oldest event");
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn send_to_slot(&mut self, slot: SlotIndex, envelope: &Envelope) {
        if slot == self.roster.local_slot() {
            return;
        }
        match self.addresses.get(slot.as_usize()) {
            Some(Some(address)) => self.socket.send_to(envelope, address),
            _ => trace!(%slot, "no address for seat; message not sent"),
        }
    }

    fn broadcast(&mut self, envelope: &Envelope) {
        let local = self.roster.local_slot().as_usize();
        for (index, address) in self.addresses.iter().enumerate() {
            if index == local {
                continue;
            }
            if let Some(address) = address {
                self.socket.send_to(envelope, address);
            }
        }
    }

    fn broadcast_system_notice(&mut self, text: &str) -> GarrisonResult<()> {
        let notice = codec::encode(&ChatPayload {
            sender: SYSTEM_MESSAGE_SENDER,
            team_only: false,
            text: text.to_owned(),
        })?;
        self.broadcast(&Envelope::net(MsgKind::Chat, notice));
        Ok(())
    }

    fn send_system_notice_to(&mut self, slot: SlotIndex, text: &str) -> GarrisonResult<()> {
        let notice = codec::encode(&ChatPayload {
            sender: SYSTEM_MESSAGE_SENDER,
            team_only: false,
            text: text.to_owned(),
        })?;
        self.send_to_slot(slot, &Envelope::net(MsgKind::Chat, notice));
        Ok(())
    }

    fn push_to_local_queue(&mut self, envelope: Envelope) {
        let local = self.roster.local_slot().as_usize();
        let Some(queues) = self.queues.slot_mut(local) else {
            return;
        };
        match envelope.channel() {
            Channel::Net => queues.push_net(envelope),
            Channel::Game => queues.push_game(envelope),
        }
    }
}

fn decode_or_log<M: DeserializeOwned>(origin: SlotIndex, kind: MsgKind, payload: &[u8]) -> Option<M> {
    match codec::decode_value(payload) {
        Ok(msg) => Some(msg),
        Err(err) => {
            warn!(%origin, %kind, %err, "undecodable payload dropped");
            None
        }
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::sessions::builder::{SeatOccupant, SessionBuilder};
    use crate::ContentDigest;

    struct TestConfig;

    impl Config for TestConfig {
        type Address = u8;
    }

    const HOST_ADDR: u8 = 1;
    const GUEST_ADDR: u8 = 7;
    const WATCHER_ADDR: u8 = 9;

    /// A socket the tests script: envelopes pushed into `inbox` arrive on
    /// the next poll, everything sent lands in `outbox`.
    #[derive(Clone, Debug, Default)]
    struct ScriptedSocket {
        inbox: Rc<RefCell<VecDeque<(u8, Envelope)>>>,
        outbox: Rc<RefCell<Vec<(u8, Envelope)>>>,
    }

    impl NonBlockingSocket<u8> for ScriptedSocket {
        fn send_to(&mut self, envelope: &Envelope, addr: &u8) {
            self.outbox.borrow_mut().push((*addr, envelope.clone()));
        }

        fn receive_all_messages(&mut self) -> Vec<(u8, Envelope)> {
            self.inbox.borrow_mut().drain(..).collect()
        }
    }

    impl ScriptedSocket {
        fn inject(&self, from: u8, envelope: Envelope) {
            self.inbox.borrow_mut().push_back((from, envelope));
        }

        fn sent(&self) -> Vec<(u8, Envelope)> {
            self.outbox.borrow().clone()
        }

        fn sent_kinds_to(&self, addr: u8) -> Vec<u8> {
            self.outbox
                .borrow()
                .iter()
                .filter(|(to, _)| *to == addr)
                .map(|(_, envelope)| envelope.kind_byte())
                .collect()
        }

        fn clear_sent(&self) {
            self.outbox.borrow_mut().clear();
        }
    }

    /// Host session: local seat 0, one remote guest on seat 1.
    fn host_session() -> (LockstepSession<TestConfig>, ScriptedSocket) {
        let socket = ScriptedSocket::default();
        let handle = socket.clone();
        let session = SessionBuilder::<TestConfig>::new()
            .add_player(SeatOccupant::Local { name: "alice".to_owned() }, SlotIndex::new(0))
            .unwrap()
            .add_player(
                SeatOccupant::Remote { name: "bob".to_owned(), address: GUEST_ADDR },
                SlotIndex::new(1),
            )
            .unwrap()
            .start_session(socket)
            .unwrap();
        (session, handle)
    }

    /// Host session with an additional remote spectator on seat 2.
    fn host_with_spectator() -> (LockstepSession<TestConfig>, ScriptedSocket) {
        let socket = ScriptedSocket::default();
        let handle = socket.clone();
        let session = SessionBuilder::<TestConfig>::new()
            .with_spectator_slots(1)
            .add_player(SeatOccupant::Local { name: "alice".to_owned() }, SlotIndex::new(0))
            .unwrap()
            .add_player(
                SeatOccupant::Remote { name: "bob".to_owned(), address: GUEST_ADDR },
                SlotIndex::new(1),
            )
            .unwrap()
            .add_spectator(
                SeatOccupant::Remote { name: "carol".to_owned(), address: WATCHER_ADDR },
                SlotIndex::new(2),
            )
            .unwrap()
            .start_session(socket)
            .unwrap();
        (session, handle)
    }

    /// Client session: remote host on seat 0, local seat 1.
    fn client_session() -> (LockstepSession<TestConfig>, ScriptedSocket) {
        let socket = ScriptedSocket::default();
        let handle = socket.clone();
        let session = SessionBuilder::<TestConfig>::new()
            .add_player(
                SeatOccupant::Remote { name: "alice".to_owned(), address: HOST_ADDR },
                SlotIndex::new(0),
            )
            .unwrap()
            .add_player(SeatOccupant::Local { name: "bob".to_owned() }, SlotIndex::new(1))
            .unwrap()
            .start_session(socket)
            .unwrap();
        (session, handle)
    }

    fn chat_from(sender: i32, text: &str) -> Envelope {
        let payload = codec::encode(&ChatPayload {
            sender,
            team_only: false,
            text: text.to_owned(),
        })
        .unwrap();
        Envelope::net(MsgKind::Chat, payload)
    }

    fn slot_notice(kind: MsgKind, slot: u32) -> Envelope {
        Envelope::net(kind, codec::encode(&SlotPayload { slot }).unwrap())
    }

    fn events_of(session: &mut LockstepSession<TestConfig>) -> Vec<GarrisonEvent> {
        session.events().collect()
    }

    // ===== Dispatch Tests =====

    #[test]
    fn empty_poll_yields_nothing() {
        let (mut session, socket) = host_session();
        let commands = session.poll(GameTime::new(0)).unwrap();
        assert!(commands.is_empty());
        assert!(events_of(&mut session).is_empty());
        // The first poll may probe pings, but nothing else goes out.
        for kind in socket.sent_kinds_to(GUEST_ADDR) {
            assert_eq!(kind, MsgKind::Ping.as_u8());
        }
    }

    #[test]
    fn unknown_address_is_dropped() {
        let (mut session, socket) = host_session();
        socket.inject(42, chat_from(1, "who am i"));
        session.poll(GameTime::new(0)).unwrap();
        assert!(events_of(&mut session).is_empty());
    }

    #[test]
    fn unroutable_kind_byte_is_dropped() {
        let (mut session, socket) = host_session();
        socket.inject(GUEST_ADDR, Envelope::raw(Channel::Net, 99, vec![1, 2, 3]));
        session.poll(GameTime::new(0)).unwrap();
        assert!(events_of(&mut session).is_empty());
        assert!(!session.roster().slot(SlotIndex::new(1)).unwrap().kicked);
    }

    #[test]
    fn game_commands_wait_for_their_stamp() {
        let (mut session, socket) = client_session();
        let marker = codec::encode(&GameTimePayload { game_time: 1000 }).unwrap();
        socket.inject(HOST_ADDR, Envelope::game(MsgKind::GameTime, marker));
        socket.inject(HOST_ADDR, Envelope::game(MsgKind::UnitOrder, vec![5, 6]));

        let early = session.poll(GameTime::new(500)).unwrap();
        assert!(early.is_empty());

        let due = session.poll(GameTime::new(1000)).unwrap();
        assert_eq!(
            due,
            vec![GameCommand {
                origin: SlotIndex::new(0),
                kind: MsgKind::UnitOrder,
                at: GameTime::new(1000),
                payload: vec![5, 6],
            }]
        );
    }

    #[test]
    fn net_messages_bypass_the_game_clock() {
        let (mut session, socket) = client_session();
        let marker = codec::encode(&GameTimePayload { game_time: 5000 }).unwrap();
        socket.inject(HOST_ADDR, Envelope::game(MsgKind::GameTime, marker));
        socket.inject(HOST_ADDR, chat_from(0, "hello"));

        session.poll(GameTime::new(0)).unwrap();
        let events = events_of(&mut session);
        assert_eq!(
            events,
            vec![GarrisonEvent::Chat {
                sender: SlotIndex::new(0),
                team_only: false,
                text: "hello".to_owned(),
            }]
        );
    }

    #[test]
    fn own_game_commands_come_back_stamped() {
        let (mut session, socket) = host_session();
        session.send_game_time(GameTime::new(700)).unwrap();
        session.send_game_command(MsgKind::UnitOrder, vec![9]).unwrap();
        assert!(socket
            .sent_kinds_to(GUEST_ADDR)
            .contains(&MsgKind::UnitOrder.as_u8()));

        assert!(session.poll(GameTime::new(600)).unwrap().is_empty());
        let commands = session.poll(GameTime::new(700)).unwrap();
        assert_eq!(
            commands,
            vec![GameCommand {
                origin: SlotIndex::new(0),
                kind: MsgKind::UnitOrder,
                at: GameTime::new(700),
                payload: vec![9],
            }]
        );
    }

    #[test]
    fn send_game_command_rejects_net_kinds() {
        let (mut session, _socket) = host_session();
        assert!(matches!(
            session.send_game_command(MsgKind::Chat, vec![]),
            Err(GarrisonError::InvalidRequest { .. })
        ));
        assert!(matches!(
            session.send_game_command(MsgKind::GameTime, vec![]),
            Err(GarrisonError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn unauthorized_kind_gets_the_sender_removed() {
        let (mut session, socket) = host_session();
        socket.inject(GUEST_ADDR, Envelope::net(MsgKind::Options, vec![0]));
        session.poll(GameTime::new(0)).unwrap();

        let events = events_of(&mut session);
        assert!(events.iter().any(|event| matches!(
            event,
            GarrisonEvent::KickIssued { slot, code: LeaveReason::Invalid, .. }
                if *slot == SlotIndex::new(1)
        )));
        // The departure was scheduled and applied in the same poll.
        assert!(events
            .iter()
            .any(|event| matches!(event, GarrisonEvent::PlayerLeft { slot, .. } if *slot == SlotIndex::new(1))));
        let kinds = socket.sent_kinds_to(GUEST_ADDR);
        assert!(kinds.contains(&MsgKind::Kick.as_u8()));
        assert!(kinds.contains(&MsgKind::PlayerLeft.as_u8()));
    }

    #[test]
    fn replay_end_marker_is_ignored_on_live_sessions() {
        let (mut session, socket) = host_session();
        socket.inject(GUEST_ADDR, Envelope::raw(Channel::Net, 255, Vec::new()));
        session.poll(GameTime::new(0)).unwrap();
        assert!(events_of(&mut session).is_empty());
        assert_eq!(session.current_stage(), MatchStage::Lobby);
    }

    // ===== Chat Tests =====

    #[test]
    fn chat_surfaces_with_its_sender() {
        let (mut session, socket) = host_session();
        socket.inject(GUEST_ADDR, chat_from(1, "gl hf"));
        session.poll(GameTime::new(0)).unwrap();
        assert_eq!(
            events_of(&mut session),
            vec![GarrisonEvent::Chat {
                sender: SlotIndex::new(1),
                team_only: false,
                text: "gl hf".to_owned(),
            }]
        );
    }

    #[test]
    fn forged_sender_claim_is_corrected_to_the_origin() {
        let (mut session, socket) = host_session();
        // The guest claims the host's seat.
        socket.inject(GUEST_ADDR, chat_from(0, "i am the host"));
        session.poll(GameTime::new(0)).unwrap();
        assert_eq!(
            events_of(&mut session),
            vec![GarrisonEvent::Chat {
                sender: SlotIndex::new(1),
                team_only: false,
                text: "i am the host".to_owned(),
            }]
        );
    }

    #[test]
    fn sender_claim_outside_the_roster_is_dropped() {
        let (mut session, socket) = host_session();
        socket.inject(GUEST_ADDR, chat_from(9, "ghost"));
        session.poll(GameTime::new(0)).unwrap();
        assert!(events_of(&mut session).is_empty());
    }

    #[test]
    fn system_notice_from_the_host_is_trusted() {
        let (mut session, socket) = client_session();
        socket.inject(HOST_ADDR, chat_from(SYSTEM_MESSAGE_SENDER, "match paused"));
        session.poll(GameTime::new(0)).unwrap();
        assert_eq!(
            events_of(&mut session),
            vec![GarrisonEvent::SystemMessage {
                text: "match paused".to_owned(),
            }]
        );
    }

    #[test]
    fn spoofed_system_notice_surfaces_as_plain_chat() {
        let (mut session, socket) = host_session();
        socket.inject(GUEST_ADDR, chat_from(SYSTEM_MESSAGE_SENDER, "fake notice"));
        session.poll(GameTime::new(0)).unwrap();
        assert_eq!(
            events_of(&mut session),
            vec![GarrisonEvent::Chat {
                sender: SlotIndex::new(1),
                team_only: false,
                text: "fake notice".to_owned(),
            }]
        );
    }

    #[test]
    fn muted_seats_are_not_heard() {
        let (mut session, socket) = host_session();
        session.set_muted(SlotIndex::new(1), true).unwrap();
        socket.inject(GUEST_ADDR, chat_from(1, "spam"));
        session.poll(GameTime::new(0)).unwrap();
        assert!(events_of(&mut session).is_empty());
    }

    #[test]
    fn beacon_needs_order_authority_over_its_sender_seat() {
        let (mut session, socket) = host_session();
        let forged = codec::encode(&BeaconPayload {
            sender: 0,
            target: 0,
            x: 10,
            y: 20,
            text: "here".to_owned(),
        })
        .unwrap();
        socket.inject(GUEST_ADDR, Envelope::net(MsgKind::Beacon, forged));
        session.poll(GameTime::new(0)).unwrap();
        assert!(events_of(&mut session).is_empty());

        let honest = codec::encode(&BeaconPayload {
            sender: 1,
            target: 0,
            x: 10,
            y: 20,
            text: "here".to_owned(),
        })
        .unwrap();
        socket.inject(GUEST_ADDR, Envelope::net(MsgKind::Beacon, honest));
        session.poll(GameTime::new(0)).unwrap();
        assert_eq!(
            events_of(&mut session),
            vec![GarrisonEvent::Beacon {
                sender: SlotIndex::new(1),
                target: SlotIndex::new(0),
                x: 10,
                y: 20,
                text: "here".to_owned(),
            }]
        );
    }

    // ===== Lifecycle Tests =====

    #[test]
    fn start_match_flags_every_human_seat_as_joining() {
        let (mut session, _socket) = host_session();
        session.start_match().unwrap();
        assert_eq!(session.current_stage(), MatchStage::Loading);
        assert!(session.roster().slot(SlotIndex::new(0)).unwrap().joining_in_progress);
        assert!(session.roster().slot(SlotIndex::new(1)).unwrap().joining_in_progress);
        assert!(matches!(
            session.start_match(),
            Err(GarrisonError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn responding_notice_clears_the_joining_flag() {
        let (mut session, socket) = host_session();
        session.start_match().unwrap();
        socket.inject(GUEST_ADDR, slot_notice(MsgKind::PlayerResponding, 1));
        session.poll(GameTime::new(0)).unwrap();
        assert!(!session.roster().slot(SlotIndex::new(1)).unwrap().joining_in_progress);
        assert!(events_of(&mut session)
            .iter()
            .any(|event| matches!(event, GarrisonEvent::PlayerResponding { slot } if *slot == SlotIndex::new(1))));
    }

    #[test]
    fn responding_for_someone_elses_seat_is_rejected() {
        let (mut session, socket) = host_session();
        session.start_match().unwrap();
        // The guest claims the host's seat finished loading.
        socket.inject(GUEST_ADDR, slot_notice(MsgKind::PlayerResponding, 0));
        session.poll(GameTime::new(0)).unwrap();
        assert!(session.roster().slot(SlotIndex::new(0)).unwrap().joining_in_progress);
        assert!(events_of(&mut session).iter().any(|event| matches!(
            event,
            GarrisonEvent::KickIssued { slot, code: LeaveReason::Invalid, .. }
                if *slot == SlotIndex::new(1)
        )));
    }

    #[test]
    fn everyone_joined_fires_once() {
        let (mut session, socket) = host_session();
        session.start_match().unwrap();
        session.mark_loaded().unwrap();
        socket.inject(GUEST_ADDR, slot_notice(MsgKind::PlayerResponding, 1));
        session.poll(GameTime::new(40)).unwrap();
        assert_eq!(session.current_stage(), MatchStage::Active);
        let events = events_of(&mut session);
        assert!(events
            .iter()
            .any(|event| matches!(event, GarrisonEvent::EveryoneJoined { at } if *at == GameTime::new(40))));

        session.poll(GameTime::new(80)).unwrap();
        assert!(!events_of(&mut session)
            .iter()
            .any(|event| matches!(event, GarrisonEvent::EveryoneJoined { .. })));
    }

    #[test]
    fn client_reports_its_digest_once_everyone_joined() {
        let (mut session, socket) = client_session();
        session.start_match().unwrap();
        session.mark_loaded().unwrap();
        socket.clear_sent();
        socket.inject(HOST_ADDR, slot_notice(MsgKind::PlayerResponding, 0));
        session.poll(GameTime::new(10)).unwrap();
        assert_eq!(session.current_stage(), MatchStage::Active);
        assert!(socket
            .sent_kinds_to(HOST_ADDR)
            .contains(&MsgKind::DataCheck.as_u8()));
    }

    #[test]
    fn departures_reset_the_seat() {
        let (mut session, socket) = host_session();
        session.kick(SlotIndex::new(1), "asked for it", LeaveReason::Kicked, false).unwrap();
        assert!(session.roster().slot(SlotIndex::new(1)).unwrap().kicked);

        session.poll(GameTime::new(0)).unwrap();
        let events = events_of(&mut session);
        assert!(events
            .iter()
            .any(|event| matches!(event, GarrisonEvent::PlayerLeft { slot, .. } if *slot == SlotIndex::new(1))));
        let seat = session.roster().slot(SlotIndex::new(1)).unwrap();
        assert_eq!(seat.control, SlotControl::Open);
        assert!(!seat.kicked);
        // The frozen handle still knows who sat there.
        let reference = session.player_reference(SlotIndex::new(1)).unwrap();
        assert!(reference.is_detached());
        assert_eq!(reference.read(session.roster()).unwrap().name, "bob");
        drop(socket);
    }

    #[test]
    fn kick_is_host_only() {
        let (mut session, _socket) = client_session();
        assert!(matches!(
            session.kick(SlotIndex::new(0), "no", LeaveReason::Kicked, false),
            Err(GarrisonError::NotHost { .. })
        ));
    }

    #[test]
    fn the_host_seat_cannot_be_kicked() {
        let (mut session, _socket) = host_session();
        assert!(matches!(
            session.kick(SlotIndex::new(0), "self", LeaveReason::Kicked, false),
            Err(GarrisonError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn kicked_client_learns_why() {
        let (mut session, socket) = client_session();
        let payload = codec::encode(&KickPayload {
            slot: 1,
            reason: "too slow".to_owned(),
            code: LeaveReason::Connection,
        })
        .unwrap();
        socket.inject(HOST_ADDR, Envelope::net(MsgKind::Kick, payload));
        session.poll(GameTime::new(0)).unwrap();
        assert_eq!(
            events_of(&mut session),
            vec![GarrisonEvent::KickedFromSession {
                reason: "too slow".to_owned(),
                code: LeaveReason::Connection,
            }]
        );
        assert!(session.roster().slot(SlotIndex::new(1)).unwrap().kicked);
    }

    #[test]
    fn host_dropped_notice_quarantines_the_host_seat() {
        let (mut session, socket) = client_session();
        socket.inject(HOST_ADDR, Envelope::net(MsgKind::HostDropped, Vec::new()));
        session.poll(GameTime::new(0)).unwrap();
        assert!(session.host_has_dropped());
        assert!(session.roster().slot(SlotIndex::new(0)).unwrap().pending_disconnect);
        assert!(events_of(&mut session)
            .iter()
            .any(|event| matches!(event, GarrisonEvent::HostDropped)));
    }

    #[test]
    fn spectators_lose_public_chat_once_the_match_runs() {
        let (mut session, socket) = host_with_spectator();
        // Lobby chat from the spectator is fine.
        let spectator_chat = codec::encode(&ChatPayload {
            sender: 2,
            team_only: false,
            text: "hi all".to_owned(),
        })
        .unwrap();
        socket.inject(WATCHER_ADDR, Envelope::net(MsgKind::Chat, spectator_chat.clone()));
        session.poll(GameTime::new(0)).unwrap();
        assert_eq!(events_of(&mut session).len(), 1);

        session.start_match().unwrap();
        session.mark_loaded().unwrap();
        socket.inject(GUEST_ADDR, slot_notice(MsgKind::PlayerResponding, 1));
        socket.inject(WATCHER_ADDR, slot_notice(MsgKind::PlayerResponding, 2));
        session.poll(GameTime::new(0)).unwrap();
        assert_eq!(session.current_stage(), MatchStage::Active);
        events_of(&mut session);

        socket.inject(WATCHER_ADDR, Envelope::net(MsgKind::Chat, spectator_chat));
        session.poll(GameTime::new(10)).unwrap();
        assert!(events_of(&mut session).iter().any(|event| matches!(
            event,
            GarrisonEvent::KickIssued { slot, code: LeaveReason::Invalid, .. }
                if *slot == SlotIndex::new(2)
        )));
    }

    #[test]
    fn event_queue_drops_the_oldest_past_its_limit() {
        let socket = ScriptedSocket::default();
        let handle = socket.clone();
        let mut session = SessionBuilder::<TestConfig>::new()
            .add_player(SeatOccupant::Local { name: "alice".to_owned() }, SlotIndex::new(0))
            .unwrap()
            .add_player(
                SeatOccupant::Remote { name: "bob".to_owned(), address: GUEST_ADDR },
                SlotIndex::new(1),
            )
            .unwrap()
            .with_event_queue_size(10)
            .unwrap()
            .start_session(socket)
            .unwrap();
        for index in 0..12 {
            handle.inject(GUEST_ADDR, chat_from(1, &index.to_string()));
        }
        session.poll(GameTime::new(0)).unwrap();
        let events = events_of(&mut session);
        assert_eq!(events.len(), 10);
        assert_eq!(
            events[0],
            GarrisonEvent::Chat {
                sender: SlotIndex::new(1),
                team_only: false,
                text: "2".to_owned(),
            }
        );
    }

    // ===== Integrity Tests =====

    #[test]
    fn mismatched_digest_report_removes_the_seat() {
        let (mut session, socket) = host_session();
        let mut digest = ContentDigest::zeroed();
        digest.0[4] = 0xdead_beef;
        let report = codec::encode(&DataCheckPayload { digest }).unwrap();
        socket.inject(GUEST_ADDR, Envelope::net(MsgKind::DataCheck, report));
        session.poll(GameTime::new(0)).unwrap();

        let events = events_of(&mut session);
        assert!(events
            .iter()
            .any(|event| matches!(event, GarrisonEvent::IntegrityFailed { slot } if *slot == SlotIndex::new(1))));
        assert!(events.iter().any(|event| matches!(
            event,
            GarrisonEvent::KickIssued { slot, code: LeaveReason::WrongData, .. }
                if *slot == SlotIndex::new(1)
        )));
    }

    #[test]
    fn matching_digest_report_verifies_the_seat() {
        let (mut session, socket) = host_session();
        let report = codec::encode(&DataCheckPayload {
            digest: ContentDigest::zeroed(),
        })
        .unwrap();
        socket.inject(GUEST_ADDR, Envelope::net(MsgKind::DataCheck, report));
        session.poll(GameTime::new(0)).unwrap();
        assert!(events_of(&mut session)
            .iter()
            .any(|event| matches!(event, GarrisonEvent::IntegrityVerified { slot } if *slot == SlotIndex::new(1))));
        assert!(session.roster().slot(SlotIndex::new(1)).unwrap().integrity_verified);
    }

    #[test]
    fn clients_answer_state_challenges() {
        let (mut session, socket) = client_session();
        let challenge = codec::encode(&IntegrityChallenge { host_slot: 0 }).unwrap();
        socket.inject(HOST_ADDR, Envelope::net(MsgKind::DataCheck2, challenge));
        session.poll(GameTime::new(0)).unwrap();

        let sent = socket.sent();
        let reply = sent
            .iter()
            .find(|(to, envelope)| *to == HOST_ADDR && envelope.kind() == Some(MsgKind::DataCheck2))
            .expect("no challenge response on the wire");
        let response: IntegrityResponse = codec::decode_value(reply.1.payload()).unwrap();
        assert_eq!(response.claimed_slot, 1);
        assert_eq!(response.echo_slot, 1);
        assert_eq!(response.ai_index, -1);
        assert!(!response.god_mode);
    }

    #[test]
    fn challenges_from_non_hosts_are_ignored() {
        let (mut session, socket) = host_with_spectator();
        // A guest pretends to challenge us. On the host session the payload
        // fails to parse as a response, which is logged and dropped.
        let challenge = codec::encode(&IntegrityChallenge { host_slot: 1 }).unwrap();
        socket.inject(GUEST_ADDR, Envelope::net(MsgKind::DataCheck2, challenge));
        session.poll(GameTime::new(0)).unwrap();
        assert!(!session.roster().slot(SlotIndex::new(1)).unwrap().kicked);
        drop(events_of(&mut session));
    }

    // ===== File Transfer Tests =====

    #[test]
    fn hosted_files_are_chunked_to_the_requester() {
        let (mut session, socket) = host_session();
        let digest = FileDigest([7; 32]);
        session.host_file(digest, "canyon.map", vec![1, 2, 3, 4, 5]).unwrap();
        let request = codec::encode(&FileRequestPayload { digest }).unwrap();
        socket.inject(GUEST_ADDR, Envelope::net(MsgKind::FileRequested, request));
        session.poll(GameTime::new(0)).unwrap();

        let sent = socket.sent();
        let chunk = sent
            .iter()
            .find(|(to, envelope)| *to == GUEST_ADDR && envelope.kind() == Some(MsgKind::FilePayload))
            .expect("no file chunk on the wire");
        let payload: FileChunkPayload = codec::decode_value(chunk.1.payload()).unwrap();
        assert_eq!(payload.digest, digest);
        assert_eq!(payload.total_size, 5);
        assert_eq!(payload.data, vec![1, 2, 3, 4, 5]);
        assert!(events_of(&mut session).iter().any(|event| matches!(
            event,
            GarrisonEvent::FileSendProgress { slot, percent: 100 } if *slot == SlotIndex::new(1)
        )));
    }

    #[test]
    fn hosting_files_is_host_only() {
        let (mut session, _socket) = client_session();
        assert!(matches!(
            session.host_file(FileDigest([1; 32]), "x", vec![]),
            Err(GarrisonError::NotHost { .. })
        ));
    }

    #[test]
    fn received_chunks_complete_into_a_file() {
        let (mut session, socket) = client_session();
        let digest = FileDigest([9; 32]);
        let chunk = codec::encode(&FileChunkPayload {
            digest,
            total_size: 4,
            offset: 0,
            data: vec![1, 2, 3, 4],
        })
        .unwrap();
        socket.inject(HOST_ADDR, Envelope::net(MsgKind::FilePayload, chunk));
        session.poll(GameTime::new(0)).unwrap();
        assert!(events_of(&mut session)
            .iter()
            .any(|event| matches!(event, GarrisonEvent::FileReceiveComplete)));
        assert_eq!(session.take_received_file(), Some((digest, vec![1, 2, 3, 4])));
        assert_eq!(session.take_received_file(), None);
    }

    #[test]
    fn file_chunks_from_non_hosts_are_a_violation() {
        let (mut session, socket) = host_session();
        let chunk = codec::encode(&FileChunkPayload {
            digest: FileDigest([3; 32]),
            total_size: 1,
            offset: 0,
            data: vec![1],
        })
        .unwrap();
        socket.inject(GUEST_ADDR, Envelope::net(MsgKind::FilePayload, chunk));
        session.poll(GameTime::new(0)).unwrap();
        assert!(events_of(&mut session).iter().any(|event| matches!(
            event,
            GarrisonEvent::KickIssued { slot, code: LeaveReason::Invalid, .. }
                if *slot == SlotIndex::new(1)
        )));
    }
}

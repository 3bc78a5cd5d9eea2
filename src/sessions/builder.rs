use std::collections::BTreeMap;

use crate::{
    sessions::config::SessionConfig,
    sessions::integrity::{IntegrityProbe, NoLocalState},
    sessions::lockstep_session::LockstepSession,
    sessions::roster::{PlayerSlot, Roster, SlotControl},
    Config, GarrisonError, IntegrityConfig, MonitorConfig, NonBlockingSocket, SessionRole,
    SlotIndex, TransferConfig,
};

const DEFAULT_GAME_SLOTS: usize = 2;
const DEFAULT_SPECTATOR_SLOTS: usize = 0;
/// Default event queue size.
/// Events older than this threshold may be dropped if not polled.
const DEFAULT_EVENT_QUEUE_SIZE: usize = 100;
/// Smallest accepted event queue size. A single poll can produce a burst of
/// events (a kick plus its warning plus a departure), so queues below this
/// would drop events the caller never saw.
const MIN_EVENT_QUEUE_SIZE: usize = 10;

/// Who sits in a seat registered with the [`SessionBuilder`].
///
/// The seat table is fixed at session start. Game seats (indices below the
/// game slot count) may hold any occupant; spectator seats hold humans only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatOccupant<A> {
    /// The endpoint building this session.
    Local {
        /// Display name for the local occupant.
        name: String,
    },
    /// A remote human endpoint reachable at the given address.
    ///
    /// The address identifies the originating endpoint to the socket layer.
    /// For relayed transports this is a logical peer identity, not the relay
    /// hop the bytes travel through.
    Remote {
        /// Display name for the remote occupant.
        name: String,
        /// Where the socket reaches this occupant.
        address: A,
    },
    /// A computer opponent, simulated by the endpoint responsible for its
    /// seat (the host, unless the seat is the local one).
    Computer {
        /// Display name for the computer occupant.
        name: String,
        /// Which computer profile fills the seat. Must be non-negative.
        ai_index: i8,
    },
}

impl<A> SeatOccupant<A> {
    /// Display name of the occupant.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            SeatOccupant::Local { name }
            | SeatOccupant::Remote { name, .. }
            | SeatOccupant::Computer { name, .. } => name,
        }
    }
}

/// The [`SessionBuilder`] assembles a [`LockstepSession`].
///
/// Register the seat table (who occupies which slot), pick the host seat,
/// adjust the monitor, integrity and transfer configurations, then call
/// [`start_session`](Self::start_session) to consume the builder.
///
/// # Examples
///
/// ```
/// use garrison_lockstep::{Config, SeatOccupant, SessionBuilder, SlotIndex};
///
/// struct MyConfig;
/// impl Config for MyConfig {
///     type Address = std::net::SocketAddr;
/// }
///
/// # fn main() -> Result<(), garrison_lockstep::GarrisonError> {
/// let builder = SessionBuilder::<MyConfig>::new()
///     .with_game_slots(2)?
///     .add_player(
///         SeatOccupant::Local {
///             name: "host".to_owned(),
///         },
///         SlotIndex::new(0),
///     )?
///     .add_player(
///         SeatOccupant::Remote {
///             name: "challenger".to_owned(),
///             address: "127.0.0.1:7000".parse().expect("valid address"),
///         },
///         SlotIndex::new(1),
///     )?;
/// # let _ = builder;
/// # Ok(())
/// # }
/// ```
#[must_use = "SessionBuilder must be consumed by calling start_session()"]
pub struct SessionBuilder<T>
where
    T: Config,
{
    /// Number of game seats; seats at or past this index are spectator seats.
    game_slots: usize,
    /// Number of spectator seats, appended after the game seats.
    spectator_slots: usize,
    /// Claimed seats. Unclaimed seats start open.
    seats: BTreeMap<SlotIndex, SeatOccupant<T::Address>>,
    /// The seat whose occupant hosts the match.
    host_slot: SlotIndex,
    /// Whether this session replays a recorded stream instead of a live match.
    replay: bool,
    /// Monitor, integrity and transfer configuration bundle.
    config: SessionConfig,
    /// Reports the local content digest, overlays and cheat state.
    probe: Box<dyn IntegrityProbe>,
    /// Maximum number of events to queue before oldest are dropped.
    event_queue_size: usize,
}

impl<T: Config> std::fmt::Debug for SessionBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        // The compiler will error if a new field is added but not handled here.
        let Self {
            game_slots,
            spectator_slots,
            seats,
            host_slot,
            replay,
            config,
            probe: _,
            event_queue_size,
        } = self;

        f.debug_struct("SessionBuilder")
            .field("game_slots", game_slots)
            .field("spectator_slots", spectator_slots)
            .field("seats", seats)
            .field("host_slot", host_slot)
            .field("replay", replay)
            .field("config", config)
            .field("probe", &"<dyn IntegrityProbe>")
            .field("event_queue_size", event_queue_size)
            .finish()
    }
}

impl<T: Config> Default for SessionBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Config> SessionBuilder<T> {
    /// Construct a new builder with all values set to their defaults.
    pub fn new() -> Self {
        Self {
            game_slots: DEFAULT_GAME_SLOTS,
            spectator_slots: DEFAULT_SPECTATOR_SLOTS,
            seats: BTreeMap::new(),
            host_slot: SlotIndex::new(0),
            replay: false,
            config: SessionConfig::default(),
            probe: Box::new(NoLocalState),
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
        }
    }

    /// Change the number of game seats. Default is 2.
    ///
    /// Seats claimed before this call keep their indices; claims that no
    /// longer fit the new seat ranges are rejected by
    /// [`start_session`](Self::start_session).
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if `game_slots` is 0.
    ///
    /// [`InvalidRequest`]: GarrisonError::InvalidRequest
    pub fn with_game_slots(mut self, game_slots: usize) -> Result<Self, GarrisonError> {
        if game_slots == 0 {
            return Err(GarrisonError::InvalidRequest {
                info: "A session needs at least one game seat.".to_owned(),
            });
        }
        self.game_slots = game_slots;
        Ok(self)
    }

    /// Change the number of spectator seats. Default is 0.
    ///
    /// Spectator seats follow the game seats: with `g` game seats and `s`
    /// spectator seats, spectators occupy indices `g..g + s`.
    pub fn with_spectator_slots(mut self, spectator_slots: usize) -> Self {
        self.spectator_slots = spectator_slots;
        self
    }

    /// Claims a game seat for an occupant. Must be called once per occupied
    /// game seat before starting the session; seats never claimed stay open.
    ///
    /// # Errors
    /// - Returns [`InvalidSlot`] if `slot` is not a game seat.
    /// - Returns [`InvalidRequest`] if the seat is already claimed, if a
    ///   local occupant was already registered elsewhere, if the address is
    ///   already in use by another seat, or if a computer occupant carries a
    ///   negative `ai_index`.
    ///
    /// [`InvalidSlot`]: GarrisonError::InvalidSlot
    /// [`InvalidRequest`]: GarrisonError::InvalidRequest
    pub fn add_player(
        mut self,
        occupant: SeatOccupant<T::Address>,
        slot: SlotIndex,
    ) -> Result<Self, GarrisonError> {
        if !slot.is_game_seat_for(self.game_slots) {
            return Err(GarrisonError::InvalidSlot {
                slot,
                num_slots: self.game_slots,
            });
        }
        self.claim(occupant, slot)?;
        Ok(self)
    }

    /// Claims a spectator seat for an occupant. Spectator seats hold humans
    /// only; computer occupants are rejected.
    ///
    /// # Errors
    /// - Returns [`InvalidSlot`] if `slot` is not a spectator seat.
    /// - Returns [`InvalidRequest`] if the occupant is a computer, or for the
    ///   same claim conflicts as [`add_player`](Self::add_player).
    ///
    /// [`InvalidSlot`]: GarrisonError::InvalidSlot
    /// [`InvalidRequest`]: GarrisonError::InvalidRequest
    pub fn add_spectator(
        mut self,
        occupant: SeatOccupant<T::Address>,
        slot: SlotIndex,
    ) -> Result<Self, GarrisonError> {
        let num_slots = self.game_slots + self.spectator_slots;
        if !slot.is_spectator_seat_for(self.game_slots) || slot.as_usize() >= num_slots {
            return Err(GarrisonError::InvalidSlot { slot, num_slots });
        }
        if matches!(occupant, SeatOccupant::Computer { .. }) {
            return Err(GarrisonError::InvalidRequest {
                info: "Spectator seats hold human occupants only.".to_owned(),
            });
        }
        self.claim(occupant, slot)?;
        Ok(self)
    }

    fn claim(
        &mut self,
        occupant: SeatOccupant<T::Address>,
        slot: SlotIndex,
    ) -> Result<(), GarrisonError> {
        if self.seats.contains_key(&slot) {
            return Err(GarrisonError::InvalidRequest {
                info: format!("Seat {slot} is already claimed."),
            });
        }
        match &occupant {
            SeatOccupant::Local { .. } => {
                if self
                    .seats
                    .values()
                    .any(|claimed| matches!(claimed, SeatOccupant::Local { .. }))
                {
                    return Err(GarrisonError::InvalidRequest {
                        info: "A session has exactly one local seat.".to_owned(),
                    });
                }
            }
            SeatOccupant::Remote { address, .. } => {
                if self.seats.iter().any(|(_, claimed)| {
                    matches!(claimed, SeatOccupant::Remote { address: used, .. } if used == address)
                }) {
                    return Err(GarrisonError::InvalidRequest {
                        info: format!("Address {address:?} is already bound to another seat."),
                    });
                }
            }
            SeatOccupant::Computer { ai_index, .. } => {
                if *ai_index < 0 {
                    return Err(GarrisonError::InvalidRequest {
                        info: format!("Computer occupants need a non-negative profile, got {ai_index}."),
                    });
                }
            }
        }
        self.seats.insert(slot, occupant);
        Ok(())
    }

    /// Picks the host seat. Default is seat 0.
    ///
    /// The host seat must be claimed by a human occupant (local or remote)
    /// when the session starts. A spectator seat may host: some matches are
    /// run by an operator who never takes a game seat.
    pub fn with_host(mut self, slot: SlotIndex) -> Self {
        self.host_slot = slot;
        self
    }

    /// Marks this session as a replay viewer.
    ///
    /// A replay session consumes a recorded stream fed through the socket
    /// seam instead of a live match, and it processes the end-of-stream
    /// marker that live sessions ignore.
    pub fn as_replay_viewer(mut self) -> Self {
        self.replay = true;
        self
    }

    /// Sets the connection-health monitor configuration.
    ///
    /// See [`MonitorConfig`] for available options and presets.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if the configuration is inconsistent,
    ///   see [`MonitorConfig::validate`].
    ///
    /// [`InvalidRequest`]: GarrisonError::InvalidRequest
    pub fn with_monitor_config(mut self, monitors: MonitorConfig) -> Result<Self, GarrisonError> {
        monitors.validate()?;
        self.config.monitors = monitors;
        Ok(self)
    }

    /// Sets the data-integrity handshake configuration.
    ///
    /// See [`IntegrityConfig`] for available options and presets.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if the configuration is inconsistent,
    ///   see [`IntegrityConfig::validate`].
    ///
    /// [`InvalidRequest`]: GarrisonError::InvalidRequest
    pub fn with_integrity_config(
        mut self,
        integrity: IntegrityConfig,
    ) -> Result<Self, GarrisonError> {
        integrity.validate()?;
        self.config.integrity = integrity;
        Ok(self)
    }

    /// Sets the file transfer configuration.
    ///
    /// See [`TransferConfig`] for available options and presets.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if the configuration is inconsistent,
    ///   see [`TransferConfig::validate`].
    ///
    /// [`InvalidRequest`]: GarrisonError::InvalidRequest
    pub fn with_transfer_config(mut self, transfer: TransferConfig) -> Result<Self, GarrisonError> {
        transfer.validate()?;
        self.config.transfer = transfer;
        Ok(self)
    }

    /// Sets the whole configuration bundle at once.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if any part of the bundle is
    ///   inconsistent, see [`SessionConfig::validate`].
    ///
    /// [`InvalidRequest`]: GarrisonError::InvalidRequest
    pub fn with_session_config(mut self, config: SessionConfig) -> Result<Self, GarrisonError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Sets the probe that reports the local content digest, overlay layers
    /// and cheat state for the data-integrity handshake. Defaults to
    /// [`NoLocalState`], which reports nothing.
    pub fn with_integrity_probe(mut self, probe: impl IntegrityProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Sets the maximum number of events to queue before oldest are dropped.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if `size` is less than 10.
    ///
    /// [`InvalidRequest`]: GarrisonError::InvalidRequest
    pub fn with_event_queue_size(mut self, size: usize) -> Result<Self, GarrisonError> {
        if size < MIN_EVENT_QUEUE_SIZE {
            return Err(GarrisonError::InvalidRequest {
                info: format!(
                    "Event queue size {size} is below the minimum of {MIN_EVENT_QUEUE_SIZE}."
                ),
            });
        }
        self.event_queue_size = size;
        Ok(self)
    }

    /// Consumes the builder to construct a [`LockstepSession`].
    ///
    /// The session's role follows from the seat table: the endpoint hosting
    /// the match if the local seat is the host seat, a client otherwise, or
    /// a replay viewer if [`as_replay_viewer`](Self::as_replay_viewer) was
    /// called.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if no local seat was registered, if the
    ///   host seat is open or held by a computer, or if the configuration
    ///   bundle is inconsistent.
    /// - Returns [`InvalidSlot`] if a claimed seat no longer fits the seat
    ///   ranges (the seat counts were shrunk after the claim).
    ///
    /// [`InvalidRequest`]: GarrisonError::InvalidRequest
    /// [`InvalidSlot`]: GarrisonError::InvalidSlot
    pub fn start_session(
        self,
        socket: impl NonBlockingSocket<T::Address> + 'static,
    ) -> Result<LockstepSession<T>, GarrisonError> {
        self.config.validate()?;

        let num_slots = self.game_slots + self.spectator_slots;
        for (&slot, occupant) in &self.seats {
            if slot.as_usize() >= num_slots {
                return Err(GarrisonError::InvalidSlot { slot, num_slots });
            }
            if matches!(occupant, SeatOccupant::Computer { .. })
                && !slot.is_game_seat_for(self.game_slots)
            {
                return Err(GarrisonError::InvalidSlot {
                    slot,
                    num_slots: self.game_slots,
                });
            }
        }

        let local_slot = self
            .seats
            .iter()
            .find_map(|(&slot, occupant)| {
                matches!(occupant, SeatOccupant::Local { .. }).then_some(slot)
            })
            .ok_or_else(|| GarrisonError::InvalidRequest {
                info: "No local seat was registered; add a SeatOccupant::Local first.".to_owned(),
            })?;

        match self.seats.get(&self.host_slot) {
            Some(SeatOccupant::Local { .. } | SeatOccupant::Remote { .. }) => {}
            Some(SeatOccupant::Computer { .. }) | None => {
                return Err(GarrisonError::InvalidRequest {
                    info: format!(
                        "Host seat {} must be claimed by a human occupant.",
                        self.host_slot
                    ),
                });
            }
        }

        // Build the seat registry and the slot-to-address table.
        let mut slots = Vec::with_capacity(num_slots);
        let mut addresses: Vec<Option<T::Address>> = Vec::with_capacity(num_slots);
        for index in 0..num_slots {
            let mut entry = PlayerSlot {
                spectator: index >= self.game_slots,
                ..PlayerSlot::default()
            };
            let mut address = None;
            if let Some(occupant) = self.seats.get(&SlotIndex::new(index)) {
                entry.name = occupant.name().to_owned();
                entry.connected = true;
                entry.control = match occupant {
                    SeatOccupant::Local { .. } | SeatOccupant::Remote { .. } => SlotControl::Human,
                    SeatOccupant::Computer { ai_index, .. } => SlotControl::Computer {
                        ai_index: *ai_index,
                    },
                };
                if let SeatOccupant::Remote { address: addr, .. } = occupant {
                    entry.ip_address = format!("{addr:?}");
                    address = Some(addr.clone());
                }
            }
            slots.push(entry);
            addresses.push(address);
        }

        let role = if self.replay {
            SessionRole::Replay
        } else if local_slot == self.host_slot {
            SessionRole::Host
        } else {
            SessionRole::Client
        };
        let roster = Roster::new(slots, self.game_slots, self.host_slot, local_slot);

        Ok(LockstepSession::<T>::new(
            Box::new(socket),
            addresses,
            roster,
            role,
            self.config,
            self.probe,
            self.event_queue_size,
        ))
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::Envelope;
    use std::net::SocketAddr;

    struct TestConfig;

    impl Config for TestConfig {
        type Address = SocketAddr;
    }

    /// A socket that goes nowhere, for builder validation tests.
    struct NullSocket;

    impl NonBlockingSocket<SocketAddr> for NullSocket {
        fn send_to(&mut self, _envelope: &Envelope, _addr: &SocketAddr) {}

        fn receive_all_messages(&mut self) -> Vec<(SocketAddr, Envelope)> {
            Vec::new()
        }
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn local(name: &str) -> SeatOccupant<SocketAddr> {
        SeatOccupant::Local {
            name: name.to_owned(),
        }
    }

    fn remote(name: &str, port: u16) -> SeatOccupant<SocketAddr> {
        SeatOccupant::Remote {
            name: name.to_owned(),
            address: addr(port),
        }
    }

    // ========================================================================
    // Seat Claim Tests
    // ========================================================================

    #[test]
    fn add_player_rejects_spectator_seat_index() {
        let result = SessionBuilder::<TestConfig>::new().add_player(local("a"), SlotIndex::new(2));
        assert!(matches!(result, Err(GarrisonError::InvalidSlot { .. })));
    }

    #[test]
    fn add_player_rejects_double_claim() {
        let result = SessionBuilder::<TestConfig>::new()
            .add_player(local("a"), SlotIndex::new(0))
            .unwrap()
            .add_player(remote("b", 7000), SlotIndex::new(0));
        assert!(matches!(result, Err(GarrisonError::InvalidRequest { .. })));
    }

    #[test]
    fn add_player_rejects_second_local_seat() {
        let result = SessionBuilder::<TestConfig>::new()
            .add_player(local("a"), SlotIndex::new(0))
            .unwrap()
            .add_player(local("b"), SlotIndex::new(1));
        assert!(matches!(result, Err(GarrisonError::InvalidRequest { .. })));
    }

    #[test]
    fn add_player_rejects_duplicate_address() {
        let result = SessionBuilder::<TestConfig>::new()
            .add_player(remote("a", 7000), SlotIndex::new(0))
            .unwrap()
            .add_player(remote("b", 7000), SlotIndex::new(1));
        assert!(matches!(result, Err(GarrisonError::InvalidRequest { .. })));
    }

    #[test]
    fn add_player_rejects_negative_computer_profile() {
        let occupant = SeatOccupant::Computer {
            name: "bot".to_owned(),
            ai_index: -1,
        };
        let result = SessionBuilder::<TestConfig>::new().add_player(occupant, SlotIndex::new(1));
        assert!(matches!(result, Err(GarrisonError::InvalidRequest { .. })));
    }

    #[test]
    fn add_spectator_rejects_game_seat_index() {
        let result = SessionBuilder::<TestConfig>::new()
            .with_spectator_slots(1)
            .add_spectator(local("watcher"), SlotIndex::new(1));
        assert!(matches!(result, Err(GarrisonError::InvalidSlot { .. })));
    }

    #[test]
    fn add_spectator_rejects_index_past_seat_table() {
        let result = SessionBuilder::<TestConfig>::new()
            .with_spectator_slots(1)
            .add_spectator(local("watcher"), SlotIndex::new(3));
        assert!(matches!(result, Err(GarrisonError::InvalidSlot { .. })));
    }

    #[test]
    fn add_spectator_rejects_computer_occupant() {
        let occupant = SeatOccupant::Computer {
            name: "bot".to_owned(),
            ai_index: 0,
        };
        let result = SessionBuilder::<TestConfig>::new()
            .with_spectator_slots(1)
            .add_spectator(occupant, SlotIndex::new(2));
        assert!(matches!(result, Err(GarrisonError::InvalidRequest { .. })));
    }

    #[test]
    fn with_game_slots_rejects_zero() {
        let result = SessionBuilder::<TestConfig>::new().with_game_slots(0);
        assert!(result.is_err());
    }

    // ========================================================================
    // Config Setter Tests
    // ========================================================================

    #[test]
    fn with_monitor_config_applies_to_builder() {
        let builder = SessionBuilder::<TestConfig>::new()
            .with_monitor_config(MonitorConfig::relaxed())
            .unwrap();
        assert_eq!(builder.config.monitors, MonitorConfig::relaxed());
    }

    #[test]
    fn with_transfer_config_rejects_invalid() {
        let bad = TransferConfig {
            chunk_size: 0,
            ..TransferConfig::default()
        };
        let result = SessionBuilder::<TestConfig>::new().with_transfer_config(bad);
        assert!(result.is_err());
    }

    #[test]
    fn with_event_queue_size_rejects_too_small() {
        let result = SessionBuilder::<TestConfig>::new().with_event_queue_size(9);
        assert!(result.is_err());
    }

    #[test]
    fn with_event_queue_size_accepts_minimum() {
        let builder = SessionBuilder::<TestConfig>::new()
            .with_event_queue_size(10)
            .expect("minimum event queue size is valid");
        assert_eq!(builder.event_queue_size, 10);
    }

    #[test]
    fn builder_defaults() {
        let builder = SessionBuilder::<TestConfig>::new();
        assert_eq!(builder.game_slots, DEFAULT_GAME_SLOTS);
        assert_eq!(builder.spectator_slots, DEFAULT_SPECTATOR_SLOTS);
        assert_eq!(builder.event_queue_size, DEFAULT_EVENT_QUEUE_SIZE);
        assert_eq!(builder.host_slot, SlotIndex::new(0));
        assert!(!builder.replay);
    }

    // ========================================================================
    // Session Start Tests
    // ========================================================================

    #[test]
    fn start_session_requires_local_seat() {
        let result = SessionBuilder::<TestConfig>::new()
            .add_player(remote("a", 7000), SlotIndex::new(0))
            .unwrap()
            .start_session(NullSocket);
        assert!(matches!(result, Err(GarrisonError::InvalidRequest { .. })));
    }

    #[test]
    fn start_session_requires_human_host_seat() {
        let bot = SeatOccupant::Computer {
            name: "bot".to_owned(),
            ai_index: 0,
        };
        let result = SessionBuilder::<TestConfig>::new()
            .add_player(bot, SlotIndex::new(0))
            .unwrap()
            .add_player(local("b"), SlotIndex::new(1))
            .unwrap()
            .start_session(NullSocket);
        assert!(matches!(result, Err(GarrisonError::InvalidRequest { .. })));
    }

    #[test]
    fn start_session_rejects_claims_orphaned_by_shrunk_seat_table() {
        let result = SessionBuilder::<TestConfig>::new()
            .with_game_slots(4)
            .unwrap()
            .add_player(local("a"), SlotIndex::new(3))
            .unwrap()
            .with_game_slots(2)
            .unwrap()
            .start_session(NullSocket);
        assert!(matches!(result, Err(GarrisonError::InvalidSlot { .. })));
    }

    #[test]
    fn start_session_builds_host_role_for_local_host_seat() {
        let session = SessionBuilder::<TestConfig>::new()
            .add_player(local("host"), SlotIndex::new(0))
            .unwrap()
            .add_player(remote("challenger", 7000), SlotIndex::new(1))
            .unwrap()
            .start_session(NullSocket)
            .unwrap();
        assert_eq!(session.role(), SessionRole::Host);
        assert_eq!(session.local_slot(), SlotIndex::new(0));
        assert!(session.roster().local_is_host());
    }

    #[test]
    fn start_session_builds_client_role_for_remote_host_seat() {
        let session = SessionBuilder::<TestConfig>::new()
            .add_player(remote("host", 7000), SlotIndex::new(0))
            .unwrap()
            .add_player(local("challenger"), SlotIndex::new(1))
            .unwrap()
            .start_session(NullSocket)
            .unwrap();
        assert_eq!(session.role(), SessionRole::Client);
        assert_eq!(session.host_slot(), SlotIndex::new(0));
    }

    #[test]
    fn start_session_builds_replay_role_when_requested() {
        let session = SessionBuilder::<TestConfig>::new()
            .add_player(local("viewer"), SlotIndex::new(0))
            .unwrap()
            .as_replay_viewer()
            .start_session(NullSocket)
            .unwrap();
        assert_eq!(session.role(), SessionRole::Replay);
    }

    #[test]
    fn start_session_fills_the_seat_registry() {
        let bot = SeatOccupant::Computer {
            name: "Nexus".to_owned(),
            ai_index: 1,
        };
        let session = SessionBuilder::<TestConfig>::new()
            .with_game_slots(3)
            .unwrap()
            .with_spectator_slots(1)
            .add_player(local("host"), SlotIndex::new(0))
            .unwrap()
            .add_player(remote("challenger", 7000), SlotIndex::new(1))
            .unwrap()
            .add_player(bot, SlotIndex::new(2))
            .unwrap()
            .add_spectator(remote("watcher", 7001), SlotIndex::new(3))
            .unwrap()
            .start_session(NullSocket)
            .unwrap();

        let roster = session.roster();
        assert_eq!(roster.num_slots(), 4);
        assert_eq!(roster.game_slot_count(), 3);
        assert_eq!(roster.slot(SlotIndex::new(0)).unwrap().name, "host");
        assert!(roster.is_human(SlotIndex::new(1)));
        assert_eq!(
            roster.slot(SlotIndex::new(2)).unwrap().control,
            SlotControl::Computer { ai_index: 1 }
        );
        assert!(roster.is_spectator(SlotIndex::new(3)));
        assert!(!roster.slot(SlotIndex::new(3)).unwrap().name.is_empty());
    }
}

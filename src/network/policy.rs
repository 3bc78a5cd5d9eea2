//! The message authorization policy and the dispatch routing table.
//!
//! Both halves are pure functions so they can be tested and benchmarked in
//! isolation. [`action_for`] decides whether a popped message may be
//! processed at all; [`route`] decides which dispatch pass handles it. The
//! session consults the policy on every pop, before any handler runs.

use crate::network::messages::MsgKind;
use crate::sessions::roster::Roster;
use crate::{MatchStage, SessionRole, SlotIndex};

/// The verdict for one (origin, kind, stage) combination.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageAction {
    /// Hand the message to its handler.
    Process,
    /// Drop the message without any side effect.
    SilentlyIgnore,
    /// Drop the message, announce the violation and kick the sender.
    DisallowAndKick,
}

/// Which dispatch pass a kind belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Handled in every dispatch iteration, joined or not.
    Always,
    /// Handled only once the local endpoint has finished joining.
    GameOnly,
}

/// Decides whether a message from `origin` may be processed.
///
/// The host's messages are always processed; this layer does not police the
/// endpoint that runs the match. Everyone else is checked, in priority
/// order: kinds only the host may send, kinds forbidden to spectator seats
/// (some with an admin exemption), chat restrictions that depend on the
/// match stage, and game-range kinds that would let a spectator influence
/// the simulation. Replay-end markers are meaningful only to a replay
/// viewer and are ignored everywhere else, whoever sent them.
#[must_use]
pub fn action_for(
    roster: &Roster,
    origin: SlotIndex,
    kind: MsgKind,
    stage: MatchStage,
    role: SessionRole,
) -> MessageAction {
    if kind == MsgKind::ReplayEnded {
        return if role == SessionRole::Replay {
            MessageAction::Process
        } else {
            MessageAction::SilentlyIgnore
        };
    }

    if origin == roster.host_slot() {
        return MessageAction::Process;
    }

    let spectator = roster.is_spectator(origin);
    let admin = roster.is_admin(origin);

    match kind {
        // Only the host may send these.
        MsgKind::Options
        | MsgKind::PlayerInfo
        | MsgKind::PlayerJoined
        | MsgKind::FilePayload
        | MsgKind::VoteRequest
        | MsgKind::HostConfig => MessageAction::DisallowAndKick,

        // Forbidden to spectator seats unless the host granted admin.
        MsgKind::Kick
        | MsgKind::TeamRequest
        | MsgKind::FactionRequest
        | MsgKind::PositionRequest => {
            if spectator && !admin {
                MessageAction::DisallowAndKick
            } else {
                MessageAction::Process
            }
        },

        // Forbidden to spectator seats outright.
        MsgKind::AiChat | MsgKind::Beacon => {
            if spectator {
                MessageAction::DisallowAndKick
            } else {
                MessageAction::Process
            }
        },

        // Spectators may chat in the lobby; once the match is underway the
        // public channel belongs to the players.
        MsgKind::Chat => {
            if spectator {
                match stage {
                    MatchStage::Lobby => MessageAction::Process,
                    MatchStage::Loading => MessageAction::SilentlyIgnore,
                    MatchStage::Active | MatchStage::Ended => MessageAction::DisallowAndKick,
                }
            } else {
                MessageAction::Process
            }
        },

        // The spectator channel the other way round: players have no
        // business on it, but it is not worth a kick.
        MsgKind::SpectatorChat => {
            if spectator {
                MessageAction::Process
            } else {
                MessageAction::SilentlyIgnore
            }
        },

        // Spectators are never challenged, so an answer from one is noise.
        MsgKind::DataCheck2 => {
            if spectator {
                MessageAction::SilentlyIgnore
            } else {
                MessageAction::Process
            }
        },

        // Spectators may recolour themselves.
        MsgKind::ColourRequest => MessageAction::Process,

        // Game-range kinds: departures and time markers flow for every
        // seat, script sync requests from spectators are dropped quietly,
        // and anything that would let a spectator steer the simulation is
        // a violation.
        MsgKind::GameTime | MsgKind::PlayerLeft => MessageAction::Process,
        MsgKind::SyncRequest => {
            if spectator {
                MessageAction::SilentlyIgnore
            } else {
                MessageAction::Process
            }
        },
        kind if kind.is_game() => {
            if spectator {
                MessageAction::DisallowAndKick
            } else {
                MessageAction::Process
            }
        },

        _ => MessageAction::Process,
    }
}

/// The routing table: which pass handles each kind.
///
/// The match is exhaustive on purpose. Adding a kind without deciding its
/// pass is a compile error, not a message that both passes or neither pass
/// picks up at runtime.
#[must_use]
pub const fn route(kind: MsgKind) -> Phase {
    match kind {
        // Meaningful only once the local endpoint participates in the
        // simulation.
        MsgKind::Chat
        | MsgKind::AiChat
        | MsgKind::SpectatorChat
        | MsgKind::Beacon
        | MsgKind::TeamStrategy
        | MsgKind::QuickChat
        | MsgKind::DataCheck
        | MsgKind::DataCheck2
        | MsgKind::UnitOrder
        | MsgKind::SyncRequest
        | MsgKind::UnitDisembark
        | MsgKind::Gift
        | MsgKind::OrbitalStrike
        | MsgKind::DebugMode
        | MsgKind::DebugAddUnit
        | MsgKind::DebugAddStructure
        | MsgKind::DebugAddFeature
        | MsgKind::DebugRemoveUnit
        | MsgKind::DebugRemoveStructure
        | MsgKind::DebugRemoveFeature
        | MsgKind::DebugFinishResearch
        | MsgKind::SyncOptChange
        | MsgKind::ReplayEnded => Phase::GameOnly,

        // Session plumbing that must flow even while still joining.
        MsgKind::Ping
        | MsgKind::PlayerStats
        | MsgKind::PlayerResponding
        | MsgKind::Options
        | MsgKind::Kick
        | MsgKind::ColourRequest
        | MsgKind::FactionRequest
        | MsgKind::TeamRequest
        | MsgKind::PlayerInfo
        | MsgKind::PlayerJoined
        | MsgKind::PlayerLeaving
        | MsgKind::PlayerDropped
        | MsgKind::ReadyRequest
        | MsgKind::PositionRequest
        | MsgKind::HostDropped
        | MsgKind::FileRequested
        | MsgKind::FileCancelled
        | MsgKind::FilePayload
        | MsgKind::Vote
        | MsgKind::VoteRequest
        | MsgKind::NameChangeRequest
        | MsgKind::SlotTypeRequest
        | MsgKind::HostConfig
        | MsgKind::Alliance
        | MsgKind::ResearchStatus
        | MsgKind::StructureEvent
        | MsgKind::GameTime
        | MsgKind::PlayerLeft => Phase::Always,
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
    use crate::sessions::roster::{PlayerSlot, SlotControl};

    const HOST: SlotIndex = SlotIndex::new(0);
    const PLAYER: SlotIndex = SlotIndex::new(1);
    const SPECTATOR: SlotIndex = SlotIndex::new(2);
    const ADMIN_SPECTATOR: SlotIndex = SlotIndex::new(3);

    fn test_roster() -> Roster {
        let mut slots = vec![PlayerSlot::default(); 4];
        for slot in &mut slots {
            slot.control = SlotControl::Human;
            slot.connected = true;
        }
        slots[2].spectator = true;
        slots[3].spectator = true;
        slots[3].admin = true;
        Roster::new(slots, 2, HOST, HOST)
    }

    fn action(origin: SlotIndex, kind: MsgKind, stage: MatchStage) -> MessageAction {
        action_for(&test_roster(), origin, kind, stage, SessionRole::Host)
    }

    #[test]
    fn host_messages_are_always_processed() {
        for kind in [
            MsgKind::Options,
            MsgKind::PlayerInfo,
            MsgKind::FilePayload,
            MsgKind::Kick,
            MsgKind::AiChat,
            MsgKind::UnitOrder,
        ] {
            assert_eq!(
                action(HOST, kind, MatchStage::Active),
                MessageAction::Process,
                "host should be allowed to send {kind}"
            );
        }
    }

    #[test]
    fn host_only_kinds_from_others_kick() {
        for kind in [
            MsgKind::Options,
            MsgKind::PlayerInfo,
            MsgKind::PlayerJoined,
            MsgKind::FilePayload,
            MsgKind::VoteRequest,
            MsgKind::HostConfig,
        ] {
            assert_eq!(
                action(PLAYER, kind, MatchStage::Lobby),
                MessageAction::DisallowAndKick,
                "{kind} from a non-host should kick"
            );
        }
    }

    #[test]
    fn admin_exemption_for_spectator_restricted_kinds() {
        for kind in [
            MsgKind::Kick,
            MsgKind::TeamRequest,
            MsgKind::FactionRequest,
            MsgKind::PositionRequest,
        ] {
            assert_eq!(
                action(SPECTATOR, kind, MatchStage::Lobby),
                MessageAction::DisallowAndKick
            );
            assert_eq!(
                action(ADMIN_SPECTATOR, kind, MatchStage::Lobby),
                MessageAction::Process
            );
            assert_eq!(action(PLAYER, kind, MatchStage::Lobby), MessageAction::Process);
        }
    }

    #[test]
    fn ai_chat_and_beacons_are_player_only() {
        for kind in [MsgKind::AiChat, MsgKind::Beacon] {
            assert_eq!(
                action(SPECTATOR, kind, MatchStage::Active),
                MessageAction::DisallowAndKick
            );
            // Admin rights do not help here.
            assert_eq!(
                action(ADMIN_SPECTATOR, kind, MatchStage::Active),
                MessageAction::DisallowAndKick
            );
            assert_eq!(action(PLAYER, kind, MatchStage::Active), MessageAction::Process);
        }
    }

    #[test]
    fn spectator_chat_rights_depend_on_stage() {
        assert_eq!(
            action(SPECTATOR, MsgKind::Chat, MatchStage::Lobby),
            MessageAction::Process
        );
        assert_eq!(
            action(SPECTATOR, MsgKind::Chat, MatchStage::Loading),
            MessageAction::SilentlyIgnore
        );
        assert_eq!(
            action(SPECTATOR, MsgKind::Chat, MatchStage::Active),
            MessageAction::DisallowAndKick
        );
        assert_eq!(
            action(SPECTATOR, MsgKind::Chat, MatchStage::Ended),
            MessageAction::DisallowAndKick
        );
        // Players chat whenever they like.
        assert_eq!(action(PLAYER, MsgKind::Chat, MatchStage::Active), MessageAction::Process);
    }

    #[test]
    fn spectator_channel_ignores_players() {
        assert_eq!(
            action(PLAYER, MsgKind::SpectatorChat, MatchStage::Active),
            MessageAction::SilentlyIgnore
        );
        assert_eq!(
            action(SPECTATOR, MsgKind::SpectatorChat, MatchStage::Active),
            MessageAction::Process
        );
    }

    #[test]
    fn integrity_answers_from_spectators_are_noise() {
        assert_eq!(
            action(SPECTATOR, MsgKind::DataCheck2, MatchStage::Active),
            MessageAction::SilentlyIgnore
        );
        assert_eq!(
            action(PLAYER, MsgKind::DataCheck2, MatchStage::Active),
            MessageAction::Process
        );
    }

    #[test]
    fn colour_requests_are_open_to_everyone() {
        assert_eq!(
            action(SPECTATOR, MsgKind::ColourRequest, MatchStage::Lobby),
            MessageAction::Process
        );
    }

    #[test]
    fn game_kinds_from_spectators() {
        // Departures and time markers flow for every seat.
        assert_eq!(
            action(SPECTATOR, MsgKind::GameTime, MatchStage::Active),
            MessageAction::Process
        );
        assert_eq!(
            action(SPECTATOR, MsgKind::PlayerLeft, MatchStage::Active),
            MessageAction::Process
        );
        // Script sync requests are dropped quietly.
        assert_eq!(
            action(SPECTATOR, MsgKind::SyncRequest, MatchStage::Active),
            MessageAction::SilentlyIgnore
        );
        // Anything steering the simulation is a violation.
        for kind in [
            MsgKind::UnitOrder,
            MsgKind::Gift,
            MsgKind::OrbitalStrike,
            MsgKind::DebugAddUnit,
            MsgKind::DebugFinishResearch,
        ] {
            assert_eq!(
                action(SPECTATOR, kind, MatchStage::Active),
                MessageAction::DisallowAndKick,
                "{kind} from a spectator should kick"
            );
        }
        assert_eq!(
            action(PLAYER, MsgKind::UnitOrder, MatchStage::Active),
            MessageAction::Process
        );
    }

    #[test]
    fn replay_end_marker_needs_a_replay_viewer() {
        let roster = test_roster();
        assert_eq!(
            action_for(
                &roster,
                HOST,
                MsgKind::ReplayEnded,
                MatchStage::Active,
                SessionRole::Host
            ),
            MessageAction::SilentlyIgnore
        );
        assert_eq!(
            action_for(
                &roster,
                PLAYER,
                MsgKind::ReplayEnded,
                MatchStage::Active,
                SessionRole::Client
            ),
            MessageAction::SilentlyIgnore
        );
        assert_eq!(
            action_for(
                &roster,
                PLAYER,
                MsgKind::ReplayEnded,
                MatchStage::Active,
                SessionRole::Replay
            ),
            MessageAction::Process
        );
    }

    #[test]
    fn plain_session_kinds_flow_for_everyone() {
        for kind in [
            MsgKind::Ping,
            MsgKind::PlayerStats,
            MsgKind::PlayerResponding,
            MsgKind::ReadyRequest,
            MsgKind::DataCheck,
            MsgKind::Vote,
            MsgKind::FileRequested,
            MsgKind::QuickChat,
        ] {
            assert_eq!(action(SPECTATOR, kind, MatchStage::Lobby), MessageAction::Process);
            assert_eq!(action(PLAYER, kind, MatchStage::Active), MessageAction::Process);
        }
    }

    #[test]
    fn routing_splits_the_kind_space() {
        assert_eq!(route(MsgKind::Chat), Phase::GameOnly);
        assert_eq!(route(MsgKind::DataCheck), Phase::GameOnly);
        assert_eq!(route(MsgKind::DataCheck2), Phase::GameOnly);
        assert_eq!(route(MsgKind::UnitOrder), Phase::GameOnly);
        assert_eq!(route(MsgKind::ReplayEnded), Phase::GameOnly);

        assert_eq!(route(MsgKind::Ping), Phase::Always);
        assert_eq!(route(MsgKind::Kick), Phase::Always);
        assert_eq!(route(MsgKind::PlayerLeft), Phase::Always);
        assert_eq!(route(MsgKind::GameTime), Phase::Always);
        assert_eq!(route(MsgKind::Alliance), Phase::Always);
        assert_eq!(route(MsgKind::FilePayload), Phase::Always);
    }
}

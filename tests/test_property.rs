//! Properties of the authorization policy and the responsibility model
//! that must hold for every input, not just the cases the unit tests pick.

use proptest::prelude::*;

use garrison_lockstep::network::policy::{action_for, MessageAction};
use garrison_lockstep::{
    Config, LockstepSession, LoopbackHub, MatchStage, MsgKind, SeatOccupant, SessionBuilder,
    SessionRole, SlotIndex,
};

struct PropConfig;

impl Config for PropConfig {
    type Address = usize;
}

type PropSession = LockstepSession<PropConfig>;

const HOST: SlotIndex = SlotIndex::new(0);
const RIVAL: SlotIndex = SlotIndex::new(1);
const WITNESS: SlotIndex = SlotIndex::new(3);

/// Three game seats (host, a remote rival, a computer) and one spectator.
fn sample_session() -> PropSession {
    let hub = LoopbackHub::new();
    SessionBuilder::<PropConfig>::new()
        .with_game_slots(3)
        .expect("three game seats are valid")
        .with_spectator_slots(1)
        .add_player(
            SeatOccupant::Local {
                name: "commander".to_owned(),
            },
            HOST,
        )
        .expect("the host seat is free")
        .add_player(
            SeatOccupant::Remote {
                name: "rival".to_owned(),
                address: 1,
            },
            RIVAL,
        )
        .expect("the rival seat is free")
        .add_player(
            SeatOccupant::Computer {
                name: "Nexus".to_owned(),
                ai_index: 0,
            },
            SlotIndex::new(2),
        )
        .expect("the computer seat is free")
        .add_spectator(
            SeatOccupant::Remote {
                name: "witness".to_owned(),
                address: 2,
            },
            WITNESS,
        )
        .expect("the spectator seat is free")
        .start_session(hub.endpoint(0))
        .expect("a valid seat table starts")
}

fn any_kind() -> impl Strategy<Value = MsgKind> {
    (0u8..=255).prop_filter_map("byte without a kind", |byte| MsgKind::try_from(byte).ok())
}

fn any_stage() -> impl Strategy<Value = MatchStage> {
    prop_oneof![
        Just(MatchStage::Lobby),
        Just(MatchStage::Loading),
        Just(MatchStage::Active),
        Just(MatchStage::Ended),
    ]
}

fn any_role() -> impl Strategy<Value = SessionRole> {
    prop_oneof![
        Just(SessionRole::Host),
        Just(SessionRole::Client),
        Just(SessionRole::Replay),
    ]
}

/// Seat indices well past the roster, so out-of-range lookups are covered.
fn any_seat() -> impl Strategy<Value = SlotIndex> {
    (0usize..40).prop_map(SlotIndex::new)
}

proptest! {
    #[test]
    fn the_policy_answers_every_combination(
        origin in any_seat(),
        kind in any_kind(),
        stage in any_stage(),
        role in any_role(),
    ) {
        let session = sample_session();
        let roster = session.roster();
        let first = action_for(roster, origin, kind, stage, role);
        let second = action_for(roster, origin, kind, stage, role);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn the_hosts_messages_are_never_a_violation(
        kind in any_kind(),
        stage in any_stage(),
        role in any_role(),
    ) {
        let session = sample_session();
        let action = action_for(session.roster(), HOST, kind, stage, role);
        prop_assert_ne!(action, MessageAction::DisallowAndKick);
    }

    #[test]
    fn replay_end_markers_only_mean_something_to_a_viewer(
        origin in any_seat(),
        stage in any_stage(),
        role in any_role(),
    ) {
        let session = sample_session();
        let action = action_for(session.roster(), origin, MsgKind::ReplayEnded, stage, role);
        prop_assert_eq!(action == MessageAction::Process, role == SessionRole::Replay);
    }

    #[test]
    fn spectators_never_steer_the_simulation(
        kind in any_kind(),
        stage in any_stage(),
        role in any_role(),
    ) {
        prop_assume!(kind.is_game());
        prop_assume!(!matches!(kind, MsgKind::GameTime | MsgKind::PlayerLeft));
        let session = sample_session();
        let action = action_for(session.roster(), WITNESS, kind, stage, role);
        prop_assert_ne!(action, MessageAction::Process);
    }

    #[test]
    fn players_are_kicked_only_for_posing_as_the_host(
        kind in any_kind(),
        stage in any_stage(),
        role in any_role(),
    ) {
        prop_assume!(kind != MsgKind::ReplayEnded);
        let session = sample_session();
        let action = action_for(session.roster(), RIVAL, kind, stage, role);
        let host_only = matches!(
            kind,
            MsgKind::Options
                | MsgKind::PlayerInfo
                | MsgKind::PlayerJoined
                | MsgKind::FilePayload
                | MsgKind::VoteRequest
                | MsgKind::HostConfig
        );
        prop_assert_eq!(action == MessageAction::DisallowAndKick, host_only);
    }

    #[test]
    fn admin_standing_restores_a_spectators_request_rights(
        stage in any_stage(),
        role in any_role(),
    ) {
        let mut session = sample_session();
        session.set_admin(WITNESS, true).expect("the witness seat exists");
        for kind in [
            MsgKind::Kick,
            MsgKind::TeamRequest,
            MsgKind::FactionRequest,
            MsgKind::PositionRequest,
        ] {
            let action = action_for(session.roster(), WITNESS, kind, stage, role);
            prop_assert_eq!(action, MessageAction::Process);
        }
    }

    #[test]
    fn responsibility_always_lands_on_a_human_seat(slot in any_seat()) {
        let session = sample_session();
        let roster = session.roster();
        let answerable = roster.whos_responsible(slot);
        prop_assert!(roster.is_human(answerable));
        prop_assert!(answerable.as_usize() < roster.num_slots());
    }

    #[test]
    fn humans_answer_for_themselves_and_the_host_for_the_rest(slot in any_seat()) {
        let session = sample_session();
        let roster = session.roster();
        let answerable = roster.whos_responsible(slot);
        if roster.is_human(slot) {
            prop_assert_eq!(answerable, slot);
        } else {
            prop_assert_eq!(answerable, HOST);
        }
    }

    #[test]
    fn nobody_orders_for_a_spectator_seat(
        actor in any_seat(),
        debug in any::<bool>(),
    ) {
        let mut session = sample_session();
        session.set_debug_override(debug);
        prop_assert!(!session.roster().can_give_orders_for(actor, WITNESS));
    }

    #[test]
    fn order_authority_is_responsibility_over_game_seats(
        actor in any_seat(),
        subject in any_seat(),
    ) {
        let session = sample_session();
        let roster = session.roster();
        let allowed = roster.can_give_orders_for(actor, subject);
        let expected = subject.is_game_seat_for(roster.game_slot_count())
            && (subject == actor || roster.whos_responsible(subject) == actor);
        prop_assert_eq!(allowed, expected);
    }

    #[test]
    fn the_debug_override_hands_out_every_game_seat(
        actor in any_seat(),
        subject in 0usize..3,
    ) {
        let mut session = sample_session();
        session.set_debug_override(true);
        prop_assert!(session.roster().can_give_orders_for(actor, SlotIndex::new(subject)));
    }
}

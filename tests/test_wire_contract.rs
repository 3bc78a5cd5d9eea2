//! Pins the wire contract: every kind's byte, its decodability, and the
//! dispatch pass it routes to. A failure here means a change that breaks
//! compatibility with recorded matches and older builds.

use garrison_lockstep::network::messages::{GAME_KIND_FLOOR, NET_KIND_FLOOR, REPLAY_SENTINEL};
use garrison_lockstep::network::policy::{route, Phase};
use garrison_lockstep::MsgKind;
use pastey::paste;

macro_rules! wire_contract {
    ($($kind:ident = $byte:literal => $phase:ident),+ $(,)?) => {
        paste! {
            $(
                #[test]
                fn [<$kind:snake _keeps_byte_ $byte _in_the_ $phase:snake _pass>]() {
                    assert_eq!(MsgKind::$kind.as_u8(), $byte);
                    assert_eq!(MsgKind::try_from($byte), Ok(MsgKind::$kind));
                    assert_eq!(route(MsgKind::$kind), Phase::$phase);
                }
            )+

            /// Every byte the decoder accepts has a row in this table.
            #[test]
            fn the_table_covers_the_decodable_byte_space() {
                let listed = [$(MsgKind::$kind),+];
                let decodable = (0u8..=255)
                    .filter(|byte| MsgKind::try_from(*byte).is_ok())
                    .count();
                assert_eq!(listed.len(), decodable);
            }
        }
    };
}

wire_contract! {
    Ping = 34 => Always,
    PlayerStats = 35 => Always,
    Chat = 36 => GameOnly,
    PlayerResponding = 37 => Always,
    Options = 38 => Always,
    Kick = 39 => Always,
    ColourRequest = 41 => Always,
    FactionRequest = 42 => Always,
    AiChat = 43 => GameOnly,
    Beacon = 44 => GameOnly,
    TeamRequest = 45 => Always,
    PlayerInfo = 48 => Always,
    PlayerJoined = 49 => Always,
    PlayerLeaving = 50 => Always,
    PlayerDropped = 51 => Always,
    ReadyRequest = 53 => Always,
    PositionRequest = 55 => Always,
    DataCheck = 56 => GameOnly,
    HostDropped = 57 => Always,
    FileRequested = 60 => Always,
    FileCancelled = 61 => Always,
    FilePayload = 62 => Always,
    Vote = 64 => Always,
    VoteRequest = 65 => Always,
    SpectatorChat = 66 => GameOnly,
    NameChangeRequest = 67 => Always,
    SlotTypeRequest = 68 => Always,
    DataCheck2 = 71 => GameOnly,
    TeamStrategy = 73 => GameOnly,
    QuickChat = 74 => GameOnly,
    HostConfig = 75 => Always,
    UnitOrder = 112 => GameOnly,
    StructureEvent = 113 => Always,
    ResearchStatus = 114 => Always,
    Alliance = 117 => Always,
    Gift = 118 => GameOnly,
    OrbitalStrike = 119 => GameOnly,
    GameTime = 120 => Always,
    PlayerLeft = 121 => Always,
    UnitDisembark = 122 => GameOnly,
    SyncRequest = 123 => GameOnly,
    DebugMode = 124 => GameOnly,
    DebugAddUnit = 125 => GameOnly,
    DebugAddStructure = 126 => GameOnly,
    DebugAddFeature = 127 => GameOnly,
    DebugRemoveUnit = 128 => GameOnly,
    DebugRemoveStructure = 129 => GameOnly,
    DebugRemoveFeature = 130 => GameOnly,
    DebugFinishResearch = 131 => GameOnly,
    SyncOptChange = 132 => GameOnly,
    ReplayEnded = 255 => GameOnly,
}

#[test]
fn every_byte_lands_in_exactly_one_range() {
    for byte in 0u8..=255 {
        let Ok(kind) = MsgKind::try_from(byte) else {
            continue;
        };
        let ranges = [kind.is_net(), kind.is_game(), byte == REPLAY_SENTINEL];
        assert_eq!(
            ranges.iter().filter(|hit| **hit).count(),
            1,
            "byte {byte} is in {ranges:?}"
        );
    }
}

#[test]
fn transport_bytes_stay_reserved() {
    for byte in 0..=NET_KIND_FLOOR {
        assert!(MsgKind::try_from(byte).is_err(), "byte {byte} must stay free");
    }
}

#[test]
fn range_checks_agree_with_the_floors() {
    for byte in 0u8..=255 {
        let Ok(kind) = MsgKind::try_from(byte) else {
            continue;
        };
        assert_eq!(
            kind.is_net(),
            byte > NET_KIND_FLOOR && byte <= GAME_KIND_FLOOR
        );
        assert_eq!(
            kind.is_game(),
            byte > GAME_KIND_FLOOR && byte != REPLAY_SENTINEL
        );
    }
}

#[test]
fn debug_mutations_are_scheduled_game_kinds() {
    for byte in 0u8..=255 {
        let Ok(kind) = MsgKind::try_from(byte) else {
            continue;
        };
        if kind.is_debug_mutation() {
            assert!(kind.is_game());
            assert_eq!(route(kind), Phase::GameOnly);
        }
    }
}

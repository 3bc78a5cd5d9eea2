//! The message kind taxonomy and wire payload structs.
//!
//! Every envelope on the wire carries a single kind byte followed by an
//! opaque payload. The kind space is partitioned by numeric range:
//!
//! - bytes at or below [`NET_KIND_FLOOR`] are reserved for the transport
//!   below this layer (connection setup, relaying, keepalive),
//! - net kinds live above [`NET_KIND_FLOOR`]: they are processed the moment
//!   they arrive,
//! - game kinds live above [`GAME_KIND_FLOOR`]: they are queued and only
//!   processed when the simulation reaches their scheduled game time, so
//!   every peer consumes them at the same simulation moment,
//! - [`REPLAY_SENTINEL`] (255) marks the end of a recorded match.
//!
//! Kind bytes are explicit and frozen: they are the wire contract. Field
//! order within each payload struct is the wire field order.

use serde::{Deserialize, Serialize};

use crate::{ContentDigest, LeaveReason};

/// Highest byte reserved for the transport; net kinds start above this.
pub const NET_KIND_FLOOR: u8 = 33;

/// Highest net kind byte; game kinds start above this.
pub const GAME_KIND_FLOOR: u8 = 111;

/// The replay-end sentinel byte.
pub const REPLAY_SENTINEL: u8 = 255;

/// Sender id carried by system notices inside chat payloads.
///
/// Chat senders are signed on the wire so that notices not attributable to a
/// seat can share the channel. Only the host's endpoint is responsible for
/// negative senders; a system notice arriving from anyone else has its
/// sender corrected to the originating seat like any other chat message.
pub const SYSTEM_MESSAGE_SENDER: i32 = -2;

/// Which delivery discipline an envelope uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Immediate: processed as soon as it is received.
    Net,
    /// Scheduled: queued per seat and consumed at a defined game time.
    Game,
}

/// Every message kind this layer routes.
///
/// The discriminant is the wire byte. Gaps in the numbering are kinds owned
/// by the transport below this layer or retired kinds whose bytes must not
/// be reused; bytes that do not map to a variant are rejected at dispatch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MsgKind {
    // --- net kinds: immediate ---
    /// Latency probe and its echo.
    Ping = 34,
    /// Cumulative player statistics, surfaced to the lobby collaborator.
    PlayerStats = 35,
    /// In-game chat (also carries system notices with a negative sender).
    Chat = 36,
    /// A peer finished loading and is now playing.
    PlayerResponding = 37,
    /// Match options, host to clients.
    Options = 38,
    /// Remove a participant.
    Kick = 39,
    /// A seat requests a colour change.
    ColourRequest = 41,
    /// A seat requests a faction change.
    FactionRequest = 42,
    /// Chat addressed to a computer-controlled seat's scripts.
    AiChat = 43,
    /// Place a map beacon for another seat.
    Beacon = 44,
    /// A seat requests team membership.
    TeamRequest = 45,
    /// Per-seat roster data, host to clients.
    PlayerInfo = 48,
    /// Notice that a peer joined, host to clients.
    PlayerJoined = 49,
    /// A peer is leaving voluntarily.
    PlayerLeaving = 50,
    /// Host notice that a peer's connection dropped.
    PlayerDropped = 51,
    /// A seat toggled its lobby ready state.
    ReadyRequest = 53,
    /// A seat requests a different position in the roster display.
    PositionRequest = 55,
    /// Phase-1 data integrity report (client to host).
    DataCheck = 56,
    /// The host itself is gone.
    HostDropped = 57,
    /// A peer requests a hosted file by digest.
    FileRequested = 60,
    /// A peer cancels an in-flight file request.
    FileCancelled = 61,
    /// One chunk of a hosted file (host to requester).
    FilePayload = 62,
    /// A vote ballot (client to host).
    Vote = 64,
    /// The host opens a vote.
    VoteRequest = 65,
    /// Spectator-to-spectator chat.
    SpectatorChat = 66,
    /// A peer is changing its display name.
    NameChangeRequest = 67,
    /// A seat asks to switch between playing and spectating.
    SlotTypeRequest = 68,
    /// Phase-2 integrity challenge (host) and response (client).
    DataCheck2 = 71,
    /// A team strategy notice shared with teammates.
    TeamStrategy = 73,
    /// A quick-chat shortcut message.
    QuickChat = 74,
    /// Host configuration, sent in the lobby and again in game.
    HostConfig = 75,

    // --- game kinds: consumed at a scheduled game time ---
    /// A unit order batch.
    UnitOrder = 112,
    /// A structure state change.
    StructureEvent = 113,
    /// A research state change.
    ResearchStatus = 114,
    /// An alliance offer or change.
    Alliance = 117,
    /// A resource gift between seats.
    Gift = 118,
    /// A superweapon strike.
    OrbitalStrike = 119,
    /// Advances the sender's game-time marker; schedules everything after it.
    GameTime = 120,
    /// A departure, consumed by all peers at the same game time.
    PlayerLeft = 121,
    /// A unit left its transport.
    UnitDisembark = 122,
    /// A script-generated event that must run on every peer.
    SyncRequest = 123,
    /// Toggle debug mode.
    DebugMode = 124,
    /// Debug: spawn a unit.
    DebugAddUnit = 125,
    /// Debug: spawn a structure.
    DebugAddStructure = 126,
    /// Debug: spawn a map feature.
    DebugAddFeature = 127,
    /// Debug: destroy a unit.
    DebugRemoveUnit = 128,
    /// Debug: destroy a structure.
    DebugRemoveStructure = 129,
    /// Debug: destroy a map feature.
    DebugRemoveFeature = 130,
    /// Debug: complete a research topic instantly.
    DebugFinishResearch = 131,
    /// A change to per-seat synchronized options.
    SyncOptChange = 132,

    // --- replay ---
    /// End of a recorded match.
    ReplayEnded = 255,
}

impl MsgKind {
    /// The wire byte for this kind.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` for kinds in the net (immediate) range.
    #[inline]
    #[must_use]
    pub const fn is_net(self) -> bool {
        let byte = self.as_u8();
        byte > NET_KIND_FLOOR && byte <= GAME_KIND_FLOOR
    }

    /// Returns `true` for kinds in the game (scheduled) range.
    #[inline]
    #[must_use]
    pub const fn is_game(self) -> bool {
        let byte = self.as_u8();
        byte > GAME_KIND_FLOOR && byte != REPLAY_SENTINEL
    }

    /// Returns `true` for game kinds that mutate simulation state outside
    /// the normal rules and are only legal with debug overrides enabled.
    #[inline]
    #[must_use]
    pub const fn is_debug_mutation(self) -> bool {
        matches!(
            self,
            MsgKind::DebugMode
                | MsgKind::DebugAddUnit
                | MsgKind::DebugAddStructure
                | MsgKind::DebugAddFeature
                | MsgKind::DebugRemoveUnit
                | MsgKind::DebugRemoveStructure
                | MsgKind::DebugRemoveFeature
                | MsgKind::DebugFinishResearch
        )
    }
}

impl std::fmt::Display for MsgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl TryFrom<u8> for MsgKind {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let kind = match byte {
            34 => MsgKind::Ping,
            35 => MsgKind::PlayerStats,
            36 => MsgKind::Chat,
            37 => MsgKind::PlayerResponding,
            38 => MsgKind::Options,
            39 => MsgKind::Kick,
            41 => MsgKind::ColourRequest,
            42 => MsgKind::FactionRequest,
            43 => MsgKind::AiChat,
            44 => MsgKind::Beacon,
            45 => MsgKind::TeamRequest,
            48 => MsgKind::PlayerInfo,
            49 => MsgKind::PlayerJoined,
            50 => MsgKind::PlayerLeaving,
            51 => MsgKind::PlayerDropped,
            53 => MsgKind::ReadyRequest,
            55 => MsgKind::PositionRequest,
            56 => MsgKind::DataCheck,
            57 => MsgKind::HostDropped,
            60 => MsgKind::FileRequested,
            61 => MsgKind::FileCancelled,
            62 => MsgKind::FilePayload,
            64 => MsgKind::Vote,
            65 => MsgKind::VoteRequest,
            66 => MsgKind::SpectatorChat,
            67 => MsgKind::NameChangeRequest,
            68 => MsgKind::SlotTypeRequest,
            71 => MsgKind::DataCheck2,
            73 => MsgKind::TeamStrategy,
            74 => MsgKind::QuickChat,
            75 => MsgKind::HostConfig,
            112 => MsgKind::UnitOrder,
            113 => MsgKind::StructureEvent,
            114 => MsgKind::ResearchStatus,
            117 => MsgKind::Alliance,
            118 => MsgKind::Gift,
            119 => MsgKind::OrbitalStrike,
            120 => MsgKind::GameTime,
            121 => MsgKind::PlayerLeft,
            122 => MsgKind::UnitDisembark,
            123 => MsgKind::SyncRequest,
            124 => MsgKind::DebugMode,
            125 => MsgKind::DebugAddUnit,
            126 => MsgKind::DebugAddStructure,
            127 => MsgKind::DebugAddFeature,
            128 => MsgKind::DebugRemoveUnit,
            129 => MsgKind::DebugRemoveStructure,
            130 => MsgKind::DebugRemoveFeature,
            131 => MsgKind::DebugFinishResearch,
            132 => MsgKind::SyncOptChange,
            255 => MsgKind::ReplayEnded,
            other => return Err(other),
        };
        Ok(kind)
    }
}

/// An envelope that [`NonBlockingSocket`] implementations send and receive.
///
/// The payload is opaque at this level; it is decoded against the kind by
/// whichever component consumes the message. Exposed constructors exist so
/// custom transports and tests can build envelopes directly.
///
/// [`NonBlockingSocket`]: crate::NonBlockingSocket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub(crate) channel: Channel,
    pub(crate) kind: u8,
    pub(crate) payload: Vec<u8>,
}

impl Envelope {
    /// Builds a net-channel envelope.
    #[must_use]
    pub fn net(kind: MsgKind, payload: Vec<u8>) -> Self {
        Self {
            channel: Channel::Net,
            kind: kind.as_u8(),
            payload,
        }
    }

    /// Builds a game-channel envelope.
    #[must_use]
    pub fn game(kind: MsgKind, payload: Vec<u8>) -> Self {
        Self {
            channel: Channel::Game,
            kind: kind.as_u8(),
            payload,
        }
    }

    /// Builds an envelope from a raw kind byte, for tests that exercise the
    /// unknown-kind rejection path.
    #[must_use]
    pub fn raw(channel: Channel, kind: u8, payload: Vec<u8>) -> Self {
        Self {
            channel,
            kind,
            payload,
        }
    }

    /// The delivery channel.
    #[inline]
    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.channel
    }

    /// The raw kind byte.
    #[inline]
    #[must_use]
    pub const fn kind_byte(&self) -> u8 {
        self.kind
    }

    /// The kind, if the byte maps to one this layer routes.
    #[must_use]
    pub fn kind(&self) -> Option<MsgKind> {
        MsgKind::try_from(self.kind).ok()
    }

    /// The payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

// ##################
// # WIRE PAYLOADS  #
// ##################

/// Payload of [`MsgKind::Ping`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PingPayload {
    /// `false` for a probe, `true` for the echo answering it.
    pub echo: bool,
}

/// Payload of [`MsgKind::Chat`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    /// Claimed sender. Negative values are reserved senders such as
    /// [`SYSTEM_MESSAGE_SENDER`]; receivers correct the claim against the
    /// originating queue before trusting it.
    pub sender: i32,
    /// Whether the message is addressed to the sender's team only.
    pub team_only: bool,
    /// The message text.
    pub text: String,
}

/// Payload of [`MsgKind::AiChat`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiChatPayload {
    /// Claimed sender seat; corrected against the originating queue.
    pub sender: u32,
    /// The computer-controlled seat the message is addressed to.
    pub receiver: u32,
    /// The message text.
    pub text: String,
}

/// Payload of [`MsgKind::SpectatorChat`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectatorChatPayload {
    /// Claimed sender seat; corrected against the originating queue.
    pub sender: u32,
    /// The message text.
    pub text: String,
}

/// Payload of [`MsgKind::Beacon`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconPayload {
    /// The seat that placed the beacon.
    pub sender: i32,
    /// The seat the beacon is for (may be a computer-controlled seat hosted
    /// by the receiving endpoint).
    pub target: i32,
    /// Map x coordinate.
    pub x: i32,
    /// Map y coordinate.
    pub y: i32,
    /// Beacon label.
    pub text: String,
}

/// Payload naming a single seat. Used by [`MsgKind::PlayerResponding`],
/// [`MsgKind::PlayerDropped`], [`MsgKind::PlayerLeaving`] and
/// [`MsgKind::PlayerLeft`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SlotPayload {
    /// The seat in question.
    pub slot: u32,
}

/// Payload of [`MsgKind::Kick`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickPayload {
    /// The seat being removed.
    pub slot: u32,
    /// Human-readable reason shown to the removed peer.
    pub reason: String,
    /// Machine-readable reason code.
    pub code: LeaveReason,
}

/// Payload of [`MsgKind::DataCheck`]: the Phase-1 integrity report.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCheckPayload {
    /// The sender's content digest.
    pub digest: ContentDigest,
}

/// Host-to-client half of [`MsgKind::DataCheck2`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityChallenge {
    /// The challenging host's seat, so the receiver can verify the origin.
    pub host_slot: u32,
}

/// One entry of the overlay-layer report in an [`IntegrityResponse`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayLayer {
    /// The layer's z-order.
    pub z_order: u16,
    /// How many overlay elements the layer currently holds.
    pub count: u32,
}

/// Client-to-host half of [`MsgKind::DataCheck2`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityResponse {
    /// The seat the responder claims to occupy.
    pub claimed_slot: u32,
    /// The same seat, filled in through a second code path. Validators
    /// treat a response whose two answers disagree as corrupted state.
    pub echo_slot: u32,
    /// The responder's UI overlay-layer report.
    pub overlay_layers: Vec<OverlayLayer>,
    /// The responder's content digest.
    pub digest: ContentDigest,
    /// The AI index of the responder's seat (-1 for human control).
    pub ai_index: i8,
    /// Whether the responder has god mode enabled.
    pub god_mode: bool,
}

/// Identity of a transferrable file: a 32-byte content hash.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileDigest(pub [u8; 32]);

impl FileDigest {
    /// First four bytes as hex, for logs.
    #[must_use]
    pub fn short_hex(&self) -> String {
        self.0[..4].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Payload of [`MsgKind::FileRequested`] and [`MsgKind::FileCancelled`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequestPayload {
    /// The digest of the wanted file.
    pub digest: FileDigest,
}

/// Payload of [`MsgKind::FilePayload`]: one chunk of a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunkPayload {
    /// The digest of the file this chunk belongs to.
    pub digest: FileDigest,
    /// Total file size in bytes.
    pub total_size: u32,
    /// Byte offset of this chunk within the file.
    pub offset: u32,
    /// The chunk bytes.
    pub data: Vec<u8>,
}

/// Payload of [`MsgKind::GameTime`]: advances the sender's stream marker.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GameTimePayload {
    /// The game time every later message on this stream is scheduled at.
    pub game_time: u32,
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

    #[test]
    fn kind_bytes_are_frozen() {
        // The wire contract: these bytes must never change.
        assert_eq!(MsgKind::Ping.as_u8(), 34);
        assert_eq!(MsgKind::Chat.as_u8(), 36);
        assert_eq!(MsgKind::Kick.as_u8(), 39);
        assert_eq!(MsgKind::DataCheck.as_u8(), 56);
        assert_eq!(MsgKind::DataCheck2.as_u8(), 71);
        assert_eq!(MsgKind::HostConfig.as_u8(), 75);
        assert_eq!(MsgKind::UnitOrder.as_u8(), 112);
        assert_eq!(MsgKind::GameTime.as_u8(), 120);
        assert_eq!(MsgKind::PlayerLeft.as_u8(), 121);
        assert_eq!(MsgKind::SyncOptChange.as_u8(), 132);
        assert_eq!(MsgKind::ReplayEnded.as_u8(), REPLAY_SENTINEL);
    }

    #[test]
    fn kind_roundtrip_through_byte() {
        let all = [
            MsgKind::Ping,
            MsgKind::PlayerStats,
            MsgKind::Chat,
            MsgKind::PlayerResponding,
            MsgKind::Options,
            MsgKind::Kick,
            MsgKind::ColourRequest,
            MsgKind::FactionRequest,
            MsgKind::AiChat,
            MsgKind::Beacon,
            MsgKind::TeamRequest,
            MsgKind::PlayerInfo,
            MsgKind::PlayerJoined,
            MsgKind::PlayerLeaving,
            MsgKind::PlayerDropped,
            MsgKind::ReadyRequest,
            MsgKind::PositionRequest,
            MsgKind::DataCheck,
            MsgKind::HostDropped,
            MsgKind::FileRequested,
            MsgKind::FileCancelled,
            MsgKind::FilePayload,
            MsgKind::Vote,
            MsgKind::VoteRequest,
            MsgKind::SpectatorChat,
            MsgKind::NameChangeRequest,
            MsgKind::SlotTypeRequest,
            MsgKind::DataCheck2,
            MsgKind::TeamStrategy,
            MsgKind::QuickChat,
            MsgKind::HostConfig,
            MsgKind::UnitOrder,
            MsgKind::StructureEvent,
            MsgKind::ResearchStatus,
            MsgKind::Alliance,
            MsgKind::Gift,
            MsgKind::OrbitalStrike,
            MsgKind::GameTime,
            MsgKind::PlayerLeft,
            MsgKind::UnitDisembark,
            MsgKind::SyncRequest,
            MsgKind::DebugMode,
            MsgKind::DebugAddUnit,
            MsgKind::DebugAddStructure,
            MsgKind::DebugAddFeature,
            MsgKind::DebugRemoveUnit,
            MsgKind::DebugRemoveStructure,
            MsgKind::DebugRemoveFeature,
            MsgKind::DebugFinishResearch,
            MsgKind::SyncOptChange,
            MsgKind::ReplayEnded,
        ];
        for kind in all {
            assert_eq!(MsgKind::try_from(kind.as_u8()), Ok(kind));
        }
    }

    #[test]
    fn unmapped_bytes_are_rejected() {
        // Transport-reserved, retired, and out-of-range bytes.
        for byte in [0u8, 10, 33, 40, 46, 47, 52, 54, 58, 59, 63, 69, 70, 72, 111, 115, 133, 200] {
            assert_eq!(MsgKind::try_from(byte), Err(byte));
        }
    }

    #[test]
    fn kind_range_classification() {
        assert!(MsgKind::Ping.is_net());
        assert!(!MsgKind::Ping.is_game());
        assert!(MsgKind::UnitOrder.is_game());
        assert!(!MsgKind::UnitOrder.is_net());
        assert!(!MsgKind::ReplayEnded.is_net());
        assert!(!MsgKind::ReplayEnded.is_game());
    }

    #[test]
    fn debug_mutation_kinds() {
        assert!(MsgKind::DebugAddUnit.is_debug_mutation());
        assert!(MsgKind::DebugFinishResearch.is_debug_mutation());
        assert!(!MsgKind::DebugMode.is_net());
        assert!(!MsgKind::UnitOrder.is_debug_mutation());
        assert!(!MsgKind::SyncRequest.is_debug_mutation());
    }

    #[test]
    fn envelope_accessors() {
        let envelope = Envelope::net(MsgKind::Ping, vec![1]);
        assert_eq!(envelope.channel(), Channel::Net);
        assert_eq!(envelope.kind(), Some(MsgKind::Ping));
        assert_eq!(envelope.kind_byte(), 34);
        assert_eq!(envelope.payload(), &[1]);

        let game = Envelope::game(MsgKind::UnitOrder, Vec::new());
        assert_eq!(game.channel(), Channel::Game);

        let unknown = Envelope::raw(Channel::Net, 47, Vec::new());
        assert_eq!(unknown.kind(), None);
        assert_eq!(unknown.kind_byte(), 47);
    }

    #[test]
    fn file_digest_short_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xAB;
        bytes[1] = 0x01;
        assert_eq!(FileDigest(bytes).short_hex(), "ab010000");
    }
}

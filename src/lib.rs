//! # Garrison Lockstep
//!
//! Garrison Lockstep is the synchronization and trust layer for lockstep
//! multiplayer simulations, written in 100% safe Rust. It owns everything
//! between the transport and the deterministic simulation: typed per-slot
//! message queues, a responsibility model for who may speak for whom, a
//! message authorization policy, connection health monitoring with
//! warn-then-kick escalation, and a two-phase data-integrity handshake.
//!
//! The layer never advances the simulation itself. Each call to
//! [`LockstepSession::poll`] drains the transport, enforces policy, runs the
//! host-side monitors, and hands back the validated, ordered
//! [`GameCommand`]s that the caller's simulation should consume at its
//! current game time. Everything else (kicks, warnings, chat, file transfer
//! progress) surfaces through [`LockstepSession::events`].

#![forbid(unsafe_code)] // let us try
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
use std::{fmt::Debug, hash::Hash};

pub use error::{GarrisonError, GarrisonResult};
pub use hash::{ContentDigest, DigestBuilder, CONTENT_DIGEST_WORDS};
pub use network::loopback::{loopback_pair, LoopbackHub, LoopbackSocket};
pub use network::messages::{Channel, Envelope, FileDigest, MsgKind, OverlayLayer};
pub use network::policy::{MessageAction, Phase};
pub use network::transfer::FileLoader;
pub use sessions::builder::{SeatOccupant, SessionBuilder};
pub use sessions::config::{IntegrityConfig, MonitorConfig, SessionConfig, TransferConfig};
pub use sessions::event_drain::EventDrain;
pub use sessions::integrity::{IntegrityProbe, NoLocalState};
pub use sessions::lockstep_session::{GameCommand, LockstepSession};
pub use sessions::roster::{
    ConnectionFlag, ConnectionStatus, PlayerReference, PlayerSlot, Roster, SlotControl,
};

// Internal modules - made pub for integration tests, but doc(hidden) for API cleanliness
#[doc(hidden)]
pub mod error;
pub mod hash;
#[doc(hidden)]
pub mod prelude;
#[doc(hidden)]
pub mod sessions {
    #[doc(hidden)]
    pub mod builder;
    #[doc(hidden)]
    pub mod config;
    #[doc(hidden)]
    pub mod event_drain;
    #[doc(hidden)]
    pub mod integrity;
    #[doc(hidden)]
    pub mod lockstep_session;
    #[doc(hidden)]
    pub mod monitors;
    #[doc(hidden)]
    pub mod roster;
}
#[doc(hidden)]
pub mod network {
    /// Binary codec for wire payload serialization.
    ///
    /// Provides centralized encoding and decoding of payload structs using
    /// bincode with a fixed integer encoding.
    pub mod codec;
    #[doc(hidden)]
    pub mod loopback;
    #[doc(hidden)]
    pub mod messages;
    #[doc(hidden)]
    pub mod policy;
    #[doc(hidden)]
    pub mod queues;
    #[doc(hidden)]
    pub mod transfer;
}

// #############
// # NEWTYPES  #
// #############

/// A seat in the session's fixed slot table.
///
/// Game seats occupy indices `0..game_slots`, spectator seats occupy
/// `game_slots..game_slots + spectator_slots`. A slot index identifies the
/// seat, not the person: the same index is reused after its occupant leaves
/// and the slot is reset.
///
/// # Type Safety
///
/// `SlotIndex` is a newtype wrapper around `usize` that provides:
/// - Clear semantic meaning (seat identifiers vs arbitrary integers)
/// - Helper methods like [`is_game_seat_for()`](SlotIndex::is_game_seat_for)
/// - Compile-time prevention of accidentally mixing slots with other integers
///
/// # Examples
///
/// ```
/// use garrison_lockstep::SlotIndex;
///
/// let seat = SlotIndex::new(1);
/// let watcher = SlotIndex::new(4); // In a 4-player session
///
/// assert!(seat.is_game_seat_for(4));
/// assert!(!watcher.is_game_seat_for(4));
/// assert!(watcher.is_spectator_seat_for(4));
/// assert_eq!(seat.as_usize(), 1);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct SlotIndex(usize);

impl SlotIndex {
    /// Creates a new `SlotIndex` from a `usize` value.
    ///
    /// Note: This does not validate the index against a specific session.
    /// Use [`is_game_seat_for()`](Self::is_game_seat_for) or the session's
    /// roster to check validity.
    #[inline]
    #[must_use]
    pub const fn new(index: usize) -> Self {
        SlotIndex(index)
    }

    /// Returns the underlying `usize` value.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns `true` if this index refers to a game seat for a session with
    /// the given number of game seats.
    #[inline]
    #[must_use]
    pub const fn is_game_seat_for(self, game_slots: usize) -> bool {
        self.0 < game_slots
    }

    /// Returns `true` if this index refers to a spectator seat for a session
    /// with the given number of game seats.
    #[inline]
    #[must_use]
    pub const fn is_spectator_seat_for(self, game_slots: usize) -> bool {
        self.0 >= game_slots
    }
}

impl std::fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for SlotIndex {
    #[inline]
    fn from(value: usize) -> Self {
        SlotIndex(value)
    }
}

impl From<SlotIndex> for usize {
    #[inline]
    fn from(index: SlotIndex) -> Self {
        index.0
    }
}

/// A point in simulation time, measured in milliseconds since the match
/// started.
///
/// Game time advances only when the simulation steps, which is what makes it
/// the ordering backbone of the layer: game-channel messages carry the game
/// time at which every peer must consume them, and deadlines expressed in
/// game time (like the integrity sweep) freeze while the simulation is
/// paused.
///
/// # Examples
///
/// ```
/// use garrison_lockstep::GameTime;
///
/// let start = GameTime::new(2);
/// let later = start + 1500;
/// assert_eq!(later.millis_since(start), 1500);
/// assert!(later > start);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct GameTime(u32);

impl GameTime {
    /// Creates a `GameTime` from milliseconds of simulation time.
    #[inline]
    #[must_use]
    pub const fn new(millis: u32) -> Self {
        GameTime(millis)
    }

    /// Returns the underlying millisecond value.
    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, saturating at zero if `earlier`
    /// is in the future.
    #[inline]
    #[must_use]
    pub const fn millis_since(self, earlier: GameTime) -> u32 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for GameTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl std::ops::Add<u32> for GameTime {
    type Output = GameTime;

    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        GameTime(self.0 + rhs)
    }
}

impl std::ops::AddAssign<u32> for GameTime {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}

impl From<u32> for GameTime {
    #[inline]
    fn from(value: u32) -> Self {
        GameTime(value)
    }
}

impl From<GameTime> for u32 {
    #[inline]
    fn from(time: GameTime) -> Self {
        time.0
    }
}

// #############
// #   ENUMS   #
// #############

/// The coarse lifecycle stage of the match, as seen by the local session.
///
/// Several policy and monitor decisions hinge on the stage: spectator chat is
/// legal in the lobby but not once the match is fully underway, the not-ready
/// monitor only runs in the lobby, and the desync monitor stops once the
/// match has ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchStage {
    /// Pre-start: seats are still being claimed and readiness checked.
    Lobby,
    /// The match has started but at least one peer is still loading data.
    Loading,
    /// Everyone is in and the simulation is running.
    Active,
    /// The match has concluded; the session lingers for stats and chat.
    Ended,
}

impl MatchStage {
    /// Returns `true` once the match has started (loading or later).
    #[inline]
    #[must_use]
    pub const fn has_started(self) -> bool {
        !matches!(self, MatchStage::Lobby)
    }
}

/// The role this session plays in the match.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SessionRole {
    /// This session is the authority: it admits joiners, runs the health
    /// monitors, and issues kicks.
    Host,
    /// This session is a regular participant.
    Client,
    /// This session is replaying a recorded match. No live peers exist; the
    /// replay-end sentinel is honored instead of ignored.
    Replay,
}

impl SessionRole {
    /// Returns `true` for the host role.
    #[inline]
    #[must_use]
    pub const fn is_host(self) -> bool {
        matches!(self, SessionRole::Host)
    }
}

/// Why a participant left or was removed.
///
/// Carried on kick messages and on departure events so UIs and lobby services
/// can distinguish a connection failure from a data mismatch or a rule
/// violation.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum LeaveReason {
    /// Ordinary departure.
    None,
    /// Connection quality: lag, desync, or failure to check ready in time.
    Connection,
    /// Removed by an explicit kick request.
    Kicked,
    /// The participant's loaded data did not match the host's.
    WrongData,
    /// The participant sent a message it was not authorized to send.
    Invalid,
    /// The participant attempted a forbidden state mutation.
    Cheat,
}

/// Notifications that you can receive from the session. Handling them is up to the user.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]` because new event types may be
/// added in future versions. Always include a wildcard arm when matching:
///
/// ```ignore
/// match event {
///     GarrisonEvent::EveryoneJoined { .. } => { /* handle */ }
///     GarrisonEvent::KickIssued { .. } => { /* handle */ }
///     _ => { /* handle unknown events */ }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GarrisonEvent {
    /// Every human seat has finished joining. Emitted exactly once; the
    /// integrity handshake starts from this moment.
    EveryoneJoined {
        /// The game time at which the last joiner arrived.
        at: GameTime,
    },
    /// A remote peer reported it has finished loading and is now playing.
    PlayerResponding {
        /// The seat that responded.
        slot: SlotIndex,
    },
    /// The host announced that a peer's connection dropped. The slot is
    /// quarantined now; the simulation-visible departure follows as a
    /// [`GarrisonEvent::PlayerLeft`] at a defined game time.
    PlayerDropped {
        /// The seat that dropped.
        slot: SlotIndex,
    },
    /// A departure was consumed from the game channel. All peers observe
    /// this at the same game time.
    PlayerLeft {
        /// The seat that left.
        slot: SlotIndex,
        /// The game time at which every peer processes the departure.
        at: GameTime,
    },
    /// The host itself is gone. The session cannot continue.
    HostDropped,
    /// This session (as host) removed a participant.
    KickIssued {
        /// The removed seat.
        slot: SlotIndex,
        /// Human-readable reason, also sent to the removed peer.
        reason: String,
        /// Machine-readable reason code.
        code: LeaveReason,
    },
    /// This session was removed from the match by the host.
    KickedFromSession {
        /// Human-readable reason supplied by the host.
        reason: String,
        /// Machine-readable reason code.
        code: LeaveReason,
    },
    /// A seat has been lagging; it will be kicked when its counter reaches
    /// the threshold.
    LagWarning {
        /// The lagging seat.
        slot: SlotIndex,
        /// Consecutive seconds the seat has been lagging.
        seconds: u32,
        /// The counter value at which the seat will be kicked.
        kick_at: u32,
    },
    /// A seat's simulation has deviated; it will be kicked when its counter
    /// reaches the threshold.
    DesyncWarning {
        /// The desynced seat.
        slot: SlotIndex,
        /// Consecutive seconds the seat has been desynced.
        seconds: u32,
        /// The counter value at which the seat will be kicked.
        kick_at: u32,
    },
    /// A seat has gone too long without checking ready in the lobby.
    NotReadyWarning {
        /// The idle seat.
        slot: SlotIndex,
        /// Accumulated seconds spent not ready.
        seconds: u32,
        /// The accumulated value at which the seat will be kicked.
        kick_at: u32,
    },
    /// The host verified a seat's content digest.
    IntegrityVerified {
        /// The verified seat.
        slot: SlotIndex,
    },
    /// A seat failed an integrity check and is being removed.
    IntegrityFailed {
        /// The failed seat.
        slot: SlotIndex,
    },
    /// In-game chat, after sender correction.
    Chat {
        /// The seat the message is attributed to.
        sender: SlotIndex,
        /// Whether the message was addressed to the sender's team only.
        team_only: bool,
        /// The message text.
        text: String,
    },
    /// Chat addressed to a computer-controlled seat's scripts.
    AiChat {
        /// The seat the message is attributed to.
        sender: SlotIndex,
        /// The computer-controlled seat the message is addressed to.
        receiver: SlotIndex,
        /// The message text.
        text: String,
    },
    /// Spectator-to-spectator chat. Only surfaced on spectator sessions.
    SpectatorChat {
        /// The seat the message is attributed to.
        sender: SlotIndex,
        /// The message text.
        text: String,
    },
    /// A system notice broadcast by a peer (kick announcements, transfer
    /// notices, monitor warnings).
    SystemMessage {
        /// The notice text.
        text: String,
    },
    /// A map beacon routed to this session because it is responsible for the
    /// target seat.
    Beacon {
        /// The seat that placed the beacon.
        sender: SlotIndex,
        /// The seat the beacon is for.
        target: SlotIndex,
        /// Map x coordinate.
        x: i32,
        /// Map y coordinate.
        y: i32,
        /// Beacon label.
        text: String,
    },
    /// An authorized net message this layer does not consume itself,
    /// surfaced for the lobby/UI collaborator (options, votes, seat
    /// requests, stats and the like).
    LobbyMessage {
        /// The queue the message arrived on.
        origin: SlotIndex,
        /// The message kind.
        kind: MsgKind,
        /// The undecoded payload bytes.
        payload: Vec<u8>,
    },
    /// Progress sending a hosted file to a peer (host side).
    FileSendProgress {
        /// The seat being sent to.
        slot: SlotIndex,
        /// Percent of the file delivered so far (0..=100).
        percent: u8,
    },
    /// Progress receiving a file from the host (client side).
    FileReceiveProgress {
        /// Percent of the file received so far (0..=100).
        percent: u8,
    },
    /// A file download completed.
    FileReceiveComplete,
    /// The recorded match being replayed has ended. Only emitted by replay
    /// sessions.
    ReplayEnded,
}

// #############
// #  TRAITS   #
// #############

/// Compile time parameterization for sessions.
///
/// This trait bundles the generic types needed for a session. Implement this
/// on a marker struct to configure your session types.
///
/// # Example
///
/// ```
/// use garrison_lockstep::Config;
/// use std::net::SocketAddr;
///
/// struct GameConfig;
///
/// impl Config for GameConfig {
///     type Address = SocketAddr; // Most common choice for UDP games
/// }
/// ```
///
/// # Common Patterns
///
/// - **UDP Games**: Use `std::net::SocketAddr` for `Address`
/// - **Relay/WebRTC**: Use a custom address type from your transport library
/// - **Local Testing**: Any `Clone + PartialEq + Eq + Ord + Hash + Debug` type works
pub trait Config: 'static {
    /// The address type which identifies the remote clients
    type Address: Clone + PartialEq + Eq + PartialOrd + Ord + Hash + Debug;
}

/// This [`NonBlockingSocket`] trait is used when you want to use Garrison Lockstep with your own transport.
/// However you wish to send and receive envelopes, it should be implemented through these two methods.
/// Delivery must be reliable and ordered per peer (a TCP stream, a reliable
/// relay channel, an in-memory pipe); the layer's queue discipline depends on it.
pub trait NonBlockingSocket<A>
where
    A: Clone + PartialEq + Eq + Hash,
{
    /// Takes an [`Envelope`] and sends it to the given address.
    fn send_to(&mut self, envelope: &Envelope, addr: &A);

    /// This method should return all envelopes received since the last time this method was called.
    /// The pairs `(A, Envelope)` indicate from which address each envelope was received.
    fn receive_all_messages(&mut self) -> Vec<(A, Envelope)>;
}

// ###################
// # UNIT TESTS      #
// ###################

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    /// A minimal test configuration for unit testing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct TestConfig;

    impl Config for TestConfig {
        type Address = SocketAddr;
    }

    // ==========================================
    // SlotIndex Tests
    // ==========================================

    #[test]
    fn slot_index_new() {
        let slot = SlotIndex::new(0);
        assert_eq!(slot.as_usize(), 0);

        let slot = SlotIndex::new(5);
        assert_eq!(slot.as_usize(), 5);
    }

    #[test]
    fn slot_index_seat_classification() {
        let seat = SlotIndex::new(3);
        assert!(seat.is_game_seat_for(4));
        assert!(!seat.is_game_seat_for(3));
        assert!(seat.is_spectator_seat_for(3));
        assert!(!seat.is_spectator_seat_for(4));
    }

    #[test]
    fn slot_index_ordering_and_hash() {
        use std::collections::HashSet;

        assert!(SlotIndex::new(0) < SlotIndex::new(1));
        assert!(SlotIndex::new(1) < SlotIndex::new(2));

        let mut set = HashSet::new();
        set.insert(SlotIndex::new(0));
        set.insert(SlotIndex::new(1));
        set.insert(SlotIndex::new(0)); // duplicate
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn slot_index_conversions() {
        let slot: SlotIndex = 7usize.into();
        assert_eq!(slot, SlotIndex::new(7));
        let raw: usize = slot.into();
        assert_eq!(raw, 7);
    }

    #[test]
    fn slot_index_display() {
        assert_eq!(SlotIndex::new(3).to_string(), "3");
    }

    // ==========================================
    // GameTime Tests
    // ==========================================

    #[test]
    fn game_time_arithmetic() {
        let t = GameTime::new(100);
        assert_eq!((t + 50).as_millis(), 150);

        let mut t2 = GameTime::new(100);
        t2 += 25;
        assert_eq!(t2.as_millis(), 125);
    }

    #[test]
    fn game_time_millis_since_saturates() {
        let early = GameTime::new(100);
        let late = GameTime::new(400);
        assert_eq!(late.millis_since(early), 300);
        assert_eq!(early.millis_since(late), 0);
    }

    #[test]
    fn game_time_ordering() {
        assert!(GameTime::new(1) < GameTime::new(2));
        assert_eq!(GameTime::new(5), GameTime::new(5));
    }

    #[test]
    fn game_time_display() {
        assert_eq!(GameTime::new(1500).to_string(), "1500ms");
    }

    // ==========================================
    // MatchStage / SessionRole Tests
    // ==========================================

    #[test]
    fn match_stage_has_started() {
        assert!(!MatchStage::Lobby.has_started());
        assert!(MatchStage::Loading.has_started());
        assert!(MatchStage::Active.has_started());
        assert!(MatchStage::Ended.has_started());
    }

    #[test]
    fn match_stage_ordering_follows_lifecycle() {
        assert!(MatchStage::Lobby < MatchStage::Loading);
        assert!(MatchStage::Loading < MatchStage::Active);
        assert!(MatchStage::Active < MatchStage::Ended);
    }

    #[test]
    fn session_role_is_host() {
        assert!(SessionRole::Host.is_host());
        assert!(!SessionRole::Client.is_host());
        assert!(!SessionRole::Replay.is_host());
    }

    // ==========================================
    // GarrisonEvent Tests
    // ==========================================

    #[test]
    fn garrison_event_everyone_joined() {
        let event = GarrisonEvent::EveryoneJoined {
            at: GameTime::new(2500),
        };

        if let GarrisonEvent::EveryoneJoined { at } = event {
            assert_eq!(at, GameTime::new(2500));
        } else {
            panic!("Expected EveryoneJoined event");
        }
    }

    #[test]
    fn garrison_event_kick_issued() {
        let event = GarrisonEvent::KickIssued {
            slot: SlotIndex::new(2),
            reason: "Your connection was too laggy.".to_owned(),
            code: LeaveReason::Connection,
        };

        if let GarrisonEvent::KickIssued { slot, reason, code } = event {
            assert_eq!(slot, SlotIndex::new(2));
            assert!(reason.contains("laggy"));
            assert_eq!(code, LeaveReason::Connection);
        } else {
            panic!("Expected KickIssued event");
        }
    }

    #[test]
    fn garrison_event_chat_carries_corrected_sender() {
        let event = GarrisonEvent::Chat {
            sender: SlotIndex::new(1),
            team_only: false,
            text: "gl hf".to_owned(),
        };

        if let GarrisonEvent::Chat { sender, team_only, text } = event {
            assert_eq!(sender, SlotIndex::new(1));
            assert!(!team_only);
            assert_eq!(text, "gl hf");
        } else {
            panic!("Expected Chat event");
        }
    }

    #[test]
    fn garrison_event_equality() {
        let a = GarrisonEvent::PlayerDropped {
            slot: SlotIndex::new(1),
        };
        let b = GarrisonEvent::PlayerDropped {
            slot: SlotIndex::new(1),
        };
        let c = GarrisonEvent::PlayerDropped {
            slot: SlotIndex::new(2),
        };

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn garrison_event_debug_format() {
        let event = GarrisonEvent::LagWarning {
            slot: SlotIndex::new(3),
            seconds: 12,
            kick_at: 15,
        };
        let debug = format!("{:?}", event);
        assert!(debug.contains("LagWarning"));
        assert!(debug.contains("12"));
    }

    #[test]
    fn leave_reason_is_copy_and_eq() {
        let reason = LeaveReason::WrongData;
        let copied: LeaveReason = reason;
        assert_eq!(reason, copied);
        assert_ne!(LeaveReason::Connection, LeaveReason::Invalid);
    }

    // Compile-time check that Config is usable with a socket address type.
    #[test]
    fn config_trait_is_implementable() {
        fn assert_config<T: Config>() {}
        assert_config::<TestConfig>();
    }
}

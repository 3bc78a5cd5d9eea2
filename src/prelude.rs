//! Convenient re-exports for common usage.
//!
//! This module provides a "prelude" that re-exports the most commonly used types
//! from Garrison Lockstep, allowing you to import them all at once.
//!
//! # Usage
//!
//! ```rust
//! use garrison_lockstep::prelude::*;
//! ```
//!
//! # What's Included
//!
//! The prelude includes:
//!
//! - **Session types**: [`LockstepSession`], [`SessionBuilder`], [`SeatOccupant`]
//! - **Core traits**: [`Config`], [`NonBlockingSocket`], [`IntegrityProbe`]
//! - **Fundamental types**: [`SlotIndex`], [`GameTime`], [`MsgKind`], [`Envelope`]
//! - **Session state**: [`MatchStage`], [`SessionRole`], [`Roster`], [`PlayerSlot`]
//! - **Event handling**: [`GarrisonEvent`], [`GameCommand`], [`EventDrain`], [`LeaveReason`]
//! - **Error handling**: [`GarrisonError`], [`GarrisonResult`]
//! - **Integrity**: [`ContentDigest`], [`DigestBuilder`], [`NoLocalState`]
//! - **Configuration**: [`SessionConfig`], [`MonitorConfig`], [`IntegrityConfig`], [`TransferConfig`]
//! - **Testing transports**: [`loopback_pair`], [`LoopbackHub`], [`LoopbackSocket`]
//!
//! # Example
//!
//! ```rust
//! use garrison_lockstep::prelude::*;
//!
//! // Create the config marker struct
//! struct MyConfig;
//!
//! impl Config for MyConfig {
//!     type Address = usize; // Loopback addresses; UDP games would use SocketAddr
//! }
//!
//! # fn main() -> GarrisonResult<()> {
//! let (socket, _peer) = loopback_pair();
//!
//! let mut session = SessionBuilder::<MyConfig>::new()
//!     .add_player(SeatOccupant::Local { name: "alice".to_owned() }, SlotIndex::new(0))?
//!     .add_player(
//!         SeatOccupant::Remote { name: "bob".to_owned(), address: 1 },
//!         SlotIndex::new(1),
//!     )?
//!     .with_host(SlotIndex::new(0))
//!     .start_session(socket)?;
//!
//! // Poll once per simulation step with the current game time.
//! let commands = session.poll(GameTime::new(0))?;
//! assert!(commands.is_empty());
//! # Ok(())
//! # }
//! ```

// Core session types
pub use crate::sessions::builder::{SeatOccupant, SessionBuilder};
pub use crate::sessions::lockstep_session::{GameCommand, LockstepSession};

// Core traits
pub use crate::{Config, NonBlockingSocket};

// In-process transport for tests and demos
pub use crate::network::loopback::{loopback_pair, LoopbackHub, LoopbackSocket};

// Fundamental types and constants
pub use crate::{Channel, Envelope, FileDigest, GameTime, MsgKind, SlotIndex};

// Session state types
pub use crate::{MatchStage, SessionRole};

// Roster access
pub use crate::sessions::roster::{PlayerSlot, Roster, SlotControl};

// Event handling
pub use crate::sessions::event_drain::EventDrain;
pub use crate::{GarrisonEvent, LeaveReason};

// Error handling
pub use crate::{GarrisonError, GarrisonResult};

// Data integrity
pub use crate::hash::{ContentDigest, DigestBuilder};
pub use crate::sessions::integrity::{IntegrityProbe, NoLocalState};

// Common configuration types
pub use crate::sessions::config::{
    IntegrityConfig, MonitorConfig, SessionConfig, TransferConfig,
};

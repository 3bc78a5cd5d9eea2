//! Common test infrastructure shared across integration tests.
//!
//! This module provides:
//! - `harness`: session wiring over the in-process loopback transport,
//!   deterministic integrity probes, and poll helpers
//!
//! # Usage
//!
//! From any integration test file:
//! ```ignore
//! mod common;
//! use common::harness::{host_client_pair, pump_pair, LockstepConfig};
//! // Or use the re-exported items:
//! use common::{host_client_pair, pump_pair};
//! ```

pub mod harness;

// Re-export commonly used items for convenience.
// These are public utilities for integration tests - allow unused until tests adopt them.
#[allow(unused_imports)]
pub use harness::{
    activate_pair, drain_events, host_client_pair, host_on_hub, lobby_trio, pair_with_seeds,
    pump_pair, pump_trio, LockstepConfig, SeededProbe, TestSession, CLIENT_ADDR, CLIENT_SEAT,
    HOST_ADDR, HOST_SEAT, WATCHER_ADDR, WATCHER_SEAT,
};

//! Configuration types for lockstep sessions.
//!
//! Three concerns, three structs, bundled as [`SessionConfig`]:
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `MonitorConfig` | Health monitor thresholds and cadences | `strict()`, `relaxed()`, `disabled()` |
//! | `IntegrityConfig` | Data integrity handshake behavior | `permissive()` |
//! | `TransferConfig` | Hosted file transfer budgets | `lan()` |
//!
//! # Example
//!
//! ```
//! use garrison_lockstep::{MonitorConfig, SessionConfig};
//!
//! let config = SessionConfig {
//!     monitors: MonitorConfig {
//!         lag_kick_seconds: 30,
//!         ..MonitorConfig::default()
//!     },
//!     ..SessionConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use web_time::Duration;

use crate::{GarrisonError, GarrisonResult};

/// Configuration for the connection health monitors.
///
/// The three monitors (lag, desync, not-ready) are host-only and run at most
/// once per [`check_interval`](Self::check_interval). Thresholds are counted
/// in monitor ticks, which at the default cadence means seconds.
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. To ensure your
/// code continues to compile, always use the `..Default::default()` or
/// `..MonitorConfig::default()` pattern when constructing instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "MonitorConfig has no effect unless passed to SessionBuilder::with_monitor_config()"]
pub struct MonitorConfig {
    /// Consecutive lagging seconds after which a seat is kicked. The
    /// not-ready monitor shares this threshold for its accumulated total.
    /// Zero disables both monitors.
    ///
    /// Default: 60
    pub lag_kick_seconds: u32,

    /// Consecutive desynced seconds after which a seat is kicked.
    /// Zero disables the desync monitor.
    ///
    /// Default: 10
    pub desync_kick_seconds: u32,

    /// Whether the lobby enforces a ready check. The not-ready monitor only
    /// runs when this is on.
    ///
    /// Default: false
    pub ready_check_enabled: bool,

    /// Minimum wall-clock interval between evaluations of each monitor.
    ///
    /// Default: 1000ms
    pub check_interval: Duration,

    /// Wall-clock interval between latency probes to each connected peer.
    ///
    /// Default: 2000ms
    pub ping_interval: Duration,

    /// Rolling ping at or above which a seat counts as lagging.
    ///
    /// Default: 4000ms
    pub ping_limit: Duration,

    /// Wall-clock grace during which a still-loading seat is not considered
    /// lagging, measured from match start.
    ///
    /// Default: 60s
    pub initial_load_grace: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            lag_kick_seconds: 60,
            desync_kick_seconds: 10,
            ready_check_enabled: false,
            check_interval: Duration::from_millis(1000),
            ping_interval: Duration::from_millis(2000),
            ping_limit: Duration::from_millis(4000),
            initial_load_grace: Duration::from_secs(60),
        }
    }
}

impl MonitorConfig {
    /// Creates a new `MonitorConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for organized play: little patience for lag or idling.
    pub fn strict() -> Self {
        Self {
            lag_kick_seconds: 20,
            desync_kick_seconds: 5,
            ready_check_enabled: true,
            // Probe twice as often so the rolling ping reacts faster.
            ping_interval: Duration::from_millis(1000),
            ping_limit: Duration::from_millis(2000),
            initial_load_grace: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Preset for casual play on slow connections.
    pub fn relaxed() -> Self {
        Self {
            lag_kick_seconds: 120,
            desync_kick_seconds: 30,
            ping_limit: Duration::from_millis(8000),
            initial_load_grace: Duration::from_secs(120),
            ..Self::default()
        }
    }

    /// Preset with every monitor off. Pings still flow so latency is
    /// observable; nobody gets kicked for it.
    pub fn disabled() -> Self {
        Self {
            lag_kick_seconds: 0,
            desync_kick_seconds: 0,
            ready_check_enabled: false,
            ..Self::default()
        }
    }

    /// Validates the monitor configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidRequest`] if any value is out of range.
    pub fn validate(&self) -> GarrisonResult<()> {
        if self.check_interval.is_zero() {
            return Err(GarrisonError::InvalidRequest {
                info: "check_interval must be non-zero".to_owned(),
            });
        }
        if self.ping_interval.is_zero() {
            return Err(GarrisonError::InvalidRequest {
                info: "ping_interval must be non-zero".to_owned(),
            });
        }
        if self.lag_kick_seconds > 3600 {
            return Err(GarrisonError::InvalidRequest {
                info: format!(
                    "lag_kick_seconds must be at most 3600, got {}",
                    self.lag_kick_seconds
                ),
            });
        }
        if self.desync_kick_seconds > 3600 {
            return Err(GarrisonError::InvalidRequest {
                info: format!(
                    "desync_kick_seconds must be at most 3600, got {}",
                    self.desync_kick_seconds
                ),
            });
        }
        Ok(())
    }
}

/// Configuration for the two-phase data integrity handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "IntegrityConfig has no effect unless passed to SessionBuilder::with_integrity_config()"]
pub struct IntegrityConfig {
    /// Minimum spacing between spot-check challenges to the same seat.
    ///
    /// Default: 10s
    pub challenge_interval: Duration,

    /// Game-time window after "everyone joined" within which every human
    /// seat must have reported a matching content digest.
    ///
    /// Default: 60000 (one minute of simulation time)
    pub join_verify_window_millis: u32,

    /// When set, the host records integrity failures but never kicks for a
    /// missing or mismatched startup report. For development against
    /// modified data.
    ///
    /// Default: false
    pub permissive: bool,

    /// Whether a peer running with the script debugger attached passes the
    /// spot check. Off in any honest match.
    ///
    /// Default: false
    pub debug_mappings_allowed: bool,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            challenge_interval: Duration::from_millis(10_000),
            join_verify_window_millis: 60_000,
            permissive: false,
            debug_mappings_allowed: false,
        }
    }
}

impl IntegrityConfig {
    /// Creates a new `IntegrityConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for development: mismatches are logged, nobody is kicked,
    /// debugger overlays are tolerated.
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            debug_mappings_allowed: true,
            ..Self::default()
        }
    }

    /// Validates the integrity configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidRequest`] if any value is out of range.
    pub fn validate(&self) -> GarrisonResult<()> {
        if self.challenge_interval.is_zero() {
            return Err(GarrisonError::InvalidRequest {
                info: "challenge_interval must be non-zero".to_owned(),
            });
        }
        Ok(())
    }
}

/// Configuration for hosted file transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "TransferConfig has no effect unless passed to SessionBuilder::with_transfer_config()"]
pub struct TransferConfig {
    /// Wall-clock budget one `poll` call may spend pushing file chunks,
    /// split evenly across every in-flight transfer. Keeps downloads from
    /// starving the simulation.
    ///
    /// Default: 4000µs
    pub send_budget: Duration,

    /// Bytes per chunk envelope.
    ///
    /// Default: 2048
    pub chunk_size: usize,

    /// Largest file a peer may request.
    ///
    /// Default: 128 MiB
    pub max_file_size: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            send_budget: Duration::from_micros(4000),
            chunk_size: 2048,
            max_file_size: 0x0800_0000,
        }
    }
}

impl TransferConfig {
    /// Creates a new `TransferConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for LAN sessions: bigger chunks, a bigger slice of each poll.
    pub fn lan() -> Self {
        Self {
            send_budget: Duration::from_micros(8000),
            chunk_size: 8192,
            ..Self::default()
        }
    }

    /// Validates the transfer configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::InvalidRequest`] if any value is out of range.
    pub fn validate(&self) -> GarrisonResult<()> {
        if self.chunk_size == 0 {
            return Err(GarrisonError::InvalidRequest {
                info: "chunk_size must be non-zero".to_owned(),
            });
        }
        if self.chunk_size > 32_768 {
            return Err(GarrisonError::InvalidRequest {
                info: format!("chunk_size must be at most 32768, got {}", self.chunk_size),
            });
        }
        if self.send_budget.is_zero() {
            return Err(GarrisonError::InvalidRequest {
                info: "send_budget must be non-zero".to_owned(),
            });
        }
        Ok(())
    }
}

/// Everything configurable about a session, bundled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[must_use = "SessionConfig has no effect unless passed to a SessionBuilder"]
pub struct SessionConfig {
    /// Health monitor thresholds and cadences.
    pub monitors: MonitorConfig,
    /// Data integrity handshake behavior.
    pub integrity: IntegrityConfig,
    /// Hosted file transfer budgets.
    pub transfer: TransferConfig,
}

impl SessionConfig {
    /// Creates a new `SessionConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates every sub-configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`GarrisonError::InvalidRequest`] found.
    pub fn validate(&self) -> GarrisonResult<()> {
        self.monitors.validate()?;
        self.integrity.validate()?;
        self.transfer.validate()?;
        Ok(())
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

    // ===== MonitorConfig Tests =====

    #[test]
    fn monitor_config_default_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.lag_kick_seconds, 60);
        assert_eq!(config.desync_kick_seconds, 10);
        assert!(!config.ready_check_enabled);
        assert_eq!(config.check_interval, Duration::from_millis(1000));
        assert_eq!(config.ping_interval, Duration::from_millis(2000));
        assert_eq!(config.ping_limit, Duration::from_millis(4000));
        assert_eq!(config.initial_load_grace, Duration::from_secs(60));
    }

    #[test]
    fn monitor_config_new_equals_default() {
        assert_eq!(MonitorConfig::new(), MonitorConfig::default());
    }

    #[test]
    fn monitor_presets_differ() {
        let presets = [
            MonitorConfig::default(),
            MonitorConfig::strict(),
            MonitorConfig::relaxed(),
            MonitorConfig::disabled(),
        ];
        for (i, a) in presets.iter().enumerate() {
            for (j, b) in presets.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "presets at index {i} and {j} should differ");
                }
            }
        }
    }

    #[test]
    fn disabled_preset_turns_monitors_off() {
        let config = MonitorConfig::disabled();
        assert_eq!(config.lag_kick_seconds, 0);
        assert_eq!(config.desync_kick_seconds, 0);
        assert!(!config.ready_check_enabled);
        // Ping service still runs.
        assert!(!config.ping_interval.is_zero());
    }

    #[test]
    fn monitor_config_validation_bounds() {
        assert!(MonitorConfig::default().validate().is_ok());
        assert!(MonitorConfig::strict().validate().is_ok());
        assert!(MonitorConfig::relaxed().validate().is_ok());
        assert!(MonitorConfig::disabled().validate().is_ok());

        let zero_interval = MonitorConfig {
            check_interval: Duration::ZERO,
            ..MonitorConfig::default()
        };
        assert!(zero_interval.validate().is_err());

        let huge_threshold = MonitorConfig {
            lag_kick_seconds: 3601,
            ..MonitorConfig::default()
        };
        assert!(huge_threshold.validate().is_err());

        let boundary = MonitorConfig {
            lag_kick_seconds: 3600,
            desync_kick_seconds: 3600,
            ..MonitorConfig::default()
        };
        assert!(boundary.validate().is_ok());
    }

    // ===== IntegrityConfig Tests =====

    #[test]
    fn integrity_config_default_values() {
        let config = IntegrityConfig::default();
        assert_eq!(config.challenge_interval, Duration::from_millis(10_000));
        assert_eq!(config.join_verify_window_millis, 60_000);
        assert!(!config.permissive);
        assert!(!config.debug_mappings_allowed);
    }

    #[test]
    fn integrity_permissive_preset() {
        let config = IntegrityConfig::permissive();
        assert!(config.permissive);
        assert!(config.debug_mappings_allowed);
        assert_eq!(
            config.challenge_interval,
            IntegrityConfig::default().challenge_interval
        );
    }

    #[test]
    fn integrity_config_validation() {
        assert!(IntegrityConfig::default().validate().is_ok());
        let bad = IntegrityConfig {
            challenge_interval: Duration::ZERO,
            ..IntegrityConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    // ===== TransferConfig Tests =====

    #[test]
    fn transfer_config_default_values() {
        let config = TransferConfig::default();
        assert_eq!(config.send_budget, Duration::from_micros(4000));
        assert_eq!(config.chunk_size, 2048);
        assert_eq!(config.max_file_size, 0x0800_0000);
    }

    #[test]
    fn transfer_config_validation() {
        assert!(TransferConfig::default().validate().is_ok());
        assert!(TransferConfig::lan().validate().is_ok());

        let zero_chunk = TransferConfig {
            chunk_size: 0,
            ..TransferConfig::default()
        };
        assert!(zero_chunk.validate().is_err());

        let oversized_chunk = TransferConfig {
            chunk_size: 65_536,
            ..TransferConfig::default()
        };
        assert!(oversized_chunk.validate().is_err());
    }

    // ===== SessionConfig Tests =====

    #[test]
    fn session_config_validates_all_parts() {
        assert!(SessionConfig::default().validate().is_ok());

        let bad = SessionConfig {
            transfer: TransferConfig {
                chunk_size: 0,
                ..TransferConfig::default()
            },
            ..SessionConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn session_config_new_equals_default() {
        assert_eq!(SessionConfig::new(), SessionConfig::default());
    }
}

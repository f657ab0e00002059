//! Configuration types for whack sessions.
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `ScheduleConfig` | Target count, spawn horizon, backoff, expiry | `classic()`, `quick()`, `deterministic()` |
//! | `BoardConfig` | Slot count and board geometry | `classic()` |
//! | `ProtocolConfig` | Sync protocol limits | `default()` |
//!
//! Every config has a `validate()` that [`SessionBuilder`](crate::SessionBuilder) runs
//! before starting a session.
//!
//! ```
//! use whack_sync::{ScheduleConfig, SessionBuilder};
//!
//! let builder = SessionBuilder::<u8>::new()
//!     .with_schedule_config(ScheduleConfig::quick());
//! ```

use web_time::Duration;

use crate::error::WhackError;
use crate::network::codec::MAX_BODY_BYTES;
use crate::slot_grid::BoardDimensions;

/// Longest spawn horizon accepted by validation.
const MAX_HORIZON: Duration = Duration::from_secs(60 * 60);

/// What happens when a target's slot is still occupied at its fire time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Retry after a fixed delay.
    Fixed(Duration),
    /// Retry after a delay drawn uniformly from `[min, max]`.
    Randomized {
        /// Shortest delay.
        min: Duration,
        /// Longest delay.
        max: Duration,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Fixed(Duration::from_millis(500))
    }
}

/// Whether visible targets leave on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Targets stay until tapped or the session ends.
    #[default]
    Never,
    /// Targets retire after being visible for this long.
    After(Duration),
}

/// How many targets to spawn and when.
///
/// # Forward Compatibility
///
/// New fields may be added. Construct with `..ScheduleConfig::default()`.
///
/// ```
/// use whack_sync::{BackoffPolicy, ExpiryPolicy, ScheduleConfig};
/// use web_time::Duration;
///
/// let config = ScheduleConfig {
///     total_targets: 30,
///     expiry: ExpiryPolicy::After(Duration::from_secs(2)),
///     backoff: BackoffPolicy::Randomized {
///         min: Duration::from_millis(200),
///         max: Duration::from_millis(900),
///     },
///     ..ScheduleConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "ScheduleConfig has no effect unless passed to SessionBuilder::with_schedule_config()"]
pub struct ScheduleConfig {
    /// Targets in one session.
    ///
    /// Default: 15
    pub total_targets: u32,

    /// Fire times are drawn uniformly from `[start, start + horizon]`.
    ///
    /// Default: 30s
    pub horizon: Duration,

    /// Retry delay when a slot is occupied at fire time.
    ///
    /// Default: fixed 500ms
    pub backoff: BackoffPolicy,

    /// Claims attempted before a target is dropped as starved.
    ///
    /// Default: 8
    pub max_claim_attempts: u32,

    /// Visibility timeout.
    ///
    /// Default: [`ExpiryPolicy::Never`]
    pub expiry: ExpiryPolicy,

    /// Seed for the scheduler RNG. `None` seeds from entropy.
    ///
    /// Default: `None`
    pub rng_seed: Option<u64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            total_targets: 15,
            horizon: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            max_claim_attempts: 8,
            expiry: ExpiryPolicy::Never,
            rng_seed: None,
        }
    }
}

impl ScheduleConfig {
    /// Same as `default()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fifteen targets over thirty seconds on the classic board.
    pub fn classic() -> Self {
        Self::default()
    }

    /// A short round: five targets within ten seconds, each visible for three.
    pub fn quick() -> Self {
        Self {
            total_targets: 5,
            horizon: Duration::from_secs(10),
            backoff: BackoffPolicy::Fixed(Duration::from_millis(250)),
            expiry: ExpiryPolicy::After(Duration::from_secs(3)),
            ..Self::default()
        }
    }

    /// Classic settings with a fixed RNG seed, so the schedule replays identically.
    ///
    /// ```
    /// use whack_sync::ScheduleConfig;
    ///
    /// assert_eq!(ScheduleConfig::deterministic(42).rng_seed, Some(42));
    /// ```
    pub fn deterministic(seed: u64) -> Self {
        Self {
            rng_seed: Some(seed),
            ..Self::default()
        }
    }

    /// Checks every field is in range.
    pub fn validate(&self) -> Result<(), WhackError> {
        if self.total_targets == 0 {
            return Err(WhackError::invalid_config(
                "total_targets",
                "must be at least 1",
            ));
        }
        if self.horizon.is_zero() || self.horizon > MAX_HORIZON {
            return Err(WhackError::invalid_config(
                "horizon",
                format!(
                    "must be between 1ms and {}s, got {}ms",
                    MAX_HORIZON.as_secs(),
                    self.horizon.as_millis()
                ),
            ));
        }
        if self.max_claim_attempts == 0 {
            return Err(WhackError::invalid_config(
                "max_claim_attempts",
                "must be at least 1",
            ));
        }
        match self.backoff {
            BackoffPolicy::Fixed(delay) if delay < Duration::from_millis(1) => {
                return Err(WhackError::invalid_config(
                    "backoff",
                    "fixed delay must be at least 1ms",
                ));
            },
            BackoffPolicy::Randomized { min, max }
                if min < Duration::from_millis(1) || min > max =>
            {
                return Err(WhackError::invalid_config(
                    "backoff",
                    format!(
                        "randomized range must satisfy 1ms <= min <= max, got [{}ms, {}ms]",
                        min.as_millis(),
                        max.as_millis()
                    ),
                ));
            },
            _ => {},
        }
        if let ExpiryPolicy::After(window) = self.expiry {
            if window < Duration::from_millis(1) {
                return Err(WhackError::invalid_config(
                    "expiry",
                    "visibility window must be at least 1ms",
                ));
            }
        }
        Ok(())
    }
}

/// The board every peer builds.
///
/// Slot 0 is never scheduled, so at least two slots are required.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "BoardConfig has no effect unless passed to SessionBuilder::with_board_config()"]
pub struct BoardConfig {
    /// Number of slots.
    ///
    /// Default: 16
    pub slot_count: usize,

    /// Geometry.
    ///
    /// Default: 0.55m square, 0.1m spacing, 0.01m height
    pub dimensions: BoardDimensions,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            slot_count: 16,
            dimensions: BoardDimensions::default(),
        }
    }
}

impl BoardConfig {
    /// Same as `default()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The 4×4 board.
    pub fn classic() -> Self {
        Self::default()
    }

    /// Checks slot count and geometry.
    pub fn validate(&self) -> Result<(), WhackError> {
        if self.slot_count < 2 {
            return Err(WhackError::invalid_config(
                "slot_count",
                format!(
                    "must be at least 2 (slot 0 is reserved), got {}",
                    self.slot_count
                ),
            ));
        }
        self.dimensions.validate()
    }
}

/// Limits for the sync protocol and event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "ProtocolConfig has no effect unless passed to SessionBuilder::with_protocol_config()"]
pub struct ProtocolConfig {
    /// Events kept before the oldest are discarded.
    ///
    /// Default: 256
    pub max_queued_events: usize,

    /// Largest world reference a host will send or a guest will accept.
    ///
    /// Default: 16 MiB
    pub max_world_reference_bytes: usize,

    /// Send the world reference point-to-point to peers discovered after it was broadcast.
    ///
    /// Default: `true`
    pub resend_world_reference_on_join: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_queued_events: 256,
            max_world_reference_bytes: MAX_BODY_BYTES - 64,
            resend_world_reference_on_join: true,
        }
    }
}

impl ProtocolConfig {
    /// Same as `default()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks limits are usable.
    pub fn validate(&self) -> Result<(), WhackError> {
        if self.max_queued_events < 16 {
            return Err(WhackError::invalid_config(
                "max_queued_events",
                format!("must be at least 16, got {}", self.max_queued_events),
            ));
        }
        if self.max_world_reference_bytes == 0
            || self.max_world_reference_bytes > MAX_BODY_BYTES - 64
        {
            return Err(WhackError::invalid_config(
                "max_world_reference_bytes",
                format!(
                    "must be between 1 and {}, got {}",
                    MAX_BODY_BYTES - 64,
                    self.max_world_reference_bytes
                ),
            ));
        }
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

    fn rejected_field(result: Result<(), WhackError>) -> &'static str {
        match result {
            Err(WhackError::InvalidConfig { field, .. }) => field,
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn presets_validate() {
        ScheduleConfig::default().validate().unwrap();
        ScheduleConfig::classic().validate().unwrap();
        ScheduleConfig::quick().validate().unwrap();
        ScheduleConfig::deterministic(1).validate().unwrap();
        BoardConfig::classic().validate().unwrap();
        ProtocolConfig::default().validate().unwrap();
    }

    #[test]
    fn classic_defaults() {
        let config = ScheduleConfig::classic();
        assert_eq!(config.total_targets, 15);
        assert_eq!(config.horizon, Duration::from_secs(30));
        assert_eq!(config.max_claim_attempts, 8);
        assert_eq!(config.expiry, ExpiryPolicy::Never);
        assert_eq!(BoardConfig::classic().slot_count, 16);
    }

    #[test]
    fn zero_targets_rejected() {
        let config = ScheduleConfig {
            total_targets: 0,
            ..ScheduleConfig::default()
        };
        assert_eq!(rejected_field(config.validate()), "total_targets");
    }

    #[test]
    fn zero_horizon_rejected() {
        let config = ScheduleConfig {
            horizon: Duration::ZERO,
            ..ScheduleConfig::default()
        };
        assert_eq!(rejected_field(config.validate()), "horizon");
    }

    #[test]
    fn zero_retry_cap_rejected() {
        let config = ScheduleConfig {
            max_claim_attempts: 0,
            ..ScheduleConfig::default()
        };
        assert_eq!(rejected_field(config.validate()), "max_claim_attempts");
    }

    #[test]
    fn inverted_backoff_range_rejected() {
        let config = ScheduleConfig {
            backoff: BackoffPolicy::Randomized {
                min: Duration::from_millis(900),
                max: Duration::from_millis(100),
            },
            ..ScheduleConfig::default()
        };
        assert_eq!(rejected_field(config.validate()), "backoff");
    }

    #[test]
    fn zero_backoff_rejected() {
        let config = ScheduleConfig {
            backoff: BackoffPolicy::Fixed(Duration::ZERO),
            ..ScheduleConfig::default()
        };
        assert_eq!(rejected_field(config.validate()), "backoff");
    }

    #[test]
    fn zero_expiry_rejected() {
        let config = ScheduleConfig {
            expiry: ExpiryPolicy::After(Duration::ZERO),
            ..ScheduleConfig::default()
        };
        assert_eq!(rejected_field(config.validate()), "expiry");
    }

    #[test]
    fn single_slot_board_rejected() {
        let config = BoardConfig {
            slot_count: 1,
            ..BoardConfig::default()
        };
        assert_eq!(rejected_field(config.validate()), "slot_count");
    }

    #[test]
    fn tiny_event_queue_rejected() {
        let config = ProtocolConfig {
            max_queued_events: 1,
            ..ProtocolConfig::default()
        };
        assert_eq!(rejected_field(config.validate()), "max_queued_events");
    }
}

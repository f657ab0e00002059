use std::marker::PhantomData;
use std::sync::Arc;

use web_time::Duration;

use crate::{
    error::{WhackError, WhackResult},
    network::protocol::SyncProtocol,
    session_state::SessionState,
    slot_grid::SlotGrid,
    spawn_scheduler::SpawnScheduler,
    telemetry::ViolationObserver,
    time::{Clock, SystemClock},
    PeerAddress, Role, SlotIndex, Transport, WhackSession,
};

pub use crate::sessions::config::{BoardConfig, ProtocolConfig, ScheduleConfig};

/// The [`SessionBuilder`] builds whack sessions.
///
/// After setting all appropriate values, use [`SessionBuilder::start_session`] to consume
/// the builder and create a [`WhackSession`]. Every peer builds with the same
/// [`BoardConfig`]; only the host's [`ScheduleConfig`] decides when targets fire, while
/// guests use its `total_targets` for their own remaining counter.
#[must_use = "SessionBuilder must be consumed by calling start_session"]
pub struct SessionBuilder<A: PeerAddress> {
    role: Role,
    schedule_config: ScheduleConfig,
    board_config: BoardConfig,
    protocol_config: ProtocolConfig,
    /// `None` uses the wall clock.
    clock: Option<Box<dyn Clock>>,
    /// Optional observer for violations.
    violation_observer: Option<Arc<dyn ViolationObserver>>,
    /// Exact `(offset, slot)` pairs replacing the random draw.
    forced_schedule: Option<Vec<(Duration, SlotIndex)>>,
    /// The host a guest listens to. `None` adopts the first valid authoritative sender.
    host: Option<A>,
    _address: PhantomData<fn() -> A>,
}

impl<A: PeerAddress> std::fmt::Debug for SessionBuilder<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            role,
            schedule_config,
            board_config,
            protocol_config,
            clock,
            violation_observer,
            forced_schedule,
            host,
            _address,
        } = self;

        f.debug_struct("SessionBuilder")
            .field("role", role)
            .field("schedule_config", schedule_config)
            .field("board_config", board_config)
            .field("protocol_config", protocol_config)
            .field("has_custom_clock", &clock.is_some())
            .field("has_violation_observer", &violation_observer.is_some())
            .field("forced_schedule", forced_schedule)
            .field("host", host)
            .finish()
    }
}

impl<A: PeerAddress> Default for SessionBuilder<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: PeerAddress> SessionBuilder<A> {
    /// Construct a new builder with all values set to their defaults.
    pub fn new() -> Self {
        Self {
            role: Role::default(),
            schedule_config: ScheduleConfig::default(),
            board_config: BoardConfig::default(),
            protocol_config: ProtocolConfig::default(),
            clock: None,
            violation_observer: None,
            forced_schedule: None,
            host: None,
            _address: PhantomData,
        }
    }

    /// Host or guest. Default is [`Role::Host`].
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Sets the spawn schedule. See [`ScheduleConfig`] for presets.
    pub fn with_schedule_config(mut self, config: ScheduleConfig) -> Self {
        self.schedule_config = config;
        self
    }

    /// Sets the board layout. All peers must agree on it.
    pub fn with_board_config(mut self, config: BoardConfig) -> Self {
        self.board_config = config;
        self
    }

    /// Sets protocol and event queue limits.
    pub fn with_protocol_config(mut self, config: ProtocolConfig) -> Self {
        self.protocol_config = config;
        self
    }

    /// Replaces the wall clock, typically with a [`ManualClock`](crate::ManualClock) in
    /// tests and replays.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Sets a custom observer for violations.
    ///
    /// When set, scheduling starvation and dropped payloads are reported to this observer
    /// in addition to being logged via tracing.
    ///
    /// # Example
    ///
    /// ```
    /// use whack_sync::{SessionBuilder, telemetry::CollectingObserver};
    /// use std::sync::Arc;
    ///
    /// let observer = Arc::new(CollectingObserver::new());
    /// let builder = SessionBuilder::<u8>::new()
    ///     .with_violation_observer(observer.clone());
    ///
    /// // After session operations, check for violations
    /// assert!(observer.violations().is_empty());
    /// ```
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Replaces the random draw with exact fire offsets and slots. The number of entries
    /// becomes the target total, overriding `total_targets`.
    ///
    /// Meant for scripted scenarios and tests.
    pub fn with_forced_schedule(mut self, plan: Vec<(Duration, SlotIndex)>) -> Self {
        self.forced_schedule = Some(plan);
        self
    }

    /// Names the host a guest takes placements, drops and world references from, for
    /// example the winner of [`elect_host`](crate::elect_host). Without it, a guest
    /// adopts the first peer whose host-only message passes validation.
    pub fn with_host(mut self, address: A) -> Self {
        self.host = Some(address);
        self
    }

    /// Consumes the builder to create a [`WhackSession`].
    ///
    /// A host draws its whole schedule here, relative to the clock's current time.
    ///
    /// # Errors
    /// - Returns [`WhackError::InvalidConfig`] if a configuration value is out of range,
    ///   the forced schedule is empty or longer than `u32::MAX`, or a host names a host.
    /// - Returns [`WhackError::SlotOutOfRange`] if a forced slot is off the board.
    pub fn start_session(
        self,
        transport: impl Transport<A> + 'static,
    ) -> WhackResult<WhackSession<A>> {
        self.schedule_config.validate()?;
        self.board_config.validate()?;
        self.protocol_config.validate()?;
        if self.role.is_host() && self.host.is_some() {
            return Err(WhackError::invalid_config(
                "host",
                "only a guest names its host",
            ));
        }

        let slot_count = self.board_config.slot_count;
        let total_targets = match &self.forced_schedule {
            Some(plan) => {
                if plan.is_empty() {
                    return Err(WhackError::invalid_config(
                        "forced_schedule",
                        "must contain at least one entry",
                    ));
                }
                if let Some((_, slot)) = plan.iter().find(|(_, slot)| !slot.is_valid_for(slot_count))
                {
                    return Err(WhackError::SlotOutOfRange {
                        slot: *slot,
                        slot_count,
                    });
                }
                u32::try_from(plan.len()).map_err(|_| {
                    WhackError::invalid_config("forced_schedule", "too many entries")
                })?
            },
            None => self.schedule_config.total_targets,
        };

        let clock: Box<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Box::new(SystemClock::new()),
        };
        let grid = SlotGrid::build(slot_count, self.board_config.dimensions);
        let mut state = SessionState::new(total_targets, grid);

        let scheduler = if self.role.is_host() {
            let mut config = self.schedule_config;
            config.total_targets = total_targets;
            let mut scheduler = SpawnScheduler::new(&config);
            let start = clock.now();
            match &self.forced_schedule {
                Some(plan) => scheduler.schedule_forced(start, plan, &mut state),
                None => scheduler.schedule(start, &mut state),
            };
            Some(scheduler)
        } else {
            None
        };

        let mut protocol = SyncProtocol::new(self.role, self.protocol_config, slot_count);
        if self.role.is_host() {
            protocol.set_total_targets(total_targets);
        }
        if let Some(host) = self.host {
            protocol.set_host(host);
        }

        Ok(WhackSession::new(
            self.role,
            clock,
            Box::new(transport),
            state,
            scheduler,
            protocol,
            self.protocol_config.max_queued_events,
            self.violation_observer,
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
    use crate::time::ManualClock;
    use crate::{MemoryNetwork, SessionStatus, TargetState};

    #[test]
    fn defaults() {
        let builder = SessionBuilder::<u8>::new();
        assert_eq!(builder.role, Role::Host);
        assert_eq!(builder.schedule_config, ScheduleConfig::default());
        assert_eq!(builder.board_config.slot_count, 16);
        assert!(builder.forced_schedule.is_none());
    }

    #[test]
    fn host_schedules_every_target_up_front() {
        let network = MemoryNetwork::<u8>::new();
        let session = SessionBuilder::<u8>::new()
            .with_schedule_config(ScheduleConfig::deterministic(3))
            .start_session(network.endpoint(0))
            .unwrap();
        assert_eq!(session.state().targets().count(), 15);
        assert!(session
            .state()
            .targets()
            .all(|t| t.state() == TargetState::Pending && t.slot().as_usize() >= 1));
        assert_eq!(session.remaining(), 15);
        assert!(session.next_timer_at().is_some());
    }

    #[test]
    fn guest_has_no_schedule() {
        let network = MemoryNetwork::<u8>::new();
        let session = SessionBuilder::<u8>::new()
            .with_role(Role::Guest)
            .start_session(network.endpoint(0))
            .unwrap();
        assert_eq!(session.state().targets().count(), 0);
        assert_eq!(session.remaining(), 15);
        assert_eq!(session.next_timer_at(), None);
        assert_eq!(session.status(), SessionStatus::Running);
    }

    #[test]
    fn forced_schedule_sets_total() {
        let network = MemoryNetwork::<u8>::new();
        let clock = ManualClock::new();
        clock.advance_millis(500);
        let session = SessionBuilder::<u8>::new()
            .with_clock(clock)
            .with_forced_schedule(vec![
                (Duration::from_millis(100), SlotIndex::new(1)),
                (Duration::from_millis(200), SlotIndex::new(2)),
            ])
            .start_session(network.endpoint(0))
            .unwrap();
        assert_eq!(session.remaining(), 2);
        assert_eq!(
            session.next_timer_at(),
            Some(crate::SimTime::from_millis(600))
        );
    }

    #[test]
    fn rejects_invalid_configs() {
        let network = MemoryNetwork::<u8>::new();
        let err = SessionBuilder::<u8>::new()
            .with_board_config(BoardConfig {
                slot_count: 1,
                ..BoardConfig::default()
            })
            .start_session(network.endpoint(0))
            .unwrap_err();
        assert!(matches!(
            err,
            WhackError::InvalidConfig {
                field: "slot_count",
                ..
            }
        ));

        let err = SessionBuilder::<u8>::new()
            .with_schedule_config(ScheduleConfig {
                total_targets: 0,
                ..ScheduleConfig::default()
            })
            .start_session(network.endpoint(1))
            .unwrap_err();
        assert!(matches!(
            err,
            WhackError::InvalidConfig {
                field: "total_targets",
                ..
            }
        ));

        let err = SessionBuilder::<u8>::new()
            .with_protocol_config(ProtocolConfig {
                max_queued_events: 1,
                ..ProtocolConfig::default()
            })
            .start_session(network.endpoint(2))
            .unwrap_err();
        assert!(matches!(err, WhackError::InvalidConfig { .. }));
    }

    #[test]
    fn rejects_forced_slot_off_board() {
        let network = MemoryNetwork::<u8>::new();
        let err = SessionBuilder::<u8>::new()
            .with_forced_schedule(vec![(Duration::ZERO, SlotIndex::new(16))])
            .start_session(network.endpoint(0))
            .unwrap_err();
        assert_eq!(
            err,
            WhackError::SlotOutOfRange {
                slot: SlotIndex::new(16),
                slot_count: 16,
            }
        );

        let err = SessionBuilder::<u8>::new()
            .with_forced_schedule(Vec::new())
            .start_session(network.endpoint(1))
            .unwrap_err();
        assert!(matches!(
            err,
            WhackError::InvalidConfig {
                field: "forced_schedule",
                ..
            }
        ));
    }

    #[test]
    fn host_cannot_name_a_host() {
        let network = MemoryNetwork::<u8>::new();
        let err = SessionBuilder::<u8>::new()
            .with_host(3)
            .start_session(network.endpoint(0))
            .unwrap_err();
        assert!(matches!(err, WhackError::InvalidConfig { field: "host", .. }));
    }

    #[test]
    fn guest_knows_named_host_before_any_traffic() {
        let network = MemoryNetwork::<u8>::new();
        let session = SessionBuilder::<u8>::new()
            .with_role(Role::Guest)
            .with_host(3)
            .start_session(network.endpoint(0))
            .unwrap();
        assert_eq!(session.host_address(), Some(&3));
    }

    #[test]
    fn debug_lists_every_field() {
        let builder = SessionBuilder::<u8>::new().with_clock(ManualClock::new());
        let text = format!("{builder:?}");
        for field in [
            "role",
            "schedule_config",
            "board_config",
            "protocol_config",
            "has_custom_clock: true",
            "has_violation_observer: false",
            "forced_schedule",
            "host: None",
        ] {
            assert!(text.contains(field), "missing {field} in {text}");
        }
    }
}

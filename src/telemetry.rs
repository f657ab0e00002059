//! Structured reporting of violated expectations and broken invariants.
//!
//! Conditions that should never happen in a healthy session (a scheduler claiming an
//! occupied slot, counters drifting apart, a configuration drawing from an empty range)
//! are reported as [`Violation`]s rather than bare log lines. By default they are logged
//! through `tracing`; sessions can route them to any [`ViolationObserver`] instead, which
//! is how tests assert that nothing went wrong.
//!
//! ```
//! use whack_sync::telemetry::{CollectingObserver, ViolationKind};
//! use std::sync::Arc;
//!
//! let observer = Arc::new(CollectingObserver::new());
//! assert!(observer.is_empty());
//! assert!(!observer.has_violation(ViolationKind::Scheduling));
//! ```

use crate::SimTime;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How bad a violation is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Unexpected but recovered from.
    Warning,
    /// Behavior may be degraded.
    Error,
    /// State may be inconsistent.
    Critical,
}

impl ViolationSeverity {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subsystem a violation came from.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]`; always include a wildcard arm when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// Spawn scheduling, e.g. a fire event for a target that is no longer pending.
    Scheduling,
    /// Slot occupancy, e.g. releasing a slot held by another target.
    SlotGrid,
    /// The sync protocol, e.g. a guest acting as an authority.
    SyncProtocol,
    /// Score and remaining counters.
    SessionState,
    /// A configuration value that slipped past validation.
    Configuration,
    /// A failed [`InvariantChecker`] check.
    Invariant,
}

impl ViolationKind {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduling => "scheduling",
            Self::SlotGrid => "slot_grid",
            Self::SyncProtocol => "sync_protocol",
            Self::SessionState => "session_state",
            Self::Configuration => "configuration",
            Self::Invariant => "invariant",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded violation.
///
/// ```
/// use whack_sync::telemetry::{Violation, ViolationKind, ViolationSeverity};
/// use whack_sync::SimTime;
///
/// let violation = Violation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::SlotGrid,
///     "release of a slot held by another target",
///     "slot_grid.rs:1",
/// )
/// .at(SimTime::from_millis(1200))
/// .with_context("slot", "4");
/// assert!(violation.to_string().contains("time=1200ms"));
/// ```
#[derive(Debug, Clone, serde::Serialize)]
pub struct Violation {
    /// How bad it is.
    pub severity: ViolationSeverity,
    /// Where it came from.
    pub kind: ViolationKind,
    /// What went wrong.
    pub message: String,
    /// `file:line` of the report.
    pub location: &'static str,
    /// Session time of the report, when known.
    pub time: Option<SimTime>,
    /// Extra key/value diagnostics such as slot or target ids.
    pub context: BTreeMap<String, String>,
}

impl Violation {
    /// Creates a violation with no time and no context.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            time: None,
            context: BTreeMap::new(),
        }
    }

    /// Attaches the session time.
    #[must_use]
    pub fn at(mut self, time: SimTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Serializes to JSON. `None` only if serialization fails.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {}",
            self.severity, self.kind, self.message, self.location
        )?;
        if let Some(time) = self.time {
            write!(f, ", time={time}")?;
        }
        if !self.context.is_empty() {
            write!(f, ", context={:?}", self.context)?;
        }
        write!(f, ")")
    }
}

/// Receives violations. Implement this to forward them to metrics or alerting.
pub trait ViolationObserver: Send + Sync {
    /// Called once per violation. Keep it quick; it runs inside [`poll`](crate::WhackSession::poll).
    fn on_violation(&self, violation: &Violation);
}

/// Logs violations through `tracing`: warnings at `warn`, everything else at `error`.
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &Violation) {
        let severity = violation.severity.as_str();
        let kind = violation.kind.as_str();
        let location = violation.location;
        let time = violation
            .time
            .map_or_else(|| "null".to_string(), |t| t.as_millis().to_string());
        let context = if violation.context.is_empty() {
            "{}".to_string()
        } else {
            let pairs: Vec<String> = violation
                .context
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        };

        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(
                    severity,
                    kind,
                    location,
                    time_ms = %time,
                    context = %context,
                    "{}",
                    violation.message
                );
            },
            ViolationSeverity::Error | ViolationSeverity::Critical => {
                tracing::error!(
                    severity,
                    kind,
                    location,
                    time_ms = %time,
                    context = %context,
                    "{}",
                    violation.message
                );
            },
        }
    }
}

/// Stores every violation it sees. Meant for tests.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<Violation>>,
}

impl CollectingObserver {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything collected so far.
    #[must_use]
    pub fn violations(&self) -> Vec<Violation> {
        self.violations.lock().clone()
    }

    /// Number of collected violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// `true` if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// `true` if a violation of `kind` was collected.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// Forgets everything collected so far.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &Violation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Reports `violation` to `observer`, or to [`TracingObserver`] when there is none.
pub fn report_to_observer(observer: Option<&Arc<dyn ViolationObserver>>, violation: &Violation) {
    match observer {
        Some(obs) => obs.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Reports a violation through [`TracingObserver`], recording the call site.
///
/// ```
/// use whack_sync::{report_violation, telemetry::{ViolationKind, ViolationSeverity}};
///
/// report_violation!(
///     ViolationSeverity::Warning,
///     ViolationKind::Scheduling,
///     "target {} fired twice",
///     7
/// );
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Like [`report_violation!`] but routed through an `Option<Arc<dyn ViolationObserver>>`.
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

// ==========================================
// Runtime Invariant Checking
// ==========================================

/// Describes a broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InvariantViolation {
    /// Type whose invariant failed.
    pub type_name: &'static str,
    /// The invariant that failed.
    pub invariant: String,
    /// Extra diagnostics.
    pub details: Option<String>,
}

impl InvariantViolation {
    /// Creates an invariant violation without details.
    #[must_use]
    pub fn new(type_name: &'static str, invariant: impl Into<String>) -> Self {
        Self {
            type_name,
            invariant: invariant.into(),
            details: None,
        }
    }

    /// Adds details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.type_name, self.invariant)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Types that can verify their own internal consistency.
///
/// ```
/// use whack_sync::telemetry::{InvariantChecker, InvariantViolation};
///
/// struct Tally {
///     hits: u32,
///     shots: u32,
/// }
///
/// impl InvariantChecker for Tally {
///     fn check_invariants(&self) -> Result<(), InvariantViolation> {
///         if self.hits > self.shots {
///             return Err(InvariantViolation::new("Tally", "hits exceed shots"));
///         }
///         Ok(())
///     }
/// }
///
/// assert!(Tally { hits: 1, shots: 2 }.check_invariants().is_ok());
/// ```
pub trait InvariantChecker {
    /// `Ok(())` when every invariant holds, otherwise the first broken one.
    fn check_invariants(&self) -> Result<(), InvariantViolation>;
}

/// Checks invariants in debug builds (or with the `paranoid` feature) and reports failures
/// as critical [`ViolationKind::Invariant`] violations. Compiles to nothing otherwise.
#[macro_export]
#[cfg(any(debug_assertions, feature = "paranoid"))]
macro_rules! debug_check_invariants {
    ($expr:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{}",
                violation
            );
        }
    }};

    ($expr:expr, $context:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{} [context: {}]",
                violation,
                $context
            );
        }
    }};
}

/// No-op outside debug builds and the `paranoid` feature.
#[macro_export]
#[cfg(not(any(debug_assertions, feature = "paranoid")))]
macro_rules! debug_check_invariants {
    ($expr:expr) => {{}};
    ($expr:expr, $context:expr) => {{}};
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

    fn sample(kind: ViolationKind) -> Violation {
        Violation::new(ViolationSeverity::Warning, kind, "sample", "test.rs:1")
    }

    #[test]
    fn severity_ordering() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn kind_labels_are_snake_case() {
        assert_eq!(ViolationKind::SlotGrid.as_str(), "slot_grid");
        assert_eq!(ViolationKind::SyncProtocol.to_string(), "sync_protocol");
    }

    #[test]
    fn display_includes_time_and_context() {
        let text = sample(ViolationKind::Scheduling)
            .at(SimTime::from_millis(5))
            .with_context("target", "3")
            .to_string();
        assert!(text.starts_with("[warning/scheduling] sample"));
        assert!(text.contains("time=5ms"));
        assert!(text.contains("target"));
    }

    #[test]
    fn collecting_observer_collects_and_clears() {
        let observer = CollectingObserver::new();
        observer.on_violation(&sample(ViolationKind::SessionState));
        assert_eq!(observer.len(), 1);
        assert!(observer.has_violation(ViolationKind::SessionState));
        assert!(!observer.has_violation(ViolationKind::SlotGrid));
        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn report_violation_to_routes_to_observer() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
        report_violation_to!(
            &observer,
            ViolationSeverity::Error,
            ViolationKind::SyncProtocol,
            "bad {}",
            1
        );
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.violations()[0].message, "bad 1");
        assert!(collector.violations()[0].location.contains("telemetry.rs"));
    }

    #[test]
    fn report_violation_to_without_observer_does_not_panic() {
        let observer: Option<Arc<dyn ViolationObserver>> = None;
        report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::Configuration,
            "logged only"
        );
    }

    #[test]
    fn invariant_violation_display() {
        let v = InvariantViolation::new("SessionState", "counters disagree").with_details("1 != 2");
        assert_eq!(v.to_string(), "SessionState: counters disagree (1 != 2)");
    }

    #[cfg(feature = "json")]
    #[test]
    fn violation_serializes_to_json() {
        let json = sample(ViolationKind::SlotGrid)
            .at(SimTime::from_millis(9))
            .to_json()
            .unwrap();
        assert!(json.contains(r#""kind":"slot_grid""#));
        assert!(json.contains(r#""time":9"#));
    }
}

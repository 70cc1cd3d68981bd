//! Shutdown metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! application installs a recorder.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `lameduck_sockets_ended_total` | Counter | `reason` | Sockets ended by the controller |
//! | `lameduck_in_flight_responses` | Gauge | - | Responses not yet finished |
//! | `lameduck_shutdowns_total` | Counter | `outcome` | Completed shutdown operations |

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Sockets ended by the controller.
pub const SOCKETS_ENDED_TOTAL: &str = "lameduck_sockets_ended_total";

/// Responses not yet finished.
pub const IN_FLIGHT_RESPONSES: &str = "lameduck_in_flight_responses";

/// Completed shutdown operations.
pub const SHUTDOWNS_TOTAL: &str = "lameduck_shutdowns_total";

/// Why the controller ended a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Last in-flight response on an advertised socket finished.
    Drained,
    /// Idle sweep.
    Idle,
    /// Force sweep.
    Forced,
}

impl EndReason {
    /// Returns the label value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drained => "drained",
            Self::Idle => "idle",
            Self::Forced => "forced",
        }
    }
}

/// Registers descriptions for the shutdown metrics.
///
/// Call once after installing a recorder.
pub fn describe_metrics() {
    describe_counter!(SOCKETS_ENDED_TOTAL, "Sockets ended by the shutdown controller");
    describe_gauge!(IN_FLIGHT_RESPONSES, "Responses started but not yet finished");
    describe_counter!(SHUTDOWNS_TOTAL, "Completed shutdown operations by outcome");
}

/// Records `count` sockets ended for `reason`.
pub fn record_sockets_ended(reason: EndReason, count: usize) {
    counter!(SOCKETS_ENDED_TOTAL, "reason" => reason.as_str()).increment(count as u64);
}

/// Updates the in-flight response gauge.
pub fn set_in_flight(count: usize) {
    gauge!(IN_FLIGHT_RESPONSES).set(count as f64);
}

/// Records a finished shutdown operation.
pub fn record_shutdown(success: bool) {
    let outcome = if success { "ok" } else { "error" };
    counter!(SHUTDOWNS_TOTAL, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_labels() {
        assert_eq!(EndReason::Drained.as_str(), "drained");
        assert_eq!(EndReason::Idle.as_str(), "idle");
        assert_eq!(EndReason::Forced.as_str(), "forced");
    }

    #[test]
    fn test_recording_without_recorder() {
        describe_metrics();
        record_sockets_ended(EndReason::Idle, 2);
        set_in_flight(3);
        record_shutdown(true);
    }
}

//! Progress events emitted by a pipeline run.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};

use crate::error::{Error, ErrorKind};
use crate::uid::UID;

use super::state::PipelineState;

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    JobStart,
    ParseStart,
    ParseFinish { elapsed: Duration },
    TransferStart,
    TransferFinish { elapsed: Duration },
    ComputeStart,
    ComputeProgress { current: usize, total: usize },
    ComputeFinish { elapsed: Duration, result: f64 },
    Info(String),
    Exception { kind: ErrorKind, message: String },
    JobFinish { elapsed: Duration },
}

impl EventKind {
    pub fn exception(error: &Error) -> Self {
        EventKind::Exception {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::JobStart => "JobStart",
            EventKind::ParseStart => "ParseStart",
            EventKind::ParseFinish { .. } => "ParseFinish",
            EventKind::TransferStart => "TransferStart",
            EventKind::TransferFinish { .. } => "TransferFinish",
            EventKind::ComputeStart => "ComputeStart",
            EventKind::ComputeProgress { .. } => "ComputeProgress",
            EventKind::ComputeFinish { .. } => "ComputeFinish",
            EventKind::Info(_) => "Info",
            EventKind::Exception { .. } => "Exception",
            EventKind::JobFinish { .. } => "JobFinish",
        }
    }

    pub fn message(&self) -> String {
        match self {
            EventKind::JobStart => "Initializing...".to_string(),
            EventKind::ParseStart => "Reading STL files and precomputing geometry...".to_string(),
            EventKind::ParseFinish { elapsed } => format!(
                "STLs parsed and geometry precomputed in: {}",
                format_elapsed(*elapsed)
            ),
            EventKind::TransferStart => "Staging triangle buffers for the compute backend...".to_string(),
            EventKind::TransferFinish { elapsed } => format!(
                "Initial buffer transfer complete in: {}",
                format_elapsed(*elapsed)
            ),
            EventKind::ComputeStart => "Beginning computation of view factors...".to_string(),
            EventKind::ComputeProgress { current, total } => format!(
                "Computation is {} complete ({current}/{total}).",
                format_percent(*current, *total)
            ),
            EventKind::ComputeFinish { elapsed, result } => format!(
                "Computation finished in: {}\nResult: {result}",
                format_elapsed(*elapsed)
            ),
            EventKind::Info(text) => text.clone(),
            EventKind::Exception { message, .. } => message.clone(),
            EventKind::JobFinish { elapsed } => {
                format!("All operations completed in: {}", format_elapsed(*elapsed))
            }
        }
    }

    /// State the pipeline has entered when this event is emitted, if the
    /// event marks a state change.
    pub fn resulting_state(&self) -> Option<PipelineState> {
        match self {
            EventKind::JobStart => Some(PipelineState::Init),
            EventKind::ParseStart => Some(PipelineState::ParsingGeometry),
            EventKind::ParseFinish { .. } => Some(PipelineState::GeometryReady),
            EventKind::TransferStart => Some(PipelineState::TransferringData),
            EventKind::TransferFinish { .. } => Some(PipelineState::DataReady),
            EventKind::ComputeStart => Some(PipelineState::Computing),
            EventKind::ComputeFinish { .. } => Some(PipelineState::ComputationDone),
            EventKind::JobFinish { .. } => Some(PipelineState::Idle),
            EventKind::Exception { .. } => Some(PipelineState::Exception),
            EventKind::ComputeProgress { .. } | EventKind::Info(_) => None,
        }
    }
}

/// Immutable record broadcast to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub run_id: UID,
    pub kind: EventKind,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl ProgressEvent {
    pub fn new(run_id: UID, kind: EventKind) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            run_id,
            kind,
            timestamp_ms,
        }
    }

    pub fn message(&self) -> String {
        self.kind.message()
    }

    pub fn to_json(&self) -> Value {
        let mut value = json!({
            "type": self.kind.name(),
            "message": self.message(),
            "timestamp": self.timestamp_ms,
            "run_id": self.run_id.as_str(),
        });
        match &self.kind {
            EventKind::ComputeProgress { current, total } => {
                value["current_job"] = json!(current);
                value["num_jobs"] = json!(total);
            }
            EventKind::ComputeFinish { result, .. } => {
                value["result"] = json!(result);
            }
            EventKind::Exception { kind, .. } => {
                value["error"] = json!(kind.to_string());
            }
            _ => {}
        }
        value
    }
}

const TIME_UNITS: [(&str, u128); 7] = [
    ("nanoseconds", 1),
    ("microseconds", 1_000),
    ("milliseconds", 1_000_000),
    ("seconds", 1_000_000_000),
    ("minutes", 60 * 1_000_000_000),
    ("hours", 3_600 * 1_000_000_000),
    ("days", 86_400 * 1_000_000_000),
];

/// Renders a duration in the finest unit whose truncated value is at most 9999,
/// e.g. `"1500 milliseconds."`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let nanos = elapsed.as_nanos();
    for (name, scale) in TIME_UNITS {
        let value = nanos / scale;
        if value <= 9999 {
            return format!("{value} {name}.");
        }
    }
    format!("{} days.", nanos / TIME_UNITS[6].1)
}

/// `current / total` as a percentage with at most two decimals, e.g. `"42.5%"`.
pub fn format_percent(current: usize, total: usize) -> String {
    if total == 0 {
        return "100%".to_string();
    }
    let percent = 100.0 * current as f64 / total as f64;
    let text = format!("{percent:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text}%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeometryError;

    #[test]
    fn test_format_elapsed_picks_reasonable_unit() {
        assert_eq!(format_elapsed(Duration::from_nanos(250)), "250 nanoseconds.");
        assert_eq!(format_elapsed(Duration::from_nanos(9999)), "9999 nanoseconds.");
        assert_eq!(format_elapsed(Duration::from_nanos(10_000)), "10 microseconds.");
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1500 milliseconds.");
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42 seconds.");
        assert_eq!(format_elapsed(Duration::from_secs(10_000)), "166 minutes.");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(17, 40), "42.5%");
        assert_eq!(format_percent(1, 3), "33.33%");
        assert_eq!(format_percent(4, 4), "100%");
        assert_eq!(format_percent(0, 0), "100%");
    }

    #[test]
    fn test_messages() {
        assert_eq!(EventKind::JobStart.message(), "Initializing...");
        assert_eq!(
            EventKind::ComputeProgress {
                current: 17,
                total: 40
            }
            .message(),
            "Computation is 42.5% complete (17/40)."
        );
        assert_eq!(
            EventKind::JobFinish {
                elapsed: Duration::from_millis(12)
            }
            .message(),
            "All operations completed in: 12 milliseconds."
        );
        let finish = EventKind::ComputeFinish {
            elapsed: Duration::from_secs(3),
            result: 0.25,
        };
        assert_eq!(finish.message(), "Computation finished in: 3 seconds.\nResult: 0.25");
    }

    #[test]
    fn test_progress_json() {
        let run_id = UID::from("run-1");
        let event = ProgressEvent::new(
            run_id,
            EventKind::ComputeProgress {
                current: 2,
                total: 8,
            },
        );
        let json = event.to_json();
        assert_eq!(json["type"], "ComputeProgress");
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["current_job"], 2);
        assert_eq!(json["num_jobs"], 8);
        assert_eq!(json["timestamp"], event.timestamp_ms);
        assert!(event.timestamp_ms > 0);
    }

    #[test]
    fn test_exception_event_carries_error() {
        let error: Error = GeometryError::UnsupportedSource("ftp://x".to_string()).into();
        let event = ProgressEvent::new(UID::new(), EventKind::exception(&error));
        assert_eq!(event.message(), "unsupported mesh source: ftp://x");
        assert_eq!(event.to_json()["error"], "GeometryError");
        assert_eq!(event.kind.resulting_state(), Some(PipelineState::Exception));
    }
}

//! Search lifecycle telemetry.
//!
//! The coordinator reports one `Started` event per executed search followed by
//! exactly one terminal event (`Completed`, `Failed` or `Cancelled`).

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::{classify::ErrorKind, search::SearchMethod};

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryKind {
    Started {
        radius_km: f64,
    },
    Completed {
        method: SearchMethod,
        count: usize,
        elapsed: Duration,
    },
    Failed {
        kind: ErrorKind,
    },
    Cancelled,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub search_id: u64,
    pub at: DateTime<Utc>,
    pub kind: TelemetryKind,
}

impl TelemetryEvent {
    pub fn new(search_id: u64, kind: TelemetryKind) -> Self {
        Self {
            search_id,
            at: Utc::now(),
            kind,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.kind, TelemetryKind::Started { .. })
    }
}

/// Sink for search lifecycle events.
pub trait TelemetryLogger: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Emits every event as a `tracing` event on the `geoseek::telemetry` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetryLogger for TracingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        let TelemetryEvent { search_id, at, kind } = event;
        match kind {
            TelemetryKind::Started { radius_km } => {
                info!(target: "geoseek::telemetry", search_id, %at, radius_km, "search started");
            }
            TelemetryKind::Completed {
                method,
                count,
                elapsed,
            } => {
                info!(
                    target: "geoseek::telemetry",
                    search_id,
                    %at,
                    %method,
                    count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "search completed"
                );
            }
            TelemetryKind::Failed { kind } => {
                warn!(target: "geoseek::telemetry", search_id, %at, %kind, "search failed");
            }
            TelemetryKind::Cancelled => {
                info!(target: "geoseek::telemetry", search_id, %at, "search cancelled");
            }
        }
    }
}

/// Keeps events in memory for later inspection.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Events recorded for one search, in order.
    pub fn events_for(&self, search_id: u64) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.search_id == search_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TelemetryLogger for MemoryTelemetry {
    fn record(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_telemetry_groups_by_search() {
        let telemetry = MemoryTelemetry::new();
        telemetry.record(TelemetryEvent::new(1, TelemetryKind::Started { radius_km: 5.0 }));
        telemetry.record(TelemetryEvent::new(2, TelemetryKind::Started { radius_km: 2.0 }));
        telemetry.record(TelemetryEvent::new(
            1,
            TelemetryKind::Failed {
                kind: ErrorKind::Timeout,
            },
        ));

        let first = telemetry.events_for(1);
        assert_eq!(first.len(), 2);
        assert!(!first[0].is_terminal());
        assert!(first[1].is_terminal());
        assert!(first[0].at <= first[1].at);
        assert_eq!(telemetry.events().len(), 3);

        telemetry.clear();
        assert!(telemetry.events().is_empty());
    }

    #[test]
    fn test_tracing_telemetry_accepts_all_events() {
        let telemetry = TracingTelemetry;
        for kind in [
            TelemetryKind::Started { radius_km: 1.0 },
            TelemetryKind::Completed {
                method: SearchMethod::Spatial,
                count: 3,
                elapsed: Duration::from_millis(12),
            },
            TelemetryKind::Failed {
                kind: ErrorKind::Network,
            },
            TelemetryKind::Cancelled,
        ] {
            telemetry.record(TelemetryEvent::new(7, kind));
        }
    }
}

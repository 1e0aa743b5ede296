// Structured trace of extraction decisions
//
// Extraction code records what it tried and what it kept here instead of
// printing. Each event is also forwarded to `tracing` at debug level.
use serde::{Deserialize, Serialize};

use crate::types::{OcrTrigger, UnitType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    /// Marks the start of a page; later events belong to it
    PageStarted { page: usize },
    StrategyFailed { strategy: String, error: String },
    CandidateMeasured { strategy: String, chars: usize },
    MethodSelected { strategy: String, chars: usize },
    OcrTriggered { trigger: OcrTrigger },
    OcrProfile { profile: String, chars: usize, kept: bool },
    OcrProfileFailed { profile: String, error: String },
    OcrMerged { chars: usize, combined: bool },
    LocatorStrategy { strategy: String, found: usize },
    LastResortScan { coverage: f64, added: usize },
    FieldResolved { unit: String, field: String, strategy: String },
    CompletionFilled { unit: String, field: String },
    DatesSwapped { unit: String, first: String, second: String },
    StatusInferred { unit: String, status: UnitType },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    events: Vec<TraceEvent>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: TraceEvent) {
        tracing::debug!(?event, "extraction trace");
        self.events.push(event);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Strategy names that resolved `field` for `unit`, in order.
    pub fn resolutions_for(&self, unit: &str, field: &str) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::FieldResolved {
                    unit: u,
                    field: f,
                    strategy,
                } if u == unit && f == field => Some(strategy.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolutions_filter_by_unit_and_field() {
        let mut diag = Diagnostics::new();
        diag.record(TraceEvent::FieldResolved {
            unit: "105".into(),
            field: "rent".into(),
            strategy: "keyword_currency".into(),
        });
        diag.record(TraceEvent::FieldResolved {
            unit: "106".into(),
            field: "rent".into(),
            strategy: "table_row".into(),
        });
        assert_eq!(diag.resolutions_for("105", "rent"), vec!["keyword_currency"]);
        assert_eq!(diag.len(), 2);
    }

    #[test]
    fn test_events_serialize_with_tag() {
        let event = TraceEvent::OcrTriggered {
            trigger: OcrTrigger::Scanned,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"ocr_triggered","trigger":"Scanned"}"#);
    }
}

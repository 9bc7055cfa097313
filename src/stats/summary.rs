//! Aggregated view of the stats log.
//!
//! The log is the source of truth; the summary is rebuilt from it on every
//! read.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::{StatsEvent, StatsEventType};

/// Aggregates over every event in the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatsSummary {
    /// Events processed.
    pub events: usize,
    /// Earliest event timestamp.
    pub first_event: Option<DateTime<Utc>>,
    /// Latest event timestamp.
    pub last_event: Option<DateTime<Utc>>,
    /// Detection passes.
    pub detections: u32,
    /// Detections that took the template path.
    pub template_hits: u32,
    /// Accepted decisions by origin.
    pub decisions_by_origin: BTreeMap<String, u32>,
    /// Decisions flagged for manual review.
    pub manual_review: u32,
    /// AI attempts.
    pub attempts: u32,
    /// AI attempts that were rejected, timed out or failed.
    pub failed_attempts: u32,
    /// Failure reason codes and how often they occurred.
    pub failure_reasons: BTreeMap<String, u32>,
    /// Checkpoint reports.
    pub reports: u32,
    /// Reports with at least one critical failure.
    pub reports_with_critical: u32,
    /// Critical checkpoint failures by checkpoint name.
    pub critical_by_checkpoint: BTreeMap<String, u32>,
}

impl StatsSummary {
    /// Build a summary from events.
    pub fn from_events(events: &[StatsEvent]) -> Self {
        let mut summary = Self::default();
        for event in events {
            summary.process_event(event);
        }
        summary
    }

    fn process_event(&mut self, event: &StatsEvent) {
        self.events += 1;
        if self.first_event.map(|t| event.ts < t).unwrap_or(true) {
            self.first_event = Some(event.ts);
        }
        if self.last_event.map(|t| event.ts > t).unwrap_or(true) {
            self.last_event = Some(event.ts);
        }

        match &event.data {
            StatsEventType::Detection { use_template, .. } => {
                self.detections += 1;
                if *use_template {
                    self.template_hits += 1;
                }
            }
            StatsEventType::Attempt {
                accepted, reason, ..
            } => {
                self.attempts += 1;
                if !accepted {
                    self.failed_attempts += 1;
                    let reason = reason.clone().unwrap_or_else(|| "unknown".to_string());
                    *self.failure_reasons.entry(reason).or_insert(0) += 1;
                }
            }
            StatsEventType::Decision {
                origin,
                requires_manual_review,
                ..
            } => {
                *self
                    .decisions_by_origin
                    .entry(origin.as_str().to_string())
                    .or_insert(0) += 1;
                if *requires_manual_review {
                    self.manual_review += 1;
                }
            }
            StatsEventType::CheckpointReport {
                critical_failures, ..
            } => {
                self.reports += 1;
                if !critical_failures.is_empty() {
                    self.reports_with_critical += 1;
                }
                for name in critical_failures {
                    *self.critical_by_checkpoint.entry(name.clone()).or_insert(0) += 1;
                }
            }
        }
    }

    /// Total accepted decisions.
    pub fn decisions(&self) -> u32 {
        self.decisions_by_origin.values().sum()
    }

    /// Share of attempts that were accepted, 0.0 with no attempts.
    pub fn attempt_success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        (self.attempts - self.failed_attempts) as f64 / self.attempts as f64
    }

    /// Share of decisions produced by the fallback paths.
    pub fn fallback_rate(&self) -> f64 {
        let total = self.decisions();
        if total == 0 {
            return 0.0;
        }
        let fallback = self.decisions_by_origin.get("fallback").copied().unwrap_or(0)
            + self
                .decisions_by_origin
                .get("emergency_fallback")
                .copied()
                .unwrap_or(0);
        fallback as f64 / total as f64
    }

    /// Most frequent failure reason.
    pub fn top_failure_reason(&self) -> Option<(&str, u32)> {
        self.failure_reasons
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::Origin;
    use crate::providers::ai::PromptVariant;

    fn at(minute: u32, data: StatsEventType) -> StatsEvent {
        let ts = DateTime::parse_from_rfc3339(&format!("2026-02-01T10:{:02}:00Z", minute))
            .unwrap()
            .with_timezone(&Utc);
        StatsEvent::with_timestamp(data, ts)
    }

    fn attempt(accepted: bool, reason: Option<&str>) -> StatsEventType {
        StatsEventType::Attempt {
            attempt: 1,
            variant: PromptVariant::Base,
            accepted,
            reason: reason.map(String::from),
            elapsed_ms: 5,
        }
    }

    fn decision(origin: Origin, review: bool) -> StatsEventType {
        StatsEventType::Decision {
            origin,
            content_type: "notes".to_string(),
            target_path: "docs/a.md".to_string(),
            confidence: 0.5,
            attempts: 0,
            requires_manual_review: review,
        }
    }

    #[test]
    fn test_empty_summary() {
        let summary = StatsSummary::from_events(&[]);
        assert_eq!(summary.events, 0);
        assert_eq!(summary.decisions(), 0);
        assert_eq!(summary.attempt_success_rate(), 0.0);
        assert_eq!(summary.fallback_rate(), 0.0);
        assert!(summary.top_failure_reason().is_none());
    }

    #[test]
    fn test_counts_by_kind() {
        let events = vec![
            at(
                1,
                StatsEventType::Detection {
                    content_type: "coding_development".to_string(),
                    confidence: 0.9,
                    use_template: true,
                    session_id: None,
                },
            ),
            at(2, attempt(false, Some("malformed_json"))),
            at(3, attempt(false, Some("malformed_json"))),
            at(4, attempt(true, None)),
            at(5, decision(Origin::Ai, false)),
            at(6, decision(Origin::Fallback, false)),
            at(7, decision(Origin::EmergencyFallback, true)),
            at(
                8,
                StatsEventType::CheckpointReport {
                    target_path: "docs/a.md".to_string(),
                    passed: 3,
                    failed: 1,
                    warnings: 0,
                    critical_failures: vec!["front_matter".to_string()],
                },
            ),
        ];

        let summary = StatsSummary::from_events(&events);
        assert_eq!(summary.events, 8);
        assert_eq!(summary.template_hits, 1);
        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.failed_attempts, 2);
        assert_eq!(summary.top_failure_reason(), Some(("malformed_json", 2)));
        assert_eq!(summary.decisions(), 3);
        assert_eq!(summary.manual_review, 1);
        assert!((summary.fallback_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.reports_with_critical, 1);
        assert_eq!(summary.critical_by_checkpoint["front_matter"], 1);
        assert!(summary.first_event < summary.last_event);
    }
}

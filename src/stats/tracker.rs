//! Stats event types and JSONL log writer for Shelve.
//!
//! Every decision cycle leaves a trail in an append-only JSONL file
//! (`.shelve/stats.log`): the detection, each AI attempt, the accepted
//! decision and the checkpoint report.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::ExecutionReport;
use crate::core::decision::{Decision, Origin};
use crate::core::detect::Detection;
use crate::error::{Result, ShelveError};
use crate::providers::ai::{AttemptRecord, PromptVariant};

/// Schema version for stats events.
///
/// Increment when the event schema changes in a breaking way.
pub const STATS_SCHEMA_VERSION: u8 = 1;

/// A stats event that is written to the JSONL log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsEvent {
    /// Schema version for forward compatibility.
    pub v: u8,
    /// Timestamp of the event.
    pub ts: DateTime<Utc>,
    /// The event type and its data.
    #[serde(flatten)]
    pub data: StatsEventType,
}

impl StatsEvent {
    /// Create a new stats event with the current timestamp.
    pub fn new(data: StatsEventType) -> Self {
        Self {
            v: STATS_SCHEMA_VERSION,
            ts: Utc::now(),
            data,
        }
    }

    /// Create a stats event with a specific timestamp (for testing).
    pub fn with_timestamp(data: StatsEventType, ts: DateTime<Utc>) -> Self {
        Self {
            v: STATS_SCHEMA_VERSION,
            ts,
            data,
        }
    }
}

/// The type of stats event and its associated data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatsEventType {
    /// The type detector scored a content unit.
    Detection {
        content_type: String,
        confidence: f64,
        use_template: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// One AI generation attempt finished.
    Attempt {
        attempt: u32,
        variant: PromptVariant,
        accepted: bool,
        /// Failure reason code, absent when accepted.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        elapsed_ms: u64,
    },

    /// A decision was accepted.
    Decision {
        origin: Origin,
        content_type: String,
        target_path: String,
        confidence: f64,
        /// AI attempts spent on this decision.
        attempts: u32,
        requires_manual_review: bool,
    },

    /// Checkpoints ran against an executed decision.
    CheckpointReport {
        target_path: String,
        passed: u32,
        failed: u32,
        warnings: u32,
        /// Names of the critical checkpoints that failed.
        critical_failures: Vec<String>,
    },
}

impl StatsEventType {
    /// Create a detection event.
    pub fn detection(detection: &Detection, session_id: Option<String>) -> Self {
        Self::Detection {
            content_type: detection.content_type.clone(),
            confidence: detection.confidence,
            use_template: detection.use_template,
            session_id,
        }
    }

    /// Create an attempt event.
    pub fn attempt(record: &AttemptRecord) -> Self {
        Self::Attempt {
            attempt: record.attempt,
            variant: record.variant,
            accepted: record.is_accepted(),
            reason: record.outcome.reason(),
            elapsed_ms: record.elapsed_ms,
        }
    }

    /// Create a decision event.
    pub fn decision(decision: &Decision, attempts: u32) -> Self {
        Self::Decision {
            origin: decision.origin,
            content_type: decision.content_type.clone(),
            target_path: decision.target_path(),
            confidence: decision.confidence,
            attempts,
            requires_manual_review: decision.requires_manual_review,
        }
    }

    /// Create a checkpoint report event.
    pub fn checkpoint_report(target_path: impl Into<String>, report: &ExecutionReport) -> Self {
        Self::CheckpointReport {
            target_path: target_path.into(),
            passed: report.passed as u32,
            failed: report.failed as u32,
            warnings: report.warnings as u32,
            critical_failures: report
                .critical_failures
                .iter()
                .map(|r| r.name.clone())
                .collect(),
        }
    }

    /// Get the event name as a string.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Detection { .. } => "detection",
            Self::Attempt { .. } => "attempt",
            Self::Decision { .. } => "decision",
            Self::CheckpointReport { .. } => "checkpoint_report",
        }
    }
}

/// JSONL log writer for stats events.
///
/// Appends events to `.shelve/stats.log` in JSONL format.
#[derive(Debug, Clone)]
pub struct StatsLogger {
    /// Path to the stats log file.
    path: PathBuf,
}

impl StatsLogger {
    /// Create a new stats logger with the given path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Append an event to the log.
    pub fn append(&self, event: &StatsEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ShelveError::storage(parent, e))?;
        }

        let json = serde_json::to_string(event)
            .map_err(|e| ShelveError::serde(format!("Failed to serialize stats event: {}", e)))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ShelveError::storage(&self.path, e))?;

        writeln!(file, "{}", json).map_err(|e| ShelveError::storage(&self.path, e))?;

        Ok(())
    }

    /// Append a detection event.
    pub fn append_detection(&self, detection: &Detection, session_id: Option<String>) -> Result<()> {
        self.append(&StatsEvent::new(StatsEventType::detection(
            detection, session_id,
        )))
    }

    /// Append one event per attempt.
    pub fn append_attempts(&self, attempts: &[AttemptRecord]) -> Result<()> {
        for record in attempts {
            self.append(&StatsEvent::new(StatsEventType::attempt(record)))?;
        }
        Ok(())
    }

    /// Append a decision event.
    pub fn append_decision(&self, decision: &Decision, attempts: u32) -> Result<()> {
        self.append(&StatsEvent::new(StatsEventType::decision(decision, attempts)))
    }

    /// Append a checkpoint report event.
    pub fn append_report(&self, target_path: &str, report: &ExecutionReport) -> Result<()> {
        self.append(&StatsEvent::new(StatsEventType::checkpoint_report(
            target_path,
            report,
        )))
    }

    /// Read all events from the log.
    pub fn read_all(&self) -> Result<Vec<StatsEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| ShelveError::storage(&self.path, e))?;

        let mut events = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let event: StatsEvent = serde_json::from_str(line).map_err(|e| {
                ShelveError::serde(format!(
                    "Failed to parse stats event on line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;
            events.push(event);
        }

        Ok(events)
    }

    /// Count the number of events in the log.
    pub fn count(&self) -> Result<usize> {
        if !self.path.exists() {
            return Ok(0);
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| ShelveError::storage(&self.path, e))?;

        Ok(content.lines().filter(|l| !l.trim().is_empty()).count())
    }

    /// Get the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

//! Stats command for Shelve.
//!
//! Summarises the project's stats log.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::project_stats_log_path;
use crate::stats::{StatsLogger, StatsSummary};

/// Options for the stats command.
#[derive(Debug, Clone, Default)]
pub struct StatsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Show per-reason and per-checkpoint breakdowns.
    pub detailed: bool,
}

/// Output format for the stats command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsOutput {
    /// Whether the log could be read.
    pub success: bool,
    pub summary: StatsSummary,
    pub attempt_success_rate: f64,
    pub fallback_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatsOutput {
    /// Create a successful output.
    pub fn success(summary: StatsSummary) -> Self {
        Self {
            success: true,
            attempt_success_rate: summary.attempt_success_rate(),
            fallback_rate: summary.fallback_rate(),
            summary,
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: StatsSummary::default(),
            attempt_success_rate: 0.0,
            fallback_rate: 0.0,
            error: Some(error.into()),
        }
    }
}

/// The stats command implementation.
pub struct StatsCommand {
    log_path: PathBuf,
}

impl StatsCommand {
    /// Create a stats command for a project directory.
    pub fn new(project_path: impl AsRef<Path>) -> Self {
        Self {
            log_path: project_stats_log_path(project_path.as_ref()),
        }
    }

    /// Run the stats command.
    pub fn run(&self) -> StatsOutput {
        match StatsLogger::new(&self.log_path).read_all() {
            Ok(events) => StatsOutput::success(StatsSummary::from_events(&events)),
            Err(e) => StatsOutput::failure(e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &StatsOutput, options: &StatsOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output, options)
        }
    }

    fn format_human_readable(&self, output: &StatsOutput, options: &StatsOptions) -> String {
        if !output.success {
            return format!(
                "Stats failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let s = &output.summary;
        if s.events == 0 {
            return "No stats recorded yet.".to_string();
        }

        let mut lines = vec!["=== Shelve Stats ===\n".to_string()];

        lines.push("Decisions".to_string());
        let by_origin: Vec<String> = s
            .decisions_by_origin
            .iter()
            .map(|(origin, n)| format!("{}: {}", origin, n))
            .collect();
        lines.push(format!("   Total: {} ({})", s.decisions(), by_origin.join(" | ")));
        lines.push(format!(
            "   Template hits: {}/{} detections",
            s.template_hits, s.detections
        ));
        lines.push(format!(
            "   Fallback rate: {:.1}% | Manual review: {}\n",
            output.fallback_rate * 100.0,
            s.manual_review
        ));

        lines.push("AI attempts".to_string());
        lines.push(format!(
            "   Total: {} | Failed: {} | Success rate: {:.1}%",
            s.attempts,
            s.failed_attempts,
            output.attempt_success_rate * 100.0
        ));
        if let Some((reason, count)) = s.top_failure_reason() {
            lines.push(format!("   Top failure: {} ({})", reason, count));
        }
        lines.push(String::new());

        lines.push("Checkpoints".to_string());
        lines.push(format!(
            "   Reports: {} | With critical failures: {}",
            s.reports, s.reports_with_critical
        ));

        if options.detailed {
            if !s.failure_reasons.is_empty() {
                lines.push("\nFailure reasons".to_string());
                for (reason, count) in &s.failure_reasons {
                    lines.push(format!("   {}: {}", reason, count));
                }
            }
            if !s.critical_by_checkpoint.is_empty() {
                lines.push("\nCritical failures by checkpoint".to_string());
                for (name, count) in &s.critical_by_checkpoint {
                    lines.push(format!("   {}: {}", name, count));
                }
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::tests::sample_decision;
    use crate::core::decision::Origin;
    use crate::providers::fallback::emergency_decision;
    use chrono::Utc;
    use std::fs;
    use tempfile::TempDir;

    fn setup_with_stats() -> TempDir {
        let temp = TempDir::new().unwrap();
        let logger = StatsLogger::new(project_stats_log_path(temp.path()));
        logger.append_decision(&sample_decision(), 2).unwrap();
        let mut fallback = sample_decision();
        fallback.origin = Origin::Fallback;
        logger.append_decision(&fallback, 3).unwrap();
        logger.append_decision(&emergency_decision(Utc::now()), 0).unwrap();
        temp
    }

    #[test]
    fn test_stats_basic() {
        let temp = setup_with_stats();
        let output = StatsCommand::new(temp.path()).run();

        assert!(output.success);
        assert_eq!(output.summary.decisions(), 3);
        assert_eq!(output.summary.manual_review, 1);
        assert!((output.fallback_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stats_empty_log() {
        let temp = TempDir::new().unwrap();
        let cmd = StatsCommand::new(temp.path());
        let output = cmd.run();

        assert!(output.success);
        assert_eq!(output.summary.events, 0);
        assert_eq!(
            cmd.format_output(&output, &StatsOptions::default()),
            "No stats recorded yet."
        );
    }

    #[test]
    fn test_stats_unreadable_log() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(project_stats_log_path(temp.path())).unwrap();

        let cmd = StatsCommand::new(temp.path());
        let output = cmd.run();
        assert!(!output.success);
        assert!(cmd
            .format_output(&output, &StatsOptions::default())
            .starts_with("Stats failed"));
    }

    #[test]
    fn test_format_output_json() {
        let temp = setup_with_stats();
        let cmd = StatsCommand::new(temp.path());
        let output = cmd.run();

        let json = cmd.format_output(
            &output,
            &StatsOptions {
                json: true,
                ..Default::default()
            },
        );
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["summary"]["decisions_by_origin"]["fallback"], 1);
    }

    #[test]
    fn test_format_output_quiet() {
        let temp = setup_with_stats();
        let cmd = StatsCommand::new(temp.path());
        let output = cmd.run();
        let options = StatsOptions {
            quiet: true,
            ..Default::default()
        };
        assert!(cmd.format_output(&output, &options).is_empty());
    }

    #[test]
    fn test_format_output_human_readable() {
        let temp = setup_with_stats();
        let cmd = StatsCommand::new(temp.path());
        let output = cmd.run();

        let text = cmd.format_output(&output, &StatsOptions::default());
        assert!(text.contains("=== Shelve Stats ==="));
        assert!(text.contains("Total: 3"));
        assert!(text.contains("emergency_fallback: 1"));
    }
}

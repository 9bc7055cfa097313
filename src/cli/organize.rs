//! Organize command for Shelve.
//!
//! Detect, decide, execute against a vault, then run checkpoints.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointContext, CheckpointRunner, ExecutionReport};
use crate::cli::{build_unit, load_registries};
use crate::config::{project_stats_log_path, Config};
use crate::core::decision::Decision;
use crate::core::engine::OrganizationEngine;
use crate::core::template::TemplateRegistry;
use crate::error::FailOpen;
use crate::providers::command::CommandGenerator;
use crate::providers::traits::Generator;
use crate::stats::StatsLogger;
use crate::vault::{ExecutionOutcome, Executor, FsVault, MemoryVault};

/// Options for the organize command.
#[derive(Debug, Clone, Default)]
pub struct OrganizeOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Decide and check against an in-memory vault; touch nothing on disk.
    pub dry_run: bool,
    /// Vault root; defaults to the project directory.
    pub vault: Option<PathBuf>,
}

/// What to organize.
#[derive(Debug, Clone, Default)]
pub struct OrganizeInput {
    pub content: String,
    pub filename: Option<String>,
    pub context: Vec<(String, String)>,
}

/// Output format for the organize command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeOutput {
    /// No critical checkpoint failed.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ExecutionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ExecutionReport>,
    /// AI attempts made.
    pub attempts: usize,
    /// Fallback or emergency placement; a human should look.
    pub needs_review: bool,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrganizeOutput {
    fn failure(error: impl Into<String>, dry_run: bool) -> Self {
        Self {
            success: false,
            decision: None,
            outcome: None,
            report: None,
            attempts: 0,
            needs_review: false,
            dry_run,
            error: Some(error.into()),
        }
    }
}

/// The organize command implementation.
pub struct OrganizeCommand {
    engine: OrganizationEngine,
    runner: CheckpointRunner,
    stats: StatsLogger,
    project_path: PathBuf,
}

impl OrganizeCommand {
    /// Create a command for a project, using its registry and stats log.
    pub fn new(config: Config, project_path: impl AsRef<Path>) -> Self {
        let project_path = project_path.as_ref().to_path_buf();
        let (templates, runner) = load_registries(&config, &project_path);
        let generator = config
            .ai
            .command
            .clone()
            .map(|cmd| Arc::new(CommandGenerator::new(cmd)) as Arc<dyn Generator>);
        Self::with_parts(config, project_path, templates, runner, generator)
    }

    /// Create a command from explicit parts.
    pub fn with_parts(
        config: Config,
        project_path: impl AsRef<Path>,
        templates: Arc<TemplateRegistry>,
        runner: CheckpointRunner,
        generator: Option<Arc<dyn Generator>>,
    ) -> Self {
        let project_path = project_path.as_ref().to_path_buf();
        let stats = StatsLogger::new(project_stats_log_path(&project_path));
        let engine = OrganizationEngine::new(templates, config, generator).with_stats(stats.clone());
        Self {
            engine,
            runner,
            stats,
            project_path,
        }
    }

    /// Run the organize command.
    pub fn run(&self, input: &OrganizeInput, options: &OrganizeOptions) -> OrganizeOutput {
        let unit = build_unit(input.content.clone(), input.filename.clone(), &input.context);
        let organized = self.engine.organize(&unit);
        let decision = organized.decision.clone();

        let vault: Box<dyn Executor> = if options.dry_run {
            Box::new(MemoryVault::new())
        } else {
            let root = options
                .vault
                .clone()
                .unwrap_or_else(|| self.project_path.clone());
            match FsVault::open(root) {
                Ok(vault) => Box::new(vault),
                Err(e) => return OrganizeOutput::failure(e.to_string(), options.dry_run),
            }
        };

        let outcome = vault.execute(&decision, &input.content);
        let ctx = CheckpointContext::from_vault(decision.clone(), outcome.clone(), vault.as_ref())
            .fail_open_with(
                "failed to read vault for checkpoints",
                CheckpointContext::new(decision.clone(), outcome.clone()),
            )
            .with_required_files(organized.required_files.clone());

        let report = self.runner.run(&ctx);
        if !options.dry_run {
            self.stats
                .append_report(&outcome.file_path, &report)
                .fail_open_default("failed to log checkpoint report");
        }

        OrganizeOutput {
            success: report.is_success(),
            needs_review: organized.needs_review(),
            attempts: organized.attempts.len(),
            decision: Some(decision),
            outcome: Some(outcome),
            report: Some(report),
            dry_run: options.dry_run,
            error: None,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &OrganizeOutput, options: &OrganizeOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &OrganizeOutput) -> String {
        let (Some(decision), Some(outcome)) = (&output.decision, &output.outcome) else {
            return format!(
                "Organize failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        };

        let mut lines = Vec::new();
        let verb = if output.dry_run { "Would place" } else { "Placed" };
        if outcome.success {
            lines.push(format!("{} {}", verb, outcome.file_path));
        } else {
            lines.push(format!(
                "Failed to place {}: {}",
                outcome.file_path,
                outcome.error.as_deref().unwrap_or("unknown error")
            ));
        }
        lines.push(format!(
            "  type: {} | origin: {} | confidence: {:.2} | attempts: {}",
            decision.content_type, decision.origin, decision.confidence, output.attempts
        ));
        if !outcome.folders_created.is_empty() {
            lines.push(format!("  created: {}", outcome.folders_created.join(", ")));
        }
        if output.needs_review {
            lines.push("  review suggested: placed without a template or AI decision".to_string());
        }

        if let Some(report) = &output.report {
            lines.push(format!(
                "Checkpoints: {} passed, {} failed ({} warnings), {} skipped",
                report.passed, report.failed, report.warnings, report.skipped
            ));
            for result in report.results.iter().filter(|r| !r.passed) {
                let level = if result.critical { "CRITICAL" } else { "warning" };
                lines.push(format!("  [{}] {}: {}", level, result.name, result.message));
                for detail in &result.details {
                    lines.push(format!("      {}", detail));
                }
            }
        }

        lines.join("\n")
    }
}

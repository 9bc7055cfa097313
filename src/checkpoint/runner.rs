//! Ordered checkpoint execution.
//!
//! The runner owns the checkpoint list. Mutation needs `&mut self` and a
//! run needs `&self`, so the list cannot change while a run is in flight.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::checkpoint::traits::{Checkpoint, CheckpointContext, CheckpointMeta, CheckpointResult};
use crate::error::{Result, ShelveError};
use crate::registry::CheckpointSettings;

/// Name of the synthetic result reported for a failed execution.
pub const EXECUTION_CHECK: &str = "execution";

/// Results of one run, in execution order, with aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub results: Vec<CheckpointResult>,
    pub passed: usize,
    pub failed: usize,
    /// Non-critical failures.
    pub warnings: usize,
    pub critical_failures: Vec<CheckpointResult>,
    /// Enabled checkpoints that never ran because of a critical stop.
    pub skipped: usize,
}

impl ExecutionReport {
    /// Aggregate a list of results.
    pub fn from_results(results: Vec<CheckpointResult>, skipped: usize) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = results.len() - passed;
        let warnings = results.iter().filter(|r| !r.passed && !r.critical).count();
        let critical_failures = results
            .iter()
            .filter(|r| r.is_critical_failure())
            .cloned()
            .collect();
        Self {
            results,
            passed,
            failed,
            warnings,
            critical_failures,
            skipped,
        }
    }

    /// No critical failures.
    pub fn is_success(&self) -> bool {
        self.critical_failures.is_empty()
    }

    /// Names of the results, in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.name.as_str()).collect()
    }
}

struct Registered {
    checkpoint: Arc<dyn Checkpoint>,
    meta: CheckpointMeta,
}

/// Runs registered checkpoints in ascending order.
pub struct CheckpointRunner {
    checkpoints: Vec<Registered>,
    stop_on_critical_failure: bool,
}

impl std::fmt::Debug for CheckpointRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointRunner")
            .field(
                "checkpoints",
                &self
                    .checkpoints
                    .iter()
                    .map(|r| (r.checkpoint.name().to_string(), r.meta))
                    .collect::<Vec<_>>(),
            )
            .field("stop_on_critical_failure", &self.stop_on_critical_failure)
            .finish()
    }
}

impl CheckpointRunner {
    pub fn new(stop_on_critical_failure: bool) -> Self {
        Self {
            checkpoints: Vec::new(),
            stop_on_critical_failure,
        }
    }

    pub fn stop_on_critical_failure(&self) -> bool {
        self.stop_on_critical_failure
    }

    pub fn set_stop_on_critical_failure(&mut self, stop: bool) {
        self.stop_on_critical_failure = stop;
    }

    /// Register with the checkpoint's default metadata.
    pub fn register(&mut self, checkpoint: Arc<dyn Checkpoint>) -> Result<()> {
        let meta = checkpoint.default_meta();
        self.register_with(checkpoint, meta)
    }

    /// Register with explicit metadata. Names must be unique.
    pub fn register_with(&mut self, checkpoint: Arc<dyn Checkpoint>, meta: CheckpointMeta) -> Result<()> {
        if self.get_meta(checkpoint.name()).is_some() {
            return Err(ShelveError::registry(format!(
                "checkpoint '{}' already registered",
                checkpoint.name()
            )));
        }
        self.checkpoints.push(Registered { checkpoint, meta });
        Ok(())
    }

    /// Remove a checkpoint; returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.checkpoints.len();
        self.checkpoints.retain(|r| r.checkpoint.name() != name);
        self.checkpoints.len() != before
    }

    /// Change the order of a checkpoint.
    pub fn reorder(&mut self, name: &str, order: i32) -> Result<()> {
        self.meta_mut(name)?.order = order;
        Ok(())
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        self.meta_mut(name)?.enabled = enabled;
        Ok(())
    }

    pub fn set_critical(&mut self, name: &str, critical: bool) -> Result<()> {
        self.meta_mut(name)?.critical = critical;
        Ok(())
    }

    /// Apply persisted overrides. Unknown names are logged and skipped.
    pub fn apply_settings(&mut self, settings: &[CheckpointSettings]) {
        for setting in settings {
            match self.meta_mut(&setting.name) {
                Ok(meta) => {
                    if let Some(enabled) = setting.enabled {
                        meta.enabled = enabled;
                    }
                    if let Some(critical) = setting.critical {
                        meta.critical = critical;
                    }
                    if let Some(order) = setting.order {
                        meta.order = order;
                    }
                }
                Err(_) => tracing::warn!(
                    "ignoring settings for unknown checkpoint '{}'",
                    setting.name
                ),
            }
        }
    }

    pub fn get_meta(&self, name: &str) -> Option<CheckpointMeta> {
        self.checkpoints
            .iter()
            .find(|r| r.checkpoint.name() == name)
            .map(|r| r.meta)
    }

    fn meta_mut(&mut self, name: &str) -> Result<&mut CheckpointMeta> {
        self.checkpoints
            .iter_mut()
            .find(|r| r.checkpoint.name() == name)
            .map(|r| &mut r.meta)
            .ok_or_else(|| ShelveError::registry(format!("unknown checkpoint '{}'", name)))
    }

    /// Registered names with metadata, in execution order.
    pub fn list(&self) -> Vec<(String, CheckpointMeta)> {
        self.ordered()
            .into_iter()
            .map(|r| (r.checkpoint.name().to_string(), r.meta))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Registered checkpoints sorted by order; ties keep registration order.
    fn ordered(&self) -> Vec<&Registered> {
        let mut ordered: Vec<&Registered> = self.checkpoints.iter().collect();
        ordered.sort_by_key(|r| r.meta.order);
        ordered
    }

    /// Run every enabled checkpoint against `ctx`.
    pub fn run(&self, ctx: &CheckpointContext) -> ExecutionReport {
        let enabled: Vec<&Registered> = self
            .ordered()
            .into_iter()
            .filter(|r| r.meta.enabled)
            .collect();
        let mut results = Vec::with_capacity(enabled.len() + 1);

        if !ctx.outcome.success {
            let error = ctx
                .outcome
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            tracing::warn!("execution failed for {}: {}", ctx.outcome.file_path, error);
            results.push(
                CheckpointResult::fail(EXECUTION_CHECK, "decision was not applied", true)
                    .with_details(vec![error]),
            );
            if self.stop_on_critical_failure {
                return ExecutionReport::from_results(results, enabled.len());
            }
        }

        for (i, registered) in enabled.iter().enumerate() {
            let result = run_one(registered, ctx);

            if !result.passed {
                tracing::warn!(
                    "checkpoint '{}' failed ({}): {}",
                    result.name,
                    if result.critical { "critical" } else { "warning" },
                    result.message
                );
            } else {
                tracing::debug!("checkpoint '{}' passed", result.name);
            }

            let stop = result.is_critical_failure() && self.stop_on_critical_failure;
            results.push(result);
            if stop {
                return ExecutionReport::from_results(results, enabled.len() - i - 1);
            }
        }

        ExecutionReport::from_results(results, 0)
    }
}

/// Run one checkpoint, turning errors and panics into critical failures.
fn run_one(registered: &Registered, ctx: &CheckpointContext) -> CheckpointResult {
    let name = registered.checkpoint.name().to_string();
    let outcome = catch_unwind(AssertUnwindSafe(|| registered.checkpoint.validate(ctx)));

    match outcome {
        Ok(Ok(mut result)) => {
            result.name = name;
            result.critical = registered.meta.critical;
            result
        }
        Ok(Err(e)) => {
            let err = ShelveError::checkpoint_execution(&name, e.to_string());
            CheckpointResult::fail(name, "checkpoint raised an error", true)
                .with_details(vec![err.to_string()])
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            let err = ShelveError::checkpoint_execution(&name, message);
            CheckpointResult::fail(name, "checkpoint panicked", true)
                .with_details(vec![err.to_string()])
        }
    }
}

//! Organization engine for Shelve.
//!
//! One decision cycle per content unit, driven as an explicit state machine:
//!
//! ```text
//! Start → Detecting → TemplateApplying ─┐
//!                   └→ AiProposing ─────┴→ Validating → Accepted → End
//!                        ↑      │
//!                    Retrying ←─┘ (bounded) → FallingBack → Accepted
//! ```
//!
//! The AI provider owns the retry loop; the engine records a `Retrying`
//! transition for every rejected attempt that is followed by another and
//! falls back when the provider reports `MaxRetriesExceeded`.
//!
//! Every path ends in `Accepted`; nothing below the engine escapes
//! `organize()`. Decisions are plain values until a vault executes them,
//! so cancelling between states leaves nothing behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::core::content::{keys, ContentUnit};
use crate::core::decision::{Decision, Origin};
use crate::core::detect::Detection;
use crate::core::schema::ResponseValidator;
use crate::core::template::{Template, TemplateContext, TemplateRegistry};
use crate::error::{FailOpen, ShelveError};
use crate::providers::ai::{AiDecisionProvider, AttemptRecord};
use crate::providers::fallback::{emergency_decision, FallbackProvider};
use crate::providers::traits::Generator;
use crate::stats::StatsLogger;

/// States of one decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Start,
    Detecting,
    TemplateApplying,
    AiProposing,
    Validating,
    Retrying,
    FallingBack,
    Accepted,
    End,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Detecting => "detecting",
            Self::TemplateApplying => "template_applying",
            Self::AiProposing => "ai_proposing",
            Self::Validating => "validating",
            Self::Retrying => "retrying",
            Self::FallingBack => "falling_back",
            Self::Accepted => "accepted",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cooperative cancellation flag shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The accepted decision and how the engine got there.
#[derive(Debug, Clone)]
pub struct Organized {
    pub decision: Decision,
    pub detection: Detection,
    /// Every AI attempt, in order.
    pub attempts: Vec<AttemptRecord>,
    /// States visited, in order.
    pub transitions: Vec<EngineState>,
    /// Template that produced the decision, when one did.
    pub template: Option<Arc<Template>>,
    /// Vault paths the template requires alongside the placed file.
    pub required_files: Vec<String>,
}

impl Organized {
    pub fn origin(&self) -> Origin {
        self.decision.origin
    }

    /// Whether a human should look at the result.
    pub fn needs_review(&self) -> bool {
        self.decision.requires_manual_review || self.decision.origin.suggests_review()
    }
}

/// Mutable bookkeeping for one cycle.
struct Cycle {
    transitions: Vec<EngineState>,
    detection: Option<Detection>,
    candidate: Option<Decision>,
    attempts: Vec<AttemptRecord>,
    template: Option<Arc<Template>>,
    required_files: Vec<String>,
}

impl Cycle {
    fn new() -> Self {
        Self {
            transitions: Vec::new(),
            detection: None,
            candidate: None,
            attempts: Vec::new(),
            template: None,
            required_files: Vec::new(),
        }
    }
}

/// Hybrid organization engine.
///
/// The template registry is injected; engines never share hidden state.
pub struct OrganizationEngine {
    templates: Arc<TemplateRegistry>,
    config: Config,
    validator: ResponseValidator,
    ai: Option<AiDecisionProvider>,
    fallback: FallbackProvider,
    stats: Option<StatsLogger>,
}

impl OrganizationEngine {
    /// Create an engine. Without a generator the AI path is skipped.
    pub fn new(
        templates: Arc<TemplateRegistry>,
        config: Config,
        generator: Option<Arc<dyn Generator>>,
    ) -> Self {
        let validator = ResponseValidator::from_config(&config);
        let ai = generator
            .map(|g| AiDecisionProvider::new(g, validator.clone(), config.ai.clone()));
        let fallback = FallbackProvider::new(validator.rules());
        Self {
            templates,
            config,
            validator,
            ai,
            fallback,
            stats: None,
        }
    }

    /// Log detections, attempts and decisions to a stats file.
    pub fn with_stats(mut self, stats: StatsLogger) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn validator(&self) -> &ResponseValidator {
        &self.validator
    }

    pub fn has_ai(&self) -> bool {
        self.ai.is_some()
    }

    /// Detect the content type against the current registry.
    pub fn detect(&self, unit: &ContentUnit) -> Detection {
        self.templates
            .detector(self.config.detection.template_threshold)
            .detect(unit)
    }

    /// Organize a unit. Always returns an accepted decision.
    pub fn organize(&self, unit: &ContentUnit) -> Organized {
        match self.organize_cancellable(unit, &CancelToken::new()) {
            Some(organized) => organized,
            // Unreachable: a fresh token is never cancelled.
            None => self.emergency(unit),
        }
    }

    /// Organize a unit, returning `None` if `cancel` fires between states.
    pub fn organize_cancellable(&self, unit: &ContentUnit, cancel: &CancelToken) -> Option<Organized> {
        let mut cycle = Cycle::new();
        let mut state = EngineState::Start;

        loop {
            if cancel.is_cancelled() {
                tracing::info!("decision cycle cancelled in state {}", state);
                return None;
            }
            cycle.transitions.push(state);

            let next = match state {
                EngineState::Start => EngineState::Detecting,
                EngineState::Detecting => self.step_detect(unit, &mut cycle),
                EngineState::TemplateApplying => self.step_template(unit, &mut cycle),
                EngineState::AiProposing | EngineState::Retrying => {
                    match self.step_ai(unit, &mut cycle, cancel) {
                        Some(next) => next,
                        None => {
                            tracing::info!("decision cycle cancelled while proposing");
                            return None;
                        }
                    }
                }
                EngineState::Validating => self.step_validate(&mut cycle),
                EngineState::FallingBack => self.step_fallback(unit, &mut cycle),
                EngineState::Accepted => EngineState::End,
                EngineState::End => break,
            };
            tracing::debug!("{} -> {}", state, next);
            state = next;
        }

        let decision = match cycle.candidate.take() {
            Some(decision) => decision,
            None => emergency_decision(Utc::now()),
        };
        let detection = cycle
            .detection
            .take()
            .unwrap_or_else(|| self.detect(unit));

        tracing::info!(
            "accepted {} decision: {}",
            decision.origin,
            decision.target_path()
        );
        if let Some(stats) = &self.stats {
            stats
                .append_decision(&decision, cycle.attempts.len() as u32)
                .fail_open_default("failed to log decision");
        }

        Some(Organized {
            decision,
            detection,
            attempts: cycle.attempts,
            transitions: cycle.transitions,
            template: cycle.template,
            required_files: cycle.required_files,
        })
    }

    fn after_template_failure(&self) -> EngineState {
        if self.ai.is_some() {
            EngineState::AiProposing
        } else {
            EngineState::FallingBack
        }
    }

    fn step_detect(&self, unit: &ContentUnit, cycle: &mut Cycle) -> EngineState {
        let detection = self.detect(unit);
        tracing::debug!(
            "detected {} ({:.2}, template: {})",
            detection.content_type,
            detection.confidence,
            detection.use_template
        );
        if let Some(stats) = &self.stats {
            stats
                .append_detection(&detection, unit.context_value(keys::SESSION_ID).map(String::from))
                .fail_open_default("failed to log detection");
        }

        let next = if detection.use_template && self.templates.get(&detection.content_type).is_some() {
            EngineState::TemplateApplying
        } else {
            self.after_template_failure()
        };
        cycle.detection = Some(detection);
        next
    }

    fn step_template(&self, unit: &ContentUnit, cycle: &mut Cycle) -> EngineState {
        let Some(detection) = &cycle.detection else {
            return self.after_template_failure();
        };
        let Some(template) = self.templates.get(&detection.content_type) else {
            return self.after_template_failure();
        };

        let ctx = TemplateContext::from_unit(
            unit,
            detection.confidence,
            self.config.validation.promotion_threshold,
        );
        let applied = template
            .apply(&ctx)
            .and_then(|decision| Ok((decision, template.required_paths(&ctx)?)));

        match applied {
            Ok((decision, required_files)) => {
                cycle.candidate = Some(decision);
                cycle.required_files = required_files;
                cycle.template = Some(template);
                EngineState::Validating
            }
            Err(e) => {
                tracing::warn!("template '{}' not applicable: {}", template.name, e);
                self.after_template_failure()
            }
        }
    }

    /// Run the provider's bounded attempt loop. `None` means cancelled.
    fn step_ai(&self, unit: &ContentUnit, cycle: &mut Cycle, cancel: &CancelToken) -> Option<EngineState> {
        let Some(ai) = &self.ai else {
            return Some(EngineState::FallingBack);
        };

        let max_attempts = ai.max_attempts();
        let transitions = &mut cycle.transitions;
        let result = ai.propose_until(
            unit,
            || cancel.is_cancelled(),
            |record| {
                if let Some(stats) = &self.stats {
                    stats
                        .append_attempts(std::slice::from_ref(record))
                        .fail_open_default("failed to log attempt");
                }
                if !record.is_accepted() && record.attempt < max_attempts {
                    transitions.push(EngineState::Retrying);
                    transitions.push(EngineState::AiProposing);
                }
            },
        );

        match result {
            Ok(proposal) => {
                cycle.attempts = proposal.attempts;
                cycle.candidate = Some(proposal.decision);
                Some(EngineState::Validating)
            }
            Err(ShelveError::MaxRetriesExceeded { attempts }) => {
                tracing::warn!(
                    "AI path exhausted after {} attempts, falling back",
                    attempts.len()
                );
                cycle.attempts = attempts;
                Some(EngineState::FallingBack)
            }
            Err(ShelveError::Cancelled) => None,
            Err(e) => {
                tracing::warn!("AI path failed: {}, falling back", e);
                Some(EngineState::FallingBack)
            }
        }
    }

    fn step_validate(&self, cycle: &mut Cycle) -> EngineState {
        let Some(candidate) = cycle.candidate.take() else {
            return EngineState::FallingBack;
        };

        match self.validator.validate_decision(&candidate) {
            Ok(decision) => {
                cycle.candidate = Some(decision);
                EngineState::Accepted
            }
            Err(e) => {
                tracing::warn!("{} decision rejected: {}", candidate.origin, e);
                match candidate.origin {
                    Origin::Template => {
                        cycle.template = None;
                        cycle.required_files.clear();
                        self.after_template_failure()
                    }
                    _ => EngineState::FallingBack,
                }
            }
        }
    }

    fn step_fallback(&self, unit: &ContentUnit, cycle: &mut Cycle) -> EngineState {
        let decision = self.fallback.build_safe_decision(unit);
        let decision = match self.validator.validate_decision(&decision) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!("fallback decision rejected ({}), using emergency storage", e);
                emergency_decision(Utc::now())
            }
        };
        cycle.candidate = Some(decision);
        EngineState::Accepted
    }

    fn emergency(&self, unit: &ContentUnit) -> Organized {
        Organized {
            decision: emergency_decision(Utc::now()),
            detection: self.detect(unit),
            attempts: Vec::new(),
            transitions: vec![EngineState::FallingBack, EngineState::Accepted, EngineState::End],
            template: None,
            required_files: Vec::new(),
        }
    }
}

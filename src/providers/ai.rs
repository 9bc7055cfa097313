//! AI decision provider.
//!
//! Asks the generation capability for a decision, validates the answer and,
//! on rejection, escalates through prompt variants:
//!
//! 1. **Base**: the schema, the rules and the content.
//! 2. **WorkedExample**: adds a complete valid answer to imitate.
//! 3. **Simplified**: asks for three fields only; the provider expands them.
//! 4. **StepByStep**: reason first, then `FINAL ANSWER:` and the JSON.
//!
//! `max_retries` is the total number of attempts. Timeouts and transport
//! errors consume an attempt like any rejection.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::traits::{GenerationError, GenerationRequest, Generator};
use crate::config::AiConfig;
use crate::core::content::ContentUnit;
use crate::core::decision::{Decision, Origin, RelationshipType};
use crate::core::schema::{ResponseValidator, SimplifiedAnswer, FINAL_ANSWER_MARKER};
use crate::error::{Result, ShelveError};

/// Content longer than this is truncated in prompts.
const MAX_PROMPT_CONTENT_CHARS: usize = 4000;

/// Confidence assigned to expanded simplified answers (before the floor).
const SIMPLIFIED_CONFIDENCE: f64 = 0.5;

/// Prompt strategy used for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptVariant {
    Base,
    WorkedExample,
    Simplified,
    StepByStep,
}

impl PromptVariant {
    /// Variant for a 1-based attempt number.
    pub fn for_attempt(attempt: u32) -> Self {
        match attempt {
            0 | 1 => Self::Base,
            2 => Self::WorkedExample,
            3 => Self::Simplified,
            _ => Self::StepByStep,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::WorkedExample => "worked_example",
            Self::Simplified => "simplified",
            Self::StepByStep => "step_by_step",
        }
    }
}

impl std::fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one generation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The answer passed validation.
    Accepted,
    /// The answer failed validation with a reason code.
    Rejected { reason: String, message: String },
    /// The call exceeded the timeout.
    Timeout,
    /// The capability failed without producing text.
    GenerationFailed { message: String },
}

impl AttemptOutcome {
    /// Machine-readable failure reason, `None` when accepted.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Accepted => None,
            Self::Rejected { reason, .. } => Some(reason.clone()),
            Self::Timeout => Some("timeout".to_string()),
            Self::GenerationFailed { .. } => Some("generation_failed".to_string()),
        }
    }
}

/// Record of one attempt, kept for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    pub variant: PromptVariant,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

impl AttemptRecord {
    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Accepted)
    }
}

/// An accepted AI decision and the attempts it took.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub decision: Decision,
    pub attempts: Vec<AttemptRecord>,
}

/// Wraps a generation capability with validation and prompt refinement.
pub struct AiDecisionProvider {
    generator: Arc<dyn Generator>,
    validator: ResponseValidator,
    config: AiConfig,
}

impl AiDecisionProvider {
    pub fn new(generator: Arc<dyn Generator>, validator: ResponseValidator, config: AiConfig) -> Self {
        Self {
            generator,
            validator,
            config,
        }
    }

    /// Name of the underlying generator.
    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Total attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.max(1)
    }

    /// Propose a decision for `unit`.
    ///
    /// Fails with `MaxRetriesExceeded` after exactly `max_attempts()` rejected
    /// attempts.
    pub fn propose(&self, unit: &ContentUnit) -> Result<Proposal> {
        self.propose_until(unit, || false, |_| {})
    }

    /// Propose a decision, checking `cancelled` before every attempt and
    /// handing each attempt record to `on_attempt` as soon as it is made.
    ///
    /// Returns `Cancelled` when the check fires; attempts made so far are
    /// discarded.
    pub fn propose_until(
        &self,
        unit: &ContentUnit,
        cancelled: impl Fn() -> bool,
        mut on_attempt: impl FnMut(&AttemptRecord),
    ) -> Result<Proposal> {
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        for n in 1..=self.max_attempts() {
            if cancelled() {
                return Err(ShelveError::Cancelled);
            }

            let previous = attempts.last().and_then(|a| a.outcome.reason());
            let (decision, record) = self.attempt(unit, n, previous.as_deref());
            on_attempt(&record);

            match decision {
                Some(decision) => {
                    tracing::info!(
                        "AI attempt {} ({}) accepted in {} ms",
                        n,
                        record.variant,
                        record.elapsed_ms
                    );
                    attempts.push(record);
                    return Ok(Proposal { decision, attempts });
                }
                None => {
                    tracing::warn!(
                        "AI attempt {}/{} ({}) rejected: {}",
                        n,
                        self.max_attempts(),
                        record.variant,
                        record.outcome.reason().unwrap_or_default()
                    );
                    attempts.push(record);
                }
            }
        }

        Err(ShelveError::MaxRetriesExceeded { attempts })
    }

    /// Run a single attempt with the variant for attempt number `n`.
    pub fn attempt(
        &self,
        unit: &ContentUnit,
        n: u32,
        previous_failure: Option<&str>,
    ) -> (Option<Decision>, AttemptRecord) {
        let variant = PromptVariant::for_attempt(n);
        let prompt = self.build_prompt(variant, unit, previous_failure);
        let request = GenerationRequest::new(prompt, &self.config);

        let started = Instant::now();
        let response = self.generator.generate(&request);
        let elapsed = started.elapsed();

        let (decision, outcome) = match response {
            Err(GenerationError::Timeout(_)) => (None, AttemptOutcome::Timeout),
            Err(e) => (
                None,
                AttemptOutcome::GenerationFailed {
                    message: e.to_string(),
                },
            ),
            // A late answer is as good as none.
            Ok(_) if elapsed > request.timeout => (None, AttemptOutcome::Timeout),
            Ok(text) => match self.validate_response(variant, &text) {
                Ok(decision) => (Some(decision), AttemptOutcome::Accepted),
                Err(e) => (
                    None,
                    AttemptOutcome::Rejected {
                        reason: e.code.to_string(),
                        message: e.message,
                    },
                ),
            },
        };

        let record = AttemptRecord {
            attempt: n,
            variant,
            outcome,
            elapsed_ms: elapsed.as_millis() as u64,
        };
        (decision, record)
    }

    fn validate_response(
        &self,
        variant: PromptVariant,
        text: &str,
    ) -> std::result::Result<Decision, crate::core::schema::ValidationError> {
        match variant {
            PromptVariant::Simplified => {
                let answer = self.validator.validate_simplified(text)?;
                let value = self.expand_simplified(&answer);
                self.validator.validate_value(&value, Origin::Ai)
            }
            _ => self.validator.validate(text, Origin::Ai),
        }
    }

    /// Turn a three-field answer into a full decision payload.
    ///
    /// The folder plan follows the path segments, each nested in the one
    /// before it.
    pub fn expand_simplified(&self, answer: &SimplifiedAnswer) -> serde_json::Value {
        let mut parent: Option<&str> = None;
        let mut plan = Vec::new();
        for segment in answer.folder_path.trim_matches('/').split('/') {
            let mut folder = json!({
                "name": segment,
                "description": format!("{} content", answer.content_type),
                "purpose": format!("Holds {} files", answer.content_type),
            });
            if let Some(p) = parent {
                folder["parent"] = json!(p);
            }
            plan.push(folder);
            parent = Some(segment);
        }

        let confidence = SIMPLIFIED_CONFIDENCE.max(self.validator.rules().confidence_floor);
        json!({
            "contentType": answer.content_type,
            "confidence": confidence,
            "folderPlan": plan,
            "filePlacement": {
                "filename": answer.filename,
                "folderPath": answer.folder_path,
                "contentType": answer.content_type,
                "reasoning": "Placement from a simplified answer",
            },
            "crossReferences": [],
            "reasoning": format!(
                "Simplified proposal: {} content filed under {}",
                answer.content_type, answer.folder_path
            ),
        })
    }

    /// Build the prompt for a variant.
    pub fn build_prompt(
        &self,
        variant: PromptVariant,
        unit: &ContentUnit,
        previous_failure: Option<&str>,
    ) -> String {
        let rules = self.validator.rules();
        let mut prompt = String::new();

        prompt.push_str("# CONTENT ORGANIZATION REQUEST\n\n");
        prompt.push_str("Decide where this content should be filed in the knowledge vault.\n\n");

        if let Some(reason) = previous_failure {
            prompt.push_str(&format!(
                "Your previous answer was rejected ({}). Follow the format exactly.\n\n",
                reason
            ));
        }

        prompt.push_str("## Content\n\n");
        if let Some(name) = &unit.filename_hint {
            prompt.push_str(&format!("**Filename**: {}\n", name));
        }
        for (key, value) in &unit.context {
            prompt.push_str(&format!("**{}**: {}\n", key, value));
        }
        prompt.push_str("\n```\n");
        let content: String = unit.content.chars().take(MAX_PROMPT_CONTENT_CHARS).collect();
        prompt.push_str(&content);
        if unit.content.chars().count() > MAX_PROMPT_CONTENT_CHARS {
            prompt.push_str("\n[... truncated]");
        }
        prompt.push_str("\n```\n\n");

        if variant == PromptVariant::Simplified {
            prompt.push_str("## Required Response Format\n\n");
            prompt.push_str("Answer with exactly these three fields and nothing else:\n\n");
            prompt.push_str("```json\n");
            prompt.push_str("{\n");
            prompt.push_str("  \"contentType\": \"<short type name>\",\n");
            prompt.push_str("  \"folderPath\": \"<folder/subfolder>\",\n");
            prompt.push_str("  \"filename\": \"<name.ext>\"\n");
            prompt.push_str("}\n");
            prompt.push_str("```\n");
            return prompt;
        }

        prompt.push_str("## Rules\n\n");
        prompt.push_str(&format!(
            "- confidence must be between {:.2} and 1.0\n",
            rules.confidence_floor
        ));
        prompt.push_str("- folder names are single path segments without / \\ : * ? \" < > |\n");
        prompt.push_str("- folder names in folderPlan are unique; parent must name another planned folder\n");
        prompt.push_str(&format!(
            "- the first segment of folderPath is a planned folder or one of: {}\n",
            rules.always_allowed_folders.join(", ")
        ));
        prompt.push_str(&format!(
            "- filename has an extension and at most {} characters\n",
            rules.max_filename_length
        ));
        prompt.push_str(&format!(
            "- at most {} crossReferences; relationshipType is one of: {}\n",
            rules.max_cross_references,
            RelationshipType::ALL.join(", ")
        ));
        prompt.push_str(&format!(
            "- projectName is set exactly when shouldPromote is true, and then confidence >= {:.2}\n",
            rules.promotion_threshold
        ));
        prompt.push_str(&format!(
            "- reasoning has at least {} characters\n",
            rules.min_reasoning_length
        ));
        prompt.push_str("- no fields other than those below\n\n");

        prompt.push_str("## Required Response Format\n\n");
        prompt.push_str("```json\n");
        prompt.push_str("{\n");
        prompt.push_str("  \"contentType\": \"<short type name>\",\n");
        prompt.push_str("  \"confidence\": 0.0-1.0,\n");
        prompt.push_str("  \"folderPlan\": [\n");
        prompt.push_str("    {\"name\": \"<folder>\", \"description\": \"<text>\", \"purpose\": \"<text>\", \"parent\": \"<folder or omit>\"}\n");
        prompt.push_str("  ],\n");
        prompt.push_str("  \"filePlacement\": {\"filename\": \"<name.ext>\", \"folderPath\": \"<folder/subfolder>\", \"contentType\": \"<type>\", \"reasoning\": \"<text>\"},\n");
        prompt.push_str("  \"crossReferences\": [\n");
        prompt.push_str("    {\"targetFile\": \"<path>\", \"relationshipType\": \"<type>\", \"reasoning\": \"<text>\"}\n");
        prompt.push_str("  ],\n");
        prompt.push_str("  \"promotionSuggestion\": {\"shouldPromote\": false, \"projectName\": null, \"confidence\": 0.0-1.0, \"reasoning\": \"<text>\"},\n");
        prompt.push_str("  \"reasoning\": \"<why this placement>\"\n");
        prompt.push_str("}\n");
        prompt.push_str("```\n");

        match variant {
            PromptVariant::WorkedExample => {
                prompt.push_str("\n## Example\n\n");
                prompt.push_str("For a Python snippet named `retry.py` about HTTP retries:\n\n");
                prompt.push_str("```json\n");
                prompt.push_str(WORKED_EXAMPLE);
                prompt.push_str("\n```\n");
            }
            PromptVariant::StepByStep => {
                prompt.push_str("\n## Method\n\n");
                prompt.push_str("1. Say what kind of content this is\n");
                prompt.push_str("2. Pick the folders it belongs in\n");
                prompt.push_str("3. Check every rule above against your choice\n");
                prompt.push_str(&format!(
                    "4. Write `{}` followed by the JSON object only\n",
                    FINAL_ANSWER_MARKER
                ));
            }
            _ => {}
        }

        prompt
    }
}

/// A complete, valid answer shown to the model on the second attempt.
pub const WORKED_EXAMPLE: &str = r#"{
  "contentType": "code",
  "confidence": 0.85,
  "folderPlan": [
    {"name": "code", "description": "Source snippets", "purpose": "Reusable code"},
    {"name": "http", "description": "HTTP helpers", "purpose": "Networking code", "parent": "code"}
  ],
  "filePlacement": {"filename": "retry.py", "folderPath": "code/http", "contentType": "code", "reasoning": "HTTP retry helper"},
  "crossReferences": [
    {"targetFile": "docs/http-client.md", "relationshipType": "implements", "reasoning": "Implements the documented retry policy"}
  ],
  "reasoning": "A reusable HTTP helper belongs with other networking code"
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ValidationRules;
    use crate::providers::scripted::{ScriptedGenerator, ScriptedReply};
    use std::time::Duration;

    fn provider(generator: Arc<ScriptedGenerator>, max_retries: u32) -> AiDecisionProvider {
        let config = AiConfig {
            max_retries,
            ..AiConfig::default()
        };
        AiDecisionProvider::new(generator, ResponseValidator::default(), config)
    }

    fn unit() -> ContentUnit {
        ContentUnit::new("def retry(): ...").with_filename("retry.py")
    }

    #[test]
    fn test_variant_escalation() {
        assert_eq!(PromptVariant::for_attempt(1), PromptVariant::Base);
        assert_eq!(PromptVariant::for_attempt(2), PromptVariant::WorkedExample);
        assert_eq!(PromptVariant::for_attempt(3), PromptVariant::Simplified);
        assert_eq!(PromptVariant::for_attempt(4), PromptVariant::StepByStep);
        assert_eq!(PromptVariant::for_attempt(9), PromptVariant::StepByStep);
    }

    #[test]
    fn test_worked_example_is_valid() {
        let decision = ResponseValidator::default()
            .validate(WORKED_EXAMPLE, Origin::Ai)
            .unwrap();
        assert_eq!(decision.target_path(), "code/http/retry.py");
    }

    #[test]
    fn test_first_attempt_accepted() {
        let generator = Arc::new(ScriptedGenerator::always(WORKED_EXAMPLE));
        let proposal = provider(generator.clone(), 3).propose(&unit()).unwrap();

        assert_eq!(proposal.decision.origin, Origin::Ai);
        assert_eq!(proposal.attempts.len(), 1);
        assert!(proposal.attempts[0].is_accepted());
        assert_eq!(generator.call_count(), 1);
    }

    #[test]
    fn test_always_malformed_exhausts_exactly_max_retries() {
        let generator = Arc::new(ScriptedGenerator::always("no json here"));
        let err = provider(generator.clone(), 3).propose(&unit()).unwrap_err();

        match err {
            ShelveError::MaxRetriesExceeded { attempts } => {
                assert_eq!(attempts.len(), 3);
                let variants: Vec<_> = attempts.iter().map(|a| a.variant).collect();
                assert_eq!(
                    variants,
                    vec![
                        PromptVariant::Base,
                        PromptVariant::WorkedExample,
                        PromptVariant::Simplified
                    ]
                );
                assert_eq!(attempts[0].outcome.reason().as_deref(), Some("malformed_json"));
            }
            other => panic!("expected MaxRetriesExceeded, got {:?}", other),
        }
        assert_eq!(generator.call_count(), 3);
    }

    #[test]
    fn test_retry_prompt_mentions_previous_failure() {
        let generator = Arc::new(ScriptedGenerator::sequence(["garbage", WORKED_EXAMPLE]));
        let proposal = provider(generator.clone(), 3).propose(&unit()).unwrap();

        assert_eq!(proposal.attempts.len(), 2);
        let prompts = generator.prompts();
        assert!(!prompts[0].contains("previous answer"));
        assert!(prompts[1].contains("malformed_json"));
        assert!(prompts[1].contains("## Example"));
    }

    #[test]
    fn test_simplified_answer_is_expanded() {
        let simple = r#"{"contentType": "code", "folderPath": "code/http", "filename": "retry.py"}"#;
        let generator = Arc::new(ScriptedGenerator::sequence(["x", "y", simple]));
        let proposal = provider(generator, 3).propose(&unit()).unwrap();

        let decision = proposal.decision;
        assert_eq!(proposal.attempts.len(), 3);
        assert_eq!(decision.target_path(), "code/http/retry.py");
        assert_eq!(decision.planned_paths(), vec!["code", "code/http"]);
        assert!((decision.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_simplified_confidence_respects_floor() {
        let rules = ValidationRules {
            confidence_floor: 0.6,
            ..ValidationRules::default()
        };
        let provider = AiDecisionProvider::new(
            Arc::new(ScriptedGenerator::new(vec![])),
            ResponseValidator::new(rules),
            AiConfig::default(),
        );
        let value = provider.expand_simplified(&SimplifiedAnswer {
            content_type: "notes".into(),
            folder_path: "docs".into(),
            filename: "a.md".into(),
        });
        assert_eq!(value["confidence"], json!(0.6));
    }

    #[test]
    fn test_step_by_step_final_answer() {
        let reasoning = format!(
            "This is a Python helper {{not json}}.\n{} {}",
            FINAL_ANSWER_MARKER, WORKED_EXAMPLE
        );
        let generator = Arc::new(ScriptedGenerator::sequence(["a", "b", "c", reasoning.as_str()]));
        let proposal = provider(generator.clone(), 4).propose(&unit()).unwrap();

        assert_eq!(proposal.attempts.last().unwrap().variant, PromptVariant::StepByStep);
        assert!(generator.prompts()[3].contains(FINAL_ANSWER_MARKER));
    }

    #[test]
    fn test_generation_errors_consume_attempts() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            ScriptedReply::Fail(GenerationError::Timeout(10)),
            ScriptedReply::Fail(GenerationError::Transport("reset".into())),
            ScriptedReply::Text(WORKED_EXAMPLE.to_string()),
        ]));
        let proposal = provider(generator, 3).propose(&unit()).unwrap();

        assert_eq!(proposal.attempts[0].outcome, AttemptOutcome::Timeout);
        assert!(matches!(
            proposal.attempts[1].outcome,
            AttemptOutcome::GenerationFailed { .. }
        ));
        assert!(proposal.attempts[2].is_accepted());
    }

    #[test]
    fn test_late_answer_counts_as_timeout() {
        let generator = Arc::new(ScriptedGenerator::new(vec![ScriptedReply::Delayed(
            WORKED_EXAMPLE.to_string(),
            Duration::from_millis(60),
        )]));
        let config = AiConfig {
            max_retries: 1,
            timeout_ms: 10,
            ..AiConfig::default()
        };
        let provider = AiDecisionProvider::new(generator, ResponseValidator::default(), config);

        match provider.propose(&unit()) {
            Err(ShelveError::MaxRetriesExceeded { attempts }) => {
                assert_eq!(attempts[0].outcome, AttemptOutcome::Timeout);
            }
            other => panic!("expected timeout exhaustion, got {:?}", other.map(|p| p.attempts)),
        }
    }

    #[test]
    fn test_cancellation_before_first_attempt() {
        let generator = Arc::new(ScriptedGenerator::always(WORKED_EXAMPLE));
        let result = provider(generator.clone(), 3).propose_until(&unit(), || true, |_| {});

        assert!(matches!(result, Err(ShelveError::Cancelled)));
        assert_eq!(generator.call_count(), 0);
    }

    #[test]
    fn test_attempts_are_reported_as_they_happen() {
        let generator = Arc::new(ScriptedGenerator::sequence(["nope", "still nope", WORKED_EXAMPLE]));
        let mut seen = Vec::new();
        let proposal = provider(generator, 3)
            .propose_until(&unit(), || false, |record| seen.push((record.attempt, record.is_accepted())))
            .unwrap();

        assert_eq!(seen, vec![(1, false), (2, false), (3, true)]);
        assert_eq!(proposal.attempts.len(), 3);
    }

    #[test]
    fn test_prompt_truncates_long_content() {
        let long = ContentUnit::new("x".repeat(MAX_PROMPT_CONTENT_CHARS + 10));
        let prompt = provider(Arc::new(ScriptedGenerator::new(vec![])), 1).build_prompt(
            PromptVariant::Base,
            &long,
            None,
        );
        assert!(prompt.contains("[... truncated]"));
    }
}

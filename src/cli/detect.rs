//! Detect command for Shelve.
//!
//! Scores a file against every registered type pattern.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::core::content::ContentUnit;
use crate::core::template::TemplateRegistry;

/// Options for the detect command.
#[derive(Debug, Clone, Default)]
pub struct DetectOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// One type and its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeScore {
    pub content_type: String,
    pub score: f64,
}

/// Output format for the detect command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectOutput {
    pub content_type: String,
    pub confidence: f64,
    pub use_template: bool,
    pub threshold: f64,
    /// Every type, best first.
    pub scores: Vec<TypeScore>,
}

/// The detect command implementation.
pub struct DetectCommand {
    config: Config,
    templates: Arc<TemplateRegistry>,
}

impl DetectCommand {
    pub fn new(config: Config, templates: Arc<TemplateRegistry>) -> Self {
        Self { config, templates }
    }

    /// Run the detect command.
    pub fn run(&self, unit: &ContentUnit) -> DetectOutput {
        let threshold = self.config.detection.template_threshold;
        let detection = self.templates.detector(threshold).detect(unit);

        let mut scores: Vec<TypeScore> = detection
            .all_scores
            .iter()
            .map(|(content_type, score)| TypeScore {
                content_type: content_type.clone(),
                score: *score,
            })
            .collect();
        scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.content_type.cmp(&b.content_type))
        });

        DetectOutput {
            content_type: detection.content_type,
            confidence: detection.confidence,
            use_template: detection.use_template,
            threshold,
            scores,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &DetectOutput, options: &DetectOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        let mut lines = vec![format!(
            "Detected: {} ({:.2}, threshold {:.2}) -> {}",
            output.content_type,
            output.confidence,
            output.threshold,
            if output.use_template { "template" } else { "ai/fallback" }
        )];
        for score in &output.scores {
            lines.push(format!("  {:<20} {:.3}", score.content_type, score.score));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> DetectCommand {
        DetectCommand::new(Config::default(), Arc::new(TemplateRegistry::with_builtins()))
    }

    #[test]
    fn test_detect_meeting_notes() {
        let unit = ContentUnit::new(
            "# Weekly sync\n## Agenda\n- roadmap\n## Action Items\n- [ ] ship it\nAttendees: ana, bo\nmeeting ended",
        )
        .with_context("topic", "weekly sync meeting");

        let output = command().run(&unit);
        assert_eq!(output.content_type, "meeting_notes");
        assert!(output.use_template);
        assert_eq!(output.scores[0].content_type, "meeting_notes");
        assert_eq!(output.scores.len(), 5);
        assert!(output.scores.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_detect_empty_registry() {
        let cmd = DetectCommand::new(Config::default(), Arc::new(TemplateRegistry::new()));
        let output = cmd.run(&ContentUnit::new("anything"));
        assert_eq!(output.content_type, "unknown");
        assert!(output.scores.is_empty());
    }

    #[test]
    fn test_format_output() {
        let cmd = command();
        let output = cmd.run(&ContentUnit::new("plain"));

        let human = cmd.format_output(&output, &DetectOptions::default());
        assert!(human.starts_with("Detected: "));

        let json = cmd.format_output(
            &output,
            &DetectOptions {
                json: true,
                quiet: false,
            },
        );
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["scores"].as_array().unwrap().len(), 5);

        assert!(cmd
            .format_output(
                &output,
                &DetectOptions {
                    json: false,
                    quiet: true
                }
            )
            .is_empty());
    }
}

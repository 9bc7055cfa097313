//! Validate command for Shelve.
//!
//! Runs a raw model response through the response validator.

use serde::{Deserialize, Serialize};

use crate::core::decision::{Decision, Origin};
use crate::core::schema::ResponseValidator;

/// Options for the validate command.
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the validate command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateOutput {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    /// Machine-readable reason code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The validate command implementation.
pub struct ValidateCommand {
    validator: ResponseValidator,
}

impl ValidateCommand {
    pub fn new(validator: ResponseValidator) -> Self {
        Self { validator }
    }

    /// Run the validate command. Accepted payloads are stamped as AI output.
    pub fn run(&self, raw: &str) -> ValidateOutput {
        match self.validator.validate(raw, Origin::Ai) {
            Ok(decision) => ValidateOutput {
                valid: true,
                decision: Some(decision),
                reason: None,
                message: None,
            },
            Err(e) => ValidateOutput {
                valid: false,
                decision: None,
                reason: Some(e.code.to_string()),
                message: Some(e.message),
            },
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ValidateOutput, options: &ValidateOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        match &output.decision {
            Some(decision) => format!(
                "Valid: {} -> {} (confidence {:.2})",
                decision.content_type,
                decision.target_path(),
                decision.confidence
            ),
            None => format!(
                "Invalid [{}]: {}",
                output.reason.as_deref().unwrap_or("unknown"),
                output.message.as_deref().unwrap_or("")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ai::WORKED_EXAMPLE;

    fn command() -> ValidateCommand {
        ValidateCommand::new(ResponseValidator::default())
    }

    #[test]
    fn test_valid_response() {
        let cmd = command();
        let output = cmd.run(&format!("Here:\n```json\n{}\n```", WORKED_EXAMPLE));
        assert!(output.valid);
        assert_eq!(
            cmd.format_output(&output, &ValidateOptions::default()),
            "Valid: code -> code/http/retry.py (confidence 0.85)"
        );
    }

    #[test]
    fn test_malformed_response() {
        let cmd = command();
        let output = cmd.run("no json at all");
        assert!(!output.valid);
        assert_eq!(output.reason.as_deref(), Some("malformed_json"));
        assert!(cmd
            .format_output(&output, &ValidateOptions::default())
            .starts_with("Invalid [malformed_json]"));
    }

    #[test]
    fn test_low_confidence_rejected() {
        let low = WORKED_EXAMPLE.replace("0.85", "0.1");
        let output = command().run(&low);
        assert!(!output.valid);
        assert!(output.reason.unwrap().starts_with("schema_violation:"));
    }

    #[test]
    fn test_json_output() {
        let cmd = command();
        let output = cmd.run("nope");
        let json = cmd.format_output(
            &output,
            &ValidateOptions {
                json: true,
                quiet: false,
            },
        );
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["valid"], false);
        assert!(value.get("decision").is_none());
    }
}

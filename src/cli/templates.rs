//! Templates command for Shelve.
//!
//! Lists registered templates with their metadata.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::template::{TemplateMetadata, TemplateRegistry};

/// Options for the templates command.
#[derive(Debug, Clone, Default)]
pub struct TemplatesOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// One listed template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub name: String,
    #[serde(flatten)]
    pub metadata: TemplateMetadata,
}

/// Output format for the templates command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesOutput {
    pub templates: Vec<TemplateInfo>,
}

/// The templates command implementation.
pub struct TemplatesCommand {
    templates: Arc<TemplateRegistry>,
}

impl TemplatesCommand {
    pub fn new(templates: Arc<TemplateRegistry>) -> Self {
        Self { templates }
    }

    /// Run the templates command.
    pub fn run(&self) -> TemplatesOutput {
        TemplatesOutput {
            templates: self
                .templates
                .list()
                .into_iter()
                .map(|(name, metadata)| TemplateInfo { name, metadata })
                .collect(),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &TemplatesOutput, options: &TemplatesOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        if output.templates.is_empty() {
            return "No templates registered.".to_string();
        }

        let mut lines = Vec::new();
        for info in &output.templates {
            let m = &info.metadata;
            let mut flags = Vec::new();
            if m.has_workflow {
                flags.push("workflow");
            }
            if !m.has_detection {
                flags.push("no detection");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            lines.push(format!("{} v{}{}", info.name, m.version, flags));
            lines.push(format!(
                "  {} ({} folders, {} required documents)",
                m.description, m.folder_count, m.required_documents
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_builtins_sorted() {
        let cmd = TemplatesCommand::new(Arc::new(TemplateRegistry::with_builtins()));
        let output = cmd.run();

        let names: Vec<&str> = output.templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "coding_development",
                "documentation",
                "meeting_notes",
                "research_analysis",
                "sop_execution"
            ]
        );
        let sop = output.templates.iter().find(|t| t.name == "sop_execution").unwrap();
        assert!(sop.metadata.has_workflow);
    }

    #[test]
    fn test_format_output() {
        let cmd = TemplatesCommand::new(Arc::new(TemplateRegistry::with_builtins()));
        let output = cmd.run();

        let human = cmd.format_output(&output, &TemplatesOptions::default());
        assert!(human.contains("sop_execution v1 [workflow]"));

        let json = cmd.format_output(
            &output,
            &TemplatesOptions {
                json: true,
                quiet: false,
            },
        );
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["templates"][0]["name"], "coding_development");
        assert!(value["templates"][0]["folder_count"].is_number());
    }

    #[test]
    fn test_empty_registry() {
        let cmd = TemplatesCommand::new(Arc::new(TemplateRegistry::new()));
        let output = cmd.run();
        assert_eq!(
            cmd.format_output(&output, &TemplatesOptions::default()),
            "No templates registered."
        );
    }
}

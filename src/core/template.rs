//! Structural templates for recognized content types.
//!
//! A template is a read-only structural definition: folders to create, the
//! documents a finished workspace must contain, and optionally the workflow
//! that owns it. Templates are registered once and never edited in place;
//! callers hold `Arc` snapshots so a template in use cannot change under them.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::core::content::{keys, ContentUnit};
use crate::core::decision::{Decision, FilePlacement, FolderSpec, Origin, PromotionSuggestion};
use crate::core::detect::{TypeDetector, TypePattern};
use crate::error::{Result, ShelveError};
use crate::util::{sanitize_filename, slugify};

/// A folder defined by a template. Name and description may hold placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderDef {
    pub name: String,
    pub description: String,
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl FolderDef {
    fn new(name: &str, description: &str, purpose: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            purpose: purpose.to_string(),
            parent: None,
        }
    }

    fn under(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }
}

/// A document every workspace built from the template must contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredDocument {
    /// Folder (template folder name) the document lives in.
    pub folder: String,
    /// Filename pattern, e.g. `{date}-{task}-plan.md`.
    pub filename_pattern: String,
    /// Reference to the content template used to seed the document.
    pub content_template: String,
}

/// A fixed multi-step procedure that owns the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    /// Steps in execution order.
    pub steps: Vec<WorkflowStep>,
}

/// One step of a workflow and the document it must leave behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    /// Filename pattern of the step's output, relative to the placement folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produces: Option<String>,
}

/// A named, versioned structural definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub description: String,
    /// Folders in creation order.
    pub folders: Vec<FolderDef>,
    /// Template folder the content itself is placed in.
    pub placement_folder: String,
    /// Filename pattern used when the unit carries no filename hint.
    #[serde(default = "default_filename_pattern")]
    pub default_filename: String,
    #[serde(default)]
    pub required_documents: Vec<RequiredDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Workflow>,
    /// Signals that route content to this template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<TypePattern>,
}

fn default_version() -> u32 {
    1
}

fn default_filename_pattern() -> String {
    "{date}-{task}.md".to_string()
}

/// Values substituted into template placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    pub values: BTreeMap<String, String>,
    /// Filename hint from the content unit.
    pub filename: Option<String>,
    /// Detector score for the template's type.
    pub confidence: f64,
    /// Project hint from the content unit.
    pub project: Option<String>,
    /// Promotion bar used when deciding whether to suggest promotion.
    pub promotion_threshold: f64,
}

impl TemplateContext {
    /// Build the substitution context for a content unit.
    ///
    /// `task` falls back to the filename stem, `topic` to `task`, and `date`
    /// to today (UTC). Every other context entry is available verbatim.
    pub fn from_unit(unit: &ContentUnit, confidence: f64, promotion_threshold: f64) -> Self {
        let mut values: BTreeMap<String, String> = unit
            .context
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k.clone(), v.trim().to_string()))
            .collect();

        if !values.contains_key(keys::TASK) {
            if let Some(stem) = unit.filename_stem() {
                values.insert(keys::TASK.to_string(), stem);
            }
        }
        if !values.contains_key(keys::TOPIC) {
            if let Some(task) = values.get(keys::TASK).cloned() {
                values.insert(keys::TOPIC.to_string(), task);
            }
        }
        values
            .entry(keys::DATE.to_string())
            .or_insert_with(|| chrono::Utc::now().format("%Y-%m-%d").to_string());

        Self {
            values,
            filename: unit.filename_hint.clone(),
            confidence,
            project: unit.project_hint().map(String::from),
            promotion_threshold,
        }
    }

    /// Replace every `{key}` in `pattern`.
    ///
    /// Values are slugified so they are safe as path segments.
    pub fn substitute(&self, template: &str, pattern: &str) -> Result<String> {
        let mut out = String::with_capacity(pattern.len());
        let mut rest = pattern;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                // Unterminated brace is literal text.
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let key = &after[..end];
            let value = self
                .values
                .get(key)
                .ok_or_else(|| ShelveError::template_context(template, key))?;
            out.push_str(&slugify(value));
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

impl Template {
    /// Placeholder keys used anywhere in the structure, sorted.
    pub fn placeholders(&self) -> Vec<String> {
        let mut texts: Vec<&str> = vec![&self.default_filename];
        for folder in &self.folders {
            texts.push(&folder.name);
            texts.push(&folder.description);
        }
        for doc in &self.required_documents {
            texts.push(&doc.filename_pattern);
        }

        let mut found: Vec<String> = Vec::new();
        for text in texts {
            let mut rest = text;
            while let Some(start) = rest.find('{') {
                let after = &rest[start + 1..];
                let Some(end) = after.find('}') else { break };
                let key = after[..end].to_string();
                if !found.contains(&key) {
                    found.push(key);
                }
                rest = &after[end + 1..];
            }
        }
        found.sort();
        found
    }

    /// Required document paths (vault-relative) for a context.
    pub fn required_paths(&self, ctx: &TemplateContext) -> Result<Vec<String>> {
        let folder_paths = self.folder_paths(ctx)?;
        let mut paths = Vec::new();

        for doc in &self.required_documents {
            let folder = folder_paths
                .get(&doc.folder)
                .cloned()
                .unwrap_or_else(|| doc.folder.clone());
            let filename = ctx.substitute(&self.name, &doc.filename_pattern)?;
            paths.push(format!("{}/{}", folder, filename));
        }

        if let Some(workflow) = &self.workflow {
            let base = folder_paths
                .get(&self.placement_folder)
                .cloned()
                .unwrap_or_else(|| self.placement_folder.clone());
            for step in &workflow.steps {
                if let Some(pattern) = &step.produces {
                    let filename = ctx.substitute(&self.name, pattern)?;
                    paths.push(format!("{}/{}", base, filename));
                }
            }
        }

        Ok(paths)
    }

    /// Map template folder names to substituted vault-relative paths.
    fn folder_paths(&self, ctx: &TemplateContext) -> Result<BTreeMap<String, String>> {
        let mut resolved: BTreeMap<String, String> = BTreeMap::new();
        for folder in &self.folders {
            let name = ctx.substitute(&self.name, &folder.name)?;
            let path = match folder.parent.as_ref().and_then(|p| resolved.get(p)) {
                Some(parent_path) => format!("{}/{}", parent_path, name),
                None => name,
            };
            resolved.insert(folder.name.clone(), path);
        }
        Ok(resolved)
    }

    /// Build a decision from this template.
    ///
    /// Never calls out to external services. Fails only when a placeholder
    /// has no value in `ctx`.
    pub fn apply(&self, ctx: &TemplateContext) -> Result<Decision> {
        let mut substituted_names: BTreeMap<String, String> = BTreeMap::new();
        let mut folder_plan = Vec::with_capacity(self.folders.len());

        for folder in &self.folders {
            let name = ctx.substitute(&self.name, &folder.name)?;
            let description = ctx.substitute(&self.name, &folder.description)?;
            substituted_names.insert(folder.name.clone(), name.clone());

            let mut spec = FolderSpec::new(name, description, folder.purpose.clone());
            if let Some(parent) = &folder.parent {
                let parent_name = substituted_names
                    .get(parent)
                    .cloned()
                    .unwrap_or_else(|| parent.clone());
                spec = spec.with_parent(parent_name);
            }
            folder_plan.push(spec);
        }

        let folder_path = self
            .folder_paths(ctx)?
            .get(&self.placement_folder)
            .cloned()
            .ok_or_else(|| ShelveError::template_context(&self.name, &self.placement_folder))?;

        let filename = match &ctx.filename {
            Some(hint) => sanitize_filename(hint, usize::MAX),
            None => ctx.substitute(&self.name, &self.default_filename)?,
        };

        let promotion_suggestion = match &ctx.project {
            Some(project) if ctx.confidence >= ctx.promotion_threshold => {
                Some(PromotionSuggestion {
                    should_promote: true,
                    project_name: Some(project.clone()),
                    confidence: ctx.confidence,
                    reasoning: format!(
                        "Content matches the {} structure and names project '{}'",
                        self.name, project
                    ),
                })
            }
            _ => None,
        };

        Ok(Decision {
            content_type: self.name.clone(),
            confidence: ctx.confidence,
            folder_plan,
            file_placement: FilePlacement {
                filename,
                folder_path,
                content_type: self.name.clone(),
                reasoning: format!(
                    "Placed in the '{}' folder of the {} template",
                    self.placement_folder, self.name
                ),
            },
            cross_references: Vec::new(),
            promotion_suggestion,
            reasoning: format!(
                "Detected {} content with confidence {:.2}; applied template '{}' v{}",
                self.name, ctx.confidence, self.name, self.version
            ),
            origin: Origin::Template,
            requires_manual_review: false,
        })
    }
}

/// Summary of a registered template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub version: u32,
    pub description: String,
    pub folder_count: usize,
    pub required_documents: usize,
    pub has_workflow: bool,
    pub has_detection: bool,
}

/// Registry of templates, in registration order.
///
/// Registration takes the write lock, so it is serialized against every
/// other registration and waits for in-flight reads. Registration is
/// create-only.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: RwLock<Vec<Arc<Template>>>,
}

impl TemplateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in templates.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for template in builtin_templates() {
            // Built-in names are distinct.
            let _ = registry.register_template(template);
        }
        registry
    }

    /// Register a template under `name`.
    pub fn register(
        &self,
        name: impl Into<String>,
        mut structure: Template,
        detection: Option<TypePattern>,
    ) -> Result<()> {
        let name = name.into();
        structure.name = name.clone();
        if let Some(mut pattern) = detection {
            pattern.type_name = name;
            structure.detection = Some(pattern);
        }
        self.register_template(structure)
    }

    /// Register a fully built template.
    pub fn register_template(&self, template: Template) -> Result<()> {
        if template
            .folders
            .iter()
            .all(|f| f.name != template.placement_folder)
        {
            return Err(ShelveError::config(format!(
                "template '{}' places content in unknown folder '{}'",
                template.name, template.placement_folder
            )));
        }

        let mut templates = self
            .templates
            .write()
            .map_err(|_| ShelveError::registry("template registry lock poisoned"))?;
        if templates.iter().any(|t| t.name == template.name) {
            return Err(ShelveError::template_exists(&template.name));
        }
        tracing::debug!("registered template '{}' v{}", template.name, template.version);
        templates.push(Arc::new(template));
        Ok(())
    }

    /// Look up a template by name.
    pub fn get(&self, name: &str) -> Option<Arc<Template>> {
        self.templates
            .read()
            .ok()?
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    /// Metadata for every registered template.
    pub fn list(&self) -> BTreeMap<String, TemplateMetadata> {
        let Ok(templates) = self.templates.read() else {
            return BTreeMap::new();
        };
        templates
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    TemplateMetadata {
                        version: t.version,
                        description: t.description.clone(),
                        folder_count: t.folders.len(),
                        required_documents: t.required_documents.len(),
                        has_workflow: t.workflow.is_some(),
                        has_detection: t.detection.is_some(),
                    },
                )
            })
            .collect()
    }

    /// Snapshot of all templates in registration order.
    pub fn templates(&self) -> Vec<Arc<Template>> {
        self.templates
            .read()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Number of registered templates.
    pub fn len(&self) -> usize {
        self.templates.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a detector over the detection patterns, in registration order.
    pub fn detector(&self, threshold: f64) -> TypeDetector {
        let patterns = self
            .templates()
            .iter()
            .filter_map(|t| t.detection.clone())
            .collect();
        TypeDetector::new(patterns, threshold)
    }

    /// Apply the named template.
    pub fn apply_template(&self, name: &str, ctx: &TemplateContext) -> Result<Decision> {
        let template = self
            .get(name)
            .ok_or_else(|| ShelveError::template_not_found(name))?;
        template.apply(ctx)
    }
}

/// Templates shipped with Shelve.
pub fn builtin_templates() -> Vec<Template> {
    vec![
        Template {
            name: "coding_development".to_string(),
            version: 1,
            description: "Feature or bugfix work with code, tests and notes".to_string(),
            folders: vec![
                FolderDef::new("{task}", "Workspace for {task}", "Group all work on one task"),
                FolderDef::new("code", "Source files for {task}", "Working code").under("{task}"),
                FolderDef::new("tests", "Tests for {task}", "Verification").under("{task}"),
                FolderDef::new("notes", "Design notes for {task}", "Decisions and context")
                    .under("{task}"),
            ],
            placement_folder: "code".to_string(),
            default_filename: "{task}.md".to_string(),
            required_documents: vec![RequiredDocument {
                folder: "notes".to_string(),
                filename_pattern: "{task}-plan.md".to_string(),
                content_template: "coding/plan".to_string(),
            }],
            workflow: None,
            detection: Some(
                TypePattern::new("coding_development")
                    .with_keywords(&["function", "implement", "bug", "test", "refactor", "code"])
                    .with_context_phrases(&["implement", "fix", "feature", "refactor"])
                    .with_indicators(&["```", "def ", "fn ", "class ", "import "])
                    .with_extensions(&["py", "rs", "js", "ts", "go", "java"]),
            ),
        },
        Template {
            name: "research_analysis".to_string(),
            version: 1,
            description: "Investigation with sources, findings and a summary".to_string(),
            folders: vec![
                FolderDef::new("research", "Research on {topic}", "Investigations"),
                FolderDef::new("{topic}", "Material on {topic}", "One topic per folder")
                    .under("research"),
            ],
            placement_folder: "{topic}".to_string(),
            default_filename: "{date}-{topic}.md".to_string(),
            required_documents: vec![RequiredDocument {
                folder: "{topic}".to_string(),
                filename_pattern: "{topic}-summary.md".to_string(),
                content_template: "research/summary".to_string(),
            }],
            workflow: None,
            detection: Some(
                TypePattern::new("research_analysis")
                    .with_keywords(&["research", "findings", "sources", "analysis", "hypothesis"])
                    .with_context_phrases(&["investigate", "research", "compare"])
                    .with_indicators(&["## findings", "## sources", "## references"])
                    .with_extensions(&["md", "pdf"]),
            ),
        },
        Template {
            name: "documentation".to_string(),
            version: 1,
            description: "Guides, references and how-tos".to_string(),
            folders: vec![
                FolderDef::new("docs", "Documentation", "Long-lived reference"),
                FolderDef::new("guides", "Guides on {topic}", "Task-oriented docs").under("docs"),
            ],
            placement_folder: "guides".to_string(),
            default_filename: "{topic}.md".to_string(),
            required_documents: Vec::new(),
            workflow: None,
            detection: Some(
                TypePattern::new("documentation")
                    .with_keywords(&["guide", "usage", "install", "overview", "example"])
                    .with_context_phrases(&["document", "write up", "explain"])
                    .with_indicators(&["# ", "## usage", "## installation"])
                    .with_extensions(&["md", "rst", "adoc"]),
            ),
        },
        Template {
            name: "meeting_notes".to_string(),
            version: 1,
            description: "Meeting minutes with attendees and action items".to_string(),
            folders: vec![FolderDef::new("meetings", "Meeting notes", "Minutes by date")],
            placement_folder: "meetings".to_string(),
            default_filename: "{date}-{topic}.md".to_string(),
            required_documents: Vec::new(),
            workflow: None,
            detection: Some(
                TypePattern::new("meeting_notes")
                    .with_keywords(&["meeting", "attendees", "agenda", "action items"])
                    .with_context_phrases(&["meeting", "standup", "sync"])
                    .with_indicators(&["## agenda", "## action items", "- [ ]"]),
            ),
        },
        Template {
            name: "sop_execution".to_string(),
            version: 1,
            description: "Standard operating procedure run with fixed steps".to_string(),
            folders: vec![
                FolderDef::new("operations", "Operational runs", "Procedures"),
                FolderDef::new("{date}-{task}", "Run of {task} on {date}", "One run per folder")
                    .under("operations"),
            ],
            placement_folder: "{date}-{task}".to_string(),
            default_filename: "{task}-log.md".to_string(),
            required_documents: Vec::new(),
            workflow: Some(Workflow {
                name: "standard_operating_procedure".to_string(),
                steps: vec![
                    WorkflowStep {
                        name: "prepare".to_string(),
                        produces: Some("01-checklist.md".to_string()),
                    },
                    WorkflowStep {
                        name: "execute".to_string(),
                        produces: Some("02-execution-log.md".to_string()),
                    },
                    WorkflowStep {
                        name: "verify".to_string(),
                        produces: Some("03-verification.md".to_string()),
                    },
                    WorkflowStep {
                        name: "review".to_string(),
                        produces: Some("04-review.md".to_string()),
                    },
                    WorkflowStep {
                        name: "close".to_string(),
                        produces: None,
                    },
                ],
            }),
            detection: Some(
                TypePattern::new("sop_execution")
                    .with_keywords(&["procedure", "checklist", "step", "verify", "runbook"])
                    .with_context_phrases(&["sop", "procedure", "runbook"])
                    .with_indicators(&["1. ", "- [ ]", "## steps"]),
            ),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, &str)]) -> TemplateContext {
        TemplateContext {
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            filename: None,
            confidence: 0.8,
            project: None,
            promotion_threshold: 0.7,
        }
    }

    #[test]
    fn test_substitute() {
        let c = ctx(&[("task", "Add Cache"), ("date", "2026-01-02")]);
        assert_eq!(
            c.substitute("t", "{date}-{task}.md").unwrap(),
            "2026-01-02-add-cache.md"
        );
    }

    #[test]
    fn test_substitute_missing_key() {
        let err = ctx(&[]).substitute("coding", "{task}.md").unwrap_err();
        assert!(matches!(
            err,
            ShelveError::TemplateContext { ref key, .. } if key == "task"
        ));
    }

    #[test]
    fn test_substitute_unterminated_brace_is_literal() {
        assert_eq!(ctx(&[]).substitute("t", "a{b").unwrap(), "a{b");
    }

    #[test]
    fn test_from_unit_fallbacks() {
        let unit = ContentUnit::new("x").with_filename("Parser Rewrite.py");
        let c = TemplateContext::from_unit(&unit, 0.9, 0.7);

        assert_eq!(c.values["task"], "Parser Rewrite");
        assert_eq!(c.values["topic"], "Parser Rewrite");
        assert_eq!(c.values["date"].len(), 10);
        assert_eq!(c.filename.as_deref(), Some("Parser Rewrite.py"));
    }

    #[test]
    fn test_from_unit_prefers_context() {
        let unit = ContentUnit::new("x")
            .with_filename("a.py")
            .with_context(keys::TASK, "login")
            .with_context(keys::DATE, "2026-03-04");
        let c = TemplateContext::from_unit(&unit, 0.9, 0.7);
        assert_eq!(c.values["task"], "login");
        assert_eq!(c.values["date"], "2026-03-04");
    }

    #[test]
    fn test_apply_coding_template() {
        let registry = TemplateRegistry::with_builtins();
        let mut c = ctx(&[("task", "login flow"), ("date", "2026-01-02")]);
        c.filename = Some("auth.py".to_string());

        let decision = registry.apply_template("coding_development", &c).unwrap();

        assert_eq!(decision.origin, Origin::Template);
        assert_eq!(decision.content_type, "coding_development");
        assert!((decision.confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(decision.file_placement.folder_path, "login-flow/code");
        assert_eq!(decision.file_placement.filename, "auth.py");
        assert_eq!(decision.folder_plan[0].name, "login-flow");
        assert_eq!(decision.folder_plan[1].parent.as_deref(), Some("login-flow"));
        assert!(decision.cross_references.is_empty());
    }

    #[test]
    fn test_apply_missing_context_fails() {
        let registry = TemplateRegistry::with_builtins();
        let err = registry
            .apply_template("coding_development", &ctx(&[]))
            .unwrap_err();
        assert!(matches!(err, ShelveError::TemplateContext { .. }));
    }

    #[test]
    fn test_apply_suggests_promotion_with_project_hint() {
        let registry = TemplateRegistry::with_builtins();
        let mut c = ctx(&[("topic", "meeting"), ("date", "2026-01-02")]);
        c.project = Some("atlas".to_string());

        let decision = registry.apply_template("meeting_notes", &c).unwrap();
        let promotion = decision.promotion_suggestion.unwrap();
        assert!(promotion.should_promote);
        assert_eq!(promotion.project_name.as_deref(), Some("atlas"));

        c.confidence = 0.5;
        let decision = registry.apply_template("meeting_notes", &c).unwrap();
        assert!(decision.promotion_suggestion.is_none());
    }

    #[test]
    fn test_required_paths_include_workflow_outputs() {
        let registry = TemplateRegistry::with_builtins();
        let sop = registry.get("sop_execution").unwrap();
        let c = ctx(&[("task", "restore"), ("date", "2026-01-02")]);

        let paths = sop.required_paths(&c).unwrap();
        assert_eq!(paths.len(), 4);
        assert_eq!(paths[0], "operations/2026-01-02-restore/01-checklist.md");
    }

    #[test]
    fn test_placeholders() {
        let registry = TemplateRegistry::with_builtins();
        let coding = registry.get("coding_development").unwrap();
        assert_eq!(coding.placeholders(), vec!["task"]);
    }

    #[test]
    fn test_register_is_create_only() {
        let registry = TemplateRegistry::with_builtins();
        let dup = registry.get("documentation").unwrap().as_ref().clone();

        let err = registry.register_template(dup).unwrap_err();
        assert!(matches!(err, ShelveError::TemplateExists { .. }));
    }

    #[test]
    fn test_register_rejects_unknown_placement_folder() {
        let registry = TemplateRegistry::new();
        let template = Template {
            name: "broken".to_string(),
            version: 1,
            description: String::new(),
            folders: vec![FolderDef::new("a", "A", "A")],
            placement_folder: "b".to_string(),
            default_filename: "x.md".to_string(),
            required_documents: Vec::new(),
            workflow: None,
            detection: None,
        };
        assert!(registry.register_template(template).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_renames_detection_pattern() {
        let registry = TemplateRegistry::new();
        let template = registry_template("draft");
        registry
            .register(
                "journal",
                template,
                Some(TypePattern::new("whatever").with_keywords(&["today"])),
            )
            .unwrap();

        let detector = registry.detector(0.7);
        assert_eq!(detector.patterns()[0].type_name, "journal");
        assert!(registry.get("journal").is_some());
    }

    #[test]
    fn test_snapshot_survives_later_registration() {
        let registry = TemplateRegistry::with_builtins();
        let before = registry.get("documentation").unwrap();
        registry.register_template(registry_template("extra")).unwrap();
        assert_eq!(before.name, "documentation");
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_list_metadata() {
        let list = TemplateRegistry::with_builtins().list();
        assert_eq!(list.len(), 5);
        assert!(list["sop_execution"].has_workflow);
        assert!(!list["documentation"].has_workflow);
        assert_eq!(list["coding_development"].folder_count, 4);
        assert!(list.values().all(|m| m.has_detection));
    }

    #[test]
    fn test_detector_keeps_registration_order() {
        let detector = TemplateRegistry::with_builtins().detector(0.7);
        let names: Vec<&str> = detector
            .patterns()
            .iter()
            .map(|p| p.type_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "coding_development",
                "research_analysis",
                "documentation",
                "meeting_notes",
                "sop_execution"
            ]
        );
    }

    fn registry_template(name: &str) -> Template {
        Template {
            name: name.to_string(),
            version: 1,
            description: String::new(),
            folders: vec![FolderDef::new("journal", "Journal", "Daily entries")],
            placement_folder: "journal".to_string(),
            default_filename: "{date}.md".to_string(),
            required_documents: Vec::new(),
            workflow: None,
            detection: None,
        }
    }
}

//! The organization decision value object.
//!
//! A `Decision` is the stable serialization contract between the engine and
//! its collaborators. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

/// Which strategy produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A registered template matched with high confidence.
    Template,
    /// The language model proposed a decision that passed validation.
    Ai,
    /// Rule-based placement after the AI path was exhausted.
    Fallback,
    /// Last-resort placement into emergency storage.
    EmergencyFallback,
}

impl Origin {
    /// Parse an origin from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "template" => Some(Self::Template),
            "ai" => Some(Self::Ai),
            "fallback" => Some(Self::Fallback),
            "emergency_fallback" => Some(Self::EmergencyFallback),
            _ => None,
        }
    }

    /// Wire name of this origin.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Ai => "ai",
            Self::Fallback => "fallback",
            Self::EmergencyFallback => "emergency_fallback",
        }
    }

    /// Whether a human should look at decisions from this origin.
    pub fn suggests_review(&self) -> bool {
        matches!(self, Self::Fallback | Self::EmergencyFallback)
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A folder the decision asks the vault to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FolderSpec {
    /// Folder name (a single path segment).
    pub name: String,
    /// What goes in the folder.
    pub description: String,
    /// Why the folder exists.
    pub purpose: String,
    /// Name of the parent folder in the same plan, if nested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl FolderSpec {
    /// Create a top-level folder spec.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            purpose: purpose.into(),
            parent: None,
        }
    }

    /// Nest this folder under a parent from the same plan.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Where the content itself lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FilePlacement {
    /// Target filename, extension included.
    pub filename: String,
    /// Folder path relative to the vault root, `/`-separated.
    pub folder_path: String,
    /// Content type of the placed file.
    pub content_type: String,
    /// Why the file goes here.
    pub reasoning: String,
}

impl FilePlacement {
    /// Vault-relative path of the placed file.
    pub fn relative_path(&self) -> String {
        let folder = self.folder_path.trim_matches('/');
        if folder.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", folder, self.filename)
        }
    }

    /// First segment of the folder path.
    pub fn top_folder(&self) -> &str {
        self.folder_path
            .trim_matches('/')
            .split('/')
            .next()
            .unwrap_or("")
    }
}

/// Relationship between the placed file and another file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    References,
    Extends,
    Implements,
    DependsOn,
    Related,
    Supersedes,
}

impl RelationshipType {
    /// Every accepted relationship type, in wire form.
    pub const ALL: &'static [&'static str] = &[
        "references",
        "extends",
        "implements",
        "depends_on",
        "related",
        "supersedes",
    ];

    /// Parse a relationship type from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "references" => Some(Self::References),
            "extends" => Some(Self::Extends),
            "implements" => Some(Self::Implements),
            "depends_on" => Some(Self::DependsOn),
            "related" => Some(Self::Related),
            "supersedes" => Some(Self::Supersedes),
            _ => None,
        }
    }
}

/// A link from the placed file to another file in the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CrossReference {
    /// Vault-relative path (or note name) of the target.
    pub target_file: String,
    /// Kind of relationship.
    pub relationship_type: RelationshipType,
    /// Why the link exists.
    pub reasoning: String,
}

/// Suggestion to lift session content into a longer-lived project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PromotionSuggestion {
    /// Whether promotion is recommended.
    pub should_promote: bool,
    /// Target project; required when `should_promote` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    /// Confidence in the suggestion.
    pub confidence: f64,
    /// Why promotion is (or is not) recommended.
    pub reasoning: String,
}

/// The accepted answer to "where and how should this content be filed?".
///
/// Decisions are immutable once built; a rejected payload is regenerated,
/// never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Decision {
    /// Detected or proposed content type.
    pub content_type: String,
    /// Confidence in the decision, in [0, 1].
    pub confidence: f64,
    /// Folders to create.
    pub folder_plan: Vec<FolderSpec>,
    /// Where the content goes.
    pub file_placement: FilePlacement,
    /// Links to existing files.
    #[serde(default)]
    pub cross_references: Vec<CrossReference>,
    /// Optional promotion into a project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion_suggestion: Option<PromotionSuggestion>,
    /// Overall reasoning.
    pub reasoning: String,
    /// Strategy that produced the decision.
    pub origin: Origin,
    /// Set on emergency placements that a human must sort out.
    #[serde(default)]
    pub requires_manual_review: bool,
}

impl Decision {
    /// Vault-relative path of the placed file.
    pub fn target_path(&self) -> String {
        self.file_placement.relative_path()
    }

    /// Whether the decision recommends promotion.
    pub fn promotes(&self) -> bool {
        self.promotion_suggestion
            .as_ref()
            .map(|p| p.should_promote)
            .unwrap_or(false)
    }

    /// Folder paths (vault-relative) implied by the plan, parents first.
    pub fn planned_paths(&self) -> Vec<String> {
        self.folder_plan
            .iter()
            .map(|folder| self.folder_path_of(folder))
            .collect()
    }

    fn folder_path_of(&self, folder: &FolderSpec) -> String {
        let mut segments = vec![folder.name.clone()];
        let mut parent = folder.parent.clone();
        // Bounded by plan size so a parent cycle cannot loop forever.
        for _ in 0..self.folder_plan.len() {
            let Some(name) = parent else { break };
            match self.folder_plan.iter().find(|f| f.name == name) {
                Some(p) => {
                    segments.push(p.name.clone());
                    parent = p.parent.clone();
                }
                None => break,
            }
        }
        segments.reverse();
        segments.join("/")
    }
}

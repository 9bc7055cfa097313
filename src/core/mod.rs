//! Core types and logic for Shelve.
//!
//! Content units and decisions, type detection, templates, the response
//! schema validator and the organization engine that ties them together.

pub mod content;
pub mod decision;
pub mod detect;
pub mod engine;
pub mod schema;
pub mod template;

pub use content::ContentUnit;
pub use decision::{
    CrossReference, Decision, FilePlacement, FolderSpec, Origin, PromotionSuggestion,
    RelationshipType,
};
pub use detect::{Detection, TypeDetector, TypePattern, UNKNOWN_TYPE};
pub use engine::{CancelToken, EngineState, OrganizationEngine, Organized};
pub use schema::{extract_json, ReasonCode, ResponseValidator, ValidationError, ValidationRules};
pub use template::{
    builtin_templates, FolderDef, RequiredDocument, Template, TemplateContext, TemplateMetadata,
    TemplateRegistry, Workflow, WorkflowStep,
};

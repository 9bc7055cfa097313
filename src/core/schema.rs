//! Decision schema validation.
//!
//! Every decision passes through here regardless of where it came from.
//! Validation runs in three layers, stopping at the first failure:
//!
//! 1. **Extraction**: find the first well-formed JSON object in raw text,
//!    tolerating prose and code fences around it.
//! 2. **Schema**: required fields, primitive types, bounds, no unknown fields.
//! 3. **Business rules**: cross-field constraints on the decoded decision.
//!
//! Invalid values are never coerced. A failure carries a machine-readable
//! [`ReasonCode`] so callers can regenerate or fall back.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::config::{Config, ValidationConfig};
use crate::core::decision::{
    CrossReference, Decision, FilePlacement, FolderSpec, Origin, PromotionSuggestion,
    RelationshipType,
};
use crate::util::{has_extension, is_reserved_char};

/// Marker after which step-by-step answers put their final JSON.
pub const FINAL_ANSWER_MARKER: &str = "FINAL ANSWER:";

const DECISION_FIELDS: &[&str] = &[
    "contentType",
    "confidence",
    "folderPlan",
    "filePlacement",
    "crossReferences",
    "promotionSuggestion",
    "reasoning",
    "origin",
    "requiresManualReview",
];
const FOLDER_FIELDS: &[&str] = &["name", "description", "purpose", "parent"];
const PLACEMENT_FIELDS: &[&str] = &["filename", "folderPath", "contentType", "reasoning"];
const XREF_FIELDS: &[&str] = &["targetFile", "relationshipType", "reasoning"];
const PROMOTION_FIELDS: &[&str] = &["shouldPromote", "projectName", "confidence", "reasoning"];
const SIMPLIFIED_FIELDS: &[&str] = &["contentType", "folderPath", "filename"];

/// Business rule names used in reason codes.
pub mod rules {
    pub const UNIQUE_FOLDER_NAMES: &str = "unique_folder_names";
    pub const FOLDER_PARENT: &str = "folder_parent";
    pub const FOLDER_PATH_IN_PLAN: &str = "folder_path_in_plan";
    pub const MAX_CROSS_REFERENCES: &str = "max_cross_references";
    pub const PROMOTION_PROJECT_NAME: &str = "promotion_project_name";
    pub const PROMOTION_CONFIDENCE: &str = "promotion_confidence";
}

/// Machine-readable validation failure reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasonCode {
    /// No JSON object could be extracted.
    MalformedJson,
    /// A field is missing, mistyped, out of bounds or unknown.
    SchemaViolation(String),
    /// A cross-field business rule failed.
    BusinessRule(String),
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReasonCode::MalformedJson => write!(f, "malformed_json"),
            ReasonCode::SchemaViolation(field) => write!(f, "schema_violation:{}", field),
            ReasonCode::BusinessRule(rule) => write!(f, "business_rule:{}", rule),
        }
    }
}

/// A rejected decision payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: ReasonCode,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn malformed(message: impl Into<String>) -> Self {
        Self::new(ReasonCode::MalformedJson, message)
    }

    fn schema(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ReasonCode::SchemaViolation(field.into()), message)
    }

    fn rule(rule: &str, message: impl Into<String>) -> Self {
        Self::new(ReasonCode::BusinessRule(rule.to_string()), message)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

type VResult<T> = std::result::Result<T, ValidationError>;

/// Bounds and allow-lists applied by the validator.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRules {
    pub confidence_floor: f64,
    pub promotion_threshold: f64,
    pub max_cross_references: usize,
    pub always_allowed_folders: Vec<String>,
    pub min_reasoning_length: usize,
    pub max_filename_length: usize,
}

impl From<&ValidationConfig> for ValidationRules {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            confidence_floor: config.confidence_floor,
            promotion_threshold: config.promotion_threshold,
            max_cross_references: config.max_cross_references,
            always_allowed_folders: config.always_allowed_folders.clone(),
            min_reasoning_length: config.min_reasoning_length,
            max_filename_length: config.max_filename_length,
        }
    }
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self::from(&ValidationConfig::default())
    }
}

/// The three-field answer requested by the simplified prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct SimplifiedAnswer {
    pub content_type: String,
    pub folder_path: String,
    pub filename: String,
}

/// Find the first well-formed JSON object in `raw`.
///
/// When the text contains [`FINAL_ANSWER_MARKER`], scanning starts after
/// the last marker and only falls back to the whole text if nothing follows.
pub fn extract_json(raw: &str) -> Option<Value> {
    if let Some(idx) = raw.rfind(FINAL_ANSWER_MARKER) {
        if let Some(value) = first_object(&raw[idx + FINAL_ANSWER_MARKER.len()..]) {
            return Some(value);
        }
    }
    first_object(raw)
}

fn first_object(text: &str) -> Option<Value> {
    for (idx, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    None
}

/// Validates decision payloads against the schema and business rules.
#[derive(Debug, Clone, Default)]
pub struct ResponseValidator {
    rules: ValidationRules,
}

impl ResponseValidator {
    /// Create a validator with explicit rules.
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    /// Create a validator from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(ValidationRules::from(&config.validation))
    }

    /// Rules in force.
    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Validate raw text and stamp the accepted decision with `origin`.
    pub fn validate(&self, raw: &str, origin: Origin) -> VResult<Decision> {
        let value = extract_json(raw)
            .ok_or_else(|| ValidationError::malformed("no JSON object found in response"))?;
        self.validate_value(&value, origin)
    }

    /// Re-validate a decision built in-process (templates, fallback).
    pub fn validate_decision(&self, decision: &Decision) -> VResult<Decision> {
        let value = serde_json::to_value(decision)
            .map_err(|e| ValidationError::malformed(e.to_string()))?;
        self.validate_value(&value, decision.origin)
    }

    /// Validate a decoded JSON value.
    pub fn validate_value(&self, value: &Value, origin: Origin) -> VResult<Decision> {
        let decision = self.check_schema(value, origin)?;
        self.check_business_rules(&decision)?;
        Ok(decision)
    }

    /// Validate the three-field answer of the simplified prompt.
    pub fn validate_simplified(&self, raw: &str) -> VResult<SimplifiedAnswer> {
        let value = extract_json(raw)
            .ok_or_else(|| ValidationError::malformed("no JSON object found in response"))?;
        let obj = as_object(&value, "")?;
        check_keys(obj, SIMPLIFIED_FIELDS, "")?;

        let content_type = req_str(obj, "contentType", "")?;
        let folder_path = req_str(obj, "folderPath", "")?;
        check_folder_path(&folder_path, "folderPath")?;
        let filename = req_str(obj, "filename", "")?;
        self.check_filename(&filename, "filename")?;

        Ok(SimplifiedAnswer {
            content_type,
            folder_path,
            filename,
        })
    }

    // =========================================================================
    // Layer 2: Schema
    // =========================================================================

    fn check_schema(&self, value: &Value, origin: Origin) -> VResult<Decision> {
        let obj = as_object(value, "")?;
        check_keys(obj, DECISION_FIELDS, "")?;

        let content_type = req_str(obj, "contentType", "")?;

        let confidence = req_unit_interval(obj, "confidence", "")?;
        if confidence < self.rules.confidence_floor {
            return Err(ValidationError::schema(
                "confidence",
                format!(
                    "confidence {:.2} is below the floor {:.2}",
                    confidence, self.rules.confidence_floor
                ),
            ));
        }

        let folder_plan = self.check_folder_plan(obj)?;
        let file_placement = self.check_file_placement(obj)?;
        let cross_references = check_cross_references(obj)?;
        let promotion_suggestion = check_promotion(obj)?;

        let reasoning = req_str(obj, "reasoning", "")?;
        let reasoning_len = reasoning.trim().chars().count();
        if reasoning_len < self.rules.min_reasoning_length {
            return Err(ValidationError::schema(
                "reasoning",
                format!(
                    "reasoning too short: {} chars (min: {})",
                    reasoning_len, self.rules.min_reasoning_length
                ),
            ));
        }

        if let Some(raw_origin) = opt_str(obj, "origin", "")? {
            if Origin::parse(&raw_origin).is_none() {
                return Err(ValidationError::schema(
                    "origin",
                    format!("unknown origin '{}'", raw_origin),
                ));
            }
        }

        let requires_manual_review = match obj.get("requiresManualReview") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(ValidationError::schema(
                    "requiresManualReview",
                    "expected a boolean",
                ))
            }
        };

        Ok(Decision {
            content_type,
            confidence,
            folder_plan,
            file_placement,
            cross_references,
            promotion_suggestion,
            reasoning,
            origin,
            requires_manual_review,
        })
    }

    fn check_folder_plan(&self, obj: &Map<String, Value>) -> VResult<Vec<FolderSpec>> {
        let items = req_array(obj, "folderPlan", "")?;
        let mut plan = Vec::with_capacity(items.len());

        for (i, item) in items.iter().enumerate() {
            let folder = as_object(item, "folderPlan")?;
            check_keys(folder, FOLDER_FIELDS, "folderPlan.")?;

            let name = req_str(folder, "name", "folderPlan.")?;
            check_segment(&name).map_err(|why| {
                ValidationError::schema(
                    "folderPlan.name",
                    format!("folder {} name '{}' {}", i, name, why),
                )
            })?;
            let description = req_string_allow_empty(folder, "description", "folderPlan.")?;
            let purpose = req_string_allow_empty(folder, "purpose", "folderPlan.")?;
            let parent = opt_str(folder, "parent", "folderPlan.")?;

            plan.push(FolderSpec {
                name,
                description,
                purpose,
                parent,
            });
        }

        Ok(plan)
    }

    fn check_file_placement(&self, obj: &Map<String, Value>) -> VResult<FilePlacement> {
        let value = obj
            .get("filePlacement")
            .ok_or_else(|| ValidationError::schema("filePlacement", "missing required field"))?;
        let placement = as_object(value, "filePlacement")?;
        check_keys(placement, PLACEMENT_FIELDS, "filePlacement.")?;

        let filename = req_str(placement, "filename", "filePlacement.")?;
        self.check_filename(&filename, "filePlacement.filename")?;

        let folder_path = req_str(placement, "folderPath", "filePlacement.")?;
        check_folder_path(&folder_path, "filePlacement.folderPath")?;

        Ok(FilePlacement {
            filename,
            folder_path,
            content_type: req_str(placement, "contentType", "filePlacement.")?,
            reasoning: req_string_allow_empty(placement, "reasoning", "filePlacement.")?,
        })
    }

    fn check_filename(&self, filename: &str, field: &str) -> VResult<()> {
        if filename.chars().any(is_reserved_char) {
            return Err(ValidationError::schema(
                field,
                format!("filename '{}' contains reserved characters", filename),
            ));
        }
        if !has_extension(filename) {
            return Err(ValidationError::schema(
                field,
                format!("filename '{}' has no extension", filename),
            ));
        }
        let len = filename.chars().count();
        if len > self.rules.max_filename_length {
            return Err(ValidationError::schema(
                field,
                format!(
                    "filename too long: {} chars (max: {})",
                    len, self.rules.max_filename_length
                ),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Layer 3: Business rules
    // =========================================================================

    fn check_business_rules(&self, decision: &Decision) -> VResult<()> {
        let mut names: HashSet<&str> = HashSet::new();
        for folder in &decision.folder_plan {
            if !names.insert(folder.name.as_str()) {
                return Err(ValidationError::rule(
                    rules::UNIQUE_FOLDER_NAMES,
                    format!("folder '{}' appears more than once", folder.name),
                ));
            }
        }

        check_parents(&decision.folder_plan)?;

        let top = decision.file_placement.top_folder();
        let allowed = self
            .rules
            .always_allowed_folders
            .iter()
            .any(|f| f == top);
        if !names.contains(top) && !allowed {
            return Err(ValidationError::rule(
                rules::FOLDER_PATH_IN_PLAN,
                format!(
                    "placement folder '{}' is neither planned nor always allowed",
                    top
                ),
            ));
        }

        if decision.cross_references.len() > self.rules.max_cross_references {
            return Err(ValidationError::rule(
                rules::MAX_CROSS_REFERENCES,
                format!(
                    "{} cross references (max: {})",
                    decision.cross_references.len(),
                    self.rules.max_cross_references
                ),
            ));
        }

        if let Some(promotion) = &decision.promotion_suggestion {
            let named = promotion
                .project_name
                .as_deref()
                .map(|p| !p.trim().is_empty())
                .unwrap_or(false);
            if named != promotion.should_promote {
                let message = if named {
                    "project name given without requesting promotion"
                } else {
                    "promotion requested without a project name"
                };
                return Err(ValidationError::rule(rules::PROMOTION_PROJECT_NAME, message));
            }
            if promotion.should_promote {
                if promotion.confidence < self.rules.promotion_threshold {
                    return Err(ValidationError::rule(
                        rules::PROMOTION_CONFIDENCE,
                        format!(
                            "promotion confidence {:.2} is below {:.2}",
                            promotion.confidence, self.rules.promotion_threshold
                        ),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Every parent must name another planned folder, without cycles.
fn check_parents(plan: &[FolderSpec]) -> VResult<()> {
    for folder in plan {
        let mut seen: HashSet<&str> = HashSet::from([folder.name.as_str()]);
        let mut parent = folder.parent.as_deref();

        while let Some(name) = parent {
            let Some(next) = plan.iter().find(|f| f.name == name) else {
                return Err(ValidationError::rule(
                    rules::FOLDER_PARENT,
                    format!("folder '{}' has unknown parent '{}'", folder.name, name),
                ));
            };
            if !seen.insert(next.name.as_str()) {
                return Err(ValidationError::rule(
                    rules::FOLDER_PARENT,
                    format!("folder '{}' is part of a parent cycle", folder.name),
                ));
            }
            parent = next.parent.as_deref();
        }
    }
    Ok(())
}

fn check_cross_references(obj: &Map<String, Value>) -> VResult<Vec<CrossReference>> {
    let items = match obj.get("crossReferences") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ValidationError::schema(
                "crossReferences",
                "expected an array",
            ))
        }
    };

    let mut refs = Vec::with_capacity(items.len());
    for item in items {
        let xref = as_object(item, "crossReferences")?;
        check_keys(xref, XREF_FIELDS, "crossReferences.")?;

        let target_file = req_str(xref, "targetFile", "crossReferences.")?;
        if target_file.split('/').any(|s| s == "..") {
            return Err(ValidationError::schema(
                "crossReferences.targetFile",
                format!("target '{}' escapes the vault", target_file),
            ));
        }

        let kind = req_str(xref, "relationshipType", "crossReferences.")?;
        let relationship_type = RelationshipType::parse(&kind).ok_or_else(|| {
            ValidationError::schema(
                "crossReferences.relationshipType",
                format!(
                    "unknown relationship '{}' (expected one of {:?})",
                    kind,
                    RelationshipType::ALL
                ),
            )
        })?;

        refs.push(CrossReference {
            target_file,
            relationship_type,
            reasoning: req_string_allow_empty(xref, "reasoning", "crossReferences.")?,
        });
    }
    Ok(refs)
}

fn check_promotion(obj: &Map<String, Value>) -> VResult<Option<PromotionSuggestion>> {
    let value = match obj.get("promotionSuggestion") {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    let promotion = as_object(value, "promotionSuggestion")?;
    check_keys(promotion, PROMOTION_FIELDS, "promotionSuggestion.")?;

    let should_promote = match promotion.get("shouldPromote") {
        Some(Value::Bool(b)) => *b,
        _ => {
            return Err(ValidationError::schema(
                "promotionSuggestion.shouldPromote",
                "expected a boolean",
            ))
        }
    };

    Ok(Some(PromotionSuggestion {
        should_promote,
        project_name: opt_str(promotion, "projectName", "promotionSuggestion.")?,
        confidence: req_unit_interval(promotion, "confidence", "promotionSuggestion.")?,
        reasoning: req_string_allow_empty(promotion, "reasoning", "promotionSuggestion.")?,
    }))
}

/// Why a path segment is invalid, if it is.
fn check_segment(segment: &str) -> std::result::Result<(), &'static str> {
    if segment.trim().is_empty() {
        return Err("is empty");
    }
    if segment != segment.trim() {
        return Err("has surrounding whitespace");
    }
    if segment == "." || segment == ".." {
        return Err("is a relative path component");
    }
    if segment.chars().any(is_reserved_char) {
        return Err("contains reserved characters");
    }
    Ok(())
}

fn check_folder_path(path: &str, field: &str) -> VResult<()> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(ValidationError::schema(field, "folder path is empty"));
    }
    for segment in trimmed.split('/') {
        check_segment(segment).map_err(|why| {
            ValidationError::schema(field, format!("segment '{}' {}", segment, why))
        })?;
    }
    Ok(())
}

// =============================================================================
// Field readers
// =============================================================================

fn as_object<'a>(value: &'a Value, field: &str) -> VResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        let field = if field.is_empty() { "root" } else { field };
        ValidationError::schema(field, "expected an object")
    })
}

fn check_keys(obj: &Map<String, Value>, allowed: &[&str], prefix: &str) -> VResult<()> {
    match obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(unknown) => Err(ValidationError::schema(
            format!("{}{}", prefix, unknown),
            "field is not part of the schema",
        )),
        None => Ok(()),
    }
}

fn req_string_allow_empty(obj: &Map<String, Value>, key: &str, prefix: &str) -> VResult<String> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::schema(
            format!("{}{}", prefix, key),
            "expected a string",
        )),
        None => Err(ValidationError::schema(
            format!("{}{}", prefix, key),
            "missing required field",
        )),
    }
}

fn req_str(obj: &Map<String, Value>, key: &str, prefix: &str) -> VResult<String> {
    let s = req_string_allow_empty(obj, key, prefix)?;
    if s.trim().is_empty() {
        return Err(ValidationError::schema(
            format!("{}{}", prefix, key),
            "must not be empty",
        ));
    }
    Ok(s)
}

fn opt_str(obj: &Map<String, Value>, key: &str, prefix: &str) -> VResult<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::schema(
            format!("{}{}", prefix, key),
            "expected a string",
        )),
    }
}

fn req_unit_interval(obj: &Map<String, Value>, key: &str, prefix: &str) -> VResult<f64> {
    let field = format!("{}{}", prefix, key);
    let n = obj
        .get(key)
        .ok_or_else(|| ValidationError::schema(&field, "missing required field"))?
        .as_f64()
        .ok_or_else(|| ValidationError::schema(&field, "expected a number"))?;
    if !(0.0..=1.0).contains(&n) {
        return Err(ValidationError::schema(
            &field,
            format!("{} is outside [0, 1]", n),
        ));
    }
    Ok(n)
}

fn req_array<'a>(obj: &'a Map<String, Value>, key: &str, prefix: &str) -> VResult<&'a Vec<Value>> {
    let field = format!("{}{}", prefix, key);
    obj.get(key)
        .ok_or_else(|| ValidationError::schema(&field, "missing required field"))?
        .as_array()
        .ok_or_else(|| ValidationError::schema(&field, "expected an array"))
}

//! Built-in checkpoints.
//!
//! | name                        | order | critical |
//! |-----------------------------|-------|----------|
//! | `compatibility`             | 10    | yes      |
//! | `front_matter`              | 20    | no       |
//! | `cross_reference_integrity` | 30    | no       |
//! | `workflow_compliance`       | 40    | no       |
//! | `diagram_syntax`            | 50    | no       |

use std::sync::Arc;

use crate::checkpoint::runner::CheckpointRunner;
use crate::checkpoint::traits::{Checkpoint, CheckpointContext, CheckpointMeta, CheckpointResult};
use crate::config::CheckpointsConfig;
use crate::error::Result;

/// Extensions a vault viewer can open.
pub const VIEWABLE_EXTENSIONS: &[&str] = &[
    "md", "markdown", "txt", "json", "canvas", "yaml", "yml", "csv", "mmd", "png", "svg",
    "py", "rs", "js", "ts", "sh", "go", "java", "c", "h", "cpp", "rb", "sql", "toml", "html",
    "css",
];

/// First keywords a mermaid diagram may start with.
pub const MERMAID_KEYWORDS: &[&str] = &[
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "stateDiagram-v2",
    "erDiagram",
    "gantt",
    "pie",
    "journey",
    "gitGraph",
    "mindmap",
    "timeline",
    "quadrantChart",
];

/// All built-in checkpoints with their default metadata.
pub fn builtin_checkpoints(config: &CheckpointsConfig) -> Vec<Arc<dyn Checkpoint>> {
    vec![
        Arc::new(CompatibilityCheck),
        Arc::new(FrontMatterCheck::new(config.required_front_matter.clone())),
        Arc::new(CrossReferenceCheck),
        Arc::new(WorkflowComplianceCheck),
        Arc::new(DiagramSyntaxCheck),
    ]
}

/// A runner with every built-in registered.
pub fn default_runner(config: &CheckpointsConfig) -> CheckpointRunner {
    let mut runner = CheckpointRunner::new(config.stop_on_critical_failure);
    for checkpoint in builtin_checkpoints(config) {
        // Built-in names are distinct.
        if let Err(e) = runner.register(checkpoint) {
            tracing::warn!("{}", e);
        }
    }
    runner
}

fn is_markdown(ctx: &CheckpointContext) -> bool {
    matches!(ctx.extension().as_deref(), Some("md") | Some("markdown"))
}

/// The written file can be opened by the consuming viewer.
#[derive(Debug, Default)]
pub struct CompatibilityCheck;

impl Checkpoint for CompatibilityCheck {
    fn name(&self) -> &str {
        "compatibility"
    }

    fn default_meta(&self) -> CheckpointMeta {
        CheckpointMeta::new(true, 10)
    }

    fn validate(&self, ctx: &CheckpointContext) -> Result<CheckpointResult> {
        let name = self.name();
        let Some(ext) = ctx.extension() else {
            return Ok(CheckpointResult::fail(name, "file has no extension", true));
        };
        if !VIEWABLE_EXTENSIONS.contains(&ext.as_str()) {
            return Ok(CheckpointResult::fail(
                name,
                format!("extension '.{}' is not viewable", ext),
                true,
            ));
        }
        let Some(content) = ctx.content.as_deref() else {
            return Ok(CheckpointResult::fail(name, "written file could not be read back", true));
        };
        if content.contains('\0') {
            return Ok(CheckpointResult::fail(name, "content contains NUL bytes", true));
        }

        let parse_error = match ext.as_str() {
            "json" | "canvas" => serde_json::from_str::<serde_json::Value>(content)
                .err()
                .map(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str::<serde_yaml::Value>(content)
                .err()
                .map(|e| e.to_string()),
            _ => None,
        };
        Ok(match parse_error {
            Some(error) => CheckpointResult::fail(name, format!("'.{}' content does not parse", ext), true)
                .with_details(vec![error]),
            None => CheckpointResult::pass(name, "file is viewable", true),
        })
    }
}

/// Markdown artifacts carry the required front-matter keys.
#[derive(Debug)]
pub struct FrontMatterCheck {
    required: Vec<String>,
}

impl FrontMatterCheck {
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }
}

/// Split a leading `---` block from markdown.
pub fn front_matter(content: &str) -> Option<&str> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some(&rest[..offset]);
        }
        offset += line.len();
    }
    None
}

impl Checkpoint for FrontMatterCheck {
    fn name(&self) -> &str {
        "front_matter"
    }

    fn default_meta(&self) -> CheckpointMeta {
        CheckpointMeta::new(false, 20)
    }

    fn validate(&self, ctx: &CheckpointContext) -> Result<CheckpointResult> {
        let name = self.name();
        if !is_markdown(ctx) || self.required.is_empty() {
            return Ok(CheckpointResult::pass(name, "not applicable", false));
        }
        let content = ctx.content.as_deref().unwrap_or("");
        let Some(block) = front_matter(content) else {
            return Ok(CheckpointResult::fail(name, "missing front matter", false)
                .with_details(self.required.clone()));
        };

        let value: serde_yaml::Value = match serde_yaml::from_str(block) {
            Ok(v) => v,
            Err(e) => {
                return Ok(CheckpointResult::fail(name, "front matter is not valid YAML", false)
                    .with_details(vec![e.to_string()]))
            }
        };
        let Some(mapping) = value.as_mapping() else {
            return Ok(CheckpointResult::fail(name, "front matter is not a mapping", false));
        };

        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|key| {
                mapping
                    .get(key.as_str())
                    .map(|v| v.is_null())
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        Ok(if missing.is_empty() {
            CheckpointResult::pass(name, "front matter complete", false)
        } else {
            CheckpointResult::fail(name, "missing front-matter keys", false).with_details(missing)
        })
    }
}

/// Cross-references and wikilinks point at files that exist.
#[derive(Debug, Default)]
pub struct CrossReferenceCheck;

/// Targets of `[[wikilinks]]`, without alias or heading.
pub fn wikilinks(content: &str) -> Vec<String> {
    let mut links = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find("[[") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("]]") else { break };
        let inner = &after[..end];
        let target = inner
            .split(['|', '#'])
            .next()
            .unwrap_or("")
            .trim();
        if !target.is_empty() && !target.contains('\n') {
            links.push(target.to_string());
        }
        rest = &after[end + 2..];
    }
    links
}

fn stem_of(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

impl CrossReferenceCheck {
    /// A target resolves by exact path, path plus `.md`, or note name.
    fn resolves(target: &str, ctx: &CheckpointContext) -> bool {
        let target = target.trim_start_matches('/');
        if ctx.known_files.contains(target) || ctx.known_files.contains(&format!("{}.md", target)) {
            return true;
        }
        if target.contains('/') {
            return false;
        }
        let wanted = stem_of(target).to_lowercase();
        ctx.known_files
            .iter()
            .any(|file| stem_of(file).to_lowercase() == wanted)
    }
}

impl Checkpoint for CrossReferenceCheck {
    fn name(&self) -> &str {
        "cross_reference_integrity"
    }

    fn default_meta(&self) -> CheckpointMeta {
        CheckpointMeta::new(false, 30)
    }

    fn validate(&self, ctx: &CheckpointContext) -> Result<CheckpointResult> {
        let mut targets: Vec<String> = ctx
            .decision
            .cross_references
            .iter()
            .map(|x| x.target_file.clone())
            .collect();
        if is_markdown(ctx) {
            targets.extend(wikilinks(ctx.content.as_deref().unwrap_or("")));
        }
        targets.dedup();

        let dangling: Vec<String> = targets
            .into_iter()
            .filter(|t| !Self::resolves(t, ctx))
            .collect();

        Ok(if dangling.is_empty() {
            CheckpointResult::pass(self.name(), "all references resolve", false)
        } else {
            CheckpointResult::fail(
                self.name(),
                format!("{} dangling reference(s)", dangling.len()),
                false,
            )
            .with_details(dangling)
        })
    }
}

/// Documents the template or workflow requires are present.
#[derive(Debug, Default)]
pub struct WorkflowComplianceCheck;

impl Checkpoint for WorkflowComplianceCheck {
    fn name(&self) -> &str {
        "workflow_compliance"
    }

    fn default_meta(&self) -> CheckpointMeta {
        CheckpointMeta::new(false, 40)
    }

    fn validate(&self, ctx: &CheckpointContext) -> Result<CheckpointResult> {
        let missing: Vec<String> = ctx
            .required_files
            .iter()
            .filter(|f| !ctx.known_files.contains(f.trim_start_matches('/')))
            .cloned()
            .collect();

        Ok(if missing.is_empty() {
            CheckpointResult::pass(self.name(), "required documents present", false)
        } else {
            CheckpointResult::fail(
                self.name(),
                format!("{} required document(s) missing", missing.len()),
                false,
            )
            .with_details(missing)
        })
    }
}

/// Mermaid diagrams are well formed.
#[derive(Debug, Default)]
pub struct DiagramSyntaxCheck;

/// Result of scanning markdown fences.
#[derive(Debug, Default, PartialEq)]
pub struct Fences {
    /// Bodies of ```mermaid blocks.
    pub mermaid: Vec<String>,
    /// A fence was opened and never closed.
    pub unclosed: bool,
}

/// Scan fenced code blocks.
pub fn scan_fences(content: &str) -> Fences {
    let mut fences = Fences::default();
    let mut open: Option<(String, Vec<&str>)> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        match open.take() {
            None => {
                if let Some(lang) = trimmed.strip_prefix("```") {
                    open = Some((lang.trim().to_lowercase(), Vec::new()));
                }
            }
            Some((lang, mut body)) => {
                if trimmed == "```" {
                    if lang == "mermaid" {
                        fences.mermaid.push(body.join("\n"));
                    }
                } else {
                    body.push(line);
                    open = Some((lang, body));
                }
            }
        }
    }
    fences.unclosed = open.is_some();
    fences
}

/// Problems in one mermaid diagram; empty when well formed.
pub fn mermaid_problems(diagram: &str) -> Vec<String> {
    let mut problems = Vec::new();

    let first = diagram
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("%%"));
    match first {
        None => problems.push("empty diagram".to_string()),
        Some(line) => {
            let keyword = line.split_whitespace().next().unwrap_or("");
            if !MERMAID_KEYWORDS.contains(&keyword) {
                problems.push(format!("unknown diagram type '{}'", keyword));
            }
        }
    }

    let mut stack = Vec::new();
    let mut in_quotes = false;
    for c in diagram.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            _ if in_quotes => {}
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    problems.push(format!("unbalanced '{}'", c));
                    return problems;
                }
            }
            _ => {}
        }
    }
    if let Some(c) = stack.last() {
        problems.push(format!("unclosed '{}'", c));
    }
    problems
}

impl Checkpoint for DiagramSyntaxCheck {
    fn name(&self) -> &str {
        "diagram_syntax"
    }

    fn default_meta(&self) -> CheckpointMeta {
        CheckpointMeta::new(false, 50)
    }

    fn validate(&self, ctx: &CheckpointContext) -> Result<CheckpointResult> {
        let name = self.name();
        let content = ctx.content.as_deref().unwrap_or("");

        let (diagrams, mut problems) = match ctx.extension().as_deref() {
            Some("mmd") => (vec![content.to_string()], Vec::new()),
            Some("md") | Some("markdown") => {
                let fences = scan_fences(content);
                let problems = if fences.unclosed {
                    vec!["unclosed code fence".to_string()]
                } else {
                    Vec::new()
                };
                (fences.mermaid, problems)
            }
            _ => return Ok(CheckpointResult::pass(name, "not applicable", false)),
        };

        for (i, diagram) in diagrams.iter().enumerate() {
            problems.extend(
                mermaid_problems(diagram)
                    .into_iter()
                    .map(|p| format!("diagram {}: {}", i + 1, p)),
            );
        }

        Ok(if problems.is_empty() {
            CheckpointResult::pass(name, format!("{} diagram(s) well formed", diagrams.len()), false)
        } else {
            CheckpointResult::fail(name, "diagram syntax problems", false).with_details(problems)
        })
    }
}

//! Rule-based fallback decisions.
//!
//! Used when the AI path is exhausted. Classification is pure string
//! heuristics over a closed set of buckets, so the same content and
//! filename always land in the same place.

use chrono::{DateTime, Utc};

use crate::core::content::ContentUnit;
use crate::core::decision::{Decision, FilePlacement, FolderSpec, Origin};
use crate::core::schema::ValidationRules;
use crate::util::{sanitize_filename, slugify, DEFAULT_EXTENSION};

/// Bucket used when nothing else matches.
pub const DEFAULT_BUCKET: &str = "documentation";

/// Folder for last-resort placements.
pub const EMERGENCY_FOLDER: &str = "emergency_storage";

/// Confidence reported by fallback decisions (raised to the floor if lower).
const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Extensions too generic to decide a bucket on their own.
const GENERIC_EXTENSIONS: &[&str] = &["md", "txt"];

/// Longest stem derived from content when there is no filename hint.
const DERIVED_STEM_CHARS: usize = 50;

/// A candidate subfolder and the keywords that select it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subfolder {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

/// One of the fixed safe buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    pub keywords: &'static [&'static str],
    /// Candidates in priority order; the first is the default.
    pub subfolders: &'static [Subfolder],
}

impl Bucket {
    /// Pick the first subfolder with a keyword in `haystack`, else the first.
    fn subfolder_for(&self, haystack: &str) -> &'static str {
        self.subfolders
            .iter()
            .find(|s| s.keywords.iter().any(|k| haystack.contains(k)))
            .or_else(|| self.subfolders.first())
            .map(|s| s.name)
            .unwrap_or("general")
    }

    fn keyword_hits(&self, haystack: &str) -> usize {
        self.keywords.iter().filter(|k| haystack.contains(*k)).count()
    }
}

/// Buckets in tie-break order. Diagrams come before code so a mermaid
/// fence is not mistaken for a code fence.
pub const BUCKETS: &[Bucket] = &[
    Bucket {
        name: "diagrams",
        extensions: &["mmd", "mermaid", "puml", "drawio", "excalidraw", "canvas"],
        keywords: &["```mermaid", "@startuml", "flowchart", "sequencediagram", "graph td", "graph lr"],
        subfolders: &[
            Subfolder { name: "flowcharts", keywords: &["flowchart", "graph td", "graph lr"] },
            Subfolder { name: "sequences", keywords: &["sequencediagram"] },
            Subfolder { name: "architecture", keywords: &["architecture", "component"] },
        ],
    },
    Bucket {
        name: "code",
        extensions: &["py", "rs", "js", "ts", "go", "java", "c", "cpp", "h", "rb", "sh", "sql"],
        keywords: &["```", "def ", "fn ", "function ", "class ", "import ", "#!/"],
        subfolders: &[
            Subfolder { name: "snippets", keywords: &["```", "snippet", "example"] },
            Subfolder { name: "scripts", keywords: &["#!/", "script", "argparse", "cli"] },
            Subfolder { name: "modules", keywords: &["class ", "module", "struct ", "impl "] },
        ],
    },
    Bucket {
        name: "analysis",
        extensions: &["csv", "ipynb", "xlsx", "tsv"],
        keywords: &["analysis", "metrics", "benchmark", "results", "dataset"],
        subfolders: &[
            Subfolder { name: "reports", keywords: &["report", "summary"] },
            Subfolder { name: "data", keywords: &["dataset", "csv", "table"] },
            Subfolder { name: "experiments", keywords: &["benchmark", "experiment"] },
        ],
    },
    Bucket {
        name: "research",
        extensions: &["pdf", "bib"],
        keywords: &["research", "paper", "study", "literature", "hypothesis", "sources"],
        subfolders: &[
            Subfolder { name: "notes", keywords: &["notes", "reading"] },
            Subfolder { name: "papers", keywords: &["paper", "arxiv", "doi"] },
            Subfolder { name: "findings", keywords: &["findings", "conclusion"] },
        ],
    },
    Bucket {
        name: DEFAULT_BUCKET,
        extensions: &["rst", "adoc"],
        keywords: &["guide", "readme", "how to", "overview", "usage", "install"],
        subfolders: &[
            Subfolder { name: "general", keywords: &[] },
            Subfolder { name: "guides", keywords: &["guide", "how to", "tutorial"] },
            Subfolder { name: "reference", keywords: &["reference", "api"] },
        ],
    },
];

/// Where the fallback puts a unit, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub bucket: &'static str,
    pub subfolder: &'static str,
    pub reason: String,
}

/// Deterministic decision builder of last resort.
#[derive(Debug, Clone)]
pub struct FallbackProvider {
    confidence: f64,
    max_filename_length: usize,
}

impl FallbackProvider {
    pub fn new(rules: &ValidationRules) -> Self {
        Self {
            confidence: FALLBACK_CONFIDENCE.max(rules.confidence_floor),
            max_filename_length: rules.max_filename_length,
        }
    }

    /// Choose bucket and subfolder for a unit.
    ///
    /// A specific extension decides the bucket; otherwise the bucket with
    /// the most keyword hits wins, ties going to the earlier bucket.
    pub fn classify(&self, unit: &ContentUnit) -> Classification {
        let haystack = format!(
            "{}\n{}",
            unit.filename_hint.as_deref().unwrap_or(""),
            unit.content
        )
        .to_lowercase();

        if let Some(ext) = unit.extension() {
            if !GENERIC_EXTENSIONS.contains(&ext.as_str()) {
                if let Some(bucket) = BUCKETS.iter().find(|b| b.extensions.contains(&ext.as_str())) {
                    return Classification {
                        bucket: bucket.name,
                        subfolder: bucket.subfolder_for(&haystack),
                        reason: format!("extension .{}", ext),
                    };
                }
            }
        }

        let mut best: Option<(&Bucket, usize)> = None;
        for bucket in BUCKETS {
            let hits = bucket.keyword_hits(&haystack);
            if hits > 0 && best.map(|(_, h)| hits > h).unwrap_or(true) {
                best = Some((bucket, hits));
            }
        }

        match best {
            Some((bucket, hits)) => Classification {
                bucket: bucket.name,
                subfolder: bucket.subfolder_for(&haystack),
                reason: format!("{} keyword match(es)", hits),
            },
            None => {
                let bucket = default_bucket();
                Classification {
                    bucket: bucket.name,
                    subfolder: bucket.subfolder_for(&haystack),
                    reason: "no signal, default bucket".to_string(),
                }
            }
        }
    }

    /// Build the safe decision for a unit. Never fails.
    pub fn build_safe_decision(&self, unit: &ContentUnit) -> Decision {
        let class = self.classify(unit);
        let filename = self.filename_for(unit);

        Decision {
            content_type: class.bucket.to_string(),
            confidence: self.confidence,
            folder_plan: vec![
                FolderSpec::new(
                    class.bucket,
                    format!("{} content", class.bucket),
                    "Fallback bucket",
                ),
                FolderSpec::new(
                    class.subfolder,
                    format!("{} in {}", class.subfolder, class.bucket),
                    "Fallback subfolder",
                )
                .with_parent(class.bucket),
            ],
            file_placement: FilePlacement {
                filename,
                folder_path: format!("{}/{}", class.bucket, class.subfolder),
                content_type: class.bucket.to_string(),
                reasoning: format!("Fallback classification by {}", class.reason),
            },
            cross_references: Vec::new(),
            promotion_suggestion: None,
            reasoning: format!(
                "Rule-based fallback placed content in {}/{} ({})",
                class.bucket, class.subfolder, class.reason
            ),
            origin: Origin::Fallback,
            requires_manual_review: false,
        }
    }

    /// Sanitized hint, or a name derived from the first line of content.
    fn filename_for(&self, unit: &ContentUnit) -> String {
        let raw = match &unit.filename_hint {
            Some(hint) => hint.clone(),
            None => {
                let first_line = unit
                    .content
                    .lines()
                    .map(|l| l.trim().trim_start_matches('#').trim())
                    .find(|l| !l.is_empty() && !l.starts_with("```"))
                    .unwrap_or("");
                let stem: String = slugify(first_line).chars().take(DERIVED_STEM_CHARS).collect();
                format!("{}.{}", stem.trim_end_matches('-'), DEFAULT_EXTENSION)
            }
        };
        sanitize_filename(&raw, self.max_filename_length)
    }
}

fn default_bucket() -> &'static Bucket {
    // DEFAULT_BUCKET is always present in BUCKETS.
    BUCKETS
        .iter()
        .find(|b| b.name == DEFAULT_BUCKET)
        .unwrap_or(&BUCKETS[BUCKETS.len() - 1])
}

/// Last-resort placement into emergency storage, flagged for review.
pub fn emergency_decision(now: DateTime<Utc>) -> Decision {
    let stamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    Decision {
        content_type: "unclassified".to_string(),
        confidence: 0.0,
        folder_plan: vec![FolderSpec::new(
            EMERGENCY_FOLDER,
            "Content that could not be organized",
            "Holding area for manual review",
        )],
        file_placement: FilePlacement {
            filename: format!("{}.{}", stamp, DEFAULT_EXTENSION),
            folder_path: EMERGENCY_FOLDER.to_string(),
            content_type: "unclassified".to_string(),
            reasoning: "Every other strategy failed".to_string(),
        },
        cross_references: Vec::new(),
        promotion_suggestion: None,
        reasoning: "Emergency placement; a human must file this content".to_string(),
        origin: Origin::EmergencyFallback,
        requires_manual_review: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ResponseValidator;
    use chrono::TimeZone;

    fn provider() -> FallbackProvider {
        FallbackProvider::new(&ValidationRules::default())
    }

    #[test]
    fn test_python_snippet_goes_to_code() {
        let unit = ContentUnit::new("```python\ndef f(): pass\n```").with_filename("util.py");
        let decision = provider().build_safe_decision(&unit);

        assert_eq!(decision.content_type, "code");
        assert_eq!(decision.file_placement.folder_path, "code/snippets");
        assert_eq!(decision.file_placement.filename, "util.py");
        assert_eq!(decision.origin, Origin::Fallback);
        assert!(decision.cross_references.is_empty());
    }

    #[test]
    fn test_fallback_decision_passes_validation() {
        let unit = ContentUnit::new("```python\ndef f(): pass\n```").with_filename("util.py");
        let decision = provider().build_safe_decision(&unit);
        assert!(ResponseValidator::default().validate_decision(&decision).is_ok());
    }

    #[test]
    fn test_mermaid_is_a_diagram_not_code() {
        let unit = ContentUnit::new("```mermaid\nflowchart LR\nA-->B\n```");
        let class = provider().classify(&unit);
        assert_eq!(class.bucket, "diagrams");
        assert_eq!(class.subfolder, "flowcharts");
    }

    #[test]
    fn test_generic_extension_uses_keywords() {
        let unit = ContentUnit::new("Benchmark results and metrics for Q3").with_filename("q3.md");
        assert_eq!(provider().classify(&unit).bucket, "analysis");
    }

    #[test]
    fn test_default_bucket() {
        let unit = ContentUnit::new("lorem ipsum dolor sit amet");
        let decision = provider().build_safe_decision(&unit);
        assert_eq!(decision.content_type, DEFAULT_BUCKET);
        assert_eq!(decision.file_placement.folder_path, "documentation/general");
        assert_eq!(decision.file_placement.filename, "lorem-ipsum-dolor-sit-amet.md");
    }

    #[test]
    fn test_subfolder_keyword_selection() {
        let unit = ContentUnit::new("#!/usr/bin/env bash\necho hi").with_filename("deploy.sh");
        assert_eq!(provider().classify(&unit).subfolder, "scripts");
    }

    #[test]
    fn test_filename_is_sanitized() {
        let unit = ContentUnit::new("notes").with_filename("my: notes?");
        let decision = provider().build_safe_decision(&unit);
        assert_eq!(decision.file_placement.filename, "my-notes.md");
    }

    #[test]
    fn test_confidence_respects_floor() {
        let rules = ValidationRules {
            confidence_floor: 0.65,
            ..ValidationRules::default()
        };
        let decision = FallbackProvider::new(&rules).build_safe_decision(&ContentUnit::new("x"));
        assert!((decision.confidence - 0.65).abs() < f64::EPSILON);
    }

    #[test]
    fn test_emergency_decision() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let decision = emergency_decision(now);
        assert_eq!(
            decision.target_path(),
            "emergency_storage/20260304T050607Z.md"
        );
        assert!(decision.requires_manual_review);
        assert_eq!(decision.origin, Origin::EmergencyFallback);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_fallback_is_idempotent(content in ".{0,200}", hint in proptest::option::of("[a-zA-Z0-9 ._-]{1,40}")) {
                let mut unit = ContentUnit::new(content);
                if let Some(h) = hint {
                    unit = unit.with_filename(h);
                }
                let a = provider().build_safe_decision(&unit);
                let b = provider().build_safe_decision(&unit);
                prop_assert_eq!(a.target_path(), b.target_path());
                prop_assert_eq!(a.folder_plan, b.folder_plan);
            }

            #[test]
            fn prop_fallback_always_validates(content in ".{0,200}", hint in proptest::option::of(".{1,60}")) {
                let mut unit = ContentUnit::new(content);
                if let Some(h) = hint {
                    unit = unit.with_filename(h);
                }
                let decision = provider().build_safe_decision(&unit);
                prop_assert!(ResponseValidator::default().validate_decision(&decision).is_ok());
            }
        }
    }
}

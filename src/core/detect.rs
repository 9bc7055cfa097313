//! Content type detection.
//!
//! Scores a content unit against registered type patterns. Detection is a
//! pure function of the input and the pattern list: no I/O, no state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::content::ContentUnit;

/// Weight of the keyword match ratio.
pub const KEYWORD_WEIGHT: f64 = 0.4;
/// Weight of the context phrase match ratio.
pub const CONTEXT_WEIGHT: f64 = 0.3;
/// Weight of the content indicator match ratio.
pub const INDICATOR_WEIGHT: f64 = 0.2;
/// Weight of the file extension match.
pub const EXTENSION_WEIGHT: f64 = 0.1;

/// Type name reported when no pattern scores above zero.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Signals that identify one content type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypePattern {
    /// Type name (usually the name of the template that handles it).
    pub type_name: String,
    /// Words expected in the content.
    pub keywords: Vec<String>,
    /// Phrases expected in the context values.
    pub context_phrases: Vec<String>,
    /// Structural markers expected in the content (fences, headings, ...).
    pub content_indicators: Vec<String>,
    /// File extensions (without dot) typical for the type.
    pub file_extensions: Vec<String>,
}

impl TypePattern {
    /// Create a pattern with only a type name.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    /// Set keywords.
    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set context phrases.
    pub fn with_context_phrases(mut self, phrases: &[&str]) -> Self {
        self.context_phrases = phrases.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set content indicators.
    pub fn with_indicators(mut self, indicators: &[&str]) -> Self {
        self.content_indicators = indicators.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set file extensions.
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.file_extensions = extensions.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Score a unit against this pattern.
    ///
    /// Each signal scores `matched / defined`. Keywords always count. Context
    /// phrases, indicators and the extension join the weighted average only
    /// where they raise it, so a signal without hits (or without input to
    /// match, such as a unit with no filename) never lowers the score. A unit
    /// that matches every signal fully scores 1.0.
    pub fn score(&self, unit: &ContentUnit) -> f64 {
        let content = unit.content.to_lowercase();
        let context = unit.context_text().to_lowercase();

        let mut weighted = 0.0;
        let mut applicable = 0.0;

        if !self.keywords.is_empty() {
            weighted += KEYWORD_WEIGHT * match_ratio(&self.keywords, &content);
            applicable += KEYWORD_WEIGHT;
        }

        // (weight, ratio) of the optional signals that matched something.
        let mut optional: Vec<(f64, f64)> = Vec::with_capacity(3);
        if !context.trim().is_empty() {
            optional.push((CONTEXT_WEIGHT, match_ratio(&self.context_phrases, &context)));
        }
        optional.push((INDICATOR_WEIGHT, match_ratio(&self.content_indicators, &content)));
        if let Some(ext) = unit.extension() {
            let hit = self
                .file_extensions
                .iter()
                .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext));
            optional.push((EXTENSION_WEIGHT, if hit { 1.0 } else { 0.0 }));
        }
        optional.retain(|(_, ratio)| *ratio > 0.0);
        optional.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        // Taking signals best-first while they beat the running average
        // yields the highest average reachable from the keyword baseline.
        for (weight, ratio) in optional {
            if applicable > 0.0 && ratio <= weighted / applicable {
                break;
            }
            weighted += weight * ratio;
            applicable += weight;
        }

        if applicable == 0.0 {
            return 0.0;
        }

        (weighted / applicable).clamp(0.0, 1.0)
    }
}

/// Fraction of needles found in the (lowercased) haystack.
fn match_ratio(needles: &[String], haystack: &str) -> f64 {
    if needles.is_empty() {
        return 0.0;
    }
    let hits = needles
        .iter()
        .filter(|n| !n.is_empty() && haystack.contains(&n.to_lowercase()))
        .count();
    hits as f64 / needles.len() as f64
}

/// Outcome of a detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Best-scoring type, or `unknown`.
    pub content_type: String,
    /// Score of the best type.
    pub confidence: f64,
    /// Score of every registered type.
    pub all_scores: BTreeMap<String, f64>,
    /// Whether the score reached the template threshold.
    pub use_template: bool,
}

impl Detection {
    /// Whether any pattern matched at all.
    pub fn is_unknown(&self) -> bool {
        self.content_type == UNKNOWN_TYPE
    }
}

/// Scores content against an ordered list of type patterns.
#[derive(Debug, Clone)]
pub struct TypeDetector {
    patterns: Vec<TypePattern>,
    threshold: f64,
}

impl TypeDetector {
    /// Create a detector from patterns in declaration order.
    pub fn new(patterns: Vec<TypePattern>, threshold: f64) -> Self {
        Self {
            patterns,
            threshold,
        }
    }

    /// Template threshold in use.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Registered patterns, in declaration order.
    pub fn patterns(&self) -> &[TypePattern] {
        &self.patterns
    }

    /// Detect the content type of a unit.
    ///
    /// Ties go to the pattern declared first.
    pub fn detect(&self, unit: &ContentUnit) -> Detection {
        let mut all_scores = BTreeMap::new();
        let mut best: Option<(&str, f64)> = None;

        for pattern in &self.patterns {
            let score = pattern.score(unit);
            all_scores.insert(pattern.type_name.clone(), score);

            let better = match best {
                Some((_, best_score)) => score > best_score,
                None => true,
            };
            if better {
                best = Some((&pattern.type_name, score));
            }
        }

        match best {
            Some((name, score)) if score > 0.0 => Detection {
                content_type: name.to_string(),
                confidence: score,
                all_scores,
                use_template: score >= self.threshold,
            },
            _ => Detection {
                content_type: UNKNOWN_TYPE.to_string(),
                confidence: 0.0,
                all_scores,
                use_template: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coding() -> TypePattern {
        TypePattern::new("coding")
            .with_keywords(&["function", "bug", "test", "refactor"])
            .with_context_phrases(&["implement", "fix"])
            .with_indicators(&["```", "fn "])
            .with_extensions(&["rs", "py"])
    }

    fn research() -> TypePattern {
        TypePattern::new("research")
            .with_keywords(&["study", "sources", "findings", "hypothesis"])
            .with_indicators(&["## References"])
    }

    #[test]
    fn test_every_signal_full_scores_one() {
        let unit = ContentUnit::new("function bug test refactor\n```\nfn main() {}\n```")
            .with_filename("main.rs")
            .with_context("task", "implement and fix the parser");
        assert!((coding().score(&unit) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_signals_join_only_when_they_raise_the_score() {
        let unit = ContentUnit::new("A function with a bug.\n```\nfn main() {}\n```")
            .with_filename("main.rs")
            .with_context("task", "fix the parser");

        // keywords 2/4 baseline; indicators 2/2 and the extension raise it,
        // context 1/2 would pull it back down and is left out.
        let expected = (0.4 * 0.5 + 0.2 * 1.0 + 0.1) / 0.7;
        assert!((coding().score(&unit) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_missing_context_and_filename_do_not_penalize() {
        let unit = ContentUnit::new("function bug test refactor ``` fn x");
        assert!((coding().score(&unit) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_misses_do_not_penalize_keywords() {
        let content = "function bug test refactor";
        let bare = coding().score(&ContentUnit::new(content));
        assert!((bare - 1.0).abs() < 1e-9);

        let unit = ContentUnit::new(content)
            .with_filename("a.md")
            .with_context("task", "login");
        assert!((coding().score(&unit) - bare).abs() < 1e-9);
    }

    #[test]
    fn test_partial_indicator_hit_does_not_lower_score() {
        let plain = ContentUnit::new("function bug test");
        let fenced = ContentUnit::new("function bug test\n```text\nok\n```");
        assert!(coding().score(&fenced) >= coding().score(&plain));
    }

    #[test]
    fn test_pattern_without_keywords_scores_from_other_signals() {
        let pattern = TypePattern::new("diagram").with_indicators(&["graph td"]);
        assert!((pattern.score(&ContentUnit::new("graph TD; a-->b")) - 1.0).abs() < 1e-9);
        assert_eq!(pattern.score(&ContentUnit::new("nothing here")), 0.0);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let unit = ContentUnit::new("STUDY of SOURCES");
        assert!(research().score(&unit) > 0.0);
    }

    #[test]
    fn test_detect_picks_best_and_reports_all_scores() {
        let detector = TypeDetector::new(vec![coding(), research()], 0.7);
        let unit = ContentUnit::new("Our study of sources produced findings.\n## References");

        let detection = detector.detect(&unit);
        assert_eq!(detection.content_type, "research");
        assert_eq!(detection.all_scores.len(), 2);
        assert!(detection.all_scores["coding"] < detection.confidence);
    }

    #[test]
    fn test_use_template_respects_threshold() {
        let unit = ContentUnit::new("study sources findings hypothesis ## References");
        let strict = TypeDetector::new(vec![research()], 1.0);
        let lenient = TypeDetector::new(vec![research()], 0.5);

        assert!(strict.detect(&unit).use_template);
        assert!(lenient.detect(&unit).use_template);

        let partial = ContentUnit::new("study");
        assert!(!strict.detect(&partial).use_template);
    }

    #[test]
    fn test_tie_goes_to_first_declared() {
        let a = TypePattern::new("alpha").with_keywords(&["shared"]);
        let b = TypePattern::new("beta").with_keywords(&["shared"]);
        let unit = ContentUnit::new("shared");

        let detection = TypeDetector::new(vec![a.clone(), b.clone()], 0.7).detect(&unit);
        assert_eq!(detection.content_type, "alpha");

        let detection = TypeDetector::new(vec![b, a], 0.7).detect(&unit);
        assert_eq!(detection.content_type, "beta");
    }

    #[test]
    fn test_unknown_when_nothing_matches() {
        let detector = TypeDetector::new(vec![coding(), research()], 0.7);
        let detection = detector.detect(&ContentUnit::new("lorem ipsum"));
        assert!(detection.is_unknown());
        assert_eq!(detection.confidence, 0.0);
        assert!(!detection.use_template);
    }

    #[test]
    fn test_unknown_with_no_patterns() {
        let detection = TypeDetector::new(vec![], 0.7).detect(&ContentUnit::new("anything"));
        assert!(detection.is_unknown());
        assert!(detection.all_scores.is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_score_is_bounded(content in ".{0,200}", ctx in ".{0,40}", ext in "[a-z]{0,4}") {
                let unit = ContentUnit::new(content)
                    .with_context("task", ctx)
                    .with_filename(format!("file.{}", ext));
                let score = coding().score(&unit);
                prop_assert!((0.0..=1.0).contains(&score));
            }

            #[test]
            fn prop_extra_signals_never_lower_score(content in "[a-z `]{0,80}", ext in "[a-z]{1,4}") {
                let bare = coding().score(&ContentUnit::new(content.clone()));
                let hinted = coding().score(
                    &ContentUnit::new(content)
                        .with_filename(format!("file.{}", ext))
                        .with_context("task", "notes"),
                );
                prop_assert!(hinted + 1e-9 >= bare);
            }

            #[test]
            fn prop_detection_is_deterministic(content in ".{0,200}") {
                let detector = TypeDetector::new(vec![coding(), research()], 0.7);
                let unit = ContentUnit::new(content);
                prop_assert_eq!(detector.detect(&unit), detector.detect(&unit));
            }
        }
    }
}

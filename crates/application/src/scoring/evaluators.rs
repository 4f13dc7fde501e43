//! Deterministic scorers.
//!
//! Every scorer here is total: malformed output, a missing expected value or
//! an unusable pattern degrade to score 0 with a reason, never a panic or an
//! error flag.

use async_trait::async_trait;
use llm_leaderboard_domain::{ScoreResult, ScorerDefinition, ScorerKind, TestCase};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-?\d[\d,]*(?:\.\d+)?(?:[eE][-+]?\d+)?|-?\.\d+").expect("number pattern is valid")
});

static LOCATOR_CORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)*").expect("locator pattern is valid"));

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n?(.*?)\n?\s*```\s*$").expect("fence pattern is valid")
});

/// What a scorer sees for one test case
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub test_case: &'a TestCase,
    pub output: &'a str,
}

impl<'a> ScoringInput<'a> {
    pub fn new(test_case: &'a TestCase, output: &'a str) -> Self {
        Self { test_case, output }
    }

    pub fn expected(&self) -> &'a str {
        &self.test_case.expected
    }
}

/// A scorer produces exactly one result per call and never fails.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, input: &ScoringInput<'_>) -> ScoreResult;

    /// Name recorded on every result
    fn name(&self) -> &str;
}

/// Build the deterministic scorer for `definition`; `None` for judge kinds
pub fn deterministic_scorer(definition: &ScorerDefinition) -> Option<Arc<dyn Scorer>> {
    let name = definition.name.clone();
    let scorer: Arc<dyn Scorer> = match &definition.kind {
        ScorerKind::ExactMatch { case_sensitive } => Arc::new(ExactMatchScorer {
            name,
            case_sensitive: *case_sensitive,
        }),
        ScorerKind::FuzzyMatch { threshold } => Arc::new(FuzzyMatchScorer {
            name,
            threshold: *threshold,
        }),
        ScorerKind::KeyPhrases => Arc::new(KeyPhraseScorer { name }),
        ScorerKind::RegexMatch => Arc::new(RegexMatchScorer { name }),
        ScorerKind::NumericTolerance {
            tolerance,
            relative,
        } => Arc::new(NumericToleranceScorer {
            name,
            tolerance: *tolerance,
            relative: *relative,
        }),
        ScorerKind::JsonStructure => Arc::new(JsonStructureScorer { name }),
        ScorerKind::ReferenceCitation => Arc::new(ReferenceCitationScorer { name }),
        ScorerKind::Judge { .. } => return None,
    };
    Some(scorer)
}

fn normalize(text: &str, case_sensitive: bool) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if case_sensitive {
        collapsed
    } else {
        collapsed.to_lowercase()
    }
}

/// Exact match evaluator.
pub struct ExactMatchScorer {
    name: String,
    case_sensitive: bool,
}

#[async_trait]
impl Scorer for ExactMatchScorer {
    #[instrument(skip_all, fields(scorer = %self.name))]
    async fn score(&self, input: &ScoringInput<'_>) -> ScoreResult {
        if input.expected().trim().is_empty() {
            return ScoreResult::zero_with_reason(&self.name, "no expected value to compare");
        }

        let actual = normalize(input.output, self.case_sensitive);
        let expected = normalize(input.expected(), self.case_sensitive);
        let matches = actual == expected;

        debug!(matches, "Exact match evaluation");

        let result = ScoreResult::new(&self.name, if matches { 1.0 } else { 0.0 })
            .with_detail("case_sensitive", self.case_sensitive);
        if matches {
            result
        } else {
            result.with_reason("output differs from expected")
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fuzzy match evaluator using Levenshtein distance.
pub struct FuzzyMatchScorer {
    name: String,
    threshold: f64,
}

impl FuzzyMatchScorer {
    /// Calculate Levenshtein distance between two strings.
    fn levenshtein_distance(s1: &str, s2: &str) -> usize {
        let s1_chars: Vec<char> = s1.chars().collect();
        let s2_chars: Vec<char> = s2.chars().collect();
        let (len1, len2) = (s1_chars.len(), s2_chars.len());

        if len1 == 0 {
            return len2;
        }
        if len2 == 0 {
            return len1;
        }

        let mut previous: Vec<usize> = (0..=len2).collect();
        let mut current = vec![0; len2 + 1];

        for i in 1..=len1 {
            current[0] = i;
            for j in 1..=len2 {
                let cost = usize::from(s1_chars[i - 1] != s2_chars[j - 1]);
                current[j] = (previous[j] + 1)
                    .min(current[j - 1] + 1)
                    .min(previous[j - 1] + cost);
            }
            std::mem::swap(&mut previous, &mut current);
        }

        previous[len2]
    }

    /// Calculate similarity score (0.0 to 1.0) from Levenshtein distance.
    fn similarity(s1: &str, s2: &str) -> f64 {
        let max_len = s1.chars().count().max(s2.chars().count());
        if max_len == 0 {
            return 1.0;
        }
        1.0 - (Self::levenshtein_distance(s1, s2) as f64 / max_len as f64)
    }
}

#[async_trait]
impl Scorer for FuzzyMatchScorer {
    #[instrument(skip_all, fields(scorer = %self.name))]
    async fn score(&self, input: &ScoringInput<'_>) -> ScoreResult {
        if input.expected().trim().is_empty() {
            return ScoreResult::zero_with_reason(&self.name, "no expected value to compare");
        }

        let actual = normalize(input.output, false);
        let expected = normalize(input.expected(), false);
        let similarity = Self::similarity(&actual, &expected);

        debug!(similarity, threshold = self.threshold, "Fuzzy match evaluation");

        ScoreResult::new(&self.name, similarity)
            .with_detail("similarity", similarity)
            .with_detail("threshold", self.threshold)
            .with_detail("passed", similarity >= self.threshold)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fraction of the test case's key phrases present in the output
pub struct KeyPhraseScorer {
    name: String,
}

#[async_trait]
impl Scorer for KeyPhraseScorer {
    #[instrument(skip_all, fields(scorer = %self.name))]
    async fn score(&self, input: &ScoringInput<'_>) -> ScoreResult {
        let phrases = &input.test_case.metadata.key_phrases;
        if phrases.is_empty() {
            return ScoreResult::zero_with_reason(&self.name, "no key phrases to look for");
        }

        let haystack = normalize(input.output, false);
        let (found, missing): (Vec<&String>, Vec<&String>) = phrases
            .iter()
            .partition(|phrase| haystack.contains(&normalize(phrase, false)));

        let score = found.len() as f64 / phrases.len() as f64;
        debug!(found = found.len(), total = phrases.len(), "Key phrase evaluation");

        ScoreResult::new(&self.name, score)
            .with_detail("found", &found)
            .with_detail("missing", &missing)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Regex match evaluator; the pattern comes from the test case metadata.
pub struct RegexMatchScorer {
    name: String,
}

#[async_trait]
impl Scorer for RegexMatchScorer {
    #[instrument(skip_all, fields(scorer = %self.name))]
    async fn score(&self, input: &ScoringInput<'_>) -> ScoreResult {
        let Some(pattern) = input.test_case.metadata.pattern.as_deref() else {
            return ScoreResult::zero_with_reason(&self.name, "no pattern to match");
        };

        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                return ScoreResult::zero_with_reason(&self.name, format!("invalid pattern: {}", e))
            }
        };

        let matched = regex.find(input.output).map(|m| m.as_str().to_string());
        let result = ScoreResult::new(&self.name, if matched.is_some() { 1.0 } else { 0.0 })
            .with_detail("pattern", pattern);
        match matched {
            Some(text) => result.with_detail("matched", text),
            None => result.with_reason("pattern not found in output"),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Numeric comparison evaluator with tolerance.
pub struct NumericToleranceScorer {
    name: String,
    tolerance: f64,
    relative: bool,
}

/// The whole text as a number, or else the last number written in it
fn extract_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<f64>() {
        return n.is_finite().then_some(n);
    }
    NUMBER
        .find_iter(trimmed)
        .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .last()
}

#[async_trait]
impl Scorer for NumericToleranceScorer {
    #[instrument(skip_all, fields(scorer = %self.name))]
    async fn score(&self, input: &ScoringInput<'_>) -> ScoreResult {
        let Some(expected) = extract_number(input.expected()) else {
            return ScoreResult::zero_with_reason(&self.name, "expected value is not a number");
        };
        let Some(actual) = extract_number(input.output) else {
            return ScoreResult::zero_with_reason(&self.name, "no number found in output");
        };

        let tolerance = self.tolerance.abs();
        let diff = (actual - expected).abs();
        let within_tolerance = if self.relative {
            let relative_diff = if expected.abs() > f64::EPSILON {
                diff / expected.abs()
            } else {
                diff
            };
            relative_diff <= tolerance
        } else {
            diff <= tolerance
        };

        let score = if within_tolerance {
            1.0
        } else {
            // linear decay out to ten tolerances
            let max_diff = if self.relative {
                expected.abs() * tolerance * 10.0
            } else {
                tolerance * 10.0
            };
            if max_diff > 0.0 {
                (1.0 - diff / max_diff).max(0.0)
            } else {
                0.0
            }
        };

        debug!(actual, expected, diff, within_tolerance, "Numeric tolerance evaluation");

        ScoreResult::new(&self.name, score)
            .with_detail("actual_value", actual)
            .with_detail("expected_value", expected)
            .with_detail("difference", diff)
            .with_detail("within_tolerance", within_tolerance)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Structural JSON check.
///
/// The output must parse as JSON (a surrounding code fence is tolerated).
/// When the expected value is a JSON schema fragment (`type`, `required`)
/// the score is the share of checks that pass; when it is a JSON template,
/// the share of its top-level keys present with the same JSON type.
pub struct JsonStructureScorer {
    name: String,
}

pub(crate) fn strip_code_fence(text: &str) -> &str {
    CODE_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_schema(value: &Value) -> bool {
    value
        .as_object()
        .map(|o| o.contains_key("required") || o.get("type").map_or(false, Value::is_string))
        .unwrap_or(false)
}

fn schema_checks(actual: &Value, schema: &Value) -> (usize, usize) {
    let mut passed = 0;
    let mut total = 0;

    if let Some(expected_type) = schema.get("type").and_then(Value::as_str) {
        total += 1;
        let actual_type = json_type(actual);
        if actual_type == expected_type || (expected_type == "integer" && actual.is_i64()) {
            passed += 1;
        }
    }

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();
    for key in required {
        total += 1;
        if actual.get(key).is_some() {
            passed += 1;
        }
    }

    (passed, total)
}

fn template_checks(actual: &Value, template: &Value) -> (usize, usize) {
    match template.as_object() {
        Some(keys) if !keys.is_empty() => {
            let passed = keys
                .iter()
                .filter(|(key, expected)| {
                    actual
                        .get(key.as_str())
                        .map_or(false, |v| json_type(v) == json_type(expected))
                })
                .count();
            (passed, keys.len())
        }
        _ => (usize::from(json_type(actual) == json_type(template)), 1),
    }
}

#[async_trait]
impl Scorer for JsonStructureScorer {
    #[instrument(skip_all, fields(scorer = %self.name))]
    async fn score(&self, input: &ScoringInput<'_>) -> ScoreResult {
        let actual: Value = match serde_json::from_str(strip_code_fence(input.output)) {
            Ok(v) => v,
            Err(e) => {
                return ScoreResult::zero_with_reason(&self.name, "output is not valid JSON")
                    .with_detail("parse_error", e.to_string());
            }
        };

        let expected = input.expected().trim();
        if expected.is_empty() {
            return ScoreResult::new(&self.name, 1.0).with_detail("checks", 0);
        }

        let template: Value = match serde_json::from_str(expected) {
            Ok(v) => v,
            Err(_) => {
                return ScoreResult::zero_with_reason(&self.name, "expected value is not JSON");
            }
        };

        let (passed, total) = if is_schema(&template) {
            schema_checks(&actual, &template)
        } else {
            template_checks(&actual, &template)
        };
        let score = if total == 0 {
            1.0
        } else {
            passed as f64 / total as f64
        };

        debug!(passed, total, "JSON structure evaluation");

        ScoreResult::new(&self.name, score)
            .with_detail("checks", total)
            .with_detail("passed_checks", passed)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Checks that the output cites the test case's reference locator.
///
/// The full locator scores 1.0; only its numeric core (`2.1` for `§2.1`)
/// scores 0.5.
pub struct ReferenceCitationScorer {
    name: String,
}

#[async_trait]
impl Scorer for ReferenceCitationScorer {
    #[instrument(skip_all, fields(scorer = %self.name))]
    async fn score(&self, input: &ScoringInput<'_>) -> ScoreResult {
        let Some(reference) = input.test_case.metadata.reference.as_deref() else {
            return ScoreResult::zero_with_reason(&self.name, "no reference locator");
        };

        let output = normalize(input.output, false);
        let locator = normalize(reference, false);
        if !locator.is_empty() && output.contains(&locator) {
            return ScoreResult::new(&self.name, 1.0).with_detail("cited", reference);
        }

        let core = LOCATOR_CORE.find(&locator).map(|m| m.as_str());
        let partial = core.map_or(false, |core| {
            NUMBER
                .find_iter(&output)
                .any(|m| m.as_str().trim_end_matches('.') == core)
        });

        if partial {
            ScoreResult::new(&self.name, 0.5)
                .with_detail("cited", core)
                .with_reason("locator cited without its prefix")
        } else {
            ScoreResult::zero_with_reason(&self.name, format!("reference {} not cited", reference))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

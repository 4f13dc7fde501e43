//! Test cases, scorer definitions and evaluation definitions.

use crate::identifiers::EvaluationId;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Individual test case within an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub input: String,
    /// Reference value the output is compared against. May be empty for
    /// scorers that only look at metadata.
    #[serde(default)]
    pub expected: String,
    #[serde(default)]
    pub metadata: ScorerMetadata,
}

impl TestCase {
    pub fn new(id: impl Into<String>, input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            expected: expected.into(),
            metadata: ScorerMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: ScorerMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Scorer-specific inputs attached to a test case.
///
/// Each field belongs to the scorer kinds that declare it in
/// [`ScorerKind::required_metadata`]; presence is checked per scorer and
/// content is checked with [`Validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ScorerMetadata {
    /// Locator of the source passage the answer must cite (e.g. "§2.1")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub reference: Option<String>,

    /// Phrases a good answer is expected to mention
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[validate(custom = "validate_phrases")]
    pub key_phrases: Vec<String>,

    /// Regular expression the output must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub pattern: Option<String>,

    /// Persona the model was asked to adopt, shown to judge scorers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 2000))]
    pub persona: Option<String>,
}

fn validate_phrases(phrases: &Vec<String>) -> Result<(), ValidationError> {
    if phrases.iter().any(|p| p.trim().is_empty()) {
        return Err(ValidationError::new("empty_key_phrase"));
    }
    Ok(())
}

/// Metadata fields a scorer kind depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Reference,
    KeyPhrases,
    Pattern,
    Persona,
}

impl MetadataField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::KeyPhrases => "key_phrases",
            Self::Pattern => "pattern",
            Self::Persona => "persona",
        }
    }
}

impl ScorerMetadata {
    /// Whether a field is present and non-empty
    pub fn has(&self, field: MetadataField) -> bool {
        match field {
            MetadataField::Reference => self.reference.is_some(),
            MetadataField::KeyPhrases => !self.key_phrases.is_empty(),
            MetadataField::Pattern => self.pattern.is_some(),
            MetadataField::Persona => self.persona.is_some(),
        }
    }

    /// Check the contract of one scorer kind against this metadata.
    ///
    /// Returns a human-readable violation, or `None` when the metadata is
    /// usable by that scorer.
    pub fn contract_violation(&self, kind: &ScorerKind) -> Option<String> {
        // only the fields this kind reads can disqualify it
        if let Err(errors) = self.validate() {
            let field_errors = errors.field_errors();
            let invalid: Vec<&str> = kind
                .checked_metadata()
                .into_iter()
                .map(|field| field.as_str())
                .filter(|name| field_errors.contains_key(name))
                .collect();
            if !invalid.is_empty() {
                return Some(format!("invalid scorer metadata: {}", invalid.join(", ")));
            }
        }
        let missing: Vec<&str> = kind
            .required_metadata()
            .iter()
            .filter(|field| !self.has(**field))
            .map(MetadataField::as_str)
            .collect();
        if missing.is_empty() {
            None
        } else {
            Some(format!("missing scorer metadata: {}", missing.join(", ")))
        }
    }
}

/// What a scorer does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScorerKind {
    ExactMatch {
        #[serde(default)]
        case_sensitive: bool,
    },
    FuzzyMatch {
        #[serde(default = "default_fuzzy_threshold")]
        threshold: f64,
    },
    KeyPhrases,
    RegexMatch,
    NumericTolerance {
        tolerance: f64,
        #[serde(default)]
        relative: bool,
    },
    JsonStructure,
    ReferenceCitation,
    Judge {
        rubric: String,
        criteria: Vec<String>,
    },
}

fn default_fuzzy_threshold() -> f64 {
    0.8
}

impl ScorerKind {
    /// Metadata fields this kind cannot work without
    pub fn required_metadata(&self) -> &'static [MetadataField] {
        match self {
            Self::KeyPhrases => &[MetadataField::KeyPhrases],
            Self::RegexMatch => &[MetadataField::Pattern],
            Self::ReferenceCitation => &[MetadataField::Reference],
            _ => &[],
        }
    }

    /// Metadata fields this kind reads, required or not
    pub fn checked_metadata(&self) -> Vec<MetadataField> {
        let mut fields = self.required_metadata().to_vec();
        if self.is_judge() {
            fields.push(MetadataField::Persona);
        }
        fields
    }

    /// Whether this kind calls out to a reasoning provider
    pub fn is_judge(&self) -> bool {
        matches!(self, Self::Judge { .. })
    }
}

/// A named scorer attached to an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerDefinition {
    pub name: String,
    pub kind: ScorerKind,
}

impl ScorerDefinition {
    pub fn new(name: impl Into<String>, kind: ScorerKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A battery of test cases scored by a fixed set of scorers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDefinition {
    pub id: EvaluationId,
    pub name: String,
    /// Sub-variant sharing the evaluation (e.g. one persona out of several)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub test_cases: Vec<TestCase>,
    pub scorers: Vec<ScorerDefinition>,
}

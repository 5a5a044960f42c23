use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{ConsultError, Result};
use crate::sections::Section;

/// One step of the fixed four-step consulting workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Welcome,
    ProblemDefinition,
    DataCollection,
    Analysis,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Welcome,
        Stage::ProblemDefinition,
        Stage::DataCollection,
        Stage::Analysis,
    ];

    /// The only stage this one may advance to
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Welcome => Some(Stage::ProblemDefinition),
            Stage::ProblemDefinition => Some(Stage::DataCollection),
            Stage::DataCollection => Some(Stage::Analysis),
            Stage::Analysis => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Welcome => "welcome",
            Stage::ProblemDefinition => "problem_definition",
            Stage::DataCollection => "data_collection",
            Stage::Analysis => "analysis",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A full case document found for the problem statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedCase {
    #[serde(rename = "relative_path")]
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Number,
    Text,
    Date,
}

impl ValueKind {
    /// Models are asked for `number`, `text` or `date` but do not always comply
    pub fn from_model(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "number" | "numeric" | "integer" | "int" | "float" | "decimal" | "currency"
            | "percentage" | "percent" => ValueKind::Number,
            "date" | "datetime" => ValueKind::Date,
            _ => ValueKind::Text,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Number => "number",
            ValueKind::Text => "text",
            ValueKind::Date => "date",
        }
    }
}

/// One data point the workflow asks the user to supply or auto-extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ValueKind,
    pub required: bool,
}

/// A collected or extracted scalar. `null` is modelled as `Option::None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_blank(&self) -> bool {
        matches!(self, FieldValue::Text(text) if text.trim().is_empty())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(t) => f.write_str(t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Confidence {
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "LOW")]
    Low,
    #[default]
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl Confidence {
    pub fn from_model(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_ascii_uppercase()).as_deref() {
            Some("HIGH") => Confidence::High,
            Some("MEDIUM") => Confidence::Medium,
            Some("LOW") => Confidence::Low,
            _ => Confidence::NotAvailable,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
            Confidence::NotAvailable => "N/A",
        }
    }
}

/// A field value found in the corpus, with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedValue {
    pub value: Option<FieldValue>,
    pub source: String,
    pub confidence: Confidence,
    pub explanation: String,
    /// How many feedback-driven refinements produced this value
    #[serde(default)]
    pub refinements: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldState {
    Unresolved,
    Extracted,
    Refined,
    Final,
}

/// The generated recommendation and its pending per-section revisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub response: String,
    pub sections: Vec<Section>,
    #[serde(default)]
    pub revised_sections: BTreeMap<usize, String>,
}

impl AnalysisReport {
    pub fn current_sections(&self) -> Vec<Section> {
        apply_revisions(&self.sections, &self.revised_sections)
    }
}

/// Everything one consultation knows, persisted wholesale as a single JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub stage: Stage,
    pub problem: Option<String>,
    /// Corpus category filter for retrieval, `None` searches everything
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub retrieved_cases: Vec<RetrievedCase>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub revised_sections: BTreeMap<usize, String>,
    #[serde(default)]
    pub required_fields: Vec<FieldSpec>,
    #[serde(default)]
    pub collected_values: BTreeMap<String, Option<FieldValue>>,
    #[serde(default)]
    pub extracted_values: BTreeMap<String, ExtractedValue>,
    #[serde(default)]
    pub field_errors: BTreeMap<String, String>,
    #[serde(default)]
    pub extraction_started: bool,
    #[serde(default)]
    pub analysis: Option<AnalysisReport>,
    #[serde(default)]
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            stage: Stage::Welcome,
            problem: None,
            category: None,
            retrieved_cases: Vec::new(),
            sections: Vec::new(),
            revised_sections: BTreeMap::new(),
            required_fields: Vec::new(),
            collected_values: BTreeMap::new(),
            extracted_values: BTreeMap::new(),
            field_errors: BTreeMap::new(),
            extraction_started: false,
            analysis: None,
            status_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// "Start Over": a fresh welcome session under a new identifier
    pub fn restart(&self) -> Session {
        Session::new()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to the next stage. Stages never go backwards.
    pub fn advance(&mut self) -> Result<Stage> {
        let next = self.stage.next().ok_or_else(|| {
            ConsultError::Validation(format!("stage '{}' is terminal", self.stage))
        })?;
        self.stage = next;
        Ok(next)
    }

    pub fn problem(&self) -> Result<&str> {
        self.problem
            .as_deref()
            .ok_or_else(|| ConsultError::Validation("no problem statement in session".into()))
    }

    /// Framework sections with any pending revisions applied
    pub fn current_sections(&self) -> Vec<Section> {
        apply_revisions(&self.sections, &self.revised_sections)
    }

    /// Fold pending revisions into the stored framework
    pub fn finalize_sections(&mut self) {
        self.sections = self.current_sections();
        self.revised_sections.clear();
    }

    pub fn clear_framework(&mut self) {
        self.sections.clear();
        self.revised_sections.clear();
    }

    pub fn clear_requirements(&mut self) {
        self.required_fields.clear();
        self.extracted_values.clear();
        self.field_errors.clear();
        self.extraction_started = false;
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.required_fields.iter().find(|f| f.name == name)
    }

    pub fn field_state(&self, name: &str) -> FieldState {
        if self.collected_values.contains_key(name) {
            return FieldState::Final;
        }
        match self.extracted_values.get(name) {
            Some(extracted) if extracted.refinements > 0 => FieldState::Refined,
            Some(_) => FieldState::Extracted,
            None => FieldState::Unresolved,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_revisions(sections: &[Section], revisions: &BTreeMap<usize, String>) -> Vec<Section> {
    sections
        .iter()
        .enumerate()
        .map(|(i, section)| match revisions.get(&i) {
            Some(revised) => Section::new(section.title.clone(), revised.clone()),
            None => section.clone(),
        })
        .collect()
}

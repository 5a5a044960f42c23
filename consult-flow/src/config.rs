use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConsultError, Result};

pub const DEFAULT_MODEL: &str = "mistralai/mistral-large-2411";

/// How many results each corpus returns per search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalLimits {
    pub cases: usize,
    pub webpages: usize,
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            cases: 2,
            webpages: 7,
        }
    }
}

/// Sampling temperature per kind of completion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperatures {
    pub framework: f64,
    pub requirements: f64,
    pub extraction: f64,
    pub refinement: f64,
    pub analysis: f64,
}

impl Default for Temperatures {
    fn default() -> Self {
        Self {
            framework: 0.05,
            requirements: 0.1,
            extraction: 0.1,
            refinement: 0.3,
            analysis: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultConfig {
    pub model: String,
    #[serde(default)]
    pub limits: RetrievalLimits,
    #[serde(default)]
    pub temperatures: Temperatures,
}

impl Default for ConsultConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            limits: RetrievalLimits::default(),
            temperatures: Temperatures::default(),
        }
    }
}

/// A research item shown on the welcome screen that can start a consultation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCard {
    pub title: String,
    pub description: String,
    pub query: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TaskCard {
    /// The problem statement a card turns into
    pub fn problem_statement(&self) -> String {
        format!("{}: {}\nQuery: {}", self.title, self.description, self.query)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionGroup {
    pub category: String,
    pub challenges: Vec<String>,
}

/// Identity of the business being advised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub name: String,
    pub description: String,
    pub industry: String,
    pub location: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub quarter: Option<String>,
    #[serde(default)]
    pub motivation: Option<String>,
    #[serde(default)]
    pub task_cards: Vec<TaskCard>,
    #[serde(default)]
    pub suggestions: Vec<SuggestionGroup>,
}

impl BusinessProfile {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ConsultError::Config(format!("invalid business profile: {e}")))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            ConsultError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }
}

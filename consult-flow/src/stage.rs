use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    error::{ConsultError, Result},
    session::{FieldValue, Session, Stage},
};

/// Something the user asked the consultation to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UserAction {
    /// Show the current stage, generating its content on first view
    View,
    /// Begin with a free-text challenge
    StartConsultation {
        problem: String,
        #[serde(default)]
        category: Option<String>,
    },
    /// Begin with one of the business profile's research task cards
    StartTask {
        index: usize,
        #[serde(default)]
        category: Option<String>,
    },
    RefineSection {
        index: usize,
        feedback: String,
    },
    ConfirmFramework,
    RefineField {
        field: String,
        feedback: String,
    },
    SubmitData {
        values: BTreeMap<String, Option<FieldValue>>,
    },
    RefineAnalysisSection {
        index: usize,
        feedback: String,
    },
    /// Throw away this stage's generated content and generate it again
    Regenerate,
    /// Abandon the consultation and start a fresh one
    StartOver,
}

impl UserAction {
    pub fn name(&self) -> &'static str {
        match self {
            UserAction::View => "view",
            UserAction::StartConsultation { .. } => "start_consultation",
            UserAction::StartTask { .. } => "start_task",
            UserAction::RefineSection { .. } => "refine_section",
            UserAction::ConfirmFramework => "confirm_framework",
            UserAction::RefineField { .. } => "refine_field",
            UserAction::SubmitData { .. } => "submit_data",
            UserAction::RefineAnalysisSection { .. } => "refine_analysis_section",
            UserAction::Regenerate => "regenerate",
            UserAction::StartOver => "start_over",
        }
    }

    /// The error for an action the current stage does not accept
    pub fn not_available_in(&self, stage: Stage) -> ConsultError {
        ConsultError::InvalidAction {
            action: self.name().to_string(),
            stage,
        }
    }
}

/// Result of handling one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Content to show the user
    pub response: Option<String>,
    /// What the workflow should do next
    pub next_action: NextAction,
    /// Short description of where the consultation stands
    pub status_message: Option<String>,
    /// Non-fatal problems, such as fields that could not be extracted
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl StepResult {
    pub fn new(response: Option<String>, next_action: NextAction) -> Self {
        Self {
            response,
            next_action,
            status_message: None,
            warnings: Vec::new(),
        }
    }

    pub fn new_with_status(
        response: Option<String>,
        next_action: NextAction,
        status_message: Option<String>,
    ) -> Self {
        Self {
            response,
            next_action,
            status_message,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Defines what should happen after a stage handled an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAction {
    /// Stay in the current stage and wait for the next action
    WaitForInput,
    /// Advance to the next stage and wait there
    Continue,
    /// The workflow is finished; only a reset leaves this stage
    End,
}

/// Core trait every stage handler implements
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// The stage this handler drives
    fn stage(&self) -> Stage;

    /// Handle one user action against the session
    async fn handle(&self, session: &mut Session, action: UserAction) -> Result<StepResult>;
}

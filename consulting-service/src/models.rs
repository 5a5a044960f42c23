use chrono::{DateTime, Utc};
use consult_flow::{
    ExecutionResult, ExecutionStatus, FieldSpec, FieldState, FieldValue, Section, Session, Stage,
    session::ExtractedValue,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateConsultationRequest {
    /// Free-text challenge; starts the consultation right away
    pub problem: Option<String>,
    /// Index of a business profile task card, used when no problem is given
    pub task_index: Option<usize>,
    pub category: Option<String>,
}

/// One form field with whatever is known about its value
#[derive(Debug, Serialize)]
pub struct FieldView {
    #[serde(flatten)]
    pub spec: FieldSpec,
    pub state: FieldState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<ExtractedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
}

/// What a client needs to render the current stage
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub stage: Stage,
    pub problem: Option<String>,
    pub category: Option<String>,
    pub case_paths: Vec<String>,
    pub sections: Vec<Section>,
    pub fields: Vec<FieldView>,
    pub analysis: Option<Vec<Section>>,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        let fields = session
            .required_fields
            .iter()
            .map(|spec| FieldView {
                spec: spec.clone(),
                state: session.field_state(&spec.name),
                extracted: session.extracted_values.get(&spec.name).cloned(),
                error: session.field_errors.get(&spec.name).cloned(),
                value: session.collected_values.get(&spec.name).cloned().flatten(),
            })
            .collect();

        Self {
            session_id: session.id.clone(),
            stage: session.stage,
            problem: session.problem.clone(),
            category: session.category.clone(),
            case_paths: session
                .retrieved_cases
                .iter()
                .map(|case| case.path.clone())
                .collect(),
            sections: session.current_sections(),
            fields,
            analysis: session
                .analysis
                .as_ref()
                .map(|report| report.current_sections()),
            status_message: session.status_message.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub session_id: String,
    pub status: ExecutionStatus,
    pub response: Option<String>,
    pub warnings: Vec<String>,
    pub session: SessionView,
}

impl ActionResponse {
    pub fn new(result: ExecutionResult, session: &Session) -> Self {
        Self {
            session_id: result.session_id,
            status: result.status,
            response: result.response,
            warnings: result.warnings,
            session: SessionView::from(session),
        }
    }

    /// A session that has not been acted on yet
    pub fn idle(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            status: ExecutionStatus::WaitingForInput,
            response: None,
            warnings: Vec::new(),
            session: SessionView::from(session),
        }
    }
}

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use super::require_feedback;
use crate::consultant::Consultant;
use crate::error::{ConsultError, Result};
use crate::extraction::{FieldOutcome, validate_submission};
use crate::prompts::data_requirements_prompt;
use crate::response::parse_model_json;
use crate::session::{FieldSpec, FieldState, Session, Stage, ValueKind};
use crate::stage::{NextAction, StageHandler, StepResult, UserAction};

/// Works out which data points the analysis needs, pre-fills them from the web
/// page corpus and accepts the user's final values
pub struct DataCollectionStage {
    consultant: Arc<Consultant>,
}

/// Turn the model's `name -> {description, type, required}` object into field
/// specs, keeping the order the model listed them in
pub fn field_specs_from_json(object: Map<String, Value>, raw: &str) -> Result<Vec<FieldSpec>> {
    if object.is_empty() {
        return Err(ConsultError::malformed("no data requirements listed", raw));
    }

    object
        .into_iter()
        .map(|(name, spec)| {
            let Value::Object(spec) = spec else {
                return Err(ConsultError::malformed(
                    format!("requirement '{name}' is not an object"),
                    raw,
                ));
            };
            let description = spec
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let kind = spec
                .get("type")
                .and_then(Value::as_str)
                .map(ValueKind::from_model)
                .unwrap_or(ValueKind::Text);
            let required = match spec.get("required") {
                Some(Value::Bool(required)) => *required,
                Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
                _ => false,
            };
            Ok(FieldSpec {
                name,
                description,
                kind,
                required,
            })
        })
        .collect()
}

/// One line per field with its current value and provenance
fn describe_fields(session: &Session) -> String {
    session
        .required_fields
        .iter()
        .map(|field| {
            let marker = if field.required { "*" } else { "" };
            let mut line = format!(
                "- {}{marker} ({}): {}",
                field.name,
                field.kind.as_str(),
                field.description
            );
            match (session.field_state(&field.name), session.extracted_values.get(&field.name)) {
                (FieldState::Extracted | FieldState::Refined, Some(extracted)) => {
                    let value = extracted
                        .value
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "Not found".into());
                    line.push_str(&format!(
                        "\n  Suggested: {value} [{}] Source: {}",
                        extracted.confidence.as_str(),
                        extracted.source
                    ));
                }
                _ => {
                    if let Some(error) = session.field_errors.get(&field.name) {
                        line.push_str(&format!("\n  {error}"));
                    }
                }
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn warnings(outcomes: &[FieldOutcome]) -> Vec<String> {
    outcomes.iter().filter_map(FieldOutcome::warning).collect()
}

impl DataCollectionStage {
    pub fn new(consultant: Arc<Consultant>) -> Self {
        Self { consultant }
    }

    async fn ensure_requirements(&self, session: &mut Session) -> Result<()> {
        if !session.required_fields.is_empty() {
            return Ok(());
        }

        let prompt = data_requirements_prompt(
            session.problem()?,
            &session.retrieved_cases,
            &self.consultant.business,
        );
        let raw = self
            .consultant
            .complete(prompt, self.consultant.config.temperatures.requirements)
            .await?;

        let object: Map<String, Value> = parse_model_json(&raw)?;
        session.required_fields = field_specs_from_json(object, &raw)?;
        info!(session_id = %session.id, fields = session.required_fields.len(), "data requirements derived");
        Ok(())
    }

    /// Requirements first, then the one-time extraction pass over them
    async fn prepare_form(&self, session: &mut Session) -> Result<Vec<String>> {
        self.ensure_requirements(session).await?;
        if session.extraction_started {
            return Ok(Vec::new());
        }
        let outcomes = self.consultant.extractor().extract_all(session).await;
        Ok(warnings(&outcomes))
    }

    fn show(session: &Session, warnings: Vec<String>) -> StepResult {
        StepResult::new_with_status(
            Some(describe_fields(session)),
            NextAction::WaitForInput,
            Some("Review the suggested values and submit the form".into()),
        )
        .with_warnings(warnings)
    }
}

#[async_trait]
impl StageHandler for DataCollectionStage {
    fn stage(&self) -> Stage {
        Stage::DataCollection
    }

    async fn handle(&self, session: &mut Session, action: UserAction) -> Result<StepResult> {
        match action {
            UserAction::View => {
                let warnings = self.prepare_form(session).await?;
                Ok(Self::show(session, warnings))
            }
            UserAction::Regenerate => {
                session.clear_requirements();
                let warnings = self.prepare_form(session).await?;
                Ok(Self::show(session, warnings))
            }
            UserAction::RefineField { field, feedback } => {
                let feedback = require_feedback(&feedback)?;
                let outcome = self
                    .consultant
                    .extractor()
                    .refine(session, &field, feedback)
                    .await?;
                Ok(Self::show(session, warnings(std::slice::from_ref(&outcome))))
            }
            UserAction::SubmitData { values } => {
                if session.required_fields.is_empty() {
                    return Err(ConsultError::Validation(
                        "The data requirements have not been generated yet.".into(),
                    ));
                }
                session.collected_values = validate_submission(&session.required_fields, &values)?;
                info!(session_id = %session.id, fields = session.collected_values.len(), "data submitted");
                Ok(StepResult::new_with_status(
                    None,
                    NextAction::Continue,
                    Some("Data collected, preparing the analysis".into()),
                ))
            }
            other => Err(other.not_available_in(self.stage())),
        }
    }
}

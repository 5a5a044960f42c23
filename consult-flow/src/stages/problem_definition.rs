use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{require_feedback, section_at};
use crate::consultant::Consultant;
use crate::error::{ConsultError, Result};
use crate::prompts::{problem_definition_prompt, refinement_prompt};
use crate::sections::{parse_sections, render_sections};
use crate::session::{Session, Stage};
use crate::stage::{NextAction, StageHandler, StepResult, UserAction};

/// Frames the challenge as a consulting framework the user can refine
/// section by section before confirming it
pub struct ProblemDefinitionStage {
    consultant: Arc<Consultant>,
}

impl ProblemDefinitionStage {
    pub fn new(consultant: Arc<Consultant>) -> Self {
        Self { consultant }
    }

    async fn ensure_framework(&self, session: &mut Session) -> Result<()> {
        if !session.sections.is_empty() {
            return Ok(());
        }

        let prompt = problem_definition_prompt(
            session.problem()?,
            &session.retrieved_cases,
            &self.consultant.business,
        );
        let raw = self
            .consultant
            .complete(prompt, self.consultant.config.temperatures.framework)
            .await?;

        let sections = parse_sections(&raw, true);
        if sections.is_empty() {
            return Err(ConsultError::malformed(
                "framework has no markdown sections",
                raw,
            ));
        }

        info!(session_id = %session.id, sections = sections.len(), "framework generated");
        session.sections = sections;
        Ok(())
    }

    fn show(session: &Session) -> StepResult {
        StepResult::new_with_status(
            Some(render_sections(&session.current_sections())),
            NextAction::WaitForInput,
            Some("Review the framework, refine any section, then confirm".into()),
        )
    }
}

#[async_trait]
impl StageHandler for ProblemDefinitionStage {
    fn stage(&self) -> Stage {
        Stage::ProblemDefinition
    }

    async fn handle(&self, session: &mut Session, action: UserAction) -> Result<StepResult> {
        match action {
            UserAction::View => {
                self.ensure_framework(session).await?;
                Ok(Self::show(session))
            }
            UserAction::Regenerate => {
                session.clear_framework();
                self.ensure_framework(session).await?;
                Ok(Self::show(session))
            }
            UserAction::RefineSection { index, feedback } => {
                let feedback = require_feedback(&feedback)?;
                let current = session.current_sections();
                let section = section_at(&current, index)?;
                debug!(session_id = %session.id, index, title = %section.title, "refining framework section");

                let prompt = refinement_prompt(&section.title, &section.content, feedback, None);
                let revised = self
                    .consultant
                    .complete(prompt, self.consultant.config.temperatures.refinement)
                    .await?;
                let revised = revised.trim().to_string();

                session.revised_sections.insert(index, revised.clone());
                Ok(StepResult::new_with_status(
                    Some(revised),
                    NextAction::WaitForInput,
                    Some(format!("Section '{}' revised", section.title)),
                ))
            }
            UserAction::ConfirmFramework => {
                if session.sections.is_empty() {
                    return Err(ConsultError::Validation(
                        "There is no framework to confirm yet.".into(),
                    ));
                }
                session.finalize_sections();
                info!(session_id = %session.id, "framework confirmed");
                Ok(StepResult::new_with_status(
                    Some(render_sections(&session.sections)),
                    NextAction::Continue,
                    Some("Framework confirmed, collecting data".into()),
                ))
            }
            other => Err(other.not_available_in(self.stage())),
        }
    }
}

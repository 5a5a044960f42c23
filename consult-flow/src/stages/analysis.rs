use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{require_feedback, section_at};
use crate::consultant::Consultant;
use crate::error::{ConsultError, Result};
use crate::prompts::{analysis_prompt, refinement_prompt};
use crate::sections::{parse_sections, render_sections};
use crate::session::{AnalysisReport, Session, Stage};
use crate::stage::{NextAction, StageHandler, StepResult, UserAction};

/// Produces recommendations from the collected data. Sections can be refined
/// against fresh web page research; the only way out is starting over.
pub struct AnalysisStage {
    consultant: Arc<Consultant>,
}

impl AnalysisStage {
    pub fn new(consultant: Arc<Consultant>) -> Self {
        Self { consultant }
    }

    async fn ensure_analysis(&self, session: &mut Session) -> Result<()> {
        if session.analysis.is_some() {
            return Ok(());
        }

        let prompt = analysis_prompt(
            session.problem()?,
            &session.required_fields,
            &session.collected_values,
            &session.retrieved_cases,
            &self.consultant.business,
        );
        let raw = self
            .consultant
            .complete(prompt, self.consultant.config.temperatures.analysis)
            .await?;

        // Headerless answers are still a usable analysis
        let sections = parse_sections(&raw, false);
        if sections.is_empty() {
            return Err(ConsultError::malformed("analysis is empty", raw));
        }

        info!(session_id = %session.id, sections = sections.len(), "analysis generated");
        session.analysis = Some(AnalysisReport {
            response: raw,
            sections,
            revised_sections: BTreeMap::new(),
        });
        Ok(())
    }

    fn show(report: &AnalysisReport) -> StepResult {
        StepResult::new_with_status(
            Some(render_sections(&report.current_sections())),
            NextAction::End,
            Some("Analysis complete".into()),
        )
    }
}

#[async_trait]
impl StageHandler for AnalysisStage {
    fn stage(&self) -> Stage {
        Stage::Analysis
    }

    async fn handle(&self, session: &mut Session, action: UserAction) -> Result<StepResult> {
        match action {
            UserAction::View | UserAction::Regenerate => {
                if matches!(action, UserAction::Regenerate) {
                    session.analysis = None;
                }
                self.ensure_analysis(session).await?;
                match &session.analysis {
                    Some(report) => Ok(Self::show(report)),
                    None => Err(ConsultError::Validation("no analysis available".into())),
                }
            }
            UserAction::RefineAnalysisSection { index, feedback } => {
                let feedback = require_feedback(&feedback)?;
                let report = session.analysis.as_ref().ok_or_else(|| {
                    ConsultError::Validation("The analysis has not been generated yet.".into())
                })?;
                let current = report.current_sections();
                let section = section_at(&current, index)?;

                let research = self
                    .consultant
                    .search_webpages(&section.content, session.category.as_deref())
                    .await?;
                debug!(session_id = %session.id, index, hits = research.results.len(), "refining analysis section");
                let research = (!research.is_empty()).then_some(&research);

                let prompt =
                    refinement_prompt(&section.title, &section.content, feedback, research);
                let revised = self
                    .consultant
                    .complete(prompt, self.consultant.config.temperatures.refinement)
                    .await?;
                let revised = revised.trim().to_string();

                if let Some(report) = session.analysis.as_mut() {
                    report.revised_sections.insert(index, revised.clone());
                }
                Ok(StepResult::new_with_status(
                    Some(revised),
                    NextAction::End,
                    Some(format!("Section '{}' revised", section.title)),
                ))
            }
            other => Err(other.not_available_in(self.stage())),
        }
    }
}

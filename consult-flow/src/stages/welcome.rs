use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::BusinessProfile;
use crate::consultant::Consultant;
use crate::error::{ConsultError, Result};
use crate::session::{Session, Stage};
use crate::stage::{NextAction, StageHandler, StepResult, UserAction};

/// Takes the user's challenge, typed in or picked from a task card, and looks up
/// similar consulting cases for it
pub struct WelcomeStage {
    consultant: Arc<Consultant>,
}

impl WelcomeStage {
    pub fn new(consultant: Arc<Consultant>) -> Self {
        Self { consultant }
    }

    async fn start(
        &self,
        session: &mut Session,
        problem: String,
        category: Option<String>,
    ) -> Result<StepResult> {
        let problem = problem.trim().to_string();
        if problem.is_empty() {
            return Err(ConsultError::Validation(
                "Please enter your question first.".into(),
            ));
        }
        let category = category.filter(|c| !c.trim().is_empty() && c != "ALL");

        let cases = self
            .consultant
            .similar_cases(&problem, category.as_deref())
            .await?;
        info!(session_id = %session.id, cases = cases.len(), "consultation started");

        let response = format!("Found {} similar case(s) for your challenge.", cases.len());
        session.problem = Some(problem);
        session.category = category;
        session.retrieved_cases = cases;

        Ok(StepResult::new_with_status(
            Some(response),
            NextAction::Continue,
            Some("Framing the problem".into()),
        ))
    }
}

fn welcome_message(business: &BusinessProfile) -> String {
    let mut message = match &business.user {
        Some(user) => format!("Welcome back, {user}!"),
        None => "Welcome!".to_string(),
    };
    if let Some(motivation) = &business.motivation {
        message.push_str(&format!("\n\n{motivation}"));
    }

    if !business.task_cards.is_empty() {
        match &business.quarter {
            Some(quarter) => message.push_str(&format!("\n\nResearch tasks for {quarter}:")),
            None => message.push_str("\n\nResearch tasks:"),
        }
        for (i, card) in business.task_cards.iter().enumerate() {
            message.push_str(&format!("\n{}. {}: {}", i + 1, card.title, card.description));
        }
    }
    message
}

#[async_trait]
impl StageHandler for WelcomeStage {
    fn stage(&self) -> Stage {
        Stage::Welcome
    }

    async fn handle(&self, session: &mut Session, action: UserAction) -> Result<StepResult> {
        match action {
            UserAction::View => Ok(StepResult::new(
                Some(welcome_message(&self.consultant.business)),
                NextAction::WaitForInput,
            )),
            UserAction::StartConsultation { problem, category } => {
                self.start(session, problem, category).await
            }
            UserAction::StartTask { index, category } => {
                let card = self.consultant.business.task_cards.get(index).ok_or_else(|| {
                    ConsultError::Validation(format!("task card {index} does not exist"))
                })?;
                let problem = card.problem_statement();
                self.start(session, problem, category).await
            }
            other => Err(other.not_available_in(self.stage())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockServices, hit};

    #[tokio::test]
    async fn view_shows_motivation_and_task_cards() {
        let mock = MockServices::new();
        let stage = WelcomeStage::new(mock.consultant());
        let mut session = Session::new();

        let result = stage.handle(&mut session, UserAction::View).await.unwrap();

        let text = result.response.unwrap();
        assert!(text.starts_with("Welcome back, Rina!"));
        assert!(text.contains("Grow beyond supermarket shelves"));
        assert!(text.contains("1. Expanding Sales Channels: Selling to restaurants and cafes"));
        assert_eq!(result.next_action, NextAction::WaitForInput);
    }

    #[tokio::test]
    async fn blank_problem_is_rejected_without_retrieval() {
        let mock = MockServices::new();
        let stage = WelcomeStage::new(mock.consultant());
        let mut session = Session::new();

        let err = stage
            .handle(
                &mut session,
                UserAction::StartConsultation {
                    problem: "   ".into(),
                    category: None,
                },
            )
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Validation failed: Please enter your question first."
        );
        assert!(mock.cases.requests().is_empty());
        assert!(session.problem.is_none());
    }

    #[tokio::test]
    async fn start_stores_problem_cases_and_category() {
        let mock = MockServices::new();
        mock.cases.push(vec![hit("cases/tea.pdf", "chunk")]);
        mock.documents.insert("cases/tea.pdf", "Tea case study");
        let stage = WelcomeStage::new(mock.consultant());
        let mut session = Session::new();

        let result = stage
            .handle(
                &mut session,
                UserAction::StartConsultation {
                    problem: " Should we sell to cafes? ".into(),
                    category: Some("Retail".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.next_action, NextAction::Continue);
        assert_eq!(session.problem.as_deref(), Some("Should we sell to cafes?"));
        assert_eq!(session.category.as_deref(), Some("Retail"));
        assert_eq!(session.retrieved_cases.len(), 1);
        assert_eq!(session.retrieved_cases[0].content, "Tea case study");
        assert_eq!(mock.cases.requests()[0].query, "Should we sell to cafes?");
    }

    #[tokio::test]
    async fn all_category_means_no_filter() {
        let mock = MockServices::new();
        let stage = WelcomeStage::new(mock.consultant());
        let mut session = Session::new();

        stage
            .handle(
                &mut session,
                UserAction::StartConsultation {
                    problem: "Pricing".into(),
                    category: Some("ALL".into()),
                },
            )
            .await
            .unwrap();

        assert!(session.category.is_none());
        assert!(mock.cases.requests()[0].filter.is_none());
    }

    #[tokio::test]
    async fn task_card_becomes_the_problem_statement() {
        let mock = MockServices::new();
        let stage = WelcomeStage::new(mock.consultant());
        let mut session = Session::new();

        stage
            .handle(
                &mut session,
                UserAction::StartTask {
                    index: 0,
                    category: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            session.problem.as_deref(),
            Some(
                "Expanding Sales Channels: Selling to restaurants and cafes\nQuery: What is the B2B tea market size?"
            )
        );

        let err = stage
            .handle(
                &mut session,
                UserAction::StartTask {
                    index: 7,
                    category: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConsultError::Validation(_)));
    }

    #[tokio::test]
    async fn later_stage_actions_are_not_available() {
        let mock = MockServices::new();
        let stage = WelcomeStage::new(mock.consultant());
        let mut session = Session::new();

        let err = stage
            .handle(&mut session, UserAction::ConfirmFramework)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsultError::InvalidAction { .. }));
    }
}

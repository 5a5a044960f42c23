use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    error::{ConsultError, Result},
    session::{Session, Stage},
    stage::{NextAction, StageHandler, UserAction},
};

/// The four consulting stages and the handler that drives each of them
pub struct Workflow {
    pub id: String,
    handlers: DashMap<Stage, Arc<dyn StageHandler>>,
}

impl Workflow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handlers: DashMap::new(),
        }
    }

    /// Register a handler for the stage it reports, replacing any previous one
    pub fn add_handler(&self, handler: Arc<dyn StageHandler>) -> &Self {
        self.handlers.insert(handler.stage(), handler);
        self
    }

    pub fn handler(&self, stage: Stage) -> Option<Arc<dyn StageHandler>> {
        self.handlers.get(&stage).map(|entry| entry.clone())
    }

    /// Apply one action to the session.
    ///
    /// The handler works on a copy; the session is only replaced when the whole
    /// step succeeded, so a failed action leaves it exactly as it was.
    pub async fn execute_session(
        &self,
        session: &mut Session,
        action: UserAction,
    ) -> Result<ExecutionResult> {
        if matches!(action, UserAction::StartOver) {
            let previous_id = session.id.clone();
            let mut fresh = session.restart();
            fresh.status_message = Some("Started a new consultation".to_string());
            info!(previous_session = %previous_id, session_id = %fresh.id, "consultation reset");
            *session = fresh;
            return Ok(ExecutionResult::for_session(
                session,
                None,
                ExecutionStatus::WaitingForInput,
                Vec::new(),
            ));
        }

        let handler = self
            .handler(session.stage)
            .ok_or(ConsultError::HandlerNotFound(session.stage))?;

        let action_name = action.name();
        let mut working = session.clone();
        let result = handler.handle(&mut working, action).await.inspect_err(|e| {
            warn!(
                session_id = %session.id,
                stage = %session.stage,
                action = action_name,
                "action failed: {}",
                e
            );
        })?;

        let status = match result.next_action {
            NextAction::WaitForInput => ExecutionStatus::WaitingForInput,
            NextAction::Continue => {
                let from = working.stage;
                let to = working.advance()?;
                info!(session_id = %working.id, %from, %to, "stage advanced");
                ExecutionStatus::WaitingForInput
            }
            NextAction::End => ExecutionStatus::Completed,
        };

        working.status_message = result.status_message.clone();
        working.touch();
        *session = working;

        Ok(ExecutionResult::for_session(
            session,
            result.response,
            status,
            result.warnings,
        ))
    }
}

/// Builder for creating workflows
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            workflow: Workflow::new(id),
        }
    }

    pub fn add_handler(self, handler: Arc<dyn StageHandler>) -> Self {
        self.workflow.add_handler(handler);
        self
    }

    pub fn build(self) -> Workflow {
        self.workflow
    }
}

/// Outcome of one executed action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Differs from the requested id after a reset
    pub session_id: String,
    pub stage: Stage,
    pub response: Option<String>,
    pub status: ExecutionStatus,
    pub status_message: Option<String>,
    pub warnings: Vec<String>,
}

impl ExecutionResult {
    fn for_session(
        session: &Session,
        response: Option<String>,
        status: ExecutionStatus,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            session_id: session.id.clone(),
            stage: session.stage,
            response,
            status,
            status_message: session.status_message.clone(),
            warnings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Waiting for the user's next action
    WaitingForInput,
    /// The consultation reached its final stage
    Completed,
}

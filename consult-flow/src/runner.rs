//! FlowRunner – loads a session, applies exactly **one** user action, and persists the
//! updated session back to storage.
//!
//! Use it from request handlers: every call is a complete _load → execute → save_
//! round trip, so the next request starts where this one left off. Call
//! [`Workflow::execute_session`] directly when you manage persistence yourself.
//!
//! Actions on the same session id are serialized by a per-session lock held for
//! the whole round trip, so two requests can never overwrite each other's state.
//! The lock is process-local; deployments with several processes sharing one
//! store need the store to serialize writers.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::{ConsultError, Result},
    session::Session,
    stage::UserAction,
    storage::SessionStorage,
    workflow::{ExecutionResult, Workflow},
};

/// High-level helper that orchestrates the common _load → execute → save_ pattern.
#[derive(Clone)]
pub struct FlowRunner {
    workflow: Arc<Workflow>,
    storage: Arc<dyn SessionStorage>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl FlowRunner {
    pub fn new(workflow: Arc<Workflow>, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            workflow,
            storage,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create and persist a fresh welcome session
    pub async fn create_session(&self) -> Result<Session> {
        let session = Session::new();
        self.storage.save(session.clone()).await?;
        info!(session_id = %session.id, "session created");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        self.storage
            .get(session_id)
            .await?
            .ok_or_else(|| ConsultError::SessionNotFound(session_id.to_string()))
    }

    /// Apply **exactly one** action for the given `session_id` and persist the result.
    ///
    /// Nothing is written when the action fails. After `StartOver` the returned
    /// [`ExecutionResult::session_id`] names the new session and the old one is
    /// removed from storage.
    pub async fn run(&self, session_id: &str, action: UserAction) -> Result<ExecutionResult> {
        self.run_with_session(session_id, action)
            .await
            .map(|(result, _)| result)
    }

    /// Like [`FlowRunner::run`], also returning the session exactly as it was saved
    pub async fn run_with_session(
        &self,
        session_id: &str,
        action: UserAction,
    ) -> Result<(ExecutionResult, Session)> {
        let lock = self.lock_for(session_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.round_trip(session_id, action).await
        };
        drop(lock);

        // Only the map still holds the lock when no one else is waiting on it
        self.locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
        outcome
    }

    async fn round_trip(
        &self,
        session_id: &str,
        action: UserAction,
    ) -> Result<(ExecutionResult, Session)> {
        // 1. Load session
        let mut session = self.get_session(session_id).await?;
        debug!(session_id, stage = %session.stage, action = action.name(), "running action");

        // 2. Apply the action
        let result = self.workflow.execute_session(&mut session, action).await?;

        // 3. Persist new state so the next call starts where we left off
        self.storage.save(session.clone()).await?;

        // A restarted session is saved under its new id before the old one goes
        if session.id != session_id {
            if let Err(e) = self.storage.delete(session_id).await {
                warn!(session_id, error = %e, "failed to delete replaced session");
            }
        }

        Ok((result, session))
    }
}

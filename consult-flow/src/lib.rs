pub mod config;
pub mod consultant;
pub mod error;
pub mod extraction;
pub mod prompts;
pub mod providers;
pub mod response;
pub mod runner;
pub mod sections;
pub mod services;
pub mod session;
pub mod stage;
pub mod stages;
pub mod storage;
pub mod storage_file;
pub mod storage_postgres;
pub mod workflow;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{BusinessProfile, ConsultConfig, RetrievalLimits, Temperatures};
pub use consultant::Consultant;
pub use error::{ConsultError, Result};
pub use extraction::{FieldExtractor, FieldOutcome};
pub use runner::FlowRunner;
pub use sections::{Section, parse_sections};
pub use services::{
    Completion, CompletionModel, CompletionRequest, DocumentStore, Retriever, SearchRequest,
    SearchResponse, Services,
};
pub use session::{FieldSpec, FieldState, FieldValue, Session, Stage};
pub use stage::{NextAction, StageHandler, StepResult, UserAction};
pub use stages::consulting_workflow;
pub use storage::{InMemorySessionStorage, SessionStorage};
pub use storage_file::FileSessionStorage;
pub use storage_postgres::PostgresSessionStorage;
pub use workflow::{ExecutionResult, ExecutionStatus, Workflow, WorkflowBuilder};

//! One handler per consulting stage.
//!
//! Handlers only ever see the session they are given and the shared
//! [`Consultant`]; the workflow decides what happens to the session afterwards.

pub mod analysis;
pub mod data_collection;
pub mod problem_definition;
pub mod welcome;

pub use analysis::AnalysisStage;
pub use data_collection::DataCollectionStage;
pub use problem_definition::ProblemDefinitionStage;
pub use welcome::WelcomeStage;

use std::sync::Arc;

use crate::consultant::Consultant;
use crate::error::{ConsultError, Result};
use crate::sections::Section;
use crate::workflow::{Workflow, WorkflowBuilder};

/// The complete welcome → problem definition → data collection → analysis flow
pub fn consulting_workflow(consultant: Arc<Consultant>) -> Workflow {
    WorkflowBuilder::new("consulting")
        .add_handler(Arc::new(WelcomeStage::new(consultant.clone())))
        .add_handler(Arc::new(ProblemDefinitionStage::new(consultant.clone())))
        .add_handler(Arc::new(DataCollectionStage::new(consultant.clone())))
        .add_handler(Arc::new(AnalysisStage::new(consultant)))
        .build()
}

fn section_at(sections: &[Section], index: usize) -> Result<&Section> {
    sections.get(index).ok_or_else(|| {
        ConsultError::Validation(format!(
            "section {index} does not exist, there are {} sections",
            sections.len()
        ))
    })
}

fn require_feedback(feedback: &str) -> Result<&str> {
    let feedback = feedback.trim();
    if feedback.is_empty() {
        return Err(ConsultError::Validation(
            "Please enter feedback before refining.".into(),
        ));
    }
    Ok(feedback)
}

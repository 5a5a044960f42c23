use async_trait::async_trait;
use rig::{client::CompletionClient, completion::Prompt, providers::openrouter};
use tracing::debug;

use crate::error::{ConsultError, Result};
use crate::services::{Completion, CompletionModel, CompletionRequest};

/// Completions through OpenRouter. The model named in each request is used as is.
pub struct RigCompletionModel {
    client: openrouter::Client,
}

impl RigCompletionModel {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: openrouter::Client::new(api_key),
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ConsultError::Config("OPENROUTER_API_KEY not set".into()))?;
        Ok(Self::new(&api_key))
    }
}

#[async_trait]
impl CompletionModel for RigCompletionModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        debug!(model = %request.model, temperature = ?request.temperature, "completion request");

        let mut builder = self.client.agent(&request.model);
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }
        let agent = builder.build();

        let text = agent
            .prompt(request.prompt.as_str())
            .await
            .map_err(ConsultError::external)?;
        Ok(Completion { text })
    }
}

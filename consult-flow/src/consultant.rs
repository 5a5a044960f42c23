use tracing::{debug, info};

use crate::config::{BusinessProfile, ConsultConfig};
use crate::error::Result;
use crate::extraction::FieldExtractor;
use crate::services::{CompletionRequest, SearchRequest, SearchResponse, Services};
use crate::session::RetrievedCase;

/// Everything a stage handler needs: the external services, tuning and the
/// business being advised. Built once by the caller and shared by all handlers.
pub struct Consultant {
    pub services: Services,
    pub config: ConsultConfig,
    pub business: BusinessProfile,
}

impl Consultant {
    pub fn new(services: Services, config: ConsultConfig, business: BusinessProfile) -> Self {
        Self {
            services,
            config,
            business,
        }
    }

    /// One completion call with the configured model
    pub async fn complete(&self, prompt: String, temperature: f64) -> Result<String> {
        let completion = self
            .services
            .completions
            .complete(&CompletionRequest {
                model: self.config.model.clone(),
                prompt,
                temperature: Some(temperature),
            })
            .await?;
        Ok(completion.text)
    }

    /// Search the case corpus and load the full text of each distinct hit,
    /// in ranking order. Documents without stored chunks are skipped.
    pub async fn similar_cases(
        &self,
        query: &str,
        category: Option<&str>,
    ) -> Result<Vec<RetrievedCase>> {
        let request =
            SearchRequest::new(query, self.config.limits.cases).with_category(category);
        let response = self.services.cases.search(&request).await?;

        let mut cases = Vec::new();
        for path in response.unique_paths() {
            match self.services.documents.full_text(path).await? {
                Some(content) => cases.push(RetrievedCase {
                    path: path.to_string(),
                    content,
                }),
                None => debug!(path, "case has no stored chunks"),
            }
        }

        info!(found = cases.len(), "similar cases retrieved");
        Ok(cases)
    }

    pub async fn search_webpages(
        &self,
        query: &str,
        category: Option<&str>,
    ) -> Result<SearchResponse> {
        let request =
            SearchRequest::new(query, self.config.limits.webpages).with_category(category);
        self.services.webpages.search(&request).await
    }

    pub fn extractor(&self) -> FieldExtractor<'_> {
        FieldExtractor::new(&self.services, &self.config)
    }
}

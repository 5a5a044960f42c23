//! The request/response boundary to the managed retrieval and completion platform.
//!
//! Nothing in this crate searches, embeds or generates text itself. Stage handlers
//! receive a [`Services`] value built by the caller, so providers can be swapped
//! for test doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;

/// Corpus metadata column used for category filtering
pub const CATEGORY_FIELD: &str = "category";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<BTreeMap<String, String>>,
    pub limit: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            filter: None,
            limit,
        }
    }

    /// Restrict results to one corpus category
    pub fn with_category(mut self, category: Option<&str>) -> Self {
        if let Some(category) = category {
            self.filter = Some(BTreeMap::from([(
                CATEGORY_FIELD.to_string(),
                category.to_string(),
            )]));
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: String,
    pub relative_path: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

impl SearchResponse {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Distinct document paths in ranking order
    pub fn unique_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for hit in &self.results {
            if !paths.contains(&hit.relative_path.as_str()) {
                paths.push(&hit.relative_path);
            }
        }
        paths
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
}

/// Similarity search over one document corpus
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;
}

/// A single free-text generation call
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

/// Bulk lookup of every chunk belonging to one document
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Concatenated full text of the document, `None` if it has no chunks
    async fn full_text(&self, relative_path: &str) -> Result<Option<String>>;
}

/// External collaborators, owned by the caller and shared by all stage handlers
#[derive(Clone)]
pub struct Services {
    /// Consulting case studies, used to frame the problem
    pub cases: Arc<dyn Retriever>,
    /// Scraped web pages, used to extract field values and refine analysis
    pub webpages: Arc<dyn Retriever>,
    pub completions: Arc<dyn CompletionModel>,
    pub documents: Arc<dyn DocumentStore>,
}

impl Services {
    pub fn new(
        cases: Arc<dyn Retriever>,
        webpages: Arc<dyn Retriever>,
        completions: Arc<dyn CompletionModel>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            cases,
            webpages,
            completions,
            documents,
        }
    }
}

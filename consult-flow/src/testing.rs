//! Scripted test doubles for the external services.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::config::{BusinessProfile, ConsultConfig, TaskCard};
use crate::consultant::Consultant;
use crate::error::{ConsultError, Result};
use crate::services::{
    Completion, CompletionModel, CompletionRequest, DocumentStore, Retriever, SearchHit,
    SearchRequest, SearchResponse, Services,
};

pub(crate) fn business() -> BusinessProfile {
    BusinessProfile {
        name: "MyTea".into(),
        description: "a ready-to-drink tea company".into(),
        industry: "Beverages".into(),
        location: "Indonesia".into(),
        user: Some("Rina".into()),
        quarter: Some("Q1 2025".into()),
        motivation: Some("Grow beyond supermarket shelves".into()),
        task_cards: vec![TaskCard {
            title: "Expanding Sales Channels".into(),
            description: "Selling to restaurants and cafes".into(),
            query: "What is the B2B tea market size?".into(),
            status: None,
            priority: None,
            tags: Vec::new(),
        }],
        suggestions: Vec::new(),
    }
}

pub(crate) fn hit(path: &str, chunk: &str) -> SearchHit {
    SearchHit {
        chunk: chunk.to_string(),
        relative_path: path.to_string(),
        category: "general".to_string(),
    }
}

/// Answers searches from a queue; an empty queue answers with no results
#[derive(Default)]
pub(crate) struct MockRetriever {
    responses: Mutex<VecDeque<std::result::Result<Vec<SearchHit>, String>>>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl MockRetriever {
    pub fn push(&self, hits: Vec<SearchHit>) {
        self.responses.lock().unwrap().push_back(Ok(hits));
    }

    pub fn fail(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(results)) => Ok(SearchResponse { results }),
            Some(Err(message)) => Err(ConsultError::External(message)),
            None => Ok(SearchResponse::default()),
        }
    }
}

/// Answers completions from a queue; an empty queue is a service error
#[derive(Default)]
pub(crate) struct MockCompletions {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletions {
    pub fn push(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(text.to_string()));
    }

    pub fn fail(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionModel for MockCompletions {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(Completion { text }),
            Some(Err(message)) => Err(ConsultError::External(message)),
            None => Err(ConsultError::External("no scripted completion left".into())),
        }
    }
}

#[derive(Default)]
pub(crate) struct MockDocuments {
    documents: Mutex<HashMap<String, String>>,
    lookups: Mutex<Vec<String>>,
}

impl MockDocuments {
    pub fn insert(&self, path: &str, text: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(path.to_string(), text.to_string());
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for MockDocuments {
    async fn full_text(&self, relative_path: &str) -> Result<Option<String>> {
        self.lookups
            .lock()
            .unwrap()
            .push(relative_path.to_string());
        Ok(self.documents.lock().unwrap().get(relative_path).cloned())
    }
}

#[derive(Default)]
pub(crate) struct MockServices {
    pub cases: Arc<MockRetriever>,
    pub webpages: Arc<MockRetriever>,
    pub completions: Arc<MockCompletions>,
    pub documents: Arc<MockDocuments>,
}

impl MockServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn services(&self) -> Services {
        Services::new(
            self.cases.clone(),
            self.webpages.clone(),
            self.completions.clone(),
            self.documents.clone(),
        )
    }
}

impl MockServices {
    pub fn consultant(&self) -> Arc<Consultant> {
        Arc::new(Consultant::new(
            self.services(),
            ConsultConfig::default(),
            business(),
        ))
    }
}

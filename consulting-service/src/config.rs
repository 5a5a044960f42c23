use anyhow::Context;
use consult_flow::{
    BusinessProfile, ConsultConfig, FileSessionStorage, InMemorySessionStorage,
    PostgresSessionStorage, Services, SessionStorage,
    providers::{CortexSearch, PostgresDocumentStore, RigCompletionModel, postgres::DEFAULT_CHUNKS_TABLE},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Profile used when `BUSINESS_PROFILE` is not set
const DEFAULT_BUSINESS_PROFILE: &str = include_str!("../config/business.yaml");

/// Where the two Cortex Search services live
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub account_url: Option<String>,
    pub database: String,
    pub schema: String,
    pub cases_service: String,
    pub webpages_service: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub consult: ConsultConfig,
    pub business: BusinessProfile,
    pub search: SearchSettings,
    /// Session storage; unset falls back to files, then memory
    pub database_url: Option<String>,
    pub session_dir: Option<PathBuf>,
    /// Database holding the indexed document chunks
    pub chunks_database_url: Option<String>,
    pub chunks_table: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any variable source; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let business = match var("BUSINESS_PROFILE") {
            Some(path) => BusinessProfile::from_yaml_file(&path)
                .with_context(|| format!("loading business profile from {path}"))?,
            None => BusinessProfile::from_yaml_str(DEFAULT_BUSINESS_PROFILE)?,
        };

        let mut consult = ConsultConfig::default();
        if let Some(model) = var("CONSULT_MODEL") {
            consult.model = model;
        }

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            consult,
            business,
            search: SearchSettings {
                account_url: var("SNOWFLAKE_ACCOUNT_URL"),
                database: var("SNOWFLAKE_DATABASE")
                    .unwrap_or_else(|| "CC_QUICKSTART_CORTEX_SEARCH_DOCS".to_string()),
                schema: var("SNOWFLAKE_SCHEMA").unwrap_or_else(|| "DATA".to_string()),
                cases_service: var("CASES_SEARCH_SERVICE")
                    .unwrap_or_else(|| "CC_SEARCH_SERVICE_CS_CONSULTING".to_string()),
                webpages_service: var("WEBPAGES_SEARCH_SERVICE")
                    .unwrap_or_else(|| "CC_SEARCH_SERVICE_CS_WEBPAGES".to_string()),
            },
            database_url: var("DATABASE_URL"),
            session_dir: var("SESSION_DIR").map(PathBuf::from),
            chunks_database_url: var("CHUNKS_DATABASE_URL"),
            chunks_table: var("CHUNKS_TABLE").unwrap_or_else(|| DEFAULT_CHUNKS_TABLE.to_string()),
        })
    }
}

/// Connect the hosted search, completion and document services
pub async fn create_services(config: &AppConfig) -> anyhow::Result<Services> {
    let account_url = config
        .search
        .account_url
        .as_deref()
        .context("SNOWFLAKE_ACCOUNT_URL not set")?;
    let token = std::env::var("SNOWFLAKE_TOKEN").context("SNOWFLAKE_TOKEN not set")?;
    let chunks_url = config
        .chunks_database_url
        .as_deref()
        .context("CHUNKS_DATABASE_URL not set")?;

    let search = &config.search;
    let cases = CortexSearch::new(
        account_url,
        &search.database,
        &search.schema,
        &search.cases_service,
        token.clone(),
    )?;
    let webpages = CortexSearch::new(
        account_url,
        &search.database,
        &search.schema,
        &search.webpages_service,
        token,
    )?;
    let completions = RigCompletionModel::from_env()?;
    let documents = PostgresDocumentStore::connect(chunks_url, &config.chunks_table).await?;

    info!(
        cases_service = %search.cases_service,
        webpages_service = %search.webpages_service,
        model = %config.consult.model,
        "external services configured"
    );
    Ok(Services::new(
        Arc::new(cases),
        Arc::new(webpages),
        Arc::new(completions),
        Arc::new(documents),
    ))
}

/// PostgreSQL when `DATABASE_URL` is set, JSON files under `SESSION_DIR`,
/// otherwise memory. A backend that fails to open falls through to the next.
pub async fn create_session_storage(config: &AppConfig) -> Arc<dyn SessionStorage> {
    if let Some(database_url) = &config.database_url {
        info!("Using PostgreSQL session storage");
        match PostgresSessionStorage::connect(database_url).await {
            Ok(storage) => return Arc::new(storage),
            Err(e) => error!("Failed to connect to PostgreSQL: {}. Falling back.", e),
        }
    }

    if let Some(dir) = &config.session_dir {
        info!(dir = %dir.display(), "Using file session storage");
        match FileSessionStorage::open(dir).await {
            Ok(storage) => return Arc::new(storage),
            Err(e) => error!("Failed to open session directory: {}. Falling back.", e),
        }
    }

    info!("Using in-memory session storage (set DATABASE_URL or SESSION_DIR to persist sessions)");
    Arc::new(InMemorySessionStorage::new())
}

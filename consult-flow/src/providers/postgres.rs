use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::error::{ConsultError, Result};
use crate::services::DocumentStore;

pub const DEFAULT_CHUNKS_TABLE: &str = "docs_chunks";

/// Rebuilds whole documents from the chunk table the search services index
pub struct PostgresDocumentStore {
    pool: PgPool,
    sql: String,
}

impl PostgresDocumentStore {
    pub async fn connect(database_url: &str, table: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::from_pool(pool, table)
    }

    pub fn from_pool(pool: PgPool, table: &str) -> Result<Self> {
        Ok(Self {
            pool,
            sql: full_text_sql(table)?,
        })
    }
}

fn full_text_sql(table: &str) -> Result<String> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid {
        return Err(ConsultError::Config(format!("invalid chunk table name: {table}")));
    }
    Ok(format!(
        "SELECT string_agg(chunk, E'\\n\\n') FROM {table} WHERE relative_path = $1"
    ))
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn full_text(&self, relative_path: &str) -> Result<Option<String>> {
        let text: Option<String> = sqlx::query_scalar(&self.sql)
            .bind(relative_path)
            .fetch_one(&self.pool)
            .await
            .map_err(ConsultError::external)?;
        Ok(text)
    }
}

use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions, types::Json};
use tracing::info;

use crate::{error::Result, session::Session, storage::SessionStorage};

/// Sessions as JSONB documents in a `consulting_sessions` table
pub struct PostgresSessionStorage {
    pool: PgPool,
}

impl PostgresSessionStorage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS consulting_sessions (
                id TEXT PRIMARY KEY,
                stage TEXT NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        info!("PostgreSQL session storage ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStorage for PostgresSessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO consulting_sessions (id, stage, data, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE
             SET stage = EXCLUDED.stage, data = EXCLUDED.data, updated_at = EXCLUDED.updated_at",
        )
        .bind(&session.id)
        .bind(session.stage.as_str())
        .bind(Json(&session))
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        let row: Option<Json<Session>> =
            sqlx::query_scalar("SELECT data FROM consulting_sessions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|Json(session)| session))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM consulting_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

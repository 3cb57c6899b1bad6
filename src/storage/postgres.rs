//! PostgreSQL storage backend
//!
//! One row per (user, event type). Saves run inside a single transaction
//! and upsert the deltas in sub-batches; a failure anywhere rolls the
//! whole call back.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, error, info};

use super::{DataStorage, StorageError, StorageResult};
use crate::types::{sum_by_key, UserEventStats};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS user_event_stats (
    user_id BIGINT NOT NULL,
    event_type VARCHAR(50) NOT NULL,
    count BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (user_id, event_type)
)
"#;

const SELECT_SQL: &str = r#"
SELECT user_id, event_type, count
FROM user_event_stats
ORDER BY user_id, event_type
"#;

const UPSERT_SQL: &str = r#"
INSERT INTO user_event_stats (user_id, event_type, count, updated_at)
SELECT d.user_id, d.event_type, d.count, now()
FROM UNNEST($1::BIGINT[], $2::VARCHAR[], $3::BIGINT[]) AS d(user_id, event_type, count)
ON CONFLICT (user_id, event_type)
DO UPDATE SET count = user_event_stats.count + EXCLUDED.count,
              updated_at = now()
"#;

/// Maximum pooled connections; only one flush uses the pool at a time
const MAX_CONNECTIONS: u32 = 4;

/// Storage backed by a PostgreSQL table
pub struct PostgresStorage {
    pool: PgPool,
    batch_size: usize,
}

impl PostgresStorage {
    /// Connect a pool to `url`
    ///
    /// `batch_size` bounds the number of rows sent per upsert statement.
    pub async fn connect(url: &str, batch_size: usize) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await?;

        Ok(Self::with_pool(pool, batch_size))
    }

    /// Wrap an existing pool
    pub fn with_pool(pool: PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl DataStorage for PostgresStorage {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn initialize(&self) -> StorageResult<()> {
        info!("Initializing PostgreSQL database...");

        match sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await {
            Ok(_) => {
                info!("PostgreSQL database initialized successfully");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize PostgreSQL database");
                Err(e.into())
            }
        }
    }

    fn get_stats(&self) -> BoxStream<'_, StorageResult<UserEventStats>> {
        Box::pin(async_stream::try_stream! {
            let mut rows = sqlx::query_as::<_, (i64, String, i64)>(SELECT_SQL).fetch(&self.pool);

            while let Some((user_id, event_type, count)) =
                rows.try_next().await.map_err(StorageError::from)?
            {
                yield UserEventStats::new(user_id, event_type, count);
            }
        })
    }

    async fn save_stats(&self, stats: &[UserEventStats]) -> StorageResult<()> {
        // One statement must never touch the same row twice
        let deltas = sum_by_key(stats);
        if deltas.is_empty() {
            return Ok(());
        }

        let result: StorageResult<()> = async {
            let mut tx = self.pool.begin().await?;

            for chunk in deltas.chunks(self.batch_size) {
                let user_ids: Vec<i64> = chunk.iter().map(|s| s.user_id).collect();
                let event_types: Vec<String> = chunk.iter().map(|s| s.event_type.clone()).collect();
                let counts: Vec<i64> = chunk.iter().map(|s| s.count).collect();

                sqlx::query(UPSERT_SQL)
                    .bind(user_ids)
                    .bind(event_types)
                    .bind(counts)
                    .execute(&mut *tx)
                    .await?;
                debug!(rows = chunk.len(), "Upserted statistics chunk");
            }

            // Dropping an uncommitted transaction rolls it back
            tx.commit().await?;
            Ok(())
        }
        .await;

        if let Err(e) = &result {
            error!(error = %e, "Failed to save statistics to PostgreSQL");
        }
        result
    }
}

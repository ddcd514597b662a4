//! Legacy source database access
//!
//! Queries reach the legacy MySQL server through [`SourceDatabase`]. Values
//! are always bound to `?` placeholders; only identifiers that cannot be bound
//! (table names in `SHOW CREATE TABLE`) are quoted by the caller.

use crate::error::GatewayError;
use crate::handlers::LegacyDbCredentials;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Total data plus index size of one schema, in GB
pub const SOURCE_SIZE_SQL: &str = "SELECT table_schema, \
     CAST(SUM(data_length + index_length) / 1024 / 1024 / 1024 AS CHAR) \
     FROM information_schema.TABLES WHERE table_schema = ? GROUP BY table_schema";

pub const LIST_TABLES_SQL: &str = "SHOW TABLES";

/// One result row; SQL `NULL` is `None`
pub type TextRow = Vec<Option<String>>;

/// Read-only query access to the legacy database
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceDatabase: Send + Sync {
    /// Run `sql`, binding `params` to its placeholders in order
    async fn query(&self, sql: &str, params: &[String]) -> Result<Vec<TextRow>, GatewayError>;
}

/// [`SourceDatabase`] over a MySQL pool opened on first use
pub struct MySqlSource {
    options: MySqlConnectOptions,
    host: String,
    database: String,
    pool: OnceCell<MySqlPool>,
}

impl std::fmt::Debug for MySqlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlSource")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("connected", &self.pool.initialized())
            .finish_non_exhaustive()
    }
}

impl MySqlSource {
    #[must_use]
    pub fn new(creds: &LegacyDbCredentials) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&creds.host)
            .username(&creds.user)
            .password(&creds.password)
            .database(&creds.database);
        Self {
            options,
            host: creds.host.clone(),
            database: creds.database.clone(),
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> &MySqlPool {
        self.pool
            .get_or_init(|| async {
                tracing::debug!(host = %self.host, database = %self.database, "source_db_pool_created");
                MySqlPoolOptions::new()
                    .max_connections(2)
                    .acquire_timeout(Duration::from_secs(30))
                    .idle_timeout(Duration::from_secs(120))
                    .connect_lazy_with(self.options.clone())
            })
            .await
    }
}

#[async_trait]
impl SourceDatabase for MySqlSource {
    async fn query(&self, sql: &str, params: &[String]) -> Result<Vec<TextRow>, GatewayError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.as_str());
        }
        let rows = query.fetch_all(self.pool().await).await?;
        rows.iter().map(text_row).collect()
    }
}

fn text_row(row: &MySqlRow) -> Result<TextRow, GatewayError> {
    (0..row.len()).map(|index| text_column(row, index)).collect()
}

/// `SHOW` statements may return binary columns depending on server charset
fn text_column(row: &MySqlRow, index: usize) -> Result<Option<String>, GatewayError> {
    if let Ok(text) = row.try_get::<Option<String>, _>(index) {
        return Ok(text);
    }
    let bytes: Option<Vec<u8>> = row.try_get(index)?;
    Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned()))
}

//! SQLite collaborators for the workflow engine.
//!
//! [`SqliteSchema`] describes the database for prompts, [`SqliteExecutor`]
//! runs generated statements, and [`seed`] creates the sample tables and data.

pub mod executor;
pub mod format;
pub mod schema;
pub mod seed;

use std::str::FromStr;

use dbagent_types::{AgentError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use sqlx::sqlite::SqlitePool;

pub use executor::SqliteExecutor;
pub use format::format_results;
pub use schema::{describe_database, SqliteSchema};
pub use seed::{clear_all_data, create_sample_data, create_tables, SeedReport};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://dbagent.db?mode=rwc";

/// Open a pool for `url`, creating the database file when it is missing.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(db_error)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(db_error)?;
    tracing::debug!(url, "Connected to database");
    Ok(pool)
}

pub(crate) fn db_error(e: sqlx::Error) -> AgentError {
    AgentError::Database(e.to_string())
}

#[cfg(test)]
pub(crate) async fn temp_pool(dir: &tempfile::TempDir) -> SqlitePool {
    let url = format!("sqlite://{}", dir.path().join("test.db").display());
    connect(&url).await.unwrap()
}

use anyhow::{anyhow, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use std::path::Path;
use std::time::Duration;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.db_idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.db_max_lifetime_seconds))
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Applies every `*.sql` file in `dir` in file-name order.
    ///
    /// Migration files are written to be re-runnable, so this is safe to call on
    /// every start.
    pub async fn migrate(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)
            .map_err(|err| anyhow!("cannot read {}: {}", dir.display(), err))?
        {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "sql") {
                files.push(path);
            }
        }
        files.sort();

        for path in &files {
            let sql = std::fs::read_to_string(path)?;
            self.pool
                .execute(sql.as_str())
                .await
                .map_err(|err| anyhow!("migration {} failed: {}", path.display(), err))?;
            tracing::debug!(file = %path.display(), "applied migration");
        }

        Ok(files.len())
    }
}

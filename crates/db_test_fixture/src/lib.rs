use std::env;

use anyhow::{Context, Result};
use db::pg::run_migrations;
use sqlx::{Executor, PgPool};
use url::Url;
use uuid::Uuid;

mod memory;

pub use memory::MemoryDatabase;

/// Creates throwaway Postgres databases for integration tests.
pub struct DbFixture {
    admin_url: String,
}

impl DbFixture {
    pub fn from_env() -> Result<Self> {
        let admin_url = env::var("TEST_ADMIN_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .context("TEST_ADMIN_URL or DATABASE_URL must be set for tests")?;
        Ok(Self { admin_url })
    }

    pub async fn create(&self, prefix: &str) -> Result<DatabaseHandle> {
        let handle = self.create_unmigrated(prefix).await?;
        run_migrations(&handle.pool).await?;
        Ok(handle)
    }

    /// Same as [`DbFixture::create`] but leaves the schema empty, for callers that
    /// migrate through `PgDatabase::connect`.
    pub async fn create_unmigrated(&self, prefix: &str) -> Result<DatabaseHandle> {
        let db_name = format!("{}_{}", prefix, Uuid::new_v4().simple());
        let admin_pool = PgPool::connect(&self.admin_url).await?;
        let create_sql = format!("CREATE DATABASE \"{}\"", db_name);
        admin_pool.execute(create_sql.as_str()).await?;

        let database_url = database_url_for(&self.admin_url, &db_name)?;
        let pool = PgPool::connect(&database_url).await?;
        Ok(DatabaseHandle {
            pool,
            name: db_name,
            admin_url: self.admin_url.clone(),
            database_url,
        })
    }
}

fn database_url_for(admin_url: &str, db_name: &str) -> Result<String> {
    let mut url = Url::parse(admin_url).context("admin url must be a valid postgres url")?;
    url.set_path(db_name);
    Ok(url.to_string())
}

pub struct DatabaseHandle {
    pool: PgPool,
    name: String,
    admin_url: String,
    database_url: String,
}

impl DatabaseHandle {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub async fn cleanup(self) -> Result<()> {
        self.pool.close().await;
        let admin_pool = PgPool::connect(&self.admin_url).await?;
        let terminate_sql = format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}'",
            self.name
        );
        admin_pool.execute(terminate_sql.as_str()).await?;
        let drop_sql = format!("DROP DATABASE IF EXISTS \"{}\"", self.name);
        admin_pool.execute(drop_sql.as_str()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::database_url_for;

    #[test]
    fn replaces_database_path() {
        let url = database_url_for("postgres://user:pw@localhost:5432/postgres", "t_1").unwrap();
        assert_eq!(url, "postgres://user:pw@localhost:5432/t_1");
    }

    #[test]
    fn adds_database_path_when_missing() {
        let url = database_url_for("postgres://localhost", "t_2").unwrap();
        assert_eq!(url, "postgres://localhost/t_2");
    }
}

use std::str::FromStr;

use anyhow::Context;
use sqlx::{SqlitePool, sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions}};
use time::OffsetDateTime;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await
        .context("could not connect to db")?;

    sqlx::migrate!()
        .run(&db_pool)
        .await
        .context("could not run migrations")?;

    Ok(db_pool)
}

/// Current UTC time; every timestamp column is written through this.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Placeholder list (`?,?,?`) for an `IN` clause of `n` binds.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_lists() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?,?,?");
    }

    #[tokio::test]
    async fn file_databases_run_in_wal_mode() {
        let path = std::env::temp_dir().join(format!("prochat-wal-{}.db", uuid::Uuid::now_v7()));
        let db_pool = connect(&format!("sqlite://{}", path.display())).await.unwrap();
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode").fetch_one(&db_pool).await.unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}

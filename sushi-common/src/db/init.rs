//! Database initialization
//!
//! Opens (creating if needed) the SQLite file and creates the usage tables.
//! Every statement is idempotent, so calling this on an existing database is
//! safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    // Single writer per statistics source; WAL keeps readers unblocked meanwhile
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables on an already-open pool
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_statistics_sources_table(pool).await?;
    create_usage_records_table(pool).await?;
    Ok(())
}

/// Create the statistics_sources table
pub async fn create_statistics_sources_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS statistics_sources (
            statistics_source_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the usage_records table (one row per resource, metric and month)
pub async fn create_usage_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS usage_records (
            usage_record_id INTEGER PRIMARY KEY AUTOINCREMENT,
            statistics_source_id INTEGER NOT NULL,
            report_type TEXT NOT NULL,
            resource_name TEXT,
            publisher TEXT,
            publisher_id TEXT,
            platform TEXT,
            authors TEXT,
            publication_date TEXT,
            article_version TEXT,
            doi TEXT,
            proprietary_id TEXT,
            isbn TEXT,
            print_issn TEXT,
            online_issn TEXT,
            uri TEXT,
            data_type TEXT,
            section_type TEXT,
            yop INTEGER,
            access_type TEXT,
            access_method TEXT,
            parent_title TEXT,
            parent_authors TEXT,
            parent_publication_date TEXT,
            parent_article_version TEXT,
            parent_data_type TEXT,
            parent_doi TEXT,
            parent_proprietary_id TEXT,
            parent_isbn TEXT,
            parent_print_issn TEXT,
            parent_online_issn TEXT,
            parent_uri TEXT,
            metric_type TEXT NOT NULL,
            usage_date TEXT NOT NULL,
            usage_count INTEGER NOT NULL CHECK (usage_count >= 0),
            report_creation_date TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_usage_records_harvest
        ON usage_records (statistics_source_id, report_type, usage_date)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

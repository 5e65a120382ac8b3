//! Usage record persistence
//!
//! [`SqliteUsageStore`] answers which months are already stored for a
//! source and report type, and stores normalized batches in one transaction.

use crate::types::{HarvestLedger, MonthRange, UsageSink};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use sushi_common::{Error, ReportType, Result, StatisticsSource, UsageRecord};

/// SQLite-backed usage store
#[derive(Debug, Clone)]
pub struct SqliteUsageStore {
    pool: SqlitePool,
}

impl SqliteUsageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or rename a statistics source
    pub async fn upsert_statistics_source(&self, source: &StatisticsSource) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO statistics_sources (statistics_source_id, name)
            VALUES (?, ?)
            ON CONFLICT(statistics_source_id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(source.id)
        .bind(&source.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Number of stored rows for a source
    pub async fn count_for_source(&self, statistics_source_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM usage_records WHERE statistics_source_id = ?")
                .bind(statistics_source_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl HarvestLedger for SqliteUsageStore {
    async fn already_harvested(
        &self,
        source: &StatisticsSource,
        report_type: ReportType,
        range: &MonthRange,
    ) -> Result<BTreeSet<NaiveDate>> {
        let months: Vec<NaiveDate> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT usage_date FROM usage_records
            WHERE statistics_source_id = ?
              AND report_type = ?
              AND usage_date BETWEEN ? AND ?
            "#,
        )
        .bind(source.id)
        .bind(report_type.as_str())
        .bind(range.begin())
        .bind(range.last_day())
        .fetch_all(&self.pool)
        .await?;

        Ok(months.into_iter().collect())
    }
}

#[async_trait]
impl UsageSink for SqliteUsageStore {
    async fn bulk_insert(&self, records: &[UsageRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for record in records {
            let (Some(source_id), Some(report_type)) = (record.statistics_source_id, record.report_type)
            else {
                return Err(Error::InvalidInput(
                    "usage record is not tagged with a statistics source and report type".to_string(),
                ));
            };
            let usage_count = i64::try_from(record.usage_count).map_err(|_| {
                Error::InvalidInput(format!("usage count {} out of range", record.usage_count))
            })?;
            let item = &record.item;
            let parent = &item.parent;

            let result = sqlx::query(
                r#"
                INSERT INTO usage_records (
                    statistics_source_id, report_type,
                    resource_name, publisher, publisher_id, platform, authors,
                    publication_date, article_version, doi, proprietary_id, isbn,
                    print_issn, online_issn, uri, data_type, section_type, yop,
                    access_type, access_method,
                    parent_title, parent_authors, parent_publication_date,
                    parent_article_version, parent_data_type, parent_doi,
                    parent_proprietary_id, parent_isbn, parent_print_issn,
                    parent_online_issn, parent_uri,
                    metric_type, usage_date, usage_count, report_creation_date
                ) VALUES (
                    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
                )
                "#,
            )
            .bind(source_id)
            .bind(report_type.as_str())
            .bind(&item.resource_name)
            .bind(&item.publisher)
            .bind(&item.publisher_id)
            .bind(&item.platform)
            .bind(&item.authors)
            .bind(item.publication_date)
            .bind(&item.article_version)
            .bind(&item.doi)
            .bind(&item.proprietary_id)
            .bind(&item.isbn)
            .bind(&item.print_issn)
            .bind(&item.online_issn)
            .bind(&item.uri)
            .bind(&item.data_type)
            .bind(&item.section_type)
            .bind(item.yop)
            .bind(&item.access_type)
            .bind(&item.access_method)
            .bind(&parent.title)
            .bind(&parent.authors)
            .bind(parent.publication_date)
            .bind(&parent.article_version)
            .bind(&parent.data_type)
            .bind(&parent.doi)
            .bind(&parent.proprietary_id)
            .bind(&parent.isbn)
            .bind(&parent.print_issn)
            .bind(&parent.online_issn)
            .bind(&parent.uri)
            .bind(&record.metric_type)
            .bind(record.usage_date)
            .bind(usage_count)
            .bind(record.report_creation_date)
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected();
        }

        tx.commit().await?;
        tracing::info!(records = written, "Stored usage records");
        Ok(written)
    }
}

//! Directory of previously downloaded SUSHI responses
//!
//! Files are named `{source_id}_{REPORT}_{YYYY-MM}_{YYYY-MM}.json`, e.g.
//! `7_TR_2023-01_2023-06.json`.

use crate::types::{FallbackKey, FallbackStore};
use async_trait::async_trait;
use std::path::PathBuf;
use sushi_common::Result;

#[derive(Debug, Clone)]
pub struct DirectoryFallbackStore {
    dir: PathBuf,
}

impl DirectoryFallbackStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_name_for(key: &FallbackKey) -> String {
        format!(
            "{}_{}_{}_{}.json",
            key.statistics_source_id,
            key.report_type,
            key.range.begin().format("%Y-%m"),
            key.range.end().format("%Y-%m")
        )
    }

    pub fn path_for(&self, key: &FallbackKey) -> PathBuf {
        self.dir.join(Self::file_name_for(key))
    }
}

#[async_trait]
impl FallbackStore for DirectoryFallbackStore {
    async fn fallback_file_for(&self, key: &FallbackKey) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                tracing::debug!(path = %path.display(), "Found previously downloaded response");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

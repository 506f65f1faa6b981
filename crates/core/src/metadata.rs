//! File size and timestamps for an input document.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Filesystem metadata captured once per document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Metadata {
    /// Read size and timestamps for `path`.
    ///
    /// Platforms without a birth time report the modification time as the
    /// creation time.
    pub fn read(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)?;
        let modified = meta.modified()?;
        let created = meta.created().unwrap_or(modified);

        Ok(Self {
            size_bytes: meta.len(),
            created_at: DateTime::<Utc>::from(created),
            modified_at: DateTime::<Utc>::from(modified),
        })
    }

    /// Creation time as Unix seconds.
    pub fn created_unix(&self) -> i64 {
        self.created_at.timestamp()
    }

    /// Modification time as Unix seconds.
    pub fn modified_unix(&self) -> i64 {
        self.modified_at.timestamp()
    }
}

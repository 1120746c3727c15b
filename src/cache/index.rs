//! Persisted listing index
//!
//! The listing table is mirrored to `files.index` as JSON, one record per cached directory.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::memory::CacheContext;
use crate::webdav::{AccountPath, FileEntry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IndexRecord {
    account: AccountPath,
    files: Vec<FileEntry>,
}

impl CacheContext {
    /// Write the whole listing table to the index file
    pub fn persist_listing_index(&self) -> Result<()> {
        let _guard = self.lock_index();
        let records: Vec<IndexRecord> = self
            .listings
            .entries()
            .into_iter()
            .map(|(account, files)| IndexRecord {
                account,
                files: files.as_ref().clone(),
            })
            .collect();

        let json = serde_json::to_vec(&records).context("Failed to serialize listing index")?;
        let location = self.disk.index_path();
        self.disk
            .write(&json, &location)
            .with_context(|| format!("Failed to write listing index: {:?}", location))?;

        debug!(listings = records.len(), "Persisted listing index");
        Ok(())
    }

    /// Persist, logging instead of failing
    pub(crate) fn persist_listing_index_logged(&self) {
        if let Err(e) = self.persist_listing_index() {
            warn!(error = %e, "Failed to persist listing index");
        }
    }

    /// Merge the index file into memory. Listings already in memory win.
    ///
    /// Returns the number of listings added.
    pub fn load_listing_index(&self) -> Result<usize> {
        let location = self.disk.index_path();
        let Some(json) = self
            .disk
            .read(&location)
            .with_context(|| format!("Failed to read listing index: {:?}", location))?
        else {
            debug!("No listing index on disk");
            return Ok(0);
        };

        let records: Vec<IndexRecord> =
            serde_json::from_slice(&json).context("Failed to parse listing index")?;

        let mut added = 0;
        for record in records {
            if self.listings.get(&record.account).is_none() {
                self.listings.set(record.account, Arc::new(record.files));
                added += 1;
            }
        }

        info!(listings = added, "Loaded listing index");
        Ok(added)
    }

    /// Remove the index file
    pub fn delete_listing_index(&self) -> Result<()> {
        let _guard = self.lock_index();
        let location = self.disk.index_path();
        self.disk
            .delete(&location)
            .with_context(|| format!("Failed to delete listing index: {:?}", location))
    }
}

//! Cache pruning after a fresh directory listing
//!
//! When the server reports the current contents of a directory, cached listings for
//! subtrees it no longer mentions and cached files it no longer contains are dropped.
//! Every step is best-effort: failures are logged and the rest of the pruning continues.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, warn};

use super::disk::thumbnail_prefix;
use super::memory::CacheContext;
use crate::webdav::account::is_descendant_path;
use crate::webdav::{AccountPath, FileEntry};

impl CacheContext {
    /// Prune memory and disk caches below `directory` against its fresh listing
    pub fn reconcile_listing(&self, directory: &AccountPath, files: &[FileEntry]) {
        let removed = self.prune_listings(directory, files);
        if removed > 0 {
            self.persist_listing_index_logged();
        }
        self.prune_disk(directory, files);
    }

    /// Drop cached listings for subtrees of `directory` that `files` no longer reports
    fn prune_listings(&self, directory: &AccountPath, files: &[FileEntry]) -> usize {
        let children: Vec<&str> = files
            .iter()
            .map(|f| f.path.as_str())
            .filter(|path| *path != directory.path)
            .collect();

        let mut removed = 0;
        for key in self.listings.keys() {
            if !key.is_strict_descendant_of(directory) {
                continue;
            }
            let still_listed = children.iter().any(|child| {
                key.path == *child
                    || is_descendant_path(&key.path, child)
                    || is_descendant_path(child, &key.path)
            });
            if !still_listed {
                debug!(path = %key.path, parent = %directory.path, "Pruning stale listing");
                self.listings.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    /// Delete cached files directly under `directory` that no fresh entry accounts for
    fn prune_disk(&self, directory: &AccountPath, files: &[FileEntry]) {
        let local_dir = self.disk.data_path(directory);
        let children = match self.disk.list_directory(&local_dir) {
            Ok(children) => children,
            Err(e) => {
                warn!(local = %local_dir.display(), error = %e, "Failed to enumerate cache directory");
                return;
            }
        };

        let expected: HashSet<PathBuf> = files
            .iter()
            .map(|f| self.disk.data_path(&AccountPath::new(directory.account.clone(), &f.path)))
            .collect();
        let thumbnail_prefixes: Vec<String> = expected
            .iter()
            .filter_map(|p| p.file_name())
            .map(|name| thumbnail_prefix(&name.to_string_lossy()))
            .collect();
        let index = self.disk.index_path();

        for child in children {
            if child == index || expected.contains(&child) {
                continue;
            }
            let is_kept_thumbnail = child
                .file_name()
                .map(|n| {
                    let name = n.to_string_lossy();
                    thumbnail_prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
                })
                .unwrap_or(false);
            if is_kept_thumbnail {
                continue;
            }

            match self.disk.delete(&child) {
                Ok(()) => debug!(local = %child.display(), "Pruned orphaned cache file"),
                Err(e) => warn!(local = %child.display(), error = %e, "Failed to prune cache file"),
            }
        }
    }
}

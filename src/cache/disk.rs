//! Disk Cache Store
//!
//! Maps cache keys to files under one cache root and performs the byte-level
//! reads, writes and deletes for downloaded content and the listing index.
//!
//! Layout: `<root>/<user@encoded-base-url>/<path>` for raw bytes, the same with a
//! `?<preview query>` suffix on the file name for thumbnails, and `<root>/files.index`
//! for the persisted listing index.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, trace};

use crate::webdav::{AccountPath, ThumbnailProperties};

/// File name of the persisted listing index inside the cache root
pub const INDEX_FILE_NAME: &str = "files.index";

/// Separates a file name from its thumbnail query in thumbnail cache file names
const THUMBNAIL_SEPARATOR: char = '?';

/// Start of every thumbnail query, as it appears in cache file names
const THUMBNAIL_MARKER: &str = "?mode=";

/// Local disk store for cached content
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    /// Root directory for cached files
    cache_dir: PathBuf,
}

impl DiskCacheStore {
    /// Open (and create if needed) a store rooted at `cache_dir`
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory: {:?}", cache_dir))?;

        let store = Self { cache_dir };

        // Clean up any stale temp files from previous runs
        store.cleanup();

        info!(cache_dir = %store.cache_dir.display(), "Disk cache initialized");
        Ok(store)
    }

    /// Get the cache directory path
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Location of the persisted listing index
    pub fn index_path(&self) -> PathBuf {
        self.cache_dir.join(INDEX_FILE_NAME)
    }

    /// Location of the raw bytes cached for a key
    pub fn data_path(&self, key: &AccountPath) -> PathBuf {
        let mut local = self.cache_dir.join(key.account.encoded_description());
        for segment in key.path.split('/').filter(|s| !s.is_empty()) {
            local.push(safe_segment(segment));
        }
        local
    }

    /// Location of one thumbnail variant for a key
    pub fn thumbnail_path(&self, key: &AccountPath, properties: &ThumbnailProperties) -> PathBuf {
        let data_path = self.data_path(key);
        let mut name: OsString = data_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(THUMBNAIL_SEPARATOR.to_string());
        name.push(properties.query());
        data_path.with_file_name(name)
    }

    /// Write bytes, creating parent directories. Replaces existing content atomically.
    pub fn write(&self, data: &[u8], local_path: &Path) -> io::Result<()> {
        let parent = local_path.parent().unwrap_or(&self.cache_dir);
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        tmp.persist(local_path).map_err(|e| e.error)?;

        debug!(local = %local_path.display(), size = data.len(), "Stored file in disk cache");
        Ok(())
    }

    /// Read cached bytes; `None` when nothing is cached there
    pub fn read(&self, local_path: &Path) -> io::Result<Option<Vec<u8>>> {
        match fs::read(local_path) {
            Ok(data) => {
                trace!(local = %local_path.display(), size = data.len(), "Disk cache HIT");
                Ok(Some(data))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(local = %local_path.display(), "Disk cache MISS");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove a cached file or directory tree. Missing locations are fine.
    pub fn delete(&self, local_path: &Path) -> io::Result<()> {
        let metadata = match fs::symlink_metadata(local_path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        if metadata.is_dir() {
            fs::remove_dir_all(local_path)?;
        } else {
            fs::remove_file(local_path)?;
        }
        debug!(local = %local_path.display(), "Removed from disk cache");
        Ok(())
    }

    /// Direct children of a cache directory (empty when it does not exist)
    pub fn list_directory(&self, directory: &Path) -> io::Result<Vec<PathBuf>> {
        let read_dir = match fs::read_dir(directory) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut children = Vec::new();
        for entry in read_dir {
            children.push(entry?.path());
        }
        Ok(children)
    }

    /// Every cached thumbnail variant sharing the file name of `data_path`
    pub fn thumbnail_variants(&self, data_path: &Path) -> io::Result<Vec<PathBuf>> {
        let (Some(parent), Some(name)) = (data_path.parent(), data_path.file_name()) else {
            return Ok(Vec::new());
        };
        let prefix = thumbnail_prefix(&name.to_string_lossy());

        Ok(self
            .list_directory(parent)?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Delete everything under the root except the listing index
    pub fn delete_all(&self) -> io::Result<()> {
        let index = self.index_path();
        for path in self.list_directory(&self.cache_dir)? {
            if path != index {
                self.delete(&path)?;
            }
        }
        info!(cache_dir = %self.cache_dir.display(), "Deleted all disk cached data");
        Ok(())
    }

    /// Delete every cached file under the root for which `matches(file_name)` holds
    pub fn delete_files_where(&self, matches: &dyn Fn(&str) -> bool) -> io::Result<()> {
        self.delete_files_where_in(&self.cache_dir, matches)
    }

    fn delete_files_where_in(&self, directory: &Path, matches: &dyn Fn(&str) -> bool) -> io::Result<()> {
        let index = self.index_path();
        for path in self.list_directory(directory)? {
            if path == index {
                continue;
            }
            if path.is_dir() {
                self.delete_files_where_in(&path, matches)?;
            } else if path
                .file_name()
                .map(|n| matches(&n.to_string_lossy()))
                .unwrap_or(false)
            {
                self.delete(&path)?;
            }
        }
        Ok(())
    }

    /// Total size in bytes of everything under the cache root
    pub fn byte_count(&self) -> u64 {
        directory_size(&self.cache_dir)
    }

    /// Clean up stale temp files on startup
    pub fn cleanup(&self) {
        // NamedTempFile names start with ".tmp"
        if let Ok(read_dir) = fs::read_dir(&self.cache_dir) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                let is_temp = path
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with(".tmp"))
                    .unwrap_or(false);
                if is_temp && path.is_file() {
                    debug!(path = %path.display(), "Removing stale temp file");
                    let _ = fs::remove_file(&path);
                }
            }
        }
    }
}

/// Whether a cache file name belongs to a thumbnail variant
pub fn is_thumbnail_file_name(name: &str) -> bool {
    name.contains(THUMBNAIL_MARKER)
}

/// Prefix shared by the thumbnail variants of the data file `file_name`
pub(crate) fn thumbnail_prefix(file_name: &str) -> String {
    format!("{}{}", file_name, THUMBNAIL_MARKER)
}

/// Keep `.` and `..` from walking out of the cache tree
fn safe_segment(segment: &str) -> String {
    match segment {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => segment.to_string(),
    }
}

fn directory_size(path: &Path) -> u64 {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return 0;
    };
    if !metadata.is_dir() {
        return metadata.len();
    }
    fs::read_dir(path)
        .map(|read_dir| {
            read_dir
                .flatten()
                .map(|entry| directory_size(&entry.path()))
                .sum()
        })
        .unwrap_or(0)
}

/// Human-readable byte count using decimal units, e.g. `1.5 MB`
pub fn format_byte_count(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];

    if bytes < 1000 {
        return if bytes == 1 {
            "1 byte".to_string()
        } else {
            format!("{} bytes", bytes)
        };
    }

    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    if value >= 100.0 {
        format!("{:.0} {}", value, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webdav::{ContentMode, SimpleAccount};
    use tempfile::TempDir;

    fn key(path: &str) -> AccountPath {
        AccountPath::for_account(&SimpleAccount::new("u", "https://host.com/dav"), path).unwrap()
    }

    #[test]
    fn test_paths_are_deterministic() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path().to_path_buf()).unwrap();

        let a = store.data_path(&key("/docs/a.txt"));
        let b = store.data_path(&key("docs/a.txt/"));
        assert_eq!(a, b);
        assert!(a.starts_with(dir.path().join("u@https%3A::host.com:dav")));
        assert!(a.ends_with("docs/a.txt"));

        let escaped = store.data_path(&key("docs/../../etc"));
        assert!(escaped.starts_with(dir.path()));
        assert!(!escaped.components().any(|c| c == std::path::Component::ParentDir));
    }

    #[test]
    fn test_thumbnail_paths_differ_by_properties() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path().to_path_buf()).unwrap();
        let k = key("img/cat.png");

        let fill = store.thumbnail_path(&k, &ThumbnailProperties::FILL);
        let fit = store.thumbnail_path(&k, &ThumbnailProperties::FIT);
        let sized = store.thumbnail_path(&k, &ThumbnailProperties::new(10, 20, ContentMode::Fill));
        assert_ne!(fill, fit);
        assert_eq!(fill.file_name().unwrap(), "cat.png?mode=cover&a=1");
        assert_eq!(sized.file_name().unwrap(), "cat.png?mode=cover&x=10&y=20&a=1");
        assert_eq!(fill.parent(), store.data_path(&k).parent());
    }

    #[test]
    fn test_write_read_delete() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path().to_path_buf()).unwrap();
        let path = store.data_path(&key("a/b/c.bin"));

        assert_eq!(store.read(&path).unwrap(), None);
        store.write(b"first", &path).unwrap();
        store.write(b"second", &path).unwrap();
        assert_eq!(store.read(&path).unwrap(), Some(b"second".to_vec()));

        store.delete(&path).unwrap();
        assert_eq!(store.read(&path).unwrap(), None);
        // Deleting again is a no-op
        store.delete(&path).unwrap();
    }

    #[test]
    fn test_thumbnail_variants() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path().to_path_buf()).unwrap();
        let k = key("pics/cat.png");
        let data = store.data_path(&k);

        store.write(b"full", &data).unwrap();
        store.write(b"t1", &store.thumbnail_path(&k, &ThumbnailProperties::FILL)).unwrap();
        store.write(b"t2", &store.thumbnail_path(&k, &ThumbnailProperties::FIT)).unwrap();
        store.write(b"other", &store.data_path(&key("pics/cat.png.bak"))).unwrap();

        let variants = store.thumbnail_variants(&data).unwrap();
        assert_eq!(variants.len(), 2);
        assert!(variants.iter().all(|p| p != &data));
    }

    #[test]
    fn test_delete_all_keeps_index() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path().to_path_buf()).unwrap();
        store.write(b"[]", &store.index_path()).unwrap();
        store.write(b"x", &store.data_path(&key("a/b"))).unwrap();

        store.delete_all().unwrap();
        assert!(store.index_path().exists());
        assert_eq!(store.list_directory(dir.path()).unwrap(), vec![store.index_path()]);
    }

    #[test]
    fn test_delete_files_where() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path().to_path_buf()).unwrap();
        let k = key("a/photo.jpg");
        let thumb = store.thumbnail_path(&k, &ThumbnailProperties::FILL);
        store.write(b"x", &store.data_path(&k)).unwrap();
        store.write(b"t", &thumb).unwrap();

        store.delete_files_where(&is_thumbnail_file_name).unwrap();
        assert!(!thumb.exists());
        assert!(store.data_path(&k).exists());
    }

    #[test]
    fn test_question_mark_in_server_name_is_data() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path().to_path_buf()).unwrap();
        let odd = key("a/what?.txt");
        let k = key("a/what");
        let thumb = store.thumbnail_path(&k, &ThumbnailProperties::FIT);
        store.write(b"x", &store.data_path(&odd)).unwrap();
        store.write(b"t", &thumb).unwrap();

        assert!(!is_thumbnail_file_name("what?.txt"));
        assert_eq!(store.thumbnail_variants(&store.data_path(&k)).unwrap(), vec![thumb.clone()]);

        store.delete_files_where(&is_thumbnail_file_name).unwrap();
        assert!(!thumb.exists());
        assert!(store.data_path(&odd).exists());
    }

    #[test]
    fn test_byte_count() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.byte_count(), 0);
        store.write(&[0u8; 1500], &store.data_path(&key("a"))).unwrap();
        store.write(&[0u8; 500], &store.data_path(&key("b/c"))).unwrap();
        assert_eq!(store.byte_count(), 2000);
    }

    #[test]
    fn test_format_byte_count() {
        assert_eq!(format_byte_count(0), "0 bytes");
        assert_eq!(format_byte_count(1), "1 byte");
        assert_eq!(format_byte_count(999), "999 bytes");
        assert_eq!(format_byte_count(1500), "1.5 KB");
        assert_eq!(format_byte_count(2_000_000), "2.0 MB");
        assert_eq!(format_byte_count(250_000_000_000), "250 GB");
    }
}

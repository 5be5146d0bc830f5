//! On-disk named caches.
//!
//! Each cache is a directory under the storage root. An entry is two files
//! named after the UUID v5 of its URL: `<key>.body` and `<key>.json`
//! (metadata). Both files are written to a `.tmp` sibling and renamed into
//! place, body first, so a metadata file always points at a complete body.

use crate::clock::now_epoch_ms;
use crate::offline::fetch::FetchedResponse;
use crate::offline::{OfflineError, OfflineResult};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

static CACHE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid cache name regex"));

const BODY_EXT: &str = "body";
const META_EXT: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    content_type: Option<String>,
    stored_at: i64,
    body_len: u64,
}

/// Response read back from a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Epoch milliseconds.
    pub stored_at: i64,
}

/// Root directory holding every named cache.
#[derive(Debug, Clone)]
pub struct CacheStorage {
    root: PathBuf,
}

impl CacheStorage {
    pub fn new(root: impl AsRef<Path>) -> OfflineResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens (creating when needed) the named cache.
    pub fn open(&self, name: &str) -> OfflineResult<Cache> {
        let dir = self.cache_dir(name)?;
        fs::create_dir_all(&dir)?;
        Ok(Cache {
            name: name.to_string(),
            dir,
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.cache_dir(name).map(|dir| dir.is_dir()).unwrap_or(false)
    }

    /// Names of existing caches, sorted.
    pub fn cache_names(&self) -> OfflineResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if CACHE_NAME_RE.is_match(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Deletes a cache; returns whether it existed.
    pub fn delete(&self, name: &str) -> OfflineResult<bool> {
        let dir = self.cache_dir(name)?;
        if !dir.is_dir() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)?;
        Ok(true)
    }

    fn cache_dir(&self, name: &str) -> OfflineResult<PathBuf> {
        if !CACHE_NAME_RE.is_match(name) {
            return Err(OfflineError::InvalidCacheName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

/// One named cache.
#[derive(Debug, Clone)]
pub struct Cache {
    name: String,
    dir: PathBuf,
}

impl Cache {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores a response for `url`, replacing any previous entry.
    pub fn put(&self, url: &str, response: &FetchedResponse) -> OfflineResult<()> {
        let key = entry_key(url);
        self.write_replacing(&key, BODY_EXT, &response.body)?;

        let meta = EntryMeta {
            url: url.to_string(),
            status: response.status,
            content_type: response.content_type.clone(),
            stored_at: now_epoch_ms(),
            body_len: response.body.len() as u64,
        };
        let meta_json = serde_json::to_vec(&meta)
            .map_err(|err| OfflineError::CorruptEntry(err.to_string()))?;
        self.write_replacing(&key, META_EXT, &meta_json)
    }

    /// Like [`Cache::lookup`], but a corrupt entry is dropped and reported
    /// as a miss.
    pub fn lookup_intact(&self, url: &str) -> OfflineResult<Option<CachedResponse>> {
        match self.lookup(url) {
            Err(OfflineError::CorruptEntry(detail)) => {
                warn!(
                    "event=cache_lookup module=offline status=error cache={} error_code=corrupt_entry detail={}",
                    self.name, detail
                );
                if let Err(err) = self.delete(url) {
                    warn!(
                        "event=cache_evict module=offline status=error cache={} error={}",
                        self.name, err
                    );
                }
                Ok(None)
            }
            other => other,
        }
    }

    /// Looks up the entry stored for `url`.
    pub fn lookup(&self, url: &str) -> OfflineResult<Option<CachedResponse>> {
        let key = entry_key(url);
        let Some(meta) = self.read_meta(&self.path_for(&key, META_EXT))? else {
            return Ok(None);
        };
        if meta.url != url {
            return Err(OfflineError::CorruptEntry(format!(
                "entry {key} in cache {} belongs to another url",
                self.name
            )));
        }

        let body = match fs::read(self.path_for(&key, BODY_EXT)) {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "event=cache_lookup module=offline status=error cache={} error_code=body_missing",
                    self.name
                );
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        if body.len() as u64 != meta.body_len {
            return Err(OfflineError::CorruptEntry(format!(
                "entry {key} in cache {} has {} bytes, expected {}",
                self.name,
                body.len(),
                meta.body_len
            )));
        }

        Ok(Some(CachedResponse {
            url: meta.url,
            status: meta.status,
            content_type: meta.content_type,
            body,
            stored_at: meta.stored_at,
        }))
    }

    pub fn contains(&self, url: &str) -> bool {
        self.path_for(&entry_key(url), META_EXT).is_file()
    }

    /// Removes the entry for `url`; returns whether it existed.
    pub fn delete(&self, url: &str) -> OfflineResult<bool> {
        let key = entry_key(url);
        let meta_path = self.path_for(&key, META_EXT);
        if !meta_path.is_file() {
            return Ok(false);
        }
        fs::remove_file(meta_path)?;
        let body_path = self.path_for(&key, BODY_EXT);
        if body_path.is_file() {
            fs::remove_file(body_path)?;
        }
        Ok(true)
    }

    /// URLs stored in this cache, sorted.
    pub fn keys(&self) -> OfflineResult<Vec<String>> {
        let mut urls = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(META_EXT) {
                continue;
            }
            if let Some(meta) = self.read_meta(&path)? {
                urls.push(meta.url);
            }
        }
        urls.sort();
        Ok(urls)
    }

    fn read_meta(&self, path: &Path) -> OfflineResult<Option<EntryMeta>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| OfflineError::CorruptEntry(format!("{}: {err}", path.display())))
    }

    fn write_replacing(&self, key: &str, ext: &str, bytes: &[u8]) -> OfflineResult<()> {
        let tmp_path = self.dir.join(format!("{key}.{ext}.tmp"));
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, self.path_for(key, ext))?;
        Ok(())
    }

    fn path_for(&self, key: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ext}"))
    }
}

fn entry_key(url: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes())
        .simple()
        .to_string()
}

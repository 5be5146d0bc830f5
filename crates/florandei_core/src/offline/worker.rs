//! App-shell caching lifecycle: install, activate and fetch.

use crate::offline::fetch::{FetchRequest, FetchedResponse, Fetcher};
use crate::offline::storage::{Cache, CacheStorage, CachedResponse};
use crate::offline::{OfflineError, OfflineResult};
use log::{debug, info, warn};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// App-shell cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineSettings {
    /// Versioned cache name; bump it to retire old shells on activation.
    pub cache_name: String,
    /// Origin that relative app-shell paths resolve against.
    pub base_url: String,
    pub precache_urls: Vec<String>,
    /// Hosts (and their subdomains) that bypass the app-shell cache.
    pub bypass_hosts: Vec<String>,
    pub fallback_path: String,
    pub network_timeout_secs: u64,
}

impl Default for OfflineSettings {
    fn default() -> Self {
        Self {
            cache_name: "florandei-v1".to_string(),
            base_url: "http://localhost:8080".to_string(),
            precache_urls: [
                "/index.html",
                "/css/styles.css",
                "/js/db.js",
                "/js/map.js",
                "/js/ui.js",
                "/js/app.js",
                "/manifest.json",
                "/icon.png",
            ]
            .iter()
            .map(|path| path.to_string())
            .collect(),
            bypass_hosts: vec![
                "tile.openstreetmap.org".to_string(),
                "unpkg.com".to_string(),
                "cdn.jsdelivr.net".to_string(),
            ],
            fallback_path: "/index.html".to_string(),
            network_timeout_secs: 10,
        }
    }
}

/// How a fetch was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Fresh network response (stored when it was a `200`).
    Network(FetchedResponse),
    /// Network failed; served from the cache.
    Cached(CachedResponse),
    /// Network failed on a navigation; served the cached app shell.
    NavigationFallback(CachedResponse),
    /// Not eligible for caching; forwarded untouched.
    Passthrough(FetchedResponse),
}

impl FetchOutcome {
    pub fn status(&self) -> u16 {
        match self {
            Self::Network(response) | Self::Passthrough(response) => response.status,
            Self::Cached(response) | Self::NavigationFallback(response) => response.status,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            Self::Network(response) | Self::Passthrough(response) => &response.body,
            Self::Cached(response) | Self::NavigationFallback(response) => &response.body,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Cached(_) => "cache",
            Self::NavigationFallback(_) => "fallback",
            Self::Passthrough(_) => "passthrough",
        }
    }
}

/// Network-first proxy over the app-shell cache.
pub struct OfflineWorker<F: Fetcher> {
    storage: CacheStorage,
    fetcher: F,
    settings: OfflineSettings,
    /// Other caches `activate` must keep, e.g. the tile cache.
    retained_caches: Vec<String>,
}

impl<F: Fetcher> OfflineWorker<F> {
    pub fn new(storage: CacheStorage, fetcher: F, settings: OfflineSettings) -> Self {
        Self {
            storage,
            fetcher,
            settings,
            retained_caches: Vec::new(),
        }
    }

    /// Keeps `cache_name` alive across activations.
    pub fn retain_cache(mut self, cache_name: impl Into<String>) -> Self {
        self.retained_caches.push(cache_name.into());
        self
    }

    pub fn settings(&self) -> &OfflineSettings {
        &self.settings
    }

    /// Precaches the app shell; returns how many entries were stored.
    ///
    /// Every URL is fetched before anything is written, so a failed install
    /// leaves the cache untouched.
    pub fn install(&self) -> OfflineResult<usize> {
        info!(
            "event=offline_install module=offline status=start cache={} urls={}",
            self.settings.cache_name,
            self.settings.precache_urls.len()
        );

        let mut fetched = Vec::with_capacity(self.settings.precache_urls.len());
        for path in &self.settings.precache_urls {
            let url = self.resolve(path);
            let response = self
                .fetcher
                .fetch(&FetchRequest::get(url.clone()))
                .map_err(|err| OfflineError::InstallFailed {
                    url: url.clone(),
                    reason: err.to_string(),
                })?;
            if !response.is_ok() {
                warn!(
                    "event=offline_install module=offline status=error error_code=bad_status status={}",
                    response.status
                );
                return Err(OfflineError::InstallFailed {
                    url,
                    reason: format!("HTTP status {}", response.status),
                });
            }
            fetched.push((url, response));
        }

        let cache = self.app_cache()?;
        for (url, response) in &fetched {
            cache.put(url, response)?;
        }

        info!(
            "event=offline_install module=offline status=ok cache={} stored={}",
            self.settings.cache_name,
            fetched.len()
        );
        Ok(fetched.len())
    }

    /// Deletes every cache other than the current app-shell and retained
    /// caches; returns the deleted names.
    pub fn activate(&self) -> OfflineResult<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.storage.cache_names()? {
            if name == self.settings.cache_name || self.retained_caches.contains(&name) {
                continue;
            }
            if self.storage.delete(&name)? {
                info!("event=offline_activate module=offline status=ok removed_cache={name}");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Answers a request network-first, falling back to cached copies.
    pub fn handle_fetch(&self, request: &FetchRequest) -> OfflineResult<FetchOutcome> {
        let url = self.resolve(&request.url);
        let resolved = FetchRequest {
            url: url.clone(),
            ..request.clone()
        };

        if !resolved.is_get() || self.is_bypassed(&url) {
            let response = self.fetcher.fetch(&resolved)?;
            return Ok(FetchOutcome::Passthrough(response));
        }

        match self.fetcher.fetch(&resolved) {
            Ok(response) => {
                if response.is_ok() {
                    if let Err(err) = self.app_cache().and_then(|cache| cache.put(&url, &response)) {
                        warn!(
                            "event=offline_fetch module=offline status=error error_code=cache_put_failed error={}",
                            err
                        );
                    }
                }
                Ok(FetchOutcome::Network(response))
            }
            Err(err) => {
                debug!("event=offline_fetch module=offline status=fallback error={err}");
                let cache = self.app_cache()?;
                if let Some(cached) = cache.lookup_intact(&url)? {
                    return Ok(FetchOutcome::Cached(cached));
                }
                if request.navigate {
                    let fallback_url = self.resolve(&self.settings.fallback_path);
                    if let Some(shell) = cache.lookup_intact(&fallback_url)? {
                        return Ok(FetchOutcome::NavigationFallback(shell));
                    }
                }
                Err(OfflineError::Offline(url))
            }
        }
    }

    fn app_cache(&self) -> OfflineResult<Cache> {
        self.storage.open(&self.settings.cache_name)
    }

    /// Resolves app-relative paths against `base_url`.
    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }

    fn is_bypassed(&self, url: &str) -> bool {
        let Some(host) = Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };
        self.settings.bypass_hosts.iter().any(|bypass| {
            let bypass = bypass.trim().to_ascii_lowercase();
            !bypass.is_empty() && (host == bypass || host.ends_with(&format!(".{bypass}")))
        })
    }
}

//! Cache-first map tile access and area prefetch.

use crate::map::area::MapArea;
use crate::map::tiles::{tile_count_for_bounds, tiles_for_bounds, TileCoord};
use crate::offline::fetch::{FetchRequest, Fetcher};
use crate::offline::storage::{Cache, CacheStorage};
use crate::offline::{OfflineError, OfflineResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tile layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSettings {
    pub url_template: String,
    pub subdomains: Vec<String>,
    pub user_agent: String,
    pub cache_name: String,
    /// Upper bound on tiles a single prefetch may download.
    pub max_prefetch_tiles: usize,
    /// Highest zoom prefetched when no zoom list is given.
    pub default_prefetch_max_zoom: u8,
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            subdomains: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            user_agent: format!("florandei/{}", env!("CARGO_PKG_VERSION")),
            cache_name: "florandei-tiles-v1".to_string(),
            max_prefetch_tiles: 2500,
            default_prefetch_max_zoom: 16,
        }
    }
}

/// Tile bytes and where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFetch {
    pub tile: TileCoord,
    pub body: Vec<u8>,
    pub from_cache: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchReport {
    pub planned: usize,
    pub fetched: usize,
    pub already_cached: usize,
    pub failed: usize,
}

/// Cache-first tile store.
pub struct TileCache<F: Fetcher> {
    cache: Cache,
    fetcher: F,
    settings: TileSettings,
}

impl<F: Fetcher> TileCache<F> {
    pub fn new(storage: &CacheStorage, fetcher: F, settings: TileSettings) -> OfflineResult<Self> {
        let cache = storage.open(&settings.cache_name)?;
        Ok(Self {
            cache,
            fetcher,
            settings,
        })
    }

    pub fn url_for(&self, tile: TileCoord) -> String {
        tile.url(&self.settings.url_template, &self.settings.subdomains)
    }

    /// Returns a tile from the cache, downloading and storing it on a miss.
    pub fn get_tile(&self, tile: TileCoord) -> OfflineResult<TileFetch> {
        let url = self.url_for(tile);
        if let Some(cached) = self.cache.lookup_intact(&url)? {
            return Ok(TileFetch {
                tile,
                body: cached.body,
                from_cache: true,
            });
        }

        let response = self.fetcher.fetch(&FetchRequest::get(url.clone()))?;
        if !response.is_ok() {
            return Err(OfflineError::UnexpectedStatus {
                url,
                status: response.status,
            });
        }
        self.cache.put(&url, &response)?;
        Ok(TileFetch {
            tile,
            body: response.body,
            from_cache: false,
        })
    }

    /// Zoom levels prefetched by default: the area minimum up to the
    /// configured ceiling.
    pub fn default_zooms(&self, area: &MapArea) -> Vec<u8> {
        let ceiling = area.clamp_zoom(self.settings.default_prefetch_max_zoom);
        (area.min_zoom..=ceiling).collect()
    }

    /// Downloads every missing tile covering the area at the given zooms.
    ///
    /// Zooms outside the area's limits are dropped. The plan size is checked
    /// against `max_prefetch_tiles` before any tile list is built. Individual
    /// tile failures are counted, not fatal.
    pub fn prefetch(&self, area: &MapArea, zooms: &[u8]) -> OfflineResult<PrefetchReport> {
        let zooms: BTreeSet<u8> = zooms
            .iter()
            .copied()
            .filter(|zoom| (area.min_zoom..=area.max_zoom).contains(zoom))
            .collect();

        let limit = self.settings.max_prefetch_tiles;
        let planned = zooms
            .iter()
            .try_fold(0u64, |total, zoom| {
                total.checked_add(tile_count_for_bounds(&area.bounds, *zoom))
            })
            .unwrap_or(u64::MAX);
        if planned > limit as u64 {
            return Err(OfflineError::PrefetchTooLarge { planned, limit });
        }

        let plan: Vec<TileCoord> = zooms
            .iter()
            .flat_map(|zoom| tiles_for_bounds(&area.bounds, *zoom))
            .collect();

        info!(
            "event=tile_prefetch module=offline status=start planned={} zooms={:?}",
            plan.len(),
            zooms
        );
        let mut report = PrefetchReport {
            planned: plan.len(),
            ..PrefetchReport::default()
        };
        for tile in plan {
            if self.cache.contains(&self.url_for(tile)) {
                report.already_cached += 1;
                continue;
            }
            match self.get_tile(tile) {
                Ok(_) => report.fetched += 1,
                Err(err) => {
                    warn!(
                        "event=tile_prefetch module=offline status=error z={} x={} y={} error={}",
                        tile.z, tile.x, tile.y, err
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "event=tile_prefetch module=offline status=ok fetched={} already_cached={} failed={}",
            report.fetched, report.already_cached, report.failed
        );
        Ok(report)
    }
}

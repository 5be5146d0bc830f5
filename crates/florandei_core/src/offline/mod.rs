//! Offline caching proxy for the app shell and map tiles.
//!
//! # Responsibility
//! - Persist fetched responses in named, versioned caches on disk.
//! - Run the install / activate / fetch lifecycle for the app shell with a
//!   network-first strategy.
//! - Serve map tiles cache-first and prefetch the survey area.
//!
//! # Invariants
//! - Only `200` responses to `GET` requests are stored.
//! - Activation keeps exactly the current app-shell and tile caches.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod fetch;
pub mod storage;
pub mod tiles;
pub mod worker;

pub use fetch::{FetchError, FetchRequest, FetchedResponse, Fetcher, HttpFetcher};
pub use storage::{Cache, CacheStorage, CachedResponse};
pub use tiles::{PrefetchReport, TileCache, TileFetch, TileSettings};
pub use worker::{FetchOutcome, OfflineSettings, OfflineWorker};

pub type OfflineResult<T> = Result<T, OfflineError>;

#[derive(Debug)]
pub enum OfflineError {
    Io(std::io::Error),
    InvalidCacheName(String),
    CorruptEntry(String),
    Fetch(FetchError),
    /// Precache failed; nothing was stored.
    InstallFailed {
        url: String,
        reason: String,
    },
    UnexpectedStatus {
        url: String,
        status: u16,
    },
    /// Network unreachable and no cached copy.
    Offline(String),
    PrefetchTooLarge {
        planned: u64,
        limit: usize,
    },
}

impl Display for OfflineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "cache storage error: {err}"),
            Self::InvalidCacheName(name) => write!(f, "invalid cache name `{name}`"),
            Self::CorruptEntry(message) => write!(f, "corrupt cache entry: {message}"),
            Self::Fetch(err) => write!(f, "{err}"),
            Self::InstallFailed { url, reason } => {
                write!(f, "offline install failed at {url}: {reason}")
            }
            Self::UnexpectedStatus { url, status } => {
                write!(f, "unexpected HTTP status {status} for {url}")
            }
            Self::Offline(url) => write!(f, "offline and no cached copy of {url}"),
            Self::PrefetchTooLarge { planned, limit } => write!(
                f,
                "prefetch plan has {planned} tiles, more than the limit of {limit}"
            ),
        }
    }
}

impl Error for OfflineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Fetch(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for OfflineError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<FetchError> for OfflineError {
    fn from(value: FetchError) -> Self {
        Self::Fetch(value)
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Download-once content cache keyed by origin URL.
//!
//! Every cached file lives at a path derived from its URL by stripping a
//! fixed base prefix, so the mapping is deterministic and two URLs never
//! share a file. A file present at its cache path is trusted as-is: there is
//! no checksum or freshness check and nothing is evicted automatically.
//!
//! Downloads go to a `.part` sibling first and are renamed into place only
//! once complete, so an interrupted transfer is never mistaken for a hit.

pub mod fetch;
pub mod progress;

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub use fetch::{FetchError, Fetcher, HttpFetcher};

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The download itself failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The URL cannot be mapped to a cache path.
    #[error("{url} is not a downloadable file under {base}")]
    UnexpectedUrl {
        /// Offending URL.
        url: String,
        /// Base prefix every cached URL must start with.
        base: String,
    },

    /// I/O error probing or finalizing a cache entry.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// What [`ContentCache::ensure`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The file was already cached.
    Hit,
    /// The file was downloaded; carries the number of bytes written.
    Downloaded(u64),
}

/// State of a cache path on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Present,
    Missing,
}

/// A cache directory plus the fetcher used to fill it.
#[derive(Clone)]
pub struct ContentCache {
    root: PathBuf,
    base_url: String,
    fetcher: Arc<dyn Fetcher>,
}

impl ContentCache {
    /// Creates a cache rooted at `root` for URLs beginning with `base_url`.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        base_url: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
            fetcher,
        }
    }

    /// Cache directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the local path that caches `url`.
    ///
    /// `https://download.geofabrik.de/europe/france-latest.osm.pbf` maps to
    /// `<root>/europe/france-latest.osm.pbf`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::UnexpectedUrl`] if `url` does not start with the
    /// base prefix, names no file, or would escape the cache directory.
    pub fn path_for(&self, url: &str) -> Result<PathBuf, CacheError> {
        let unexpected = || CacheError::UnexpectedUrl {
            url: url.to_string(),
            base: self.base_url.clone(),
        };

        let suffix = url.strip_prefix(&self.base_url).ok_or_else(unexpected)?;
        if suffix.is_empty() || suffix.ends_with('/') {
            return Err(unexpected());
        }

        let relative = Path::new(suffix);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(unexpected());
        }

        Ok(self.root.join(relative))
    }

    /// Ensures `url` is cached at [`path_for`](Self::path_for) and returns
    /// that path.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the URL cannot be mapped or the download
    /// fails.
    pub async fn ensure_url(&self, url: &str) -> Result<PathBuf, CacheError> {
        let path = self.path_for(url)?;
        self.ensure(url, &path).await?;
        Ok(path)
    }

    /// Downloads `url` to `path` unless a file is already there.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Fetch`] if the transfer fails, or
    /// [`CacheError::Io`] if the path cannot be probed (permissions, a
    /// directory in the way) or the finished download cannot be moved into
    /// place.
    pub async fn ensure(&self, url: &str, path: &Path) -> Result<EnsureOutcome, CacheError> {
        if probe(path).await? == Probe::Present {
            log::info!("{} already exists, not downloading it", path.display());
            return Ok(EnsureOutcome::Hit);
        }

        log::info!("{} missing, downloading it", path.display());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::Io {
                    path: parent.display().to_string(),
                    source: e,
                })?;
        }

        let part = part_path(path);
        let written = match self.fetcher.fetch_to(url, &part).await {
            Ok(written) => written,
            Err(e) => {
                match tokio::fs::remove_file(&part).await {
                    Err(rm) if rm.kind() != std::io::ErrorKind::NotFound => {
                        log::warn!(
                            "Failed to remove partial download {}: {rm}",
                            part.display()
                        );
                    }
                    _ => {}
                }
                return Err(e.into());
            }
        };

        tokio::fs::rename(&part, path)
            .await
            .map_err(|e| CacheError::Io {
                path: path.display().to_string(),
                source: e,
            })?;

        Ok(EnsureOutcome::Downloaded(written))
    }
}

/// Distinguishes a cached file from a missing one; anything else is an error.
async fn probe(path: &Path) -> Result<Probe, CacheError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(Probe::Present),
        Ok(_) => Err(CacheError::Io {
            path: path.display().to_string(),
            source: std::io::Error::other("cache path exists but is not a file"),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Probe::Missing),
        Err(e) => Err(CacheError::Io {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

/// `<path>.part`, the staging file for an in-flight download.
fn part_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

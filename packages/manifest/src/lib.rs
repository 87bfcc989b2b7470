#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Provenance manifest of processed boundaries.
//!
//! The manifest is a JSON object keyed by region, then by boundary, whose
//! values are `[friendly_name, timestamp]` pairs:
//!
//! ```json
//! {
//!   "france": {
//!     "paris": ["Paris", "2024-05-01T20:21:02Z"]
//!   }
//! }
//! ```
//!
//! Every update re-reads the file, merges one entry, and writes the whole
//! document back, so entries written by earlier runs are preserved. A
//! missing or unparsable file is treated as an empty manifest since the
//! manifest can always be regenerated. There is no locking: one process
//! owns the file at a time.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use osm_extract_pipeline_models::{BoundaryKey, ManifestEntry};
use serde::{Deserialize, Serialize};

/// Errors from manifest operations.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// I/O error reading or writing the manifest.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// In-memory manifest document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    regions: BTreeMap<String, BTreeMap<String, ManifestEntry>>,
}

impl Manifest {
    /// Reads the manifest at `path`.
    ///
    /// A missing or unparsable file yields an empty manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] if the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No existing manifest at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ManifestError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        match serde_json::from_str(&contents) {
            Ok(manifest) => Ok(manifest),
            Err(e) => {
                log::warn!(
                    "Failed to parse manifest {}: {e}; starting a new one",
                    path.display()
                );
                Ok(Self::default())
            }
        }
    }

    /// Writes the manifest to `path` as pretty-printed JSON.
    ///
    /// Uses an atomic write pattern (write to `.tmp`, then rename).
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let io_err = |source: std::io::Error| ManifestError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp_path = tmp_path(path);
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp_path, contents).map_err(io_err)?;
        std::fs::rename(&tmp_path, path).map_err(io_err)?;
        Ok(())
    }

    /// Sets the entry for `key`, returning the previous one.
    pub fn insert(&mut self, key: &BoundaryKey, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.regions
            .entry(key.region.clone())
            .or_default()
            .insert(key.boundary.clone(), entry)
    }

    /// Looks up the entry for `key`.
    #[must_use]
    pub fn get(&self, key: &BoundaryKey) -> Option<&ManifestEntry> {
        self.regions.get(&key.region)?.get(&key.boundary)
    }

    /// Boundaries recorded for one region.
    #[must_use]
    pub fn region(&self, region: &str) -> Option<&BTreeMap<String, ManifestEntry>> {
        self.regions.get(region)
    }

    /// Total number of recorded boundaries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.values().map(BTreeMap::len).sum()
    }

    /// Whether no boundary has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-merge-write access to the manifest file.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// Creates a store for the manifest at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Manifest file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the current manifest from disk.
    ///
    /// # Errors
    ///
    /// See [`Manifest::load`].
    pub fn read(&self) -> Result<Manifest, ManifestError> {
        Manifest::load(&self.path)
    }

    /// Records `entry` for `key`, overwriting any previous value and keeping
    /// every other entry.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the manifest cannot be read or written.
    pub fn upsert(&self, key: &BoundaryKey, entry: ManifestEntry) -> Result<(), ManifestError> {
        let mut manifest = self.read()?;
        match manifest.insert(key, entry.clone()) {
            Some(previous) if previous == entry => {
                log::debug!("Manifest entry for {key} unchanged");
            }
            Some(_) => log::info!("Updated manifest entry for {key}"),
            None => log::info!("Added manifest entry for {key}"),
        }
        manifest.save(&self.path)?;
        log::info!("Saved manifest to {}", self.path.display());
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

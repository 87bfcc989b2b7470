#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Boundary extract pipeline.
//!
//! For one boundary file under the input root:
//!
//! 1. check the path and derive its `<region>/<boundary>` key,
//! 2. resolve the smallest enclosing region and ensure its extract is cached,
//! 3. clip the extract to the boundary into the mirrored output path,
//! 4. read the timestamp of the clipped data,
//! 5. record `(friendly name, timestamp)` in the manifest.
//!
//! Each step needs the previous one to succeed; nothing is retried. The
//! manifest is only touched once clipping and timestamp reading both
//! succeeded. [`batch`] drives the pipeline over the whole input root.
//!
//! The region index is downloaded (if needed) and parsed at most once per
//! [`ExtractPipeline`], then shared by every boundary it processes.

pub mod batch;
pub mod config;
pub mod tools;

#[cfg(test)]
mod test_support;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use osm_extract_cache::{CacheError, ContentCache, Fetcher};
use osm_extract_manifest::{ManifestError, ManifestStore};
use osm_extract_pipeline_models::{BoundaryKey, ExtractConfig, ManifestEntry};
use osm_extract_regions::{Boundary, RegionError, RegionIndex, Resolution, find_smallest};
use thiserror::Error;
use tokio::sync::OnceCell;

pub use batch::{SyncOptions, SyncSummary};
pub use tools::{OsmiumRunner, ToolRunner};

/// Errors that abort processing of a boundary.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The boundary file does not live under the input root.
    #[error("{path} must be in {root}")]
    InvalidPath {
        /// Offending boundary path.
        path: String,
        /// Configured input root.
        root: String,
    },

    /// The boundary path is not `<region>/<boundary>` below the input root.
    #[error("{path} has an unexpected form -- should just be <REGION>/<BOUNDARY>")]
    ManifestPath {
        /// Path relative to the input root.
        path: String,
    },

    /// The external clip tool failed.
    #[error("Clipping {boundary} failed: {message}")]
    ClipFailed {
        /// Boundary being clipped.
        boundary: String,
        /// Tool failure description.
        message: String,
    },

    /// The data timestamp could not be read from an extract.
    #[error("Reading the timestamp of {path} failed: {message}")]
    Timestamp {
        /// Extract being inspected.
        path: String,
        /// Tool failure description.
        message: String,
    },

    /// The configuration file is invalid.
    #[error("Invalid config {path}: {message}")]
    Config {
        /// Config file.
        path: String,
        /// Parse error.
        message: String,
    },

    /// Boundary validation or region resolution failed.
    #[error(transparent)]
    Region(#[from] RegionError),

    /// Downloading the region extract failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Updating the manifest failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Filesystem error while preparing output or listing input.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Result of processing one boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOutcome {
    /// Manifest key of the boundary.
    pub key: BoundaryKey,
    /// Clipped extract written for it.
    pub output_path: PathBuf,
    /// Region the extract was cut from.
    pub region_label: String,
    /// Entry recorded in the manifest.
    pub entry: ManifestEntry,
}

/// Runs the extract pipeline against one configuration.
pub struct ExtractPipeline {
    config: ExtractConfig,
    cache: ContentCache,
    manifest: ManifestStore,
    tools: Arc<dyn ToolRunner>,
    index: OnceCell<RegionIndex>,
}

impl ExtractPipeline {
    /// Creates a pipeline that downloads through `fetcher` and clips with
    /// `tools`.
    #[must_use]
    pub fn new(
        config: ExtractConfig,
        fetcher: Arc<dyn Fetcher>,
        tools: Arc<dyn ToolRunner>,
    ) -> Self {
        let cache = ContentCache::new(
            config.cache_dir.clone(),
            config.download_base_url.clone(),
            fetcher,
        );
        let manifest = ManifestStore::new(config.manifest_path());

        Self {
            config,
            cache,
            manifest,
            tools,
            index: OnceCell::new(),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Manifest store the pipeline writes to.
    #[must_use]
    pub const fn manifest(&self) -> &ManifestStore {
        &self.manifest
    }

    /// Region index, loaded on first use.
    async fn index(&self) -> Result<&RegionIndex, ExtractError> {
        let index = self
            .index
            .get_or_try_init(|| RegionIndex::load(&self.cache, &self.config.index_url))
            .await?;
        Ok(index)
    }

    /// Resolves the boundary file at `boundary_path` to its smallest
    /// enclosing region without downloading the region's extract.
    ///
    /// The boundary is validated before the region index is touched.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Region`] if the boundary is invalid, no region
    /// contains it, or the index cannot be loaded.
    pub async fn find_smallest(&self, boundary_path: &Path) -> Result<Resolution, ExtractError> {
        let boundary = Boundary::load(boundary_path)?;
        let index = self.index().await?;
        Ok(find_smallest(index, &boundary, &self.cache)?)
    }

    /// Returns `path` relative to the input root.
    ///
    /// A plain lexical prefix match is taken as is. Anything else (`..`
    /// segments, symlinks, relative spellings of the root) is compared again
    /// after resolving both paths on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidPath`] if `path` is not strictly below
    /// the input root.
    pub fn relative_to_input(&self, path: &Path) -> Result<PathBuf, ExtractError> {
        let root = &self.config.input_dir;

        path.strip_prefix(root)
            .ok()
            .filter(|relative| is_plain_relative(relative))
            .map(Path::to_path_buf)
            .or_else(|| canonical_relative(path, root))
            .ok_or_else(|| ExtractError::InvalidPath {
                path: path.display().to_string(),
                root: root.display().to_string(),
            })
    }

    /// Output path for a boundary file under the input root.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidPath`] if `boundary_path` is not under
    /// the input root.
    pub fn output_path_for(&self, boundary_path: &Path) -> Result<PathBuf, ExtractError> {
        let relative = self.relative_to_input(boundary_path)?;
        Ok(self.config.output_path_for(&relative))
    }

    /// Runs the full pipeline for one boundary file.
    ///
    /// # Errors
    ///
    /// Returns the [`ExtractError`] of the first step that fails. The
    /// manifest is left untouched in that case.
    pub async fn run(&self, boundary_path: &Path) -> Result<ExtractOutcome, ExtractError> {
        let relative = self.relative_to_input(boundary_path)?;
        let key = BoundaryKey::from_relative(&relative, &self.config.boundary_extension)
            .ok_or_else(|| ExtractError::ManifestPath {
                path: relative.display().to_string(),
            })?;

        let resolution = self.find_smallest(boundary_path).await?;
        self.cache
            .ensure(&resolution.url, &resolution.cache_path)
            .await?;

        let output_path = self.config.output_path_for(&relative);
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExtractError::Io {
                    path: parent.display().to_string(),
                    source: e,
                })?;
        }

        self.tools
            .clip(boundary_path, &resolution.cache_path, &output_path)
            .await?;
        let timestamp = self.tools.read_timestamp(&output_path).await?;

        let entry = ManifestEntry::new(resolution.friendly_name, timestamp);
        self.manifest.upsert(&key, entry.clone())?;

        log::info!(
            "Wrote {} ({}, data from {})",
            output_path.display(),
            resolution.region_label,
            entry.timestamp()
        );

        Ok(ExtractOutcome {
            key,
            output_path,
            region_label: resolution.region_label,
            entry,
        })
    }
}

/// `path` relative to `root` once both are resolved on disk.
fn canonical_relative(path: &Path, root: &Path) -> Option<PathBuf> {
    let path = std::fs::canonicalize(path).ok()?;
    let root = std::fs::canonicalize(root).ok()?;
    let relative = path.strip_prefix(&root).ok()?;
    is_plain_relative(relative).then(|| relative.to_path_buf())
}

/// Non-empty and made only of ordinary name segments.
fn is_plain_relative(relative: &Path) -> bool {
    relative.components().next().is_some()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_support::{Fixture, LINESTRING_BOUNDARY, TIMESTAMP};

    #[tokio::test]
    async fn clips_boundary_and_records_provenance() {
        let fx = Fixture::new();
        let paris = fx.write_boundary("france/paris.geojson", "Paris", (2.2, 48.8), (2.5, 48.9));
        let pipeline = fx.pipeline();

        let outcome = pipeline.run(&paris).await.unwrap();

        assert_eq!(outcome.key.to_string(), "france/paris");
        assert_eq!(outcome.output_path, fx.root().join("output/france/paris.osm.pbf"));
        assert_eq!(outcome.region_label, "france");
        assert_eq!(
            std::fs::read_to_string(&outcome.output_path).unwrap(),
            "PBF:france clipped by paris.geojson"
        );
        assert!(fx.root().join("cache/france-latest.osm.pbf").exists());

        let manifest = pipeline.manifest().read().unwrap();
        assert_eq!(manifest.get(&outcome.key), Some(&ManifestEntry::new("Paris", TIMESTAMP)));
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let fx = Fixture::new();
        let paris = fx.write_boundary("france/paris.geojson", "Paris", (2.2, 48.8), (2.5, 48.9));
        let pipeline = fx.pipeline();

        let first = pipeline.run(&paris).await.unwrap();
        let output_first = std::fs::read(&first.output_path).unwrap();
        let manifest_first = std::fs::read(pipeline.manifest().path()).unwrap();

        let second = fx.pipeline().run(&paris).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second.output_path).unwrap(), output_first);
        assert_eq!(std::fs::read(pipeline.manifest().path()).unwrap(), manifest_first);

        // One index and one extract download across both runs.
        assert_eq!(fx.fetcher.total_calls(), 2);
        assert_eq!(fx.tools.clip_calls(), 2);
    }

    #[tokio::test]
    async fn linestring_boundary_fails_before_network() {
        let fx = Fixture::new();
        let path = fx.write_raw("france/route.geojson", LINESTRING_BOUNDARY);

        let err = fx.pipeline().run(&path).await.unwrap_err();

        assert!(matches!(
            err,
            ExtractError::Region(RegionError::InvalidBoundary { .. })
        ));
        assert_eq!(fx.fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn boundary_outside_input_root_is_rejected() {
        let fx = Fixture::new();
        let stray = fx.root().join("elsewhere/paris.geojson");
        std::fs::create_dir_all(stray.parent().unwrap()).unwrap();
        std::fs::write(&stray, "{}").unwrap();

        let err = fx.pipeline().run(&stray).await.unwrap_err();

        assert!(matches!(err, ExtractError::InvalidPath { .. }));
        assert_eq!(fx.fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn parent_segments_resolving_under_input_root_are_accepted() {
        let fx = Fixture::new();
        fx.write_boundary("france/paris.geojson", "Paris", (2.2, 48.8), (2.5, 48.9));
        let indirect = fx.root().join("input/france/../france/paris.geojson");

        let outcome = fx.pipeline().run(&indirect).await.unwrap();

        assert_eq!(outcome.key.to_string(), "france/paris");
        assert_eq!(outcome.output_path, fx.root().join("output/france/paris.osm.pbf"));
    }

    #[tokio::test]
    async fn parent_segments_escaping_input_root_are_rejected() {
        let fx = Fixture::new();
        fx.write_boundary("france/paris.geojson", "Paris", (2.2, 48.8), (2.5, 48.9));
        let stray = fx.root().join("elsewhere/paris.geojson");
        std::fs::create_dir_all(stray.parent().unwrap()).unwrap();
        std::fs::write(&stray, "{}").unwrap();

        let err = fx
            .pipeline()
            .run(&fx.root().join("input/../elsewhere/paris.geojson"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::InvalidPath { .. }));
        assert_eq!(fx.fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn nested_boundary_path_is_rejected_before_clipping() {
        let fx = Fixture::new();
        let nested =
            fx.write_boundary("region/sub/boundary.geojson", "Nested", (2.2, 48.8), (2.5, 48.9));

        let err = fx.pipeline().run(&nested).await.unwrap_err();

        assert!(matches!(err, ExtractError::ManifestPath { .. }));
        assert_eq!(fx.fetcher.total_calls(), 0);
        assert_eq!(fx.tools.clip_calls(), 0);
        assert!(!fx.root().join("output/manifest.json").exists());
    }

    #[tokio::test]
    async fn uncontained_boundary_downloads_only_the_index() {
        let fx = Fixture::new();
        let pole =
            fx.write_boundary("antarctica/pole.geojson", "Pole", (0.0, -89.0), (10.0, -85.0));

        let err = fx.pipeline().run(&pole).await.unwrap_err();

        assert!(matches!(
            err,
            ExtractError::Region(RegionError::NoEnclosingRegion { .. })
        ));
        assert_eq!(fx.fetcher.total_calls(), 1);
    }

    #[tokio::test]
    async fn clip_failure_leaves_manifest_untouched() {
        let fx = Fixture::new();
        let paris = fx.write_boundary("france/paris.geojson", "Paris", (2.2, 48.8), (2.5, 48.9));
        fx.tools.fail_clips();

        let err = fx.pipeline().run(&paris).await.unwrap_err();

        assert!(matches!(err, ExtractError::ClipFailed { .. }));
        assert_eq!(fx.tools.timestamp_calls(), 0);
        assert!(!fx.root().join("output/manifest.json").exists());
    }

    #[tokio::test]
    async fn find_smallest_skips_extract_download() {
        let fx = Fixture::new();
        let berlin =
            fx.write_boundary("germany/berlin.geojson", "Berlin", (13.0, 52.3), (13.7, 52.7));

        let resolution = fx.pipeline().find_smallest(&berlin).await.unwrap();

        assert_eq!(resolution.friendly_name, "Berlin");
        assert_eq!(resolution.url, "https://download.geofabrik.de/europe-latest.osm.pbf");
        assert_eq!(resolution.cache_path, fx.root().join("cache/europe-latest.osm.pbf"));
        assert!(!resolution.cache_path.exists());
        assert_eq!(fx.fetcher.total_calls(), 1);
    }

    #[test]
    fn output_path_mirrors_input() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline();
        assert_eq!(
            pipeline
                .output_path_for(&fx.root().join("input/france/paris.geojson"))
                .unwrap(),
            fx.root().join("output/france/paris.osm.pbf")
        );
        assert!(matches!(
            pipeline.relative_to_input(&fx.root().join("input")),
            Err(ExtractError::InvalidPath { .. })
        ));
    }
}

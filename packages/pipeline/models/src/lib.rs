#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the extract toolchain.
//!
//! This crate contains only data types, configuration structs, and simple
//! path conversions. It has no heavyweight dependencies (no HTTP, no geometry,
//! no I/O).

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default Geofabrik index of downloadable regions.
pub const DEFAULT_INDEX_URL: &str = "https://download.geofabrik.de/index-v1.json";

/// Prefix stripped from download URLs to form cache paths.
pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://download.geofabrik.de/";

/// File name of the provenance manifest inside the output directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Configuration for a single invocation of the toolchain.
///
/// Every field has a default so a partial TOML file (or none at all) is
/// enough to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
    /// Root directory holding `<region>/<boundary>.<boundary_extension>` files.
    pub input_dir: PathBuf,
    /// Root directory receiving clipped extracts and the manifest.
    pub output_dir: PathBuf,
    /// Directory for the cached region index and full region extracts.
    pub cache_dir: PathBuf,
    /// Manifest location. Defaults to `<output_dir>/manifest.json`.
    pub manifest_path: Option<PathBuf>,
    /// URL of the region index `FeatureCollection`.
    pub index_url: String,
    /// Prefix every cached URL must start with.
    pub download_base_url: String,
    /// Extension (without the leading dot) of boundary files.
    pub boundary_extension: String,
    /// Extension (without the leading dot) of produced extracts.
    pub extract_extension: String,
    /// Path or name of the `osmium` executable.
    pub osmium_bin: PathBuf,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            cache_dir: PathBuf::from("overpass_cache"),
            manifest_path: None,
            index_url: DEFAULT_INDEX_URL.to_string(),
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
            boundary_extension: "geojson".to_string(),
            extract_extension: "osm.pbf".to_string(),
            osmium_bin: PathBuf::from("osmium"),
        }
    }
}

impl ExtractConfig {
    /// Returns the effective manifest path.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(MANIFEST_FILE_NAME))
    }

    /// Maps a path relative to the input root onto the output root, swapping
    /// the boundary extension for the extract extension.
    ///
    /// `france/paris.geojson` becomes `<output_dir>/france/paris.osm.pbf`.
    #[must_use]
    pub fn output_path_for(&self, relative: &Path) -> PathBuf {
        let stem = boundary_stem(relative, &self.boundary_extension);
        let file_name = format!("{stem}.{}", self.extract_extension);
        let mut out = self.output_dir.join(relative);
        out.set_file_name(file_name);
        out
    }
}

/// Strips `.<extension>` from the file name of `path`, falling back to the
/// plain file stem when the file carries some other extension.
fn boundary_stem(path: &Path, extension: &str) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    file_name
        .strip_suffix(&format!(".{extension}"))
        .map(ToString::to_string)
        .or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or(file_name)
}

/// Identifies one processed boundary: `<region>/<boundary>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BoundaryKey {
    /// Directory directly below the input root (e.g. `france`).
    pub region: String,
    /// Boundary file name without its extension (e.g. `paris`).
    pub boundary: String,
}

impl BoundaryKey {
    /// Decomposes a path relative to the input root.
    ///
    /// Returns `None` unless the path is exactly two plain UTF-8 segments.
    #[must_use]
    pub fn from_relative(relative: &Path, boundary_extension: &str) -> Option<Self> {
        let segments = relative
            .components()
            .map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;

        let [region, _file] = segments.as_slice() else {
            return None;
        };

        let boundary = boundary_stem(relative, boundary_extension);
        if region.is_empty() || boundary.is_empty() {
            return None;
        }

        Some(Self {
            region: (*region).to_string(),
            boundary,
        })
    }
}

impl std::fmt::Display for BoundaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.region, self.boundary)
    }
}

/// Provenance recorded for a boundary, stored on disk as
/// `[friendly_name, timestamp]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry(pub String, pub String);

impl ManifestEntry {
    /// Creates an entry from the boundary's friendly name and the source
    /// data timestamp.
    #[must_use]
    pub fn new(friendly_name: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self(friendly_name.into(), timestamp.into())
    }

    /// Human-friendly boundary name.
    #[must_use]
    pub fn friendly_name(&self) -> &str {
        &self.0
    }

    /// Timestamp of the data the extract was cut from.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.1
    }
}

/// `properties` object of one feature in the region index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionProperties {
    /// Geofabrik region identifier (e.g. `"france"`).
    #[serde(default)]
    pub id: Option<String>,
    /// Identifier of the enclosing region, if any.
    #[serde(default)]
    pub parent: Option<String>,
    /// Display name (e.g. `"France"`).
    #[serde(default)]
    pub name: Option<String>,
    /// Download links for the region's extracts.
    pub urls: RegionUrls,
}

/// Download links of a region. Only the PBF extract is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionUrls {
    /// Full URL of the region's `.osm.pbf` extract.
    pub pbf: String,
}

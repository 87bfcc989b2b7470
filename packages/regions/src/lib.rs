#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region index loading and smallest-enclosing-region resolution.
//!
//! Given a user boundary, finds the smallest Geofabrik region whose outline
//! fully contains it and works out where that region's extract is cached.

pub mod boundary;
pub mod index;

use std::path::PathBuf;

use osm_extract_cache::{CacheError, ContentCache};
use thiserror::Error;

pub use boundary::Boundary;
pub use index::{RegionEntry, RegionIndex};

/// Errors that can occur while reading boundaries or resolving regions.
#[derive(Debug, Error)]
pub enum RegionError {
    /// The boundary file is not a polygonal `GeoJSON` feature.
    #[error("{path} isn't a GeoJSON file with one Polygon or MultiPolygon boundary: {reason}")]
    InvalidBoundary {
        /// Boundary file.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The boundary feature has no usable `name` property.
    #[error("{path} doesn't have a 'name' property")]
    MissingName {
        /// Boundary file.
        path: String,
    },

    /// No region in the index contains the boundary.
    #[error("No region contains the boundary from {path}")]
    NoEnclosingRegion {
        /// Boundary file.
        path: String,
    },

    /// The region index is not a usable `FeatureCollection`.
    #[error("Malformed region index: {message}")]
    IndexFormat {
        /// Description of what went wrong.
        message: String,
    },

    /// The region index or extract could not be cached.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Reading a boundary or cached index failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl RegionError {
    pub(crate) fn index_format(message: impl Into<String>) -> Self {
        Self::IndexFormat {
            message: message.into(),
        }
    }
}

/// Outcome of resolving a boundary against the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Local path the region's extract is (or will be) cached at.
    pub cache_path: PathBuf,
    /// Download URL of the region's extract.
    pub url: String,
    /// The boundary's friendly name.
    pub friendly_name: String,
    /// Display label of the chosen region.
    pub region_label: String,
}

/// Resolves `boundary` to its smallest enclosing region and derives the
/// region extract's cache path.
///
/// # Errors
///
/// Returns [`RegionError::NoEnclosingRegion`] if no region contains the
/// boundary, or [`RegionError::Cache`] if the region's URL lies outside the
/// cache's base URL.
pub fn find_smallest(
    index: &RegionIndex,
    boundary: &Boundary,
    cache: &ContentCache,
) -> Result<Resolution, RegionError> {
    let region = index.resolve(boundary)?;
    log::info!(
        "{} is inside {} ({})",
        boundary.path.display(),
        region.label(),
        region.url
    );

    Ok(Resolution {
        cache_path: cache.path_for(&region.url)?,
        url: region.url.clone(),
        friendly_name: boundary.name.clone(),
        region_label: region.label().to_string(),
    })
}

//! User-supplied boundary files.

use std::path::{Path, PathBuf};

use geo::{BoundingRect as _, MultiPolygon};
use geojson::GeoJson;

use crate::RegionError;

/// A named polygonal area of interest, read from a `GeoJSON` `Feature`.
#[derive(Debug, Clone)]
pub struct Boundary {
    /// File the boundary was read from.
    pub path: PathBuf,
    /// Value of the feature's `name` property.
    pub name: String,
    /// Boundary geometry; a `Polygon` is stored as a one-member multipolygon.
    pub geometry: MultiPolygon<f64>,
}

impl Boundary {
    /// Reads and validates a boundary file.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::Io`] if the file cannot be read,
    /// [`RegionError::InvalidBoundary`] if it is not a `Feature` with a
    /// non-empty `Polygon` or `MultiPolygon` geometry, or
    /// [`RegionError::MissingName`] if it has no `name` property.
    pub fn load(path: &Path) -> Result<Self, RegionError> {
        let text = std::fs::read_to_string(path).map_err(|e| RegionError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_geojson_str(path, &text)
    }

    /// Parses boundary `GeoJSON` text; `path` is only used for messages.
    ///
    /// # Errors
    ///
    /// Same as [`Boundary::load`], minus the I/O case.
    pub fn from_geojson_str(path: &Path, text: &str) -> Result<Self, RegionError> {
        let invalid = |reason: String| RegionError::InvalidBoundary {
            path: path.display().to_string(),
            reason,
        };

        let geojson: GeoJson = text
            .parse()
            .map_err(|e| invalid(format!("not valid GeoJSON: {e}")))?;
        let GeoJson::Feature(feature) = geojson else {
            return Err(invalid("expected a single GeoJSON Feature".to_string()));
        };

        let geometry = feature
            .geometry
            .clone()
            .ok_or_else(|| invalid("feature has no geometry".to_string()))?;
        let geometry: geo::Geometry<f64> = geometry
            .try_into()
            .map_err(|e| invalid(format!("unreadable geometry: {e}")))?;

        let geometry = match geometry {
            geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
            geo::Geometry::MultiPolygon(mp) => mp,
            other => {
                return Err(invalid(format!(
                    "geometry must be Polygon or MultiPolygon, found {}",
                    geometry_type_name(&other)
                )));
            }
        };
        if geometry.bounding_rect().is_none() {
            return Err(invalid("geometry is empty".to_string()));
        }

        let name = feature
            .property("name")
            .and_then(serde_json::Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| RegionError::MissingName {
                path: path.display().to_string(),
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            name: name.to_string(),
            geometry,
        })
    }
}

/// `GeoJSON`-style type name of a geometry.
pub(crate) const fn geometry_type_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

//! The remote region index, ordered smallest area first.
//!
//! Geofabrik publishes every downloadable region as one feature of a large
//! `GeoJSON` `FeatureCollection`. The index is cached locally, parsed into
//! typed [`RegionEntry`] values, and sorted ascending by area so that the
//! first region containing a boundary is also the smallest one. An R-tree
//! over the region envelopes keeps the containment checks to the handful of
//! regions near the boundary.

use geo::{BoundingRect as _, ChamberlainDuquetteArea as _, Contains as _, MultiPolygon};
use geojson::GeoJson;
use osm_extract_cache::ContentCache;
use osm_extract_pipeline_models::RegionProperties;
use rstar::{AABB, RTree, RTreeObject};

use crate::boundary::{Boundary, geometry_type_name};
use crate::RegionError;

/// One downloadable region.
#[derive(Debug, Clone)]
pub struct RegionEntry {
    /// Region identifier from the index (e.g. `"france"`).
    pub id: Option<String>,
    /// Display name from the index (e.g. `"France"`).
    pub name: Option<String>,
    /// Identifier of the enclosing region.
    pub parent: Option<String>,
    /// Download URL of the region's PBF extract.
    pub url: String,
    /// Spherical area in square meters, used only for ordering.
    pub area: f64,
    /// Region outline.
    pub geometry: MultiPolygon<f64>,
}

impl RegionEntry {
    /// Best available label for log output.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or(&self.url)
    }
}

/// Envelope of the region at `rank` in the sorted entry list.
struct RankedEnvelope {
    rank: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for RankedEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// All regions, sorted ascending by area (ties keep document order).
pub struct RegionIndex {
    entries: Vec<RegionEntry>,
    tree: RTree<RankedEnvelope>,
}

impl RegionIndex {
    /// Ensures the index at `index_url` is cached, then parses it.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::Cache`] if the index cannot be downloaded,
    /// [`RegionError::Io`] if the cached copy cannot be read, or
    /// [`RegionError::IndexFormat`] if it is not a valid region index.
    pub async fn load(cache: &ContentCache, index_url: &str) -> Result<Self, RegionError> {
        let path = cache.ensure_url(index_url).await?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RegionError::Io {
                path: path.display().to_string(),
                source: e,
            })?;

        let index = Self::from_geojson_str(&text)?;
        log::info!("Loaded {} regions from {}", index.len(), path.display());
        Ok(index)
    }

    /// Parses the index `FeatureCollection`.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::IndexFormat`] if the text is not a
    /// `FeatureCollection`, is empty, or any feature lacks a polygonal
    /// geometry or a `urls.pbf` property.
    pub fn from_geojson_str(text: &str) -> Result<Self, RegionError> {
        let geojson: GeoJson = text
            .parse()
            .map_err(|e| RegionError::index_format(format!("not valid GeoJSON: {e}")))?;
        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(RegionError::index_format("expected a FeatureCollection"));
        };

        let mut entries = collection
            .features
            .into_iter()
            .enumerate()
            .map(|(i, feature)| parse_entry(i, feature))
            .collect::<Result<Vec<_>, _>>()?;

        if entries.is_empty() {
            return Err(RegionError::index_format("index contains no regions"));
        }

        // Stable, so equal areas keep document order.
        entries.sort_by(|a, b| a.area.total_cmp(&b.area));

        let tree = RTree::bulk_load(
            entries
                .iter()
                .enumerate()
                .map(|(rank, entry)| RankedEnvelope {
                    rank,
                    envelope: envelope_of(&entry.geometry),
                })
                .collect(),
        );

        Ok(Self { entries, tree })
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false` for a successfully loaded index.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Regions in ascending area order.
    #[must_use]
    pub fn entries(&self) -> &[RegionEntry] {
        &self.entries
    }

    /// Returns the smallest region whose outline fully contains the boundary.
    ///
    /// Equivalent to scanning [`entries`](Self::entries) in order and taking
    /// the first match.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::NoEnclosingRegion`] if no region contains it.
    pub fn resolve(&self, boundary: &Boundary) -> Result<&RegionEntry, RegionError> {
        let query = envelope_of(&boundary.geometry);

        self.tree
            .locate_in_envelope_intersecting(&query)
            .filter(|candidate| {
                self.entries[candidate.rank]
                    .geometry
                    .contains(&boundary.geometry)
            })
            .map(|candidate| candidate.rank)
            .min()
            .map(|rank| &self.entries[rank])
            .ok_or_else(|| RegionError::NoEnclosingRegion {
                path: boundary.path.display().to_string(),
            })
    }
}

fn parse_entry(i: usize, feature: geojson::Feature) -> Result<RegionEntry, RegionError> {
    let properties = feature
        .properties
        .ok_or_else(|| RegionError::index_format(format!("feature {i} has no properties")))?;
    let properties: RegionProperties =
        serde_json::from_value(serde_json::Value::Object(properties)).map_err(|e| {
            RegionError::index_format(format!("feature {i} has invalid properties: {e}"))
        })?;

    let geometry = feature
        .geometry
        .ok_or_else(|| RegionError::index_format(format!("feature {i} has no geometry")))?;
    let geometry: geo::Geometry<f64> = geometry.try_into().map_err(|e| {
        RegionError::index_format(format!("feature {i} has an unreadable geometry: {e}"))
    })?;
    let geometry = match geometry {
        geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
        geo::Geometry::MultiPolygon(mp) => mp,
        other => {
            return Err(RegionError::index_format(format!(
                "feature {i} has a {} geometry",
                geometry_type_name(&other)
            )));
        }
    };

    Ok(RegionEntry {
        id: properties.id,
        name: properties.name,
        parent: properties.parent,
        url: properties.urls.pbf,
        area: geometry.chamberlain_duquette_unsigned_area(),
        geometry,
    })
}

/// Bounding box of a multipolygon; empty geometries collapse to the origin.
fn envelope_of(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

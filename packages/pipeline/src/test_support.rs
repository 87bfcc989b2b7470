//! Fakes and fixtures shared by the pipeline tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use osm_extract_cache::{FetchError, Fetcher};
use osm_extract_pipeline_models::ExtractConfig;

use crate::{ExtractError, ExtractPipeline, ToolRunner};

pub const TIMESTAMP: &str = "2024-05-01T20:21:02Z";

pub const LINESTRING_BOUNDARY: &str = r#"{
    "type": "Feature",
    "properties": { "name": "Route" },
    "geometry": { "type": "LineString", "coordinates": [[2.2, 48.8], [2.5, 48.9]] }
}"#;

const REGIONS: &[(&str, (f64, f64), (f64, f64))] = &[
    ("europe", (-10.0, 35.0), (40.0, 70.0)),
    ("world", (-170.0, -80.0), (170.0, 80.0)),
    ("france", (-5.0, 42.0), (8.0, 51.0)),
];

fn polygon_json(min: (f64, f64), max: (f64, f64)) -> String {
    let (x0, y0) = min;
    let (x1, y1) = max;
    format!(
        r#"{{ "type": "Polygon", "coordinates": [[[{x0}, {y0}], [{x1}, {y0}], [{x1}, {y1}], [{x0}, {y1}], [{x0}, {y0}]]] }}"#
    )
}

fn index_json() -> String {
    let features = REGIONS
        .iter()
        .map(|(id, min, max)| {
            format!(
                r#"{{
                    "type": "Feature",
                    "properties": {{
                        "id": "{id}",
                        "name": "{id}",
                        "urls": {{ "pbf": "https://download.geofabrik.de/{id}-latest.osm.pbf" }}
                    }},
                    "geometry": {}
                }}"#,
                polygon_json(*min, *max)
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(r#"{{ "type": "FeatureCollection", "features": [{features}] }}"#)
}

/// Serves canned bodies and records every requested URL.
pub struct FakeFetcher {
    bodies: BTreeMap<String, Vec<u8>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    fn new() -> Self {
        let mut bodies = BTreeMap::new();
        bodies.insert(
            "https://download.geofabrik.de/index-v1.json".to_string(),
            index_json().into_bytes(),
        );
        for (id, _, _) in REGIONS {
            bodies.insert(
                format!("https://download.geofabrik.de/{id}-latest.osm.pbf"),
                format!("PBF:{id}").into_bytes(),
            );
        }
        Self {
            bodies,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| *u == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let body = self.bodies.get(url).ok_or_else(|| FetchError::HttpStatus {
            url: url.to_string(),
            status: 404,
        })?;
        tokio::fs::write(dest, body).await.unwrap();
        Ok(body.len() as u64)
    }
}

/// Deterministic stand-in for osmium.
#[derive(Default)]
pub struct FakeTools {
    clips: AtomicUsize,
    timestamps: AtomicUsize,
    fail_clips: AtomicBool,
}

impl FakeTools {
    pub fn clip_calls(&self) -> usize {
        self.clips.load(Ordering::SeqCst)
    }

    pub fn timestamp_calls(&self) -> usize {
        self.timestamps.load(Ordering::SeqCst)
    }

    pub fn fail_clips(&self) {
        self.fail_clips.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ToolRunner for FakeTools {
    async fn clip(
        &self,
        boundary: &Path,
        source: &Path,
        output: &Path,
    ) -> Result<(), ExtractError> {
        self.clips.fetch_add(1, Ordering::SeqCst);
        if self.fail_clips.load(Ordering::SeqCst) {
            return Err(ExtractError::ClipFailed {
                boundary: boundary.display().to_string(),
                message: "osmium extract exited with exit status: 1".to_string(),
            });
        }
        let source = std::fs::read_to_string(source).unwrap();
        let name = boundary.file_name().unwrap().to_string_lossy();
        std::fs::write(output, format!("{source} clipped by {name}")).unwrap();
        Ok(())
    }

    async fn read_timestamp(&self, file: &Path) -> Result<String, ExtractError> {
        self.timestamps.fetch_add(1, Ordering::SeqCst);
        assert!(file.exists(), "timestamp read before clip output exists");
        Ok(TIMESTAMP.to_string())
    }
}

/// A temporary `input/`, `output/` and `cache/` tree plus the fakes.
pub struct Fixture {
    dir: tempfile::TempDir,
    pub fetcher: Arc<FakeFetcher>,
    pub tools: Arc<FakeTools>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            fetcher: Arc::new(FakeFetcher::new()),
            tools: Arc::new(FakeTools::default()),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> ExtractConfig {
        ExtractConfig {
            input_dir: self.root().join("input"),
            output_dir: self.root().join("output"),
            cache_dir: self.root().join("cache"),
            ..ExtractConfig::default()
        }
    }

    pub fn pipeline(&self) -> ExtractPipeline {
        ExtractPipeline::new(self.config(), self.fetcher.clone(), self.tools.clone())
    }

    /// Writes `text` to `input/<relative>`.
    pub fn write_raw(&self, relative: &str, text: &str) -> PathBuf {
        let path = self.root().join("input").join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, text).unwrap();
        path
    }

    /// Writes a rectangular boundary feature to `input/<relative>`.
    pub fn write_boundary(
        &self,
        relative: &str,
        name: &str,
        min: (f64, f64),
        max: (f64, f64),
    ) -> PathBuf {
        let text = format!(
            r#"{{ "type": "Feature", "properties": {{ "name": "{name}" }}, "geometry": {} }}"#,
            polygon_json(min, max)
        );
        self.write_raw(relative, &text)
    }
}

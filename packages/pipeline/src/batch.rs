//! Runs the pipeline over every boundary under the input root.
//!
//! Boundaries are processed one at a time in file-name order. By default a
//! failing boundary is logged and recorded in the [`SyncSummary`] while the
//! rest of the batch carries on; [`SyncOptions::fail_fast`] stops at the
//! first failure instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use osm_extract_cache::progress::ProgressCallback;
use walkdir::WalkDir;

use crate::{ExtractError, ExtractOutcome, ExtractPipeline};

/// Batch behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Skip boundaries whose output file already exists.
    pub skip_existing: bool,
    /// Stop at the first failing boundary.
    pub fail_fast: bool,
}

/// What a batch run did.
#[derive(Debug, Default)]
pub struct SyncSummary {
    /// Boundaries clipped and recorded.
    pub processed: Vec<ExtractOutcome>,
    /// Boundaries skipped because their output already existed.
    pub skipped: Vec<PathBuf>,
    /// Boundaries that failed, with the error that stopped them.
    pub failures: Vec<(PathBuf, ExtractError)>,
}

impl SyncSummary {
    /// Whether every boundary was processed or skipped.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl std::fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {} skipped (output exists), {} failed",
            self.processed.len(),
            self.skipped.len(),
            self.failures.len()
        )
    }
}

impl ExtractPipeline {
    /// Lists boundary files under the input root, sorted by path.
    ///
    /// Files without the boundary extension are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Io`] if the input root cannot be walked.
    pub fn boundary_files(&self) -> Result<Vec<PathBuf>, ExtractError> {
        let root = &self.config().input_dir;
        let extension = self.config().boundary_extension.as_str();
        let mut files = Vec::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| ExtractError::Io {
                path: e
                    .path()
                    .unwrap_or(root.as_path())
                    .display()
                    .to_string(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.into_path();
            if has_extension(&path, extension) {
                files.push(path);
            } else {
                log::debug!("Ignoring {} (not a .{extension} file)", path.display());
            }
        }

        Ok(files)
    }

    /// Runs the pipeline for every boundary file under the input root.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Io`] only if the input root cannot be listed.
    /// Per-boundary failures are reported in the returned summary.
    pub async fn sync_all(
        &self,
        options: SyncOptions,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<SyncSummary, ExtractError> {
        let files = self.boundary_files()?;
        log::info!(
            "Found {} boundaries under {}",
            files.len(),
            self.config().input_dir.display()
        );
        progress.set_total(files.len() as u64);

        let mut summary = SyncSummary::default();

        for path in files {
            progress.set_message(path.display().to_string());

            if options.skip_existing && self.output_exists(&path) {
                log::info!("{} exists, skipping", path.display());
                summary.skipped.push(path);
                progress.inc(1);
                continue;
            }

            log::info!("Working on {}", path.display());
            match self.run(&path).await {
                Ok(outcome) => summary.processed.push(outcome),
                Err(e) => {
                    log::error!("Failed to process {}: {e}", path.display());
                    summary.failures.push((path, e));
                    if options.fail_fast {
                        progress.finish(format!("Stopped: {summary}"));
                        return Ok(summary);
                    }
                }
            }
            progress.inc(1);
        }

        progress.finish(format!("Done: {summary}"));
        Ok(summary)
    }

    fn output_exists(&self, boundary_path: &Path) -> bool {
        self.output_path_for(boundary_path)
            .is_ok_and(|output| output.is_file())
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| {
            name.len() > extension.len() + 1 && name.ends_with(&format!(".{extension}"))
        })
}

//! External tools the pipeline shells out to.
//!
//! [`ToolRunner`] is the seam; [`OsmiumRunner`] drives the `osmium` CLI.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::ExtractError;

/// Clips extracts and reads their metadata.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Clips `source` to the polygon in `boundary`, writing (and overwriting)
    /// `output`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::ClipFailed`] if the tool cannot be started or
    /// exits unsuccessfully.
    async fn clip(
        &self,
        boundary: &Path,
        source: &Path,
        output: &Path,
    ) -> Result<(), ExtractError>;

    /// Reads the data timestamp recorded in the header of `file`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Timestamp`] if the tool fails or the header
    /// carries no timestamp.
    async fn read_timestamp(&self, file: &Path) -> Result<String, ExtractError>;
}

/// Runs `osmium extract` and `osmium fileinfo`.
#[derive(Debug, Clone)]
pub struct OsmiumRunner {
    program: PathBuf,
}

impl OsmiumRunner {
    /// Uses the `osmium` executable at `program` (a bare name is looked up
    /// on `PATH`).
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, args: &[&OsStr]) -> Command {
        log::info!(
            "> {} {}",
            self.program.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd
    }
}

#[async_trait]
impl ToolRunner for OsmiumRunner {
    async fn clip(
        &self,
        boundary: &Path,
        source: &Path,
        output: &Path,
    ) -> Result<(), ExtractError> {
        let clip_failed = |message: String| ExtractError::ClipFailed {
            boundary: boundary.display().to_string(),
            message,
        };

        let status = self
            .command(&[
                OsStr::new("extract"),
                OsStr::new("-p"),
                boundary.as_os_str(),
                source.as_os_str(),
                OsStr::new("-o"),
                output.as_os_str(),
                OsStr::new("--overwrite"),
            ])
            .status()
            .await
            .map_err(|e| {
                clip_failed(format!(
                    "Failed to run {} (is osmium installed?): {e}",
                    self.program.display()
                ))
            })?;

        if !status.success() {
            return Err(clip_failed(format!("osmium extract exited with {status}")));
        }

        Ok(())
    }

    async fn read_timestamp(&self, file: &Path) -> Result<String, ExtractError> {
        let output = self
            .command(&[OsStr::new("fileinfo"), OsStr::new("-j"), file.as_os_str()])
            .output()
            .await
            .map_err(|e| ExtractError::Timestamp {
                path: file.display().to_string(),
                message: format!(
                    "Failed to run {} (is osmium installed?): {e}",
                    self.program.display()
                ),
            })?;

        if !output.status.success() {
            return Err(ExtractError::Timestamp {
                path: file.display().to_string(),
                message: format!(
                    "osmium fileinfo exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        parse_fileinfo_timestamp(file, &output.stdout)
    }
}

/// The subset of `osmium fileinfo -j` output we read.
#[derive(Deserialize)]
struct FileInfo {
    header: FileInfoHeader,
}

#[derive(Deserialize)]
struct FileInfoHeader {
    #[serde(default)]
    option: FileInfoOptions,
}

#[derive(Default, Deserialize)]
struct FileInfoOptions {
    timestamp: Option<String>,
}

/// Extracts `header.option.timestamp` from `osmium fileinfo -j` output.
fn parse_fileinfo_timestamp(file: &Path, stdout: &[u8]) -> Result<String, ExtractError> {
    let timestamp_err = |message: String| ExtractError::Timestamp {
        path: file.display().to_string(),
        message,
    };

    let info: FileInfo = serde_json::from_slice(stdout)
        .map_err(|e| timestamp_err(format!("unreadable osmium fileinfo output: {e}")))?;

    info.header
        .option
        .timestamp
        .filter(|ts| !ts.is_empty())
        .ok_or_else(|| timestamp_err("file header has no timestamp".to_string()))
}

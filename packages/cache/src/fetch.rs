//! Raw file transfer from a URL to a local file.
//!
//! [`Fetcher`] is the seam the [`ContentCache`](crate::ContentCache) downloads
//! through; [`HttpFetcher`] is the production implementation.

use std::path::Path;

use async_trait::async_trait;
use futures::{Stream, StreamExt as _};
use tokio::io::AsyncWriteExt as _;

use crate::progress::{ProgressCallback, ProgressFactory};

/// User agent sent with every download request.
const USER_AGENT: &str = "osm-extract/0.1";

/// Transfers the body at a URL into a local file.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Downloads `url` into `dest`, creating or truncating it.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the transfer fails, the server answers with
    /// a non-success status, or `dest` cannot be written.
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

/// Streams HTTP(S) downloads to disk using `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
    progress: ProgressFactory,
}

impl HttpFetcher {
    /// Builds a fetcher that reports each download through a progress
    /// indicator created by `progress`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the HTTP client cannot be built.
    pub fn new(progress: ProgressFactory) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Http)?;

        Ok(Self { client, progress })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        log::info!("Downloading {url}");
        log::info!("  -> {}", dest.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::Http)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let progress = (self.progress)(url);
        let total_size = response.content_length();
        if let Some(size) = total_size {
            progress.set_total(size);
            #[allow(clippy::cast_precision_loss)]
            let mb = size as f64 / 1_048_576.0;
            log::info!("  file size: {mb:.1} MB");
        }

        let body = response.bytes_stream().map(|chunk| chunk.map_err(FetchError::Http));
        let result = write_body(body, dest, progress.as_ref()).await;
        progress.finish_and_clear();

        let downloaded = result?;
        #[allow(clippy::cast_precision_loss)]
        let mb = downloaded as f64 / 1_048_576.0;
        log::info!("  download complete: {mb:.1} MB");

        Ok(downloaded)
    }
}

/// Writes every chunk of `body` to `dest`, reporting bytes to `progress`.
///
/// Stops at the first chunk or write error. The caller owns `progress` and
/// finishes it whatever the outcome.
async fn write_body<S, B>(
    mut body: S,
    dest: &Path,
    progress: &dyn ProgressCallback,
) -> Result<u64, FetchError>
where
    S: Stream<Item = Result<B, FetchError>> + Unpin,
    B: AsRef<[u8]>,
{
    let io_err = |source: std::io::Error| FetchError::Io {
        path: dest.display().to_string(),
        source,
    };

    let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
    let mut downloaded: u64 = 0;
    let mut last_log_mb: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        file.write_all(chunk).await.map_err(io_err)?;
        downloaded += chunk.len() as u64;
        progress.inc(chunk.len() as u64);

        // Log progress every 100 MB
        let current_mb = downloaded / (100 * 1_048_576);
        if current_mb > last_log_mb {
            last_log_mb = current_mb;
            #[allow(clippy::cast_precision_loss)]
            let mb = downloaded as f64 / 1_048_576.0;
            log::debug!("  downloaded {mb:.0} MB");
        }
    }

    file.flush().await.map_err(io_err)?;
    Ok(downloaded)
}

/// Errors from download operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// I/O error writing to disk.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct CountingProgress {
        bytes: AtomicU64,
    }

    impl ProgressCallback for CountingProgress {
        fn set_total(&self, _total: u64) {}
        fn inc(&self, delta: u64) {
            self.bytes.fetch_add(delta, Ordering::SeqCst);
        }
        fn set_message(&self, _msg: String) {}
        fn finish(&self, _msg: String) {}
        fn finish_and_clear(&self) {}
    }

    fn chunks(
        items: Vec<Result<&'static [u8], FetchError>>,
    ) -> impl Stream<Item = Result<&'static [u8], FetchError>> + Unpin {
        futures::stream::iter(items)
    }

    #[tokio::test]
    async fn writes_every_chunk_and_counts_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("region.osm.pbf");
        let progress = CountingProgress::default();

        let written = write_body(
            chunks(vec![Ok(b"PBF:".as_slice()), Ok(b"france".as_slice())]),
            &dest,
            &progress,
        )
        .await
        .unwrap();

        assert_eq!(written, 10);
        assert_eq!(progress.bytes.load(Ordering::SeqCst), 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"PBF:france");
    }

    #[tokio::test]
    async fn chunk_error_stops_the_download() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("region.osm.pbf");
        let progress = CountingProgress::default();

        let err = write_body(
            chunks(vec![
                Ok(b"PBF:".as_slice()),
                Err(FetchError::HttpStatus {
                    url: "https://download.geofabrik.de/france-latest.osm.pbf".to_string(),
                    status: 502,
                }),
                Ok(b"france".as_slice()),
            ]),
            &dest,
            &progress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus { status: 502, .. }));
        assert_eq!(progress.bytes.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn unwritable_destination_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing/region.osm.pbf");

        let err = write_body(chunks(vec![]), &dest, &CountingProgress::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Io { .. }));
    }
}

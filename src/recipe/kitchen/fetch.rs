// src/recipe/kitchen/fetch.rs

//! Source downloads
//!
//! A [`SourceFetcher`] performs one download attempt; [`fetch_with_retry`]
//! adds bounded retries with linear back-off for failures the fetcher
//! reports as transient.

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Download failure
#[derive(Debug, Error)]
pub enum FetchError {
    /// Worth retrying: timeouts, connection resets, 5xx responses
    #[error("Transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },

    #[error("Failed to fetch {url}: {reason}")]
    Permanent { url: String, reason: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Downloads one URL to one file
pub trait SourceFetcher: Send + Sync {
    /// Make a single attempt to store `url` at `dest`
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Fetch with up to `attempts` tries, sleeping `delay * attempt` between them
pub fn fetch_with_retry(
    fetcher: &dyn SourceFetcher,
    url: &str,
    dest: &Path,
    attempts: u32,
    delay: Duration,
) -> Result<(), FetchError> {
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match fetcher.fetch(url, dest) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!("Download attempt {} of {} failed: {}, retrying...", attempt, attempts, e);
                std::thread::sleep(delay * attempt);
            }
            Err(e) => return Err(e),
        }
    }
}

/// HTTP(S) and `file://` fetcher
pub struct HttpFetcher {
    client: Client,
    progress: bool,
}

impl HttpFetcher {
    /// Create a fetcher with a per-request timeout
    pub fn new(timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("crossbake/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::Error::ConfigError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            progress: false,
        })
    }

    /// Show a progress bar while downloading
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn fetch_local(&self, url: &url::Url, dest: &Path) -> Result<(), FetchError> {
        let permanent = |reason: String| FetchError::Permanent {
            url: url.to_string(),
            reason,
        };
        let source = url
            .to_file_path()
            .map_err(|_| permanent("not a local path".to_string()))?;
        fs::copy(&source, dest).map_err(|e| permanent(format!("{}: {}", source.display(), e)))?;
        Ok(())
    }

    fn fetch_http(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let transient = |reason: String| FetchError::Transient {
            url: url.to_string(),
            reason,
        };

        let mut response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                transient(e.to_string())
            } else {
                FetchError::Permanent {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let reason = format!("HTTP {}", status);
            return Err(if is_transient_status(status) {
                transient(reason)
            } else {
                FetchError::Permanent {
                    url: url.to_string(),
                    reason,
                }
            });
        }

        let total_size = response.content_length().unwrap_or(0);
        let display_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let pb = if self.progress {
            create_progress_bar(total_size, &display_name)
        } else {
            ProgressBar::hidden()
        };

        // Write to a partial file first
        let part = partial_path(dest);
        let mut file = File::create(&part).map_err(|e| FetchError::Permanent {
            url: url.to_string(),
            reason: format!("cannot create {}: {}", part.display(), e),
        })?;

        let mut downloaded: u64 = 0;
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let read = match response.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    let _ = fs::remove_file(&part);
                    return Err(transient(format!("connection dropped: {e}")));
                }
            };
            if let Err(e) = file.write_all(&buffer[..read]) {
                let _ = fs::remove_file(&part);
                return Err(FetchError::Permanent {
                    url: url.to_string(),
                    reason: format!("write failed: {e}"),
                });
            }
            downloaded += read as u64;
            pb.set_position(downloaded);
        }
        pb.finish_with_message(format!("{} [done]", display_name));

        fs::rename(&part, dest).map_err(|e| FetchError::Permanent {
            url: url.to_string(),
            reason: format!("cannot move {} into place: {}", part.display(), e),
        })?;
        debug!("Downloaded {} bytes", downloaded);
        Ok(())
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        info!("Downloading {} to {}", url, dest.display());

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| FetchError::Permanent {
                url: url.to_string(),
                reason: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }

        let parsed = url::Url::parse(url).map_err(|e| FetchError::Permanent {
            url: url.to_string(),
            reason: format!("invalid URL: {e}"),
        })?;
        match parsed.scheme() {
            "file" => self.fetch_local(&parsed, dest),
            "http" | "https" => self.fetch_http(url, dest),
            other => Err(FetchError::Permanent {
                url: url.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Create a styled progress bar for source downloads
fn create_progress_bar(size: u64, name: &str) -> ProgressBar {
    let pb = ProgressBar::new(size);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(name.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fails with the queued errors, then succeeds
    struct Flaky {
        failures: Mutex<Vec<FetchError>>,
        calls: Mutex<u32>,
    }

    impl Flaky {
        fn new(failures: Vec<FetchError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl SourceFetcher for Flaky {
        fn fetch(&self, _url: &str, dest: &Path) -> Result<(), FetchError> {
            *self.calls.lock().unwrap() += 1;
            let mut failures = self.failures.lock().unwrap();
            if failures.is_empty() {
                fs::write(dest, b"payload").unwrap();
                Ok(())
            } else {
                Err(failures.remove(0))
            }
        }
    }

    fn transient() -> FetchError {
        FetchError::Transient {
            url: "u".to_string(),
            reason: "reset".to_string(),
        }
    }

    #[test]
    fn test_retry_recovers_from_transient_failures() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("src.tar.gz");
        let fetcher = Flaky::new(vec![transient(), transient()]);
        fetch_with_retry(&fetcher, "u", &dest, 3, Duration::from_millis(1)).unwrap();
        assert_eq!(fetcher.calls(), 3);
        assert!(dest.exists());
    }

    #[test]
    fn test_retry_gives_up() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("src.tar.gz");
        let fetcher = Flaky::new(vec![transient(), transient(), transient()]);
        let err = fetch_with_retry(&fetcher, "u", &dest, 3, Duration::from_millis(1)).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(fetcher.calls(), 3);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("src.tar.gz");
        let fetcher = Flaky::new(vec![FetchError::Permanent {
            url: "u".to_string(),
            reason: "HTTP 404".to_string(),
        }]);
        assert!(fetch_with_retry(&fetcher, "u", &dest, 3, Duration::from_millis(1)).is_err());
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_file_url() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("upstream.tar.gz");
        fs::write(&source, b"archive").unwrap();
        let url = url::Url::from_file_path(&source).unwrap();

        let dest = dir.path().join("cache/upstream.tar.gz");
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        fetcher.fetch(url.as_str(), &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"archive");

        let missing = url::Url::from_file_path(dir.path().join("nope.tar.gz")).unwrap();
        let err = fetcher.fetch(missing.as_str(), &dest).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_status_classification() {
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/c/sqlite.tar.gz")),
            PathBuf::from("/c/sqlite.tar.gz.part")
        );
    }
}

//! The messaging seam: inbound signals, outbound replies, upload sources.
//!
//! The bot core never talks to a chat platform directly. A host feeds it
//! [`Signal`]s and implements [`Messenger`] for the replies; uploads arrive
//! with an [`UploadSource`] that knows how to fetch the bytes into a scratch
//! path. Two sources ship with the crate: [`LocalFile`] (copy from disk) and
//! [`HttpUpload`] (streamed `reqwest` download, capped at the size limit).

use crate::dispatch::{Action, Command};
use crate::error::TransportError;
use crate::session::UserId;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Handle of a sent message, for later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MessageId(pub u64);

/// Outbound side of the conversation.
///
/// Implementations must be cheap to call concurrently for different users.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, user: UserId, text: &str) -> Result<MessageId, TransportError>;

    /// Replace the text of an earlier message (status updates).
    async fn edit_text(&self, user: UserId, message: MessageId, text: &str) -> Result<(), TransportError>;

    /// Send a file. `file_name` is the name the user sees, not the scratch name.
    async fn send_document(
        &self,
        user: UserId,
        path: &Path,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<(), TransportError>;

    async fn send_photo(&self, user: UserId, path: &Path, caption: Option<&str>) -> Result<(), TransportError>;

    /// Send `text` with rows of buttons.
    async fn show_buttons(
        &self,
        user: UserId,
        text: &str,
        buttons: &[Vec<Action>],
    ) -> Result<MessageId, TransportError>;
}

/// Where an upload's bytes come from.
#[async_trait]
pub trait UploadSource: Send + Sync {
    /// Human-readable origin, for logs.
    fn describe(&self) -> String;

    /// Write the upload to `dest`, refusing more than `max_bytes`.
    /// Returns the number of bytes written.
    async fn fetch_to(&self, dest: &Path, max_bytes: u64) -> Result<u64, TransportError>;
}

/// An upload announced by the transport.
pub struct Upload {
    /// File name as sent by the user.
    pub name: String,
    /// Size the transport reported before download; 0 when unknown.
    pub declared_size: u64,
    pub source: Box<dyn UploadSource>,
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("name", &self.name)
            .field("declared_size", &self.declared_size)
            .field("source", &self.source.describe())
            .finish()
    }
}

impl Upload {
    /// Build an upload from a local path or an `http(s)://` URL.
    pub async fn from_location(location: &str, download_timeout_secs: u64) -> Result<Self, TransportError> {
        if is_url(location) {
            let source = HttpUpload::new(location, download_timeout_secs);
            return Ok(Self {
                name: file_name_from_url(location),
                declared_size: 0,
                source: Box::new(source),
            });
        }

        let path = PathBuf::from(location);
        let meta = tokio::fs::metadata(&path).await.map_err(|e| TransportError::FetchFailed {
            source_name: location.to_string(),
            reason: e.to_string(),
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| location.to_string());
        Ok(Self {
            name,
            declared_size: meta.len(),
            source: Box::new(LocalFile::new(path)),
        })
    }
}

/// One inbound event for one user.
#[derive(Debug)]
pub enum Signal {
    Upload(Upload),
    /// A button press carrying its action tag.
    Button(String),
    Text(String),
    Command(Command),
}

// ── Sources ──────────────────────────────────────────────────────────────

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Last path segment of a URL if it looks like a file name.
fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "download.pdf".to_string()
}

/// Upload already on local disk.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UploadSource for LocalFile {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch_to(&self, dest: &Path, max_bytes: u64) -> Result<u64, TransportError> {
        let len = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| TransportError::FetchFailed {
                source_name: self.describe(),
                reason: e.to_string(),
            })?
            .len();
        if len > max_bytes {
            return Err(TransportError::TooLarge { max_bytes });
        }
        let copied = tokio::fs::copy(&self.path, dest).await?;
        debug!("Copied {} ({} bytes) to {}", self.path.display(), copied, dest.display());
        Ok(copied)
    }
}

/// Upload behind an HTTP(S) URL, streamed to disk.
#[derive(Debug, Clone)]
pub struct HttpUpload {
    url: String,
    timeout_secs: u64,
}

impl HttpUpload {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            url: url.into(),
            timeout_secs,
        }
    }

    fn failed(&self, reason: impl ToString) -> TransportError {
        TransportError::FetchFailed {
            source_name: self.url.clone(),
            reason: reason.to_string(),
        }
    }

    fn classify(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            self.failed(e)
        }
    }
}

#[async_trait]
impl UploadSource for HttpUpload {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch_to(&self, dest: &Path, max_bytes: u64) -> Result<u64, TransportError> {
        info!("Downloading upload from: {}", self.url);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| self.failed(e))?;

        let response = client.get(&self.url).send().await.map_err(|e| self.classify(e))?;
        if !response.status().is_success() {
            return Err(self.failed(format!("HTTP {}", response.status())));
        }
        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(TransportError::TooLarge { max_bytes });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.classify(e))?;
            written += chunk.len() as u64;
            if written > max_bytes {
                return Err(TransportError::TooLarge { max_bytes });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        info!("Downloaded {} bytes to {}", written, dest.display());
        Ok(written)
    }
}

/// Whether the file at `path` starts with the `%PDF` magic bytes.
pub async fn has_pdf_magic(path: &Path) -> std::io::Result<bool> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic).await {
        Ok(_) => Ok(&magic == b"%PDF"),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn url_file_names() {
        assert_eq!(file_name_from_url("https://x.org/a/report.pdf"), "report.pdf");
        assert_eq!(file_name_from_url("https://x.org/a/"), "download.pdf");
        assert_eq!(file_name_from_url("not a url"), "download.pdf");
    }

    #[tokio::test]
    async fn local_file_respects_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in.pdf");
        std::fs::write(&src, b"%PDF-1.4 0123456789").unwrap();
        let dest = tmp.path().join("out.pdf");

        let source = LocalFile::new(&src);
        let err = source.fetch_to(&dest, 4).await.unwrap_err();
        assert!(matches!(err, TransportError::TooLarge { max_bytes: 4 }));
        assert!(!dest.exists());

        let n = source.fetch_to(&dest, 1024).await.unwrap();
        assert_eq!(n, 19);
        assert!(has_pdf_magic(&dest).await.unwrap());
    }

    #[tokio::test]
    async fn missing_local_file_is_a_fetch_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let source = LocalFile::new(tmp.path().join("nope.pdf"));
        let err = source.fetch_to(&tmp.path().join("x"), 10).await.unwrap_err();
        assert!(matches!(err, TransportError::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn magic_check_rejects_short_and_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        let short = tmp.path().join("short");
        std::fs::write(&short, b"%P").unwrap();
        assert!(!has_pdf_magic(&short).await.unwrap());

        let png = tmp.path().join("fake.pdf");
        std::fs::write(&png, b"\x89PNG\r\n").unwrap();
        assert!(!has_pdf_magic(&png).await.unwrap());
    }

    #[tokio::test]
    async fn upload_from_local_location_reports_size() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("scan.png");
        std::fs::write(&src, [0u8; 32]).unwrap();
        let upload = Upload::from_location(src.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(upload.name, "scan.png");
        assert_eq!(upload.declared_size, 32);
    }
}

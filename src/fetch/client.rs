// src/fetch/client.rs

//! Transports for downloading source archives
//!
//! [`HttpTransport`] wraps a blocking reqwest client for `http(s)://` URLs
//! and reads `file://` URLs straight from disk, which is how local mirrors
//! and tests feed archives in. Retry is handled one level up, by the
//! [`super::Fetcher`], based on [`crate::Error::is_retryable`].

use crate::error::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default timeout for HTTP requests
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Something that can stream a URL's content into a writer
///
/// Implementations report transport problems as [`Error::Network`], marking
/// whether a retry may help.
pub trait Transport: Send + Sync {
    /// Write the resource at `url` into `writer`, returning the byte count
    fn download(&self, url: &Url, writer: &mut dyn Write) -> Result<u64>;
}

/// HTTP(S) and `file://` transport
pub struct HttpTransport {
    client: Client,
    show_progress: bool,
}

impl HttpTransport {
    /// Create a new transport
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("formulary/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            show_progress: false,
        })
    }

    /// Draw a progress bar on stderr while downloading
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn download_http(&self, url: &Url, writer: &mut dyn Write) -> Result<u64> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .map_err(|e| Error::network(url.as_str(), e.to_string(), true))?;

        let status = response.status();
        if !status.is_success() {
            // Server errors may clear up; client errors will not
            return Err(Error::network(
                url.as_str(),
                format!("HTTP {}", status),
                status.is_server_error(),
            ));
        }

        let total = response.content_length().unwrap_or(0);
        let progress = self.show_progress.then(|| create_progress_bar(total, url));
        let result = stream_to_writer(response, writer, progress.as_ref())
            .map_err(|e| Error::network(url.as_str(), format!("Failed to read response: {e}"), true));

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        result
    }

    fn download_file(&self, url: &Url, writer: &mut dyn Write) -> Result<u64> {
        let path = url
            .to_file_path()
            .map_err(|_| Error::network(url.as_str(), "not a local file path", false))?;
        let mut file = File::open(&path).map_err(|e| {
            Error::network(url.as_str(), format!("{}: {}", path.display(), e), false)
        })?;
        io::copy(&mut file, writer).map_err(Error::from)
    }
}

impl Transport for HttpTransport {
    fn download(&self, url: &Url, writer: &mut dyn Write) -> Result<u64> {
        debug!("Downloading {}", url);
        match url.scheme() {
            "http" | "https" => self.download_http(url, writer),
            "file" => self.download_file(url, writer),
            other => Err(Error::network(
                url.as_str(),
                format!("unsupported scheme '{}'", other),
                false,
            )),
        }
    }
}

/// Stream a response body in chunks, never buffering the whole archive
fn stream_to_writer<R: Read>(
    mut reader: R,
    writer: &mut dyn Write,
    progress: Option<&ProgressBar>,
) -> io::Result<u64> {
    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;

        if let Some(pb) = progress {
            pb.set_position(downloaded);
        }
    }

    Ok(downloaded)
}

fn create_progress_bar(size: u64, url: &Url) -> ProgressBar {
    let name = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or("source")
        .to_string();

    let pb = if size > 0 {
        ProgressBar::new(size)
    } else {
        ProgressBar::new_spinner()
    };
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(name);
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_file_url_download() {
        let mut src = tempfile::NamedTempFile::new().unwrap();
        src.write_all(b"archive bytes").unwrap();
        src.flush().unwrap();

        let url = Url::from_file_path(src.path()).unwrap();
        let transport = HttpTransport::new().unwrap();
        let mut out = Vec::new();
        let n = transport.download(&url, &mut out).unwrap();

        assert_eq!(n, 13);
        assert_eq!(out, b"archive bytes");
    }

    #[test]
    fn test_missing_file_is_not_retryable() {
        let url = Url::parse("file:///nonexistent/formulary/archive.tar.gz").unwrap();
        let transport = HttpTransport::new().unwrap();
        let err = transport.download(&url, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Network { retryable: false, .. }));
    }

    #[test]
    fn test_unsupported_scheme() {
        let url = Url::parse("ftp://example.com/archive.tar.gz").unwrap();
        let transport = HttpTransport::new().unwrap();
        assert!(transport.download(&url, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_stream_to_writer_counts_bytes() {
        let data = vec![7u8; STREAM_BUFFER_SIZE * 2 + 3];
        let mut out = Vec::new();
        let n = stream_to_writer(&data[..], &mut out, None).unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(out, data);
    }
}

//! Blocking HTTP transport backed by reqwest.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::DateTime;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_LENGTH, LAST_MODIFIED};

use super::{Transfer, Transport, TransportError, TransportResult};

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default timeout for small requests (listings, checksums, API calls).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default timeout for whole-body transfers (12 hours).
///
/// Monthly Wikipedia archives exceed 100 GB; the bound exists so a stalled
/// connection cannot hang a scheduled run forever.
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 12 * 60 * 60;

/// Buffer size for streaming downloads to disk (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Timeouts applied by [`HttpTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// TCP/TLS connection establishment.
    pub connect: Duration,
    /// Listings, checksums, HEAD requests and API calls.
    pub request: Duration,
    /// Full download of a file body.
    pub transfer: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            transfer: Duration::from_secs(DEFAULT_TRANSFER_TIMEOUT_SECS),
        }
    }
}

/// HTTP transport.
///
/// Every request carries an explicit timeout: short requests use
/// `timeouts.request`, file bodies use `timeouts.transfer`.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    timeouts: HttpTimeouts,
}

impl HttpTransport {
    /// Create a transport with default timeouts.
    pub fn new() -> TransportResult<Self> {
        Self::with_timeouts(HttpTimeouts::default())
    }

    /// Create a transport with custom timeouts.
    pub fn with_timeouts(timeouts: HttpTimeouts) -> TransportResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .user_agent(concat!("zimvault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client, timeouts })
    }

    /// Configured timeouts.
    pub fn timeouts(&self) -> HttpTimeouts {
        self.timeouts
    }

    /// Send a request and check for a success status.
    fn send(&self, url: &str, request: RequestBuilder, timeout: Duration) -> TransportResult<Response> {
        let response = request.timeout(timeout).send().map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: url.to_string(),
                    timeout_secs: timeout.as_secs(),
                }
            } else {
                TransportError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    fn read_error(&self, url: &str, e: reqwest::Error, timeout: Duration) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            }
        } else {
            TransportError::Request {
                url: url.to_string(),
                reason: format!("Read error: {}", e),
            }
        }
    }
}

/// Parse an HTTP `Last-Modified` value (RFC 7231 IMF-fixdate).
pub(crate) fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(SystemTime::from)
}

fn remote_modified(response: &Response) -> Option<SystemTime> {
    response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str) -> TransportResult<String> {
        let timeout = self.timeouts.request;
        let response = self.send(url, self.client.get(url), timeout)?;
        response
            .text()
            .map_err(|e| self.read_error(url, e, timeout))
    }

    fn get_bytes(&self, url: &str) -> TransportResult<Vec<u8>> {
        let timeout = self.timeouts.transfer;
        let response = self.send(url, self.client.get(url), timeout)?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| self.read_error(url, e, timeout))
    }

    fn content_length(&self, url: &str) -> Option<u64> {
        self.send(url, self.client.head(url), self.timeouts.request)
            .ok()
            .and_then(|r| {
                r.headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
            })
    }

    fn download(&self, url: &str, dest: &Path) -> TransportResult<Transfer> {
        let timeout = self.timeouts.transfer;
        let mut response = self.send(url, self.client.get(url), timeout)?;
        let modified = remote_modified(&response);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| TransportError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let file = File::create(dest).map_err(|e| TransportError::Write {
            path: dest.to_path_buf(),
            source: e,
        })?;

        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut downloaded = 0u64;

        loop {
            let bytes_read = response
                .read(&mut buffer)
                .map_err(|e| TransportError::Request {
                    url: url.to_string(),
                    reason: format!("Read error: {}", e),
                })?;

            if bytes_read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| TransportError::Write {
                    path: dest.to_path_buf(),
                    source: e,
                })?;

            downloaded += bytes_read as u64;
        }

        writer.flush().map_err(|e| TransportError::Write {
            path: dest.to_path_buf(),
            source: e,
        })?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| TransportError::Write {
                path: dest.to_path_buf(),
                source: e,
            })?;

        Ok(Transfer {
            bytes: downloaded,
            modified,
        })
    }
}

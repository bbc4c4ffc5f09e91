//! In-memory transport for tests and offline runs.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;

use super::{Transfer, Transport, TransportError, TransportResult};

#[derive(Debug, Clone)]
enum Canned {
    Body {
        data: Vec<u8>,
        modified: Option<SystemTime>,
    },
    Status(u16),
    /// Writes `partial` bytes, then fails as a dropped connection would.
    Interrupted { partial: Vec<u8> },
}

/// Kind of request recorded by [`MemoryTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Get,
    Head,
    Download,
}

/// Transport that serves canned responses from memory.
///
/// Unknown URLs answer with status 404. Every request is recorded so tests
/// can assert on what was (or wasn't) fetched.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    responses: HashMap<String, Canned>,
    /// URLs whose HEAD response carries no `Content-Length`.
    r#unsized: HashSet<String>,
    log: Mutex<Vec<(RequestKind, String)>>,
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `url`.
    pub fn with_body(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(
            url.into(),
            Canned::Body {
                data: body.into(),
                modified: None,
            },
        );
        self
    }

    /// Serve `body` at `url` with a `Last-Modified` time.
    pub fn with_dated_body(
        mut self,
        url: impl Into<String>,
        body: impl Into<Vec<u8>>,
        modified: SystemTime,
    ) -> Self {
        self.responses.insert(
            url.into(),
            Canned::Body {
                data: body.into(),
                modified: Some(modified),
            },
        );
        self
    }

    /// Answer `url` with an HTTP error status.
    pub fn with_status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.responses.insert(url.into(), Canned::Status(status));
        self
    }

    /// Write `partial` bytes for `url`, then fail mid-transfer.
    pub fn with_interruption(mut self, url: impl Into<String>, partial: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(
            url.into(),
            Canned::Interrupted {
                partial: partial.into(),
            },
        );
        self
    }

    /// Answer HEAD for `url` without a size, as servers that omit
    /// `Content-Length` do. GET and download are unaffected.
    pub fn without_length(mut self, url: impl Into<String>) -> Self {
        self.r#unsized.insert(url.into());
        self
    }

    /// All requests made so far, in order.
    pub fn requests(&self) -> Vec<(RequestKind, String)> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Number of requests of `kind` made for `url`.
    pub fn count(&self, kind: RequestKind, url: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(k, u)| *k == kind && u == url)
            .count()
    }

    fn record(&self, kind: RequestKind, url: &str) {
        if let Ok(mut log) = self.log.lock() {
            log.push((kind, url.to_string()));
        }
    }

    fn lookup(&self, url: &str) -> TransportResult<(&[u8], Option<SystemTime>)> {
        match self.responses.get(url) {
            Some(Canned::Body { data, modified }) => Ok((data.as_slice(), *modified)),
            Some(Canned::Status(status)) => Err(TransportError::Status {
                url: url.to_string(),
                status: *status,
            }),
            Some(Canned::Interrupted { .. }) => Err(TransportError::Request {
                url: url.to_string(),
                reason: "connection reset".to_string(),
            }),
            None => Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

impl Transport for MemoryTransport {
    fn get_text(&self, url: &str) -> TransportResult<String> {
        self.record(RequestKind::Get, url);
        let (data, _) = self.lookup(url)?;
        Ok(String::from_utf8_lossy(data).into_owned())
    }

    fn get_bytes(&self, url: &str) -> TransportResult<Vec<u8>> {
        self.record(RequestKind::Get, url);
        let (data, _) = self.lookup(url)?;
        Ok(data.to_vec())
    }

    fn content_length(&self, url: &str) -> Option<u64> {
        self.record(RequestKind::Head, url);
        if self.r#unsized.contains(url) {
            return None;
        }
        self.lookup(url).ok().map(|(data, _)| data.len() as u64)
    }

    fn download(&self, url: &str, dest: &Path) -> TransportResult<Transfer> {
        self.record(RequestKind::Download, url);

        let write_err = |e| TransportError::Write {
            path: dest.to_path_buf(),
            source: e,
        };

        if let Some(Canned::Interrupted { partial }) = self.responses.get(url) {
            let mut file = File::create(dest).map_err(write_err)?;
            file.write_all(partial).map_err(write_err)?;
            return Err(TransportError::Request {
                url: url.to_string(),
                reason: "connection reset".to_string(),
            });
        }

        let (data, modified) = self.lookup(url)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(dest, data).map_err(write_err)?;

        Ok(Transfer {
            bytes: data.len() as u64,
            modified,
        })
    }
}

//! Newest-archive resolution across ordered candidate sources.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::listing::newest_in_listing;
use crate::archive::ArchiveName;
use crate::transport::{join_url, Transport};

/// An archive located on a candidate source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArchive {
    /// Parsed archive name.
    pub name: ArchiveName,
    /// Full download URL.
    pub url: String,
    /// Base location of the source that produced the match.
    pub source: String,
}

impl ResolvedArchive {
    /// Filename of the archive.
    pub fn file_name(&self) -> String {
        self.name.file_name()
    }

    /// URL of the sibling checksum record.
    pub fn checksum_url(&self) -> String {
        format!("{}.sha256", self.url)
    }
}

/// Resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No candidate source lists an archive of the requested family.
    #[error("no archive named {basename}_YYYY-MM.{extension} found on {sources_tried} source(s)")]
    NotFound {
        basename: String,
        extension: String,
        sources_tried: usize,
    },
}

/// Finds the newest archive of a family across ordered candidate sources.
///
/// Sources are consulted in order. The first source whose listing contains
/// at least one match decides the result; later sources are not fetched and
/// results are never merged across sources. A source whose listing cannot be
/// fetched counts as having no match.
pub struct SourceResolver {
    transport: Arc<dyn Transport>,
    sources: Vec<String>,
    extension: String,
}

impl SourceResolver {
    /// Create a resolver over `sources` (primary first).
    pub fn new(
        transport: Arc<dyn Transport>,
        sources: Vec<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            sources,
            extension: extension.into(),
        }
    }

    /// Resolve the newest archive of `basename`.
    pub fn find_newest(&self, basename: &str) -> Result<ResolvedArchive, ResolveError> {
        for source in &self.sources {
            let listing_url = listing_url(source);
            let listing = match self.transport.get_text(&listing_url) {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(source = %source, error = %e, "Candidate source unavailable, trying next");
                    continue;
                }
            };

            match newest_in_listing(&listing, basename, &self.extension) {
                Some(name) => {
                    let url = join_url(source, &name.file_name());
                    info!(basename, source = %source, url = %url, "Resolved newest archive");
                    return Ok(ResolvedArchive {
                        name,
                        url,
                        source: source.clone(),
                    });
                }
                None => {
                    debug!(basename, source = %source, "No matching archive on source");
                }
            }
        }

        Err(ResolveError::NotFound {
            basename: basename.to_string(),
            extension: self.extension.clone(),
            sources_tried: self.sources.len(),
        })
    }
}

/// Listing URL for a source base: directory indexes are requested with a
/// trailing slash so servers don't answer with a redirect.
fn listing_url(source: &str) -> String {
    format!("{}/", source.trim_end_matches('/'))
}

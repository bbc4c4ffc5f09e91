//! Directory listing parsing.
//!
//! Mirror index pages are treated as plain text. The body is split into runs
//! of filename characters (`[A-Za-z0-9._-]`); every run that parses as an
//! archive name of the requested family is a candidate. This covers Apache
//! and nginx autoindex HTML, bare `ls`-style text listings, and hrefs with
//! leading path segments, without any HTML parsing.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::archive::ArchiveName;

/// Runs of characters that may appear in an archive filename.
fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z0-9._\-]+").unwrap())
}

/// Extract archives of one family from a listing, newest first.
///
/// Duplicates (an autoindex usually names each file twice: once in the href
/// and once in the link text) are collapsed.
///
/// # Examples
///
/// ```
/// use zimvault::source::parse_listing;
///
/// let listing = r#"
/// <a href="wiki_test_2024-01.zim">wiki_test_2024-01.zim</a>
/// <a href="wiki_test_2024-02.zim">wiki_test_2024-02.zim</a>
/// <a href="wiki_test_2024-02.zim.sha256">wiki_test_2024-02.zim.sha256</a>
/// "#;
///
/// let found = parse_listing(listing, "wiki_test", "zim");
/// assert_eq!(found.len(), 2);
/// assert_eq!(found[0].stamp(), "2024-02");
/// ```
pub fn parse_listing(listing: &str, basename: &str, extension: &str) -> Vec<ArchiveName> {
    let unique: BTreeSet<ArchiveName> = token_pattern()
        .find_iter(listing)
        .filter_map(|m| ArchiveName::parse(m.as_str()).ok())
        .filter(|name| name.is_family(basename, extension))
        .collect();

    unique.into_iter().rev().collect()
}

/// The newest archive of a family in a listing, if any.
pub fn newest_in_listing(listing: &str, basename: &str, extension: &str) -> Option<ArchiveName> {
    parse_listing(listing, basename, extension).into_iter().next()
}

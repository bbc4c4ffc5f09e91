//! Dated archive filename parsing.
//!
//! Archives follow the convention `<basename>_<YYYY>-<MM>.<ext>`:
//!
//! - `wikipedia_en_all_maxi_2024-01.zim`
//! - `wiktionary_fr_all_nopic_2023-11.zim`
//!
//! The basename may itself contain underscores; the year-month stamp is the
//! last `_YYYY-MM` segment before the extension. Only names of this exact form
//! take part in rotation, so `.part` downloads, `.sha256` siblings and lock
//! files are never mistaken for archives.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Parsed archive filename.
///
/// Ordering is by year-month stamp first, which matches the lexicographic
/// order of the zero-padded `YYYY-MM` text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveName {
    /// Logical archive family (e.g. `wikipedia_en_all_maxi`)
    pub basename: String,
    /// Four-digit year
    pub year: u16,
    /// Month, 1-12
    pub month: u8,
    /// File extension without the dot (e.g. `zim`)
    pub extension: String,
}

/// Error parsing an archive filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Filename doesn't match `<basename>_<YYYY>-<MM>.<ext>`
    InvalidPattern,
    /// Month outside 01-12
    InvalidMonth(String),
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameError::InvalidPattern => write!(f, "Filename doesn't match archive pattern"),
            NameError::InvalidMonth(s) => write!(f, "Invalid month: {}", s),
        }
    }
}

impl std::error::Error for NameError {}

/// Archive filename pattern.
///
/// We capture:
/// - Group 1: basename (greedy, may contain underscores)
/// - Group 2: year (exactly 4 digits)
/// - Group 3: month (exactly 2 digits)
/// - Group 4: extension (alphanumeric, no further dots)
fn archive_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.+)_(\d{4})-(\d{2})\.([A-Za-z0-9]+)$").unwrap())
}

impl ArchiveName {
    /// Create an archive name from its parts.
    pub fn new(
        basename: impl Into<String>,
        year: u16,
        month: u8,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            basename: basename.into(),
            year,
            month,
            extension: extension.into(),
        }
    }

    /// Parse a bare filename (no directory components).
    ///
    /// # Examples
    ///
    /// ```
    /// use zimvault::archive::ArchiveName;
    ///
    /// let name = ArchiveName::parse("wikipedia_en_all_maxi_2024-01.zim").unwrap();
    /// assert_eq!(name.basename, "wikipedia_en_all_maxi");
    /// assert_eq!(name.year, 2024);
    /// assert_eq!(name.month, 1);
    /// assert_eq!(name.extension, "zim");
    /// assert_eq!(name.stamp(), "2024-01");
    /// ```
    pub fn parse(file_name: &str) -> Result<Self, NameError> {
        let captures = archive_pattern()
            .captures(file_name)
            .ok_or(NameError::InvalidPattern)?;

        let basename = captures.get(1).unwrap().as_str();
        let year_str = captures.get(2).unwrap().as_str();
        let month_str = captures.get(3).unwrap().as_str();
        let extension = captures.get(4).unwrap().as_str();

        // Four ASCII digits always fit in u16
        let year = year_str
            .parse::<u16>()
            .map_err(|_| NameError::InvalidPattern)?;

        let month = month_str
            .parse::<u8>()
            .ok()
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| NameError::InvalidMonth(month_str.to_string()))?;

        Ok(Self::new(basename, year, month, extension))
    }

    /// Year-month stamp, zero padded (`YYYY-MM`).
    pub fn stamp(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// Full filename (`<basename>_<YYYY>-<MM>.<ext>`).
    pub fn file_name(&self) -> String {
        format!("{}_{}.{}", self.basename, self.stamp(), self.extension)
    }

    /// Whether this name belongs to the given archive family.
    pub fn is_family(&self, basename: &str, extension: &str) -> bool {
        self.basename == basename && self.extension == extension
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

impl PartialOrd for ArchiveName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArchiveName {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.year, self.month)
            .cmp(&(other.year, other.month))
            .then_with(|| self.basename.cmp(&other.basename))
            .then_with(|| self.extension.cmp(&other.extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_name() {
        let name = ArchiveName::parse("wiki_test_2024-02.zim").unwrap();
        assert_eq!(name.basename, "wiki_test");
        assert_eq!(name.year, 2024);
        assert_eq!(name.month, 2);
        assert_eq!(name.extension, "zim");
    }

    #[test]
    fn test_parse_basename_with_many_underscores() {
        let name = ArchiveName::parse("wikipedia_en_all_maxi_2023-12.zim").unwrap();
        assert_eq!(name.basename, "wikipedia_en_all_maxi");
        assert_eq!(name.stamp(), "2023-12");
    }

    #[test]
    fn test_parse_rejects_partial_download() {
        assert_eq!(
            ArchiveName::parse("wiki_test_2024-02.zim.part"),
            Err(NameError::InvalidPattern)
        );
    }

    #[test]
    fn test_parse_rejects_checksum_sibling() {
        assert_eq!(
            ArchiveName::parse("wiki_test_2024-02.zim.sha256"),
            Err(NameError::InvalidPattern)
        );
    }

    #[test]
    fn test_parse_rejects_missing_stamp() {
        assert_eq!(
            ArchiveName::parse("wiki_test.zim"),
            Err(NameError::InvalidPattern)
        );
        assert_eq!(
            ArchiveName::parse("wiki_test_2024-2.zim"),
            Err(NameError::InvalidPattern)
        );
        assert_eq!(
            ArchiveName::parse("_2024-02.zim"),
            Err(NameError::InvalidPattern)
        );
    }

    #[test]
    fn test_parse_rejects_invalid_month() {
        assert_eq!(
            ArchiveName::parse("wiki_test_2024-13.zim"),
            Err(NameError::InvalidMonth("13".to_string()))
        );
        assert_eq!(
            ArchiveName::parse("wiki_test_2024-00.zim"),
            Err(NameError::InvalidMonth("00".to_string()))
        );
    }

    #[test]
    fn test_file_name_round_trip() {
        let name = ArchiveName::new("wiki_test", 2024, 3, "zim");
        assert_eq!(name.file_name(), "wiki_test_2024-03.zim");
        assert_eq!(name.to_string(), "wiki_test_2024-03.zim");
    }

    #[test]
    fn test_ordering_follows_stamp() {
        let mut names = vec![
            ArchiveName::new("wiki", 2023, 12, "zim"),
            ArchiveName::new("wiki", 2024, 2, "zim"),
            ArchiveName::new("wiki", 2024, 1, "zim"),
        ];
        names.sort();
        let stamps: Vec<String> = names.iter().map(|n| n.stamp()).collect();
        assert_eq!(stamps, vec!["2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn test_is_family() {
        let name = ArchiveName::parse("wiki_test_2024-02.zim").unwrap();
        assert!(name.is_family("wiki_test", "zim"));
        assert!(!name.is_family("wiki", "zim"));
        assert!(!name.is_family("wiki_test", "zip"));
    }
}

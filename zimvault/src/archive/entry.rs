//! Archive entries in managed storage.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::naming::ArchiveName;

/// A committed archive file in the storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Absolute path of the file.
    pub path: PathBuf,

    /// Parsed filename.
    pub name: ArchiveName,

    /// File size in bytes.
    pub size: u64,

    /// Last modification time.
    pub modified: SystemTime,
}

impl ArchiveEntry {
    /// Bare filename of the entry.
    pub fn file_name(&self) -> String {
        self.name.file_name()
    }

    /// Build an entry from a path, returning `None` for non-archive files.
    pub fn from_path(path: &Path) -> io::Result<Option<Self>> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let Ok(name) = ArchiveName::parse(file_name) else {
            return Ok(None);
        };

        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }))
    }
}

/// List every archive entry directly inside `dir`.
///
/// Subdirectories and files that don't follow the archive naming pattern are
/// skipped. A missing directory yields an empty list. Entries are returned in
/// eviction order: oldest modification time first, ties broken by filename.
pub fn scan_archives(dir: &Path) -> io::Result<Vec<ArchiveEntry>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    for dir_entry in read_dir {
        let dir_entry = dir_entry?;
        match ArchiveEntry::from_path(&dir_entry.path()) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            // Removed between listing and stat
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }

    sort_oldest_first(&mut entries);
    Ok(entries)
}

/// Sort entries by (modification time, filename) ascending.
pub fn sort_oldest_first(entries: &mut [ArchiveEntry]) {
    entries.sort_by(|a, b| {
        a.modified
            .cmp(&b.modified)
            .then_with(|| a.file_name().cmp(&b.file_name()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, len: usize, mtime: i64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![0u8; len]).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
        path
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let entries = scan_archives(&temp.path().join("missing")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_scan_skips_non_archives() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "wiki_2024-01.zim", 10, 1_000);
        write_file(temp.path(), "wiki_2024-02.zim.part", 10, 1_000);
        write_file(temp.path(), "notes.txt", 10, 1_000);
        fs::create_dir(temp.path().join("wiki_2024-03.zim")).unwrap();

        let entries = scan_archives(temp.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name(), "wiki_2024-01.zim");
        assert_eq!(entries[0].size, 10);
    }

    #[test]
    fn test_scan_orders_oldest_first() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "wiki_2024-03.zim", 1, 3_000);
        write_file(temp.path(), "wiki_2024-01.zim", 1, 1_000);
        write_file(temp.path(), "wiki_2024-02.zim", 1, 2_000);

        let names: Vec<String> = scan_archives(temp.path())
            .unwrap()
            .iter()
            .map(|e| e.file_name())
            .collect();
        assert_eq!(
            names,
            vec!["wiki_2024-01.zim", "wiki_2024-02.zim", "wiki_2024-03.zim"]
        );
    }

    #[test]
    fn test_equal_mtimes_break_ties_by_name() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "beta_2024-01.zim", 1, 5_000);
        write_file(temp.path(), "alpha_2024-01.zim", 1, 5_000);

        let entries = scan_archives(temp.path()).unwrap();
        assert_eq!(entries[0].file_name(), "alpha_2024-01.zim");
        assert_eq!(entries[1].file_name(), "beta_2024-01.zim");
    }
}

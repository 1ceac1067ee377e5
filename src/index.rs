//! Card and disk tree indices keyed by file name and byte size.
//!
//! Both indices are built once from a directory snapshot and are read-mostly
//! afterwards; the only later mutation is caching a record's content digest.
//! The card index holds at most one record per key (duplicates on a card are
//! a policy violation and keep the first record seen); the disk index holds
//! every file sharing a key, in walk order, and a key never maps to an empty
//! group.

use std::{
    collections::{HashMap, hash_map::Entry},
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ExtensionSet;

/// Identity key used to cross-reference card and disk files.
///
/// Name plus size is a cheap pre-filter, not a content identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileKey {
    /// File basename as it appears on disk.
    pub name: String,
    /// File size in bytes.
    pub size: u64,
}

/// One physical file plus its lazily computed content digest.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Full path of the file.
    pub path: PathBuf,
    /// Modification time from the snapshot the index was built from.
    pub modified: SystemTime,
    /// Cached prefix digest; `None` until first computed, then never
    /// overwritten.
    pub digest: Option<[u8; 32]>,
}

impl FileRecord {
    /// Record with no digest computed yet.
    pub fn new(path: PathBuf, modified: SystemTime) -> Self {
        Self {
            path,
            modified,
            digest: None,
        }
    }
}

/// Errors raised while indexing a tree.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The root path is missing or not a directory.
    #[error("Root is not a directory: {0}")]
    InvalidRoot(PathBuf),
    /// Reading the root directory or a file's metadata failed.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Index of the card tree: at most one record per key.
#[derive(Debug, Default)]
pub struct CardIndex {
    files: HashMap<FileKey, FileRecord>,
}

impl CardIndex {
    /// Index every recognized file under `root`.
    pub fn build(root: &Path, extensions: &ExtensionSet) -> Result<Self, IndexError> {
        info!("Reading card {}", root.display());
        let mut index = Self::default();
        visit_files(root, extensions, &mut |path, meta| {
            if let Some((key, record)) = make_record(path, meta.len(), meta.modified()) {
                index.insert(key, record);
            }
        })?;
        info!("Done reading card: {} file(s)", index.len());
        Ok(index)
    }

    /// Insert a record, keeping the first one on a key collision.
    ///
    /// Duplicate (name, size) pairs should not happen on a single card;
    /// they are logged and the duplicate is dropped.
    pub fn insert(&mut self, key: FileKey, record: FileRecord) {
        match self.files.entry(key) {
            Entry::Occupied(existing) => {
                warn!(
                    name = %existing.key().name,
                    size = existing.key().size,
                    kept = %existing.get().path.display(),
                    dropped = %record.path.display(),
                    "Duplicate name and size on card; keeping first record"
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }

    /// Iterate over all (key, record) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&FileKey, &FileRecord)> {
        self.files.iter()
    }

    /// Look up the record for a key.
    pub fn record(&self, key: &FileKey) -> Option<&FileRecord> {
        self.files.get(key)
    }

    /// Mutable access to a record, used to cache its digest.
    pub fn record_mut(&mut self, key: &FileKey) -> Option<&mut FileRecord> {
        self.files.get_mut(key)
    }

    /// Number of indexed card files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing was indexed.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Index of the disk archive: every file sharing a key, in walk order.
#[derive(Debug, Default)]
pub struct DiskIndex {
    files: HashMap<FileKey, Vec<FileRecord>>,
}

impl DiskIndex {
    /// Index every recognized file under `root`.
    pub fn build(root: &Path, extensions: &ExtensionSet) -> Result<Self, IndexError> {
        info!("Reading disk {}", root.display());
        let mut index = Self::default();
        visit_files(root, extensions, &mut |path, meta| {
            if let Some((key, record)) = make_record(path, meta.len(), meta.modified()) {
                index.insert(key, record);
            }
        })?;
        info!("Done reading disk: {} distinct file(s)", index.len());
        Ok(index)
    }

    /// Insert a record, appending on key collisions.
    ///
    /// Duplicates are legitimate on disk: the same card export can land in
    /// several folders, or a name can collide with different content.
    pub fn insert(&mut self, key: FileKey, record: FileRecord) {
        let group = self.files.entry(key).or_default();
        group.push(record);
        if group.len() > 1 {
            debug!(
                count = group.len(),
                "Multiple disk files share a name and size"
            );
            for candidate in group.iter() {
                debug!("  {}", candidate.path.display());
            }
        }
    }

    /// All candidates recorded under `key`, if any.
    pub fn candidates(&self, key: &FileKey) -> Option<&[FileRecord]> {
        self.files.get(key).map(Vec::as_slice)
    }

    /// Look up one candidate by position within its key group.
    pub fn record(&self, key: &FileKey, candidate: usize) -> Option<&FileRecord> {
        self.files.get(key).and_then(|group| group.get(candidate))
    }

    /// Mutable access to one candidate, used to cache its digest.
    pub fn record_mut(&mut self, key: &FileKey, candidate: usize) -> Option<&mut FileRecord> {
        self.files
            .get_mut(key)
            .and_then(|group| group.get_mut(candidate))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing was indexed.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn make_record(
    path: &Path,
    size: u64,
    modified: std::io::Result<SystemTime>,
) -> Option<(FileKey, FileRecord)> {
    let modified = match modified {
        Ok(modified) => modified,
        Err(err) => {
            // a fabricated timestamp would make every card counterpart look
            // stale and bypass content verification
            warn!(
                path = %path.display(),
                error = %err,
                "Failed to read modification time; skipping"
            );
            return None;
        }
    };
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Some((
        FileKey { name, size },
        FileRecord::new(path.to_path_buf(), modified),
    ))
}

/// Walk `root` depth-first, calling `visitor` for every regular file whose
/// extension is in the allow-set.
///
/// Symlinks are skipped. A directory that fails to read below the root is
/// logged and aborts the walk, keeping everything collected so far; a
/// failure on the root itself is an error since nothing useful was indexed.
/// A single entry whose type cannot be read is logged and skipped.
fn visit_files(
    root: &Path,
    extensions: &ExtensionSet,
    visitor: &mut impl FnMut(&Path, &fs::Metadata),
) -> Result<(), IndexError> {
    if !root.is_dir() {
        return Err(IndexError::InvalidRoot(root.to_path_buf()));
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) if dir != root => {
                warn!(
                    dir = %dir.display(),
                    error = %source,
                    "Failed to read directory; aborting walk with entries collected so far"
                );
                break;
            }
            Err(source) => {
                return Err(IndexError::Io { path: dir, source });
            }
        };
        for entry_result in entries {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(
                        dir = %dir.display(),
                        error = %err,
                        "Failed to read directory entry; skipping"
                    );
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "Failed to read file type; skipping"
                    );
                    continue;
                }
            };
            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            if file_type.is_file() && extensions.matches(&path) {
                match entry.metadata() {
                    Ok(meta) => visitor(&path, &meta),
                    Err(err) => {
                        warn!(
                            path = %path.display(),
                            error = %err,
                            "Failed to read metadata; skipping"
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, contents).expect("write file");
    }

    #[test]
    fn indexing_filters_by_extension() {
        let dir = tempdir().expect("tempdir");
        write(&dir.path().join("IMG_0001.JPG"), b"jpeg");
        write(&dir.path().join("clip.mp4"), b"video");
        write(&dir.path().join("notes.txt"), b"text");
        write(&dir.path().join("sub/IMG_0002.nef"), b"raw");

        let index = CardIndex::build(dir.path(), &ExtensionSet::default_media())
            .expect("build card index");
        assert_eq!(index.len(), 3);
        assert!(
            index
                .record(&FileKey {
                    name: "IMG_0002.nef".into(),
                    size: 3,
                })
                .is_some()
        );
    }

    #[test]
    fn card_collision_keeps_first_record() {
        let mut index = CardIndex::default();
        let key = FileKey {
            name: "IMG_0001.JPG".into(),
            size: 100,
        };
        index.insert(
            key.clone(),
            FileRecord::new(PathBuf::from("/card/a/IMG_0001.JPG"), SystemTime::now()),
        );
        index.insert(
            key.clone(),
            FileRecord::new(PathBuf::from("/card/b/IMG_0001.JPG"), SystemTime::now()),
        );
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.record(&key).expect("record").path,
            PathBuf::from("/card/a/IMG_0001.JPG")
        );
    }

    #[test]
    fn disk_collision_appends_in_order() {
        let mut index = DiskIndex::default();
        let key = FileKey {
            name: "IMG_0001.JPG".into(),
            size: 100,
        };
        index.insert(
            key.clone(),
            FileRecord::new(PathBuf::from("/disk/2024/IMG_0001.JPG"), SystemTime::now()),
        );
        index.insert(
            key.clone(),
            FileRecord::new(PathBuf::from("/disk/best/IMG_0001.JPG"), SystemTime::now()),
        );
        let group = index.candidates(&key).expect("group");
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].path, PathBuf::from("/disk/2024/IMG_0001.JPG"));
        assert_eq!(group[1].path, PathBuf::from("/disk/best/IMG_0001.JPG"));
    }

    #[test]
    fn same_name_different_size_are_distinct_keys() {
        let dir = tempdir().expect("tempdir");
        write(&dir.path().join("a/IMG.JPG"), b"short");
        write(&dir.path().join("b/IMG.JPG"), b"a bit longer");

        let index = DiskIndex::build(dir.path(), &ExtensionSet::default_media())
            .expect("build disk index");
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn mid_walk_directory_failure_keeps_collected_entries() {
        let dir = tempdir().expect("tempdir");
        write(&dir.path().join("IMG_0001.JPG"), b"kept");
        let sub = dir.path().join("sub");
        write(&sub.join("IMG_0002.JPG"), b"also kept");
        let nested = sub.join("nested");
        write(&nested.join("IMG_0003.JPG"), b"behind the failure");

        // `nested` is pushed while listing `sub`; removing it when its
        // sibling file is visited makes the later read_dir on it fail.
        let mut visited = Vec::new();
        let result = visit_files(dir.path(), &ExtensionSet::default_media(), &mut |path, _meta| {
            if path.file_name().and_then(|name| name.to_str()) == Some("IMG_0002.JPG") {
                fs::remove_dir_all(&nested).expect("remove nested dir");
            }
            visited.push(path.to_path_buf());
        });

        result.expect("mid-walk failure must not be fatal");
        let mut names: Vec<_> = visited
            .iter()
            .map(|path| {
                path.file_name()
                    .expect("basename")
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        assert_eq!(names, ["IMG_0001.JPG", "IMG_0002.JPG"]);
    }

    #[test]
    fn unreadable_modification_time_skips_the_file() {
        let skipped = make_record(
            Path::new("/card/IMG_0001.JPG"),
            4,
            Err(std::io::Error::other("mtime unavailable")),
        );
        assert!(skipped.is_none());

        let (key, record) = make_record(
            Path::new("/card/IMG_0001.JPG"),
            4,
            Ok(SystemTime::UNIX_EPOCH),
        )
        .expect("record with readable mtime");
        assert_eq!(key.name, "IMG_0001.JPG");
        assert_eq!(key.size, 4);
        assert!(record.digest.is_none());
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("not_there");
        assert!(matches!(
            CardIndex::build(&missing, &ExtensionSet::default_media()),
            Err(IndexError::InvalidRoot(_))
        ));
    }
}

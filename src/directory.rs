use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use time::OffsetDateTime;
use walkdir::WalkDir;

/// Which file a path pointed at when it was listed.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    device: u64,
    inode: u64,
}

#[cfg(unix)]
impl FileIdentity {
    fn of(metadata: &fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            device: metadata.dev(),
            inode: metadata.ino(),
        }
    }
}

/// Which file a path pointed at when it was listed.
#[cfg(not(unix))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    len: u64,
    modified: Option<std::time::SystemTime>,
    created: Option<std::time::SystemTime>,
}

#[cfg(not(unix))]
impl FileIdentity {
    fn of(metadata: &fs::Metadata) -> Self {
        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
            created: metadata.created().ok(),
        }
    }
}

/// Opaque reference to the item an [`Entry`] was listed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHandle {
    path: PathBuf,
    identity: Option<FileIdentity>,
}

impl EntryHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            identity: None,
        }
    }

    fn with_identity(path: PathBuf, metadata: &fs::Metadata) -> Self {
        Self {
            path,
            identity: Some(FileIdentity::of(metadata)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// False once the path names a different file than the one listed.
    fn still_refers_to_listed_item(&self) -> bool {
        let Ok(current) = fs::symlink_metadata(&self.path) else {
            return false;
        };
        match self.identity {
            Some(identity) => identity == FileIdentity::of(&current),
            None => true,
        }
    }
}

/// One child of a directory as it looked when the directory was listed.
///
/// Entries are never updated after a rename. A handle names "the item that was
/// called `name`", so an entry must not be reused once something else may have
/// taken that name.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub last_modified: OffsetDateTime,
    pub handle: EntryHandle,
}

/// The storage operations the rename engine needs from a directory.
pub trait DirectoryHandle {
    /// Lists the immediate children as they are right now.
    fn list_entries(&self) -> io::Result<Vec<Entry>>;

    /// Renames `entry` to `new_name` inside the same directory.
    ///
    /// Ordinary refusals (name taken, invalid name, I/O failure) are reported
    /// as `false`.
    fn rename(&mut self, entry: &Entry, new_name: &str) -> bool;
}

/// [`DirectoryHandle`] backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DirectoryHandle for FsDirectory {
    fn list_entries(&self) -> io::Result<Vec<Entry>> {
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false);

        let mut entries = Vec::new();
        for item in walker {
            let item = item?;
            let metadata = item.metadata()?;
            let last_modified = metadata
                .modified()
                .map(OffsetDateTime::from)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH);
            entries.push(Entry {
                name: item.file_name().to_string_lossy().into_owned(),
                is_directory: item.file_type().is_dir(),
                size: metadata.len(),
                last_modified,
                handle: EntryHandle::with_identity(item.into_path(), &metadata),
            });
        }
        Ok(entries)
    }

    fn rename(&mut self, entry: &Entry, new_name: &str) -> bool {
        if entry.is_directory || !is_plain_file_name(new_name) {
            return false;
        }
        let target = self.root.join(new_name);
        if fs::symlink_metadata(&target).is_ok() {
            return false;
        }
        // An earlier rename in the same run may have moved another file onto
        // this entry's old name.
        if !entry.handle.still_refers_to_listed_item() {
            return false;
        }
        fs::rename(entry.handle.path(), &target).is_ok()
    }
}

/// A name that stays inside the directory it is created in.
fn is_plain_file_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if name.contains('/') || name.contains('\0') {
        return false;
    }
    if cfg!(windows) && name.contains('\\') {
        return false;
    }
    true
}

/// Which entries the `list` command shows.
#[derive(Debug, Default)]
pub struct ListFilter {
    include_hidden: bool,
    exclude: Option<GlobSet>,
}

impl ListFilter {
    pub fn new(include_hidden: bool, exclude_patterns: &[String]) -> Result<Self> {
        Ok(Self {
            include_hidden,
            exclude: exclude_set(exclude_patterns)?,
        })
    }

    fn accepts(&self, entry: &Entry) -> bool {
        if entry.is_directory {
            return false;
        }
        if !self.include_hidden && entry.name.starts_with('.') {
            return false;
        }
        match &self.exclude {
            Some(set) => !set.is_match(entry.name.as_str()),
            None => true,
        }
    }
}

/// Files that pass `filter`, sorted by name.
pub fn visible_files<'a>(entries: &'a [Entry], filter: &ListFilter) -> Vec<&'a Entry> {
    let mut files: Vec<&Entry> = entries
        .iter()
        .filter(|entry| filter.accepts(entry))
        .collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}

fn exclude_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .with_context(|| format!("parsing --exclude pattern '{pattern}'"))?;
        builder.add(glob);
    }
    let set = builder.build().context("compiling --exclude patterns")?;
    Ok(Some(set))
}

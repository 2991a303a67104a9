//! Source tree enumeration
//!
//! Walks a packing root and yields one [`PackageFile`] per regular file, in
//! the order the directory walk produces them. Archive paths are always
//! relative to the root, use forward slashes and never contain `..`.

use crate::{Error, Result};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error};
use walkdir::WalkDir;

/// One file scheduled for packing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    /// Location of the content on disk
    pub local_path: PathBuf,
    /// Entry name inside the archive (relative, `/`-separated)
    pub archive_path: String,
    /// Size in bytes at enumeration time
    pub size: u64,
    /// Permission bits recorded for the entry
    pub attributes: u32,
}

impl PackageFile {
    /// Build a package file from a local path and a caller-supplied archive path
    ///
    /// The archive path is normalized and rejected if it is absolute or
    /// walks out of the packing root.
    pub fn new(local_path: impl Into<PathBuf>, archive_path: &str) -> Result<Self> {
        let local_path = local_path.into();
        let archive_path = normalize_archive_path(Path::new(archive_path))?;
        let metadata = std::fs::metadata(&local_path)?;

        Ok(Self {
            attributes: permission_bits(&metadata),
            size: metadata.len(),
            local_path,
            archive_path,
        })
    }
}

/// Total payload size of a file set
pub fn total_size(files: &[PackageFile]) -> u64 {
    files.iter().map(|f| f.size).sum()
}

/// Reject file sets that map two sources onto one archive path
pub fn ensure_unique(files: &[PackageFile]) -> Result<()> {
    let mut seen = HashSet::with_capacity(files.len());
    for file in files {
        if !seen.insert(file.archive_path.as_str()) {
            return Err(Error::Validation(format!(
                "Duplicate archive path: {}",
                file.archive_path
            )));
        }
    }
    Ok(())
}

/// Turn a relative path into an archive entry name
pub fn normalize_archive_path(path: &Path) -> Result<String> {
    let mut parts = Vec::new();

    for component in path.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                error!(path = ?path, "Archive path contains parent directory component");
                return Err(Error::InvalidPath(format!(
                    "Path traversal not allowed in archive path: {:?}",
                    path
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidPath(format!(
                    "Absolute archive path not allowed: {:?}",
                    path
                )));
            }
        }
    }

    // Layout files written on Windows use backslashes
    let joined = parts.join("/").replace('\\', "/");
    if joined.is_empty() || joined.split('/').any(|p| p == "..") {
        return Err(Error::InvalidPath(format!(
            "Invalid archive path: {:?}",
            path
        )));
    }

    Ok(joined)
}

/// Recursive walker over the regular files below a root directory
pub struct PathEnumerator {
    root: PathBuf,
    inner: walkdir::IntoIter,
}

impl PathEnumerator {
    /// Start enumerating `root`
    ///
    /// Fails with `NotFound` if the root is missing and `NotADirectory` if it
    /// is not a directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::with_options(root, false)
    }

    /// Start enumerating `root`, optionally following symlinks
    pub fn with_options<P: AsRef<Path>>(root: P, follow_links: bool) -> Result<Self> {
        let root = root.as_ref();

        if !root.exists() {
            return Err(Error::NotFound(format!(
                "Input path does not exist: {:?}",
                root
            )));
        }
        if !root.is_dir() {
            return Err(Error::NotADirectory(root.to_path_buf()));
        }

        Ok(Self {
            root: root.to_path_buf(),
            inner: WalkDir::new(root).follow_links(follow_links).into_iter(),
        })
    }

    fn package_file(&self, entry: &walkdir::DirEntry) -> Result<PackageFile> {
        let relative = entry.path().strip_prefix(&self.root).map_err(|_| {
            Error::InvalidPath(format!("{:?} is outside {:?}", entry.path(), self.root))
        })?;
        let metadata = entry.metadata()?;

        Ok(PackageFile {
            local_path: entry.path().to_path_buf(),
            archive_path: normalize_archive_path(relative)?,
            size: metadata.len(),
            attributes: permission_bits(&metadata),
        })
    }
}

impl Iterator for PathEnumerator {
    type Item = Result<PackageFile>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let file = self.package_file(&entry);
            if let Ok(file) = &file {
                debug!(path = %file.archive_path, size = file.size, "Found file");
            }
            return Some(file);
        }
    }
}

/// Collect every regular file below `root`
pub fn enumerate<P: AsRef<Path>>(root: P) -> Result<Vec<PackageFile>> {
    PathEnumerator::new(root)?.collect()
}

#[cfg(unix)]
fn permission_bits(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &std::fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

//! ZIP reader with per-entry fault isolation

use crate::interactive::{ConflictResolver, OverwriteMode};
use crate::strategy::EntryMethod;
use crate::{Error, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

use super::BUFFER_SIZE;

/// Stored entry as listed in the central directory
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    /// Position in the central directory
    pub index: usize,
    /// Entry name as stored
    pub name: String,
    /// Uncompressed size in bytes
    pub size: u64,
    /// Compressed size in bytes
    pub compressed_size: u64,
    /// Storage method, if it is one appx writes
    pub method: Option<EntryMethod>,
    /// Whether this is a directory entry
    pub is_dir: bool,
}

/// Why an entry was not written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Destination exists and the overwrite mode is `No`
    Exists,
    /// The conflict resolver declined to overwrite
    Declined,
}

/// Result of extracting one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// Entry written; carries the number of bytes written
    Extracted(u64),
    /// Entry left alone on purpose
    Skipped(SkipReason),
    /// Entry could not be written; extraction of other entries continues
    Failed(String),
}

/// Open archive being read
pub struct ArchiveReader {
    source: PathBuf,
    archive: ZipArchive<File>,
}

impl ArchiveReader {
    /// Open an existing archive
    pub fn open<P: AsRef<Path>>(source: P) -> Result<Self> {
        let source = source.as_ref();

        if !source.exists() {
            return Err(Error::NotFound(format!(
                "Package file does not exist: {:?}",
                source
            )));
        }

        let file = File::open(source)?;
        let archive = ZipArchive::new(file)
            .map_err(|e| Error::Archive(format!("Failed to open package file {:?}: {}", source, e)))?;
        debug!("Opened {:?} with {} entries", source, archive.len());

        Ok(Self {
            source: source.to_path_buf(),
            archive,
        })
    }

    /// Path of the archive
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Number of entries in the central directory
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    /// Whether the archive has no entries
    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// Stored entry names, in central directory order
    pub fn list_entries(&mut self) -> Result<Vec<String>> {
        Ok(self.entries()?.into_iter().map(|e| e.name).collect())
    }

    /// Stored entries with their sizes and methods
    pub fn entries(&mut self) -> Result<Vec<EntryInfo>> {
        let mut entries = Vec::with_capacity(self.archive.len());

        for index in 0..self.archive.len() {
            let file = self.archive.by_index_raw(index)?;
            let method = match file.compression() {
                zip::CompressionMethod::Stored => Some(EntryMethod::Store),
                zip::CompressionMethod::Deflated => Some(EntryMethod::Deflate),
                _ => None,
            };
            entries.push(EntryInfo {
                index,
                name: file.name().to_string(),
                size: file.size(),
                compressed_size: file.compressed_size(),
                method,
                is_dir: file.is_dir(),
            });
        }

        Ok(entries)
    }

    /// Write entry `index` below `dest_root`
    ///
    /// Conflicts with existing files follow `mode`; in [`OverwriteMode::Ask`]
    /// the resolver is consulted for this entry only. Failures to create the
    /// destination are reported as [`ExtractOutcome::Failed`] rather than an
    /// error so the caller can continue with the next entry.
    pub fn extract_entry(
        &mut self,
        index: usize,
        dest_root: &Path,
        mode: OverwriteMode,
        resolver: &mut dyn ConflictResolver,
    ) -> ExtractOutcome {
        let mut entry = match self.archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => return failed(format!("cannot read entry #{}: {}", index, e)),
        };

        let name = entry.name().to_string();
        let relative = match entry.enclosed_name().map(|p| p.to_path_buf()) {
            Some(path) => path,
            None => return failed(format!("unsafe entry name: {}", name)),
        };
        let dest = dest_root.join(&relative);

        if entry.is_dir() {
            return match fs::create_dir_all(&dest) {
                Ok(()) => ExtractOutcome::Extracted(0),
                Err(e) => failed(format!("cannot create directory {:?}: {}", dest, e)),
            };
        }

        if dest.exists() {
            match mode {
                OverwriteMode::No => {
                    debug!("Skipping existing file: {:?}", dest);
                    return ExtractOutcome::Skipped(SkipReason::Exists);
                }
                OverwriteMode::Ask => {
                    if !resolver.resolve_conflict(&dest).overwrites() {
                        debug!("Declined overwrite: {:?}", dest);
                        return ExtractOutcome::Skipped(SkipReason::Declined);
                    }
                }
                OverwriteMode::Yes => debug!("Overwriting existing file: {:?}", dest),
            }
        }

        if let Some(parent) = dest.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return failed(format!("cannot create directory {:?}: {}", parent, e));
            }
        }

        let file = match File::create(&dest) {
            Ok(file) => file,
            Err(e) => return failed(format!("cannot open {:?} for writing: {}", dest, e)),
        };

        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
        let copied = io::copy(&mut entry, &mut writer).and_then(|n| {
            writer.flush()?;
            Ok(n)
        });

        match copied {
            Ok(bytes) => {
                debug!(entry = %name, bytes, "Extracted entry");
                ExtractOutcome::Extracted(bytes)
            }
            Err(e) => {
                drop(writer);
                // The destination was truncated before the copy failed
                match fs::remove_file(&dest) {
                    Ok(()) => warn!("Removed incomplete file {:?}", dest),
                    Err(remove_err) => warn!(
                        "Failed to remove incomplete file {:?}: {}",
                        dest, remove_err
                    ),
                }
                failed(format!("cannot extract {}: {}", name, e))
            }
        }
    }
}

fn failed(reason: String) -> ExtractOutcome {
    warn!("{}", reason);
    ExtractOutcome::Failed(reason)
}

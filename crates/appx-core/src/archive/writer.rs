//! Streaming ZIP writer with all-or-nothing commit

use crate::strategy::EntryMethod;
use crate::{Error, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::BUFFER_SIZE;

/// Entries at or above this size need ZIP64 headers
const ZIP64_ENTRY_SIZE: u64 = u32::MAX as u64;

/// Result of a successful commit
#[derive(Debug, Clone, Copy)]
pub struct CommitStats {
    /// Time spent writing the central directory
    pub elapsed: Duration,
    /// Final size of the archive file
    pub archive_size: u64,
}

/// Open archive being written
///
/// The target is created (or truncated) on [`ArchiveWriter::create`] and is
/// only kept on disk once [`ArchiveWriter::commit`] succeeds. Dropping the
/// writer without committing discards the output.
pub struct ArchiveWriter {
    target: PathBuf,
    zip: Option<ZipWriter<File>>,
    entries: u64,
}

impl ArchiveWriter {
    /// Create or truncate `target` and open it for writing
    pub fn create<P: AsRef<Path>>(target: P) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let file = File::create(&target).map_err(|e| {
            Error::Io(io::Error::new(
                e.kind(),
                format!("Failed to create output package {:?}: {}", target, e),
            ))
        })?;
        debug!("Opened archive for writing: {:?}", target);

        Ok(Self {
            target,
            zip: Some(ZipWriter::new(file)),
            entries: 0,
        })
    }

    /// Path of the archive being written
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> u64 {
        self.entries
    }

    /// Stream a file from disk into a new entry
    ///
    /// Returns the number of bytes copied. Any failure is reported as
    /// [`Error::Entry`]; the writer stays usable for [`ArchiveWriter::discard`].
    pub fn add_entry(
        &mut self,
        source: &Path,
        archive_path: &str,
        method: EntryMethod,
        attributes: u32,
    ) -> Result<u64> {
        let entry_error = |reason: String| Error::Entry {
            path: archive_path.to_string(),
            reason,
        };

        // Open the source first so a missing file never leaves a dangling entry header
        let file = File::open(source)
            .map_err(|e| entry_error(format!("cannot open {:?}: {}", source, e)))?;
        let size = file
            .metadata()
            .map_err(|e| entry_error(e.to_string()))?
            .len();
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);

        let zip = self.zip_mut(archive_path)?;
        zip.start_file(archive_path, entry_options(method, attributes, size))
            .map_err(|e| entry_error(e.to_string()))?;
        let copied = io::copy(&mut reader, zip).map_err(|e| entry_error(e.to_string()))?;

        self.entries += 1;
        debug!(entry = archive_path, bytes = copied, %method, "Added entry");
        Ok(copied)
    }

    /// Add an entry from an in-memory buffer
    pub fn add_bytes(&mut self, archive_path: &str, data: &[u8], method: EntryMethod) -> Result<()> {
        let entry_error = |reason: String| Error::Entry {
            path: archive_path.to_string(),
            reason,
        };

        let zip = self.zip_mut(archive_path)?;
        zip.start_file(
            archive_path,
            entry_options(method, 0o644, data.len() as u64),
        )
        .map_err(|e| entry_error(e.to_string()))?;
        zip.write_all(data).map_err(|e| entry_error(e.to_string()))?;

        self.entries += 1;
        debug!(entry = archive_path, bytes = data.len(), %method, "Added synthetic entry");
        Ok(())
    }

    /// Write the central directory and keep the archive
    ///
    /// This is the only step whose cost scales with the whole container.
    /// On failure the partially written file is removed.
    pub fn commit(mut self) -> Result<CommitStats> {
        let zip = self
            .zip
            .take()
            .ok_or_else(|| Error::Archive("Archive already closed".to_string()))?;

        let started = Instant::now();
        let finished = zip.finish().and_then(|mut file| {
            file.flush()?;
            Ok(file)
        });
        let elapsed = started.elapsed();

        let file = match finished {
            Ok(file) => file,
            Err(e) => {
                remove_partial(&self.target);
                return Err(Error::Archive(format!(
                    "Failed to finalize package - ZIP close operation failed: {}",
                    e
                )));
            }
        };
        drop(file);

        let archive_size = match fs::metadata(&self.target) {
            Ok(metadata) => metadata.len(),
            Err(_) => {
                return Err(Error::Archive(
                    "Output package file was not created".to_string(),
                ))
            }
        };
        if archive_size == 0 {
            remove_partial(&self.target);
            return Err(Error::Archive("Output package file is empty".to_string()));
        }

        info!(
            "Committed {} entries to {:?} ({} bytes) in {:.2?}",
            self.entries, self.target, archive_size, elapsed
        );
        Ok(CommitStats {
            elapsed,
            archive_size,
        })
    }

    /// Abandon the archive and delete whatever was written
    pub fn discard(mut self) {
        self.discard_inner();
    }

    fn discard_inner(&mut self) {
        if let Some(zip) = self.zip.take() {
            drop(zip);
            remove_partial(&self.target);
            warn!("Discarded incomplete archive {:?}", self.target);
        }
    }

    fn zip_mut(&mut self, archive_path: &str) -> Result<&mut ZipWriter<File>> {
        self.zip.as_mut().ok_or_else(|| Error::Entry {
            path: archive_path.to_string(),
            reason: "archive already closed".to_string(),
        })
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        self.discard_inner();
    }
}

fn entry_options(method: EntryMethod, attributes: u32, size: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(method.zip_method())
        .unix_permissions(attributes)
        .large_file(size >= ZIP64_ENTRY_SIZE)
}

fn remove_partial(target: &Path) {
    if let Err(e) = fs::remove_file(target) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove partial archive {:?}: {}", target, e);
        }
    }
}

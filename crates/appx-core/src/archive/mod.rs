//! Archive operations module
//!
//! Packing is all-or-nothing: any entry failure discards the output.
//! Unpacking isolates faults per entry and keeps going.

pub mod reader;
pub mod writer;

pub use reader::{ArchiveReader, EntryInfo, ExtractOutcome, SkipReason};
pub use writer::{ArchiveWriter, CommitStats};

use crate::config::{ExtractConfig, PackageConfig};
use crate::interactive::{ConflictResolver, OverwriteMode};
use crate::manifest::{self, PACKAGE_MANIFEST};
use crate::progress::{ProgressObserver, Tracker};
use crate::strategy::{Advisory, CompressionLevel, EntryMethod, SizePolicy, LARGE_PAYLOAD_THRESHOLD};
use crate::walk::{self, PackageFile, PathEnumerator};
use crate::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Size of the buffers entries stream through
pub const BUFFER_SIZE: usize = 8192;

/// Options for packing
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Requested compression level
    pub compression: CompressionLevel,
    /// Aggregate size above which entries are stored uncompressed
    pub large_payload_threshold: u64,
    /// Require a valid AppxManifest.xml at the package root
    pub require_manifest: bool,
    /// Follow symbolic links while walking the input
    pub follow_symlinks: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            compression: CompressionLevel::Normal,
            large_payload_threshold: LARGE_PAYLOAD_THRESHOLD,
            require_manifest: true,
            follow_symlinks: false,
        }
    }
}

impl PackOptions {
    /// Take packing defaults from the `[package]` config section
    pub fn from_config(config: &PackageConfig) -> Self {
        Self {
            compression: config.compression,
            large_payload_threshold: config.large_payload_threshold,
            require_manifest: config.require_manifest,
            follow_symlinks: false,
        }
    }
}

/// Summary of a committed package
#[derive(Debug, Clone, Serialize)]
pub struct PackReport {
    /// Number of entries written
    pub entries: u64,
    /// Payload bytes copied into the archive
    pub payload_bytes: u64,
    /// Method every entry was written with
    pub method: EntryMethod,
    /// Set when compression was downgraded because of payload size
    #[serde(skip)]
    pub advisory: Option<Advisory>,
    /// Time spent finalizing the archive
    pub finalize_elapsed: Duration,
    /// Size of the archive on disk
    pub archive_size: u64,
}

/// Options for unpacking
#[derive(Debug, Clone, Copy, Default)]
pub struct UnpackOptions {
    /// Policy for destinations that already exist
    pub overwrite: OverwriteMode,
}

impl UnpackOptions {
    /// Take extraction defaults from the `[extract]` config section
    pub fn from_config(config: &ExtractConfig) -> Self {
        Self {
            overwrite: config.overwrite,
        }
    }
}

/// Summary of an unpack run
#[derive(Debug, Clone, Default, Serialize)]
pub struct UnpackReport {
    /// Entries written to disk
    pub extracted: u64,
    /// Entries left alone because the destination existed
    pub skipped: u64,
    /// Entries that could not be written
    pub failed: u64,
    /// Bytes written across all extracted entries
    pub bytes_written: u64,
    /// Entry name and reason for each failure
    pub failures: Vec<(String, String)>,
}

impl UnpackReport {
    /// Whether every entry was either extracted or deliberately skipped
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Recognizes an already existing output file among the inputs
pub(crate) struct OutputGuard {
    output: Option<PathBuf>,
}

impl OutputGuard {
    pub(crate) fn new(output: &Path) -> Self {
        Self {
            output: fs::canonicalize(output).ok(),
        }
    }

    /// Whether `path` resolves to the output file
    pub(crate) fn is_output(&self, path: &Path) -> bool {
        match &self.output {
            Some(output) => fs::canonicalize(path).map_or(false, |p| &p == output),
            None => false,
        }
    }
}

/// Pack a directory into a package
pub fn pack<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &PackOptions,
    progress: &mut dyn ProgressObserver,
) -> Result<PackReport> {
    let input = input.as_ref();
    let output = output.as_ref();
    info!("Packing {:?} -> {:?}", input, output);

    let enumerator = PathEnumerator::with_options(input, options.follow_symlinks)?;

    if options.require_manifest {
        manifest::validate_package_manifest(&input.join(PACKAGE_MANIFEST))?;
    }

    let guard = OutputGuard::new(output);
    let mut files = Vec::new();
    for file in enumerator {
        let file = file?;
        // A previous package written into the input tree must not pack itself
        if guard.is_output(&file.local_path) {
            debug!("Skipping output file found in input: {:?}", file.local_path);
            continue;
        }
        files.push(file);
    }

    write_package(&files, &[], output, options, progress)
}

/// Write `prelude` entries followed by `files` as one package
///
/// Shared by pack, bundle and build. The output is discarded on any failure.
pub(crate) fn write_package(
    files: &[PackageFile],
    prelude: &[(&str, &[u8])],
    output: &Path,
    options: &PackOptions,
    progress: &mut dyn ProgressObserver,
) -> Result<PackReport> {
    walk::ensure_unique(files)?;
    if files.is_empty() && prelude.is_empty() {
        return Err(Error::Validation("No files found to package".to_string()));
    }

    // Creating the output would truncate an input that is still to be read
    let guard = OutputGuard::new(output);
    if let Some(file) = files.iter().find(|f| guard.is_output(&f.local_path)) {
        return Err(Error::Validation(format!(
            "Output {:?} is also an input (entry {})",
            output, file.archive_path
        )));
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let prelude_bytes: u64 = prelude.iter().map(|(_, data)| data.len() as u64).sum();
    let total_bytes = walk::total_size(files) + prelude_bytes;
    let total_files = (files.len() + prelude.len()) as u64;

    let decision = SizePolicy::with_threshold(options.large_payload_threshold)
        .decide(total_bytes, options.compression);
    let method = decision.method;
    info!(
        "Packaging {} files ({} bytes) with method {}",
        total_files, total_bytes, method
    );

    let mut tracker = Tracker::new(progress, total_files, total_bytes);
    let mut writer = ArchiveWriter::create(output)?;
    let mut processed = 0u64;

    for (name, data) in prelude {
        tracker.begin(processed, name);
        if let Err(e) = writer.add_bytes(name, data, method) {
            writer.discard();
            return Err(e);
        }
        tracker.add_bytes(data.len() as u64);
        processed += 1;
    }

    for file in files {
        tracker.begin(processed, &file.archive_path);
        match writer.add_entry(&file.local_path, &file.archive_path, method, file.attributes) {
            Ok(copied) => tracker.add_bytes(copied),
            Err(e) => {
                warn!("Aborting package: {}", e);
                writer.discard();
                return Err(e);
            }
        }
        processed += 1;
    }

    tracker.finish("");
    let payload_bytes = tracker.processed_bytes();

    if decision.large_payload {
        info!(
            "Finalizing package ({:.2} GB), this may take a while...",
            total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
        );
    } else {
        info!("Finalizing package...");
    }
    let stats = writer.commit()?;
    info!("Package finalized in {:.2?}", stats.elapsed);

    Ok(PackReport {
        entries: processed,
        payload_bytes,
        method,
        advisory: decision.advisory,
        finalize_elapsed: stats.elapsed,
        archive_size: stats.archive_size,
    })
}

/// Extract a package into a directory
///
/// Entries that cannot be written are counted in the report; the call only
/// fails when the package itself cannot be opened or the output directory
/// cannot be created.
pub fn unpack<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &UnpackOptions,
    resolver: &mut dyn ConflictResolver,
    progress: &mut dyn ProgressObserver,
) -> Result<UnpackReport> {
    let input = input.as_ref();
    let output = output.as_ref();
    info!("Unpacking {:?} -> {:?}", input, output);

    let mut reader = ArchiveReader::open(input)?;

    if output.exists() && !output.is_dir() {
        return Err(Error::NotADirectory(output.to_path_buf()));
    }
    fs::create_dir_all(output)?;

    let entries = reader.entries()?;
    let total_bytes = entries.iter().filter(|e| !e.is_dir).map(|e| e.size).sum();
    let mut tracker = Tracker::new(progress, entries.len() as u64, total_bytes);
    let mut report = UnpackReport::default();

    for entry in &entries {
        tracker.begin(entry.index as u64, &entry.name);

        match reader.extract_entry(entry.index, output, options.overwrite, resolver) {
            ExtractOutcome::Extracted(bytes) => {
                tracker.add_bytes(bytes);
                report.extracted += 1;
                report.bytes_written += bytes;
            }
            ExtractOutcome::Skipped(_) => report.skipped += 1,
            ExtractOutcome::Failed(reason) => {
                report.failed += 1;
                report.failures.push((entry.name.clone(), reason));
            }
        }
    }

    tracker.finish("Complete");
    info!(
        "Unpacked {} entries ({} skipped, {} failed, {} bytes)",
        report.extracted, report.skipped, report.failed, report.bytes_written
    );

    Ok(report)
}

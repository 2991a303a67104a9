//! Building a package from a layout file
//!
//! A layout file maps local files to package paths, one pair per line:
//!
//! ```text
//! # comment
//! "bin/app.exe" "App.exe"
//! "assets/logo.png" "Assets/Logo.png"
//! ```
//!
//! Relative local paths are resolved against the layout file's directory.

use crate::archive::{self, PackOptions, PackReport};
use crate::manifest::{self, PACKAGE_MANIFEST};
use crate::progress::ProgressObserver;
use crate::walk::PackageFile;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One `"<local>" "<package>"` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    pub local_path: PathBuf,
    pub package_path: String,
}

/// Parse layout text into entries
///
/// Empty lines and lines starting with `#` are ignored, as are lines with
/// fewer than four quotes.
pub fn parse_layout(contents: &str) -> Vec<LayoutEntry> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }

            let parts: Vec<&str> = line.splitn(5, '"').collect();
            if parts.len() < 5 {
                debug!("Ignoring layout line: {}", line);
                return None;
            }

            Some(LayoutEntry {
                local_path: PathBuf::from(parts[1]),
                package_path: parts[3].to_string(),
            })
        })
        .collect()
}

/// Read a layout file and resolve it into package files
///
/// Entries whose local file does not exist are skipped. A layout that
/// yields no files is rejected.
pub fn load_layout<P: AsRef<Path>>(layout_file: P) -> Result<Vec<PackageFile>> {
    let layout_file = layout_file.as_ref();
    if !layout_file.exists() {
        return Err(Error::NotFound(format!(
            "Layout file does not exist: {:?}",
            layout_file
        )));
    }

    let contents = fs::read_to_string(layout_file)?;
    let base = layout_file.parent().unwrap_or_else(|| Path::new(""));

    let mut files = Vec::new();
    for entry in parse_layout(&contents) {
        let local = base.join(&entry.local_path);
        if !local.is_file() {
            warn!("Skipping missing layout file: {:?}", local);
            continue;
        }
        files.push(PackageFile::new(local, &entry.package_path)?);
    }

    if files.is_empty() {
        return Err(Error::Validation(format!(
            "Layout file {:?} lists no existing files",
            layout_file
        )));
    }

    debug!("Layout resolved to {} files", files.len());
    Ok(files)
}

/// Build a package from the files listed in `layout_file`
pub fn build<P: AsRef<Path>, Q: AsRef<Path>>(
    layout_file: P,
    output: Q,
    options: &PackOptions,
    progress: &mut dyn ProgressObserver,
) -> Result<PackReport> {
    let layout_file = layout_file.as_ref();
    let output = output.as_ref();
    info!("Building {:?} from layout {:?}", output, layout_file);

    let files = load_layout(layout_file)?;

    if options.require_manifest {
        let manifest_file = files
            .iter()
            .find(|f| f.archive_path == PACKAGE_MANIFEST)
            .ok_or_else(|| {
                Error::Validation(format!("Layout does not include {}", PACKAGE_MANIFEST))
            })?;
        manifest::validate_package_manifest(&manifest_file.local_path)?;
    }

    archive::write_package(&files, &[], output, options, progress)
}

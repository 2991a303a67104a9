//! Bundling several packages into one container

use crate::archive::{self, OutputGuard, PackOptions, PackReport, UnpackOptions, UnpackReport};
use crate::interactive::ConflictResolver;
use crate::manifest::{self, BundleIdentity, BUNDLE_MANIFEST};
use crate::progress::ProgressObserver;
use crate::walk::PackageFile;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PACKAGE_EXTENSIONS: [&str; 2] = ["appx", "msix"];

/// Whether `path` names an .appx or .msix package (case-insensitive)
pub fn is_package_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| PACKAGE_EXTENSIONS.iter().any(|p| ext.eq_ignore_ascii_case(p)))
        .unwrap_or(false)
}

/// Packages directly inside `input`, sorted by file name
pub fn find_packages(input: &Path) -> Result<Vec<PathBuf>> {
    if !input.exists() {
        return Err(Error::NotFound(format!(
            "Input path does not exist: {:?}",
            input
        )));
    }
    if !input.is_dir() {
        return Err(Error::NotADirectory(input.to_path_buf()));
    }

    let mut packages = Vec::new();
    for entry in fs::read_dir(input)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_package_file(&path) {
            debug!("Found package: {:?}", path);
            packages.push(path);
        }
    }
    packages.sort();

    Ok(packages)
}

/// Bundle every package at the top level of `input` into `output`
///
/// The generated AppxBundleManifest.xml is written as the first entry,
/// followed by the packages stored under their file names.
pub fn bundle<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    identity: &BundleIdentity,
    options: &PackOptions,
    progress: &mut dyn ProgressObserver,
) -> Result<PackReport> {
    let input = input.as_ref();
    let output = output.as_ref();
    info!("Bundling {:?} -> {:?}", input, output);

    let guard = OutputGuard::new(output);
    let packages: Vec<PathBuf> = find_packages(input)?
        .into_iter()
        .filter(|path| {
            let previous = guard.is_output(path);
            if previous {
                debug!("Skipping previous bundle output: {:?}", path);
            }
            !previous
        })
        .collect();
    if packages.is_empty() {
        return Err(Error::Validation(
            "No .appx or .msix files found in input directory".to_string(),
        ));
    }

    let mut files = Vec::with_capacity(packages.len());
    let mut names = Vec::with_capacity(packages.len());
    for path in &packages {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath(format!("{:?} has no file name", path)))?;
        files.push(PackageFile::new(path, &name)?);
        names.push(name);
    }

    let bundle_manifest = manifest::generate_bundle_manifest(identity, &names)?;
    info!("Bundling {} packages", files.len());

    archive::write_package(
        &files,
        &[(BUNDLE_MANIFEST, bundle_manifest.as_slice())],
        output,
        options,
        progress,
    )
}

/// Extract a bundle; identical to unpacking any other package
pub fn unbundle<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &UnpackOptions,
    resolver: &mut dyn ConflictResolver,
    progress: &mut dyn ProgressObserver,
) -> Result<UnpackReport> {
    archive::unpack(input, output, options, resolver, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_package_extensions() {
        assert!(is_package_file(Path::new("a.appx")));
        assert!(is_package_file(Path::new("b.MSIX")));
        assert!(is_package_file(Path::new("dir/c.Appx")));
        assert!(!is_package_file(Path::new("d.appxbundle")));
        assert!(!is_package_file(Path::new("appx")));
    }

    #[test]
    fn test_find_packages_top_level_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("b.msix"), b"b").unwrap();
        fs::write(root.join("a.APPX"), b"a").unwrap();
        fs::write(root.join("notes.txt"), b"n").unwrap();
        fs::write(root.join("nested/c.appx"), b"c").unwrap();

        let found = find_packages(root).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.APPX", "b.msix"]);
    }

    #[test]
    fn test_bundle_without_packages() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("readme.txt"), b"x").unwrap();

        let err = bundle(
            temp_dir.path(),
            temp_dir.path().join("out.appxbundle"),
            &BundleIdentity::default(),
            &PackOptions::default(),
            &mut crate::progress::NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!temp_dir.path().join("out.appxbundle").exists());
    }
}

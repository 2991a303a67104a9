//! Common assertions for appx testing

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// Asserts that two directory trees hold the same files with the same bytes
///
/// Only regular files are compared, keyed by their path relative to each
/// root; empty directories are ignored.
pub fn assert_dirs_equal(dir1: &Path, dir2: &Path) -> Result<()> {
    let files1 = collect_files(dir1)?;
    let files2 = collect_files(dir2)?;

    let names1: Vec<_> = files1.keys().collect();
    let names2: Vec<_> = files2.keys().collect();
    assert_eq!(names1, names2, "Different file sets");

    for (name, content1) in &files1 {
        assert!(
            content1 == &files2[name],
            "Content mismatch for {:?}",
            name
        );
    }

    Ok(())
}

/// Asserts that `path` holds exactly `expected`
pub fn assert_file_content(path: &Path, expected: &[u8]) -> Result<()> {
    let actual = std::fs::read(path)?;
    assert!(
        actual == expected,
        "Content mismatch for {:?}: {} bytes vs {} expected",
        path,
        actual.len(),
        expected.len()
    );
    Ok(())
}

fn collect_files(dir: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)?
            .to_string_lossy()
            .replace('\\', "/");
        files.insert(relative, std::fs::read(entry.path())?);
    }
    Ok(files)
}

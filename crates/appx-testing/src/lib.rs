//! Testing utilities and fixtures for appx
//!
//! [`TestDir`] is a scratch directory that package trees, layout files and
//! key files are written into; everything is removed when it drops.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub mod assertions;
pub mod fixtures;
pub mod helpers;

/// Scratch directory for package inputs and outputs
pub struct TestDir {
    root: TempDir,
}

impl TestDir {
    pub fn new() -> Result<Self> {
        let root = tempfile::Builder::new().prefix("appx-test-").tempdir()?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Path of `relative` inside the directory, without creating it
    pub fn join(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    /// Write `content` to `relative`, creating parent directories
    pub fn create_file(&self, relative: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    pub fn create_dir(&self, relative: &str) -> Result<PathBuf> {
        let path = self.join(relative);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Write a layout file mapping `(local, package)` pairs, one per line
    pub fn create_layout(&self, relative: &str, entries: &[(&str, &str)]) -> Result<PathBuf> {
        let mut text = String::from("# generated layout\n");
        for (local, package) in entries {
            text.push_str(&format!("\"{}\" \"{}\"\n", local, package));
        }
        self.create_file(relative, text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_land_below_root() {
        let test_dir = TestDir::new().unwrap();
        let path = test_dir.create_file("Assets/Icons/a.png", b"png").unwrap();
        assert!(path.starts_with(test_dir.path()));
        assert_eq!(fs::read(&path).unwrap(), b"png");
    }

    #[test]
    fn test_layout_lines_are_quoted_pairs() {
        let test_dir = TestDir::new().unwrap();
        let layout = test_dir
            .create_layout("layout.txt", &[("bin/app.exe", "App.exe"), ("logo.png", "Assets/Logo.png")])
            .unwrap();

        let text = fs::read_to_string(layout).unwrap();
        let lines: Vec<_> = text.lines().skip(1).collect();
        assert_eq!(lines, vec!["\"bin/app.exe\" \"App.exe\"", "\"logo.png\" \"Assets/Logo.png\""]);
    }
}

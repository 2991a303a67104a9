//! Error types for appx-core

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for the appx library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Path exists but is not a directory
    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),

    /// Invalid file or directory path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Input failed validation before any output was produced
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Archive-level failure (open, finalize, verification)
    #[error("Archive error: {0}")]
    Archive(String),

    /// ZIP library error
    #[error("Zip error: {0}")]
    Zip(String),

    /// A single entry could not be added to the archive
    #[error("Failed to add entry {path}: {reason}")]
    Entry {
        /// Archive-relative path of the failing entry
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// Key material has the wrong length
    #[error("Invalid key: expected 32 bytes, got {0}")]
    InvalidKey(usize),

    /// Cipher provider, key import or per-chunk failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// XML parsing or writing failed
    #[error("XML error: {0}")]
    Xml(String),

    /// Configuration-related error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Zip(err.to_string())
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::Io(err.into())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

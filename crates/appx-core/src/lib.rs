//! appx - package, bundle and transport-encrypt application directories
//!
//! This library packs a directory tree into a ZIP-based package, extracts
//! packages back to disk, and applies a streaming AES-256-CBC layer to any
//! file. Packing is all-or-nothing; extraction isolates failures per entry.

pub mod archive;
pub mod bundle;
pub mod cgm;
pub mod cipher;
pub mod config;
pub mod error;
pub mod interactive;
pub mod layout;
pub mod manifest;
pub mod progress;
pub mod strategy;
pub mod walk;

pub use error::{Error, Result};

// Re-export commonly used types
pub use archive::{pack, unpack, PackOptions, PackReport, UnpackOptions, UnpackReport};
pub use bundle::{bundle, unbundle};
pub use cgm::convert_cgm;
pub use cipher::{decrypt_file, encrypt_file, Key};
pub use interactive::{ConflictAction, ConflictResolver, FixedResolver, OverwriteMode};
pub use layout::build;
pub use manifest::BundleIdentity;
pub use progress::{NoProgress, ProgressInfo, ProgressObserver};
pub use strategy::{CompressionLevel, EntryMethod, SizePolicy};
pub use walk::{PackageFile, PathEnumerator};

//! Compression method policy
//!
//! Packages are written entry by entry and every entry is tagged either
//! store or deflate. The caller asks for a [`CompressionLevel`]; the
//! [`SizePolicy`] turns that request into the [`EntryMethod`] actually used,
//! forcing store-only once the aggregate payload crosses the large-payload
//! threshold so that finalizing the archive stays bounded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Aggregate payload size above which compression is disabled (10 GiB)
pub const LARGE_PAYLOAD_THRESHOLD: u64 = 10 * 1024 * 1024 * 1024;

/// Requested compression level
///
/// `Fast`, `Normal` and `Maximum` all map to the same deflate method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Store entries without compression
    None,
    /// Fast compression
    Fast,
    /// Normal compression
    #[default]
    Normal,
    /// Maximum compression
    Maximum,
}

impl CompressionLevel {
    /// Whether this level asks for a compressed method
    pub fn is_compressed(self) -> bool {
        !matches!(self, CompressionLevel::None)
    }
}

impl FromStr for CompressionLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "store" | "0" => Ok(CompressionLevel::None),
            "fast" | "1" => Ok(CompressionLevel::Fast),
            "normal" | "2" => Ok(CompressionLevel::Normal),
            "maximum" | "max" | "3" => Ok(CompressionLevel::Maximum),
            _ => Err(format!("Unknown compression level: {}", s)),
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionLevel::None => write!(f, "none"),
            CompressionLevel::Fast => write!(f, "fast"),
            CompressionLevel::Normal => write!(f, "normal"),
            CompressionLevel::Maximum => write!(f, "maximum"),
        }
    }
}

/// Per-entry storage method written into the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryMethod {
    /// Method 0: stored
    Store,
    /// Method 8: deflate
    Deflate,
}

impl EntryMethod {
    /// The ZIP compression method for this entry method
    pub fn zip_method(self) -> zip::CompressionMethod {
        match self {
            EntryMethod::Store => zip::CompressionMethod::Stored,
            EntryMethod::Deflate => zip::CompressionMethod::Deflated,
        }
    }
}

impl fmt::Display for EntryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryMethod::Store => write!(f, "store"),
            EntryMethod::Deflate => write!(f, "deflate"),
        }
    }
}

/// Non-fatal notice raised when the policy overrides the requested level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    /// Aggregate payload size that triggered the override
    pub total_size: u64,
    /// Threshold that was exceeded
    pub threshold: u64,
    /// Level the caller asked for
    pub requested: CompressionLevel,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Large package detected ({} GB). Using no compression instead of '{}' to keep finalization bounded",
            self.total_size / (1024 * 1024 * 1024),
            self.requested
        )
    }
}

/// Outcome of applying the policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecision {
    /// Method to tag every entry with
    pub method: EntryMethod,
    /// Whether the payload counts as large
    pub large_payload: bool,
    /// Present when the requested level was downgraded
    pub advisory: Option<Advisory>,
}

/// Maps a requested level and aggregate size onto an entry method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePolicy {
    threshold: u64,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self {
            threshold: LARGE_PAYLOAD_THRESHOLD,
        }
    }
}

impl SizePolicy {
    /// Create a policy with a custom large-payload threshold
    pub fn with_threshold(threshold: u64) -> Self {
        Self { threshold }
    }

    /// The large-payload threshold in bytes
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Decide the entry method for a payload of `total_size` bytes
    pub fn decide(&self, total_size: u64, requested: CompressionLevel) -> MethodDecision {
        let large_payload = total_size > self.threshold;

        if large_payload && requested.is_compressed() {
            let advisory = Advisory {
                total_size,
                threshold: self.threshold,
                requested,
            };
            warn!("{}", advisory);
            return MethodDecision {
                method: EntryMethod::Store,
                large_payload,
                advisory: Some(advisory),
            };
        }

        let method = if requested.is_compressed() {
            EntryMethod::Deflate
        } else {
            EntryMethod::Store
        };
        debug!(total_size, %requested, %method, "Selected entry method");

        MethodDecision {
            method,
            large_payload,
            advisory: None,
        }
    }
}

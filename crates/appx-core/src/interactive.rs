//! Overwrite policy and conflict resolution for extraction

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// What to do when an extracted entry's destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwriteMode {
    /// Ask the conflict resolver, one entry at a time
    #[default]
    Ask,
    /// Always overwrite
    Yes,
    /// Never overwrite; existing files are skipped
    No,
}

impl FromStr for OverwriteMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ask" => Ok(OverwriteMode::Ask),
            "yes" | "y" | "always" => Ok(OverwriteMode::Yes),
            "no" | "n" | "never" => Ok(OverwriteMode::No),
            _ => Err(format!("Unknown overwrite mode: {}", s)),
        }
    }
}

impl fmt::Display for OverwriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverwriteMode::Ask => write!(f, "ask"),
            OverwriteMode::Yes => write!(f, "yes"),
            OverwriteMode::No => write!(f, "no"),
        }
    }
}

/// Conflict resolution answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    /// Overwrite the existing file
    Overwrite,
    /// Skip this file
    Skip,
    /// Overwrite; offered as "all" but honored for the asked entry only
    OverwriteAll,
    /// Skip; offered as "all" but honored for the asked entry only
    SkipAll,
}

impl ConflictAction {
    /// Whether the asked entry should be written
    pub fn overwrites(self) -> bool {
        matches!(self, ConflictAction::Overwrite | ConflictAction::OverwriteAll)
    }
}

/// Decides a single extraction conflict
pub trait ConflictResolver {
    /// Resolve the conflict for the entry that would be written to `path`
    fn resolve_conflict(&mut self, path: &Path) -> ConflictAction;
}

impl<F> ConflictResolver for F
where
    F: FnMut(&Path) -> ConflictAction,
{
    fn resolve_conflict(&mut self, path: &Path) -> ConflictAction {
        self(path)
    }
}

/// Non-interactive conflict resolver that uses a fixed action
pub struct FixedResolver {
    action: ConflictAction,
}

impl FixedResolver {
    /// Create a resolver that always overwrites
    pub fn overwrite() -> Self {
        Self {
            action: ConflictAction::Overwrite,
        }
    }

    /// Create a resolver that always skips
    pub fn skip() -> Self {
        Self {
            action: ConflictAction::Skip,
        }
    }
}

impl ConflictResolver for FixedResolver {
    fn resolve_conflict(&mut self, _path: &Path) -> ConflictAction {
        self.action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_mode_parsing() {
        assert_eq!("Ask".parse::<OverwriteMode>(), Ok(OverwriteMode::Ask));
        assert_eq!("y".parse::<OverwriteMode>(), Ok(OverwriteMode::Yes));
        assert_eq!("never".parse::<OverwriteMode>(), Ok(OverwriteMode::No));
        assert!("maybe".parse::<OverwriteMode>().is_err());
    }

    #[test]
    fn test_all_variants_only_carry_their_direction() {
        assert!(ConflictAction::OverwriteAll.overwrites());
        assert!(ConflictAction::Overwrite.overwrites());
        assert!(!ConflictAction::SkipAll.overwrites());
        assert!(!ConflictAction::Skip.overwrites());
    }

    #[test]
    fn test_fixed_resolver() {
        let path = Path::new("file.txt");
        assert_eq!(
            FixedResolver::skip().resolve_conflict(path),
            ConflictAction::Skip
        );
        assert_eq!(
            FixedResolver::overwrite().resolve_conflict(path),
            ConflictAction::Overwrite
        );
    }
}

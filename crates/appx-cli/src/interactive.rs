//! Interactive conflict prompt for unpacking

use appx_core::{ConflictAction, ConflictResolver};
use dialoguer::Select;
use std::path::Path;

/// Asks on the terminal for every existing destination
pub struct PromptResolver;

impl ConflictResolver for PromptResolver {
    fn resolve_conflict(&mut self, path: &Path) -> ConflictAction {
        let options = [
            "[O]verwrite",
            "[S]kip",
            "[A]ll - overwrite",
            "[N]one - skip",
        ];

        let prompt = format!("File already exists: {:?}", path);
        let selection = Select::new()
            .with_prompt(&prompt)
            .items(&options)
            .default(1) // Skip
            .interact()
            .unwrap_or(1);

        match selection {
            0 => ConflictAction::Overwrite,
            2 => ConflictAction::OverwriteAll,
            3 => ConflictAction::SkipAll,
            _ => ConflictAction::Skip,
        }
    }
}

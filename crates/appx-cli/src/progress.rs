//! Console progress bar fed by archive progress snapshots

use appx_core::{ProgressInfo, ProgressObserver};
use indicatif::{ProgressBar, ProgressStyle};

/// Draws one byte-based bar per operation on stderr
#[derive(Default)]
pub struct ConsoleProgress {
    bar: Option<ProgressBar>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn bar_for(&mut self, total_bytes: u64) -> &ProgressBar {
        self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(total_bytes);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            bar
        })
    }
}

impl ProgressObserver for ConsoleProgress {
    fn on_progress(&mut self, info: &ProgressInfo) {
        let bar = self.bar_for(info.total_bytes);
        bar.set_length(info.total_bytes);
        bar.set_position(info.processed_bytes);

        if info.is_complete() {
            bar.finish_with_message(format!("{} files", info.total_files));
        } else {
            bar.set_message(format!(
                "[{}/{}] {}",
                info.processed_files + 1,
                info.total_files,
                info.current_file
            ));
        }
    }
}

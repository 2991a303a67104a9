//! Progress reporting module
//!
//! Long-running archive operations emit [`ProgressInfo`] snapshots between
//! entries. Observers run synchronously on the calling thread; use
//! [`channel`] to hand the snapshot sequence to another thread instead.

use crossbeam_channel::{Receiver, Sender};

/// Snapshot of an archive operation's progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressInfo {
    /// Number of entries the operation will process
    pub total_files: u64,
    /// Entries fully processed so far
    pub processed_files: u64,
    /// Payload bytes the operation will process
    pub total_bytes: u64,
    /// Payload bytes processed so far
    pub processed_bytes: u64,
    /// Entry currently being processed
    pub current_file: String,
}

impl ProgressInfo {
    /// Create an initial snapshot for an operation
    pub fn new(total_files: u64, total_bytes: u64) -> Self {
        Self {
            total_files,
            total_bytes,
            ..Default::default()
        }
    }

    /// Whether every entry has been accounted for
    pub fn is_complete(&self) -> bool {
        self.processed_files == self.total_files
    }
}

/// Receives progress snapshots
pub trait ProgressObserver {
    /// Called with each snapshot, in order
    fn on_progress(&mut self, info: &ProgressInfo);

    /// Whether snapshots should be computed at all
    fn is_enabled(&self) -> bool {
        true
    }
}

impl<F> ProgressObserver for F
where
    F: FnMut(&ProgressInfo),
{
    fn on_progress(&mut self, info: &ProgressInfo) {
        self(info)
    }
}

/// Observer that discards everything and disables snapshot construction
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _info: &ProgressInfo) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Observer that forwards snapshots into a channel
pub struct ChannelObserver {
    sender: Sender<ProgressInfo>,
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&mut self, info: &ProgressInfo) {
        // A dropped receiver only means nobody is watching anymore
        let _ = self.sender.send(info.clone());
    }
}

/// Create an observer whose snapshots can be consumed lazily elsewhere
///
/// The receiver yields snapshots in emission order and ends once the
/// observer is dropped.
pub fn channel() -> (ChannelObserver, Receiver<ProgressInfo>) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (ChannelObserver { sender }, receiver)
}

/// Emits snapshots for one operation, skipping all work when disabled
pub(crate) struct Tracker<'a> {
    observer: &'a mut dyn ProgressObserver,
    info: ProgressInfo,
    enabled: bool,
}

impl<'a> Tracker<'a> {
    pub(crate) fn new(observer: &'a mut dyn ProgressObserver, total_files: u64, total_bytes: u64) -> Self {
        let enabled = observer.is_enabled();
        Self {
            observer,
            info: ProgressInfo::new(total_files, total_bytes),
            enabled,
        }
    }

    /// Announce the next entry with the counters accumulated so far
    pub(crate) fn begin(&mut self, processed_files: u64, current: &str) {
        if !self.enabled {
            return;
        }
        self.info.processed_files = processed_files;
        self.info.current_file.clear();
        self.info.current_file.push_str(current);
        self.observer.on_progress(&self.info);
    }

    /// Account for bytes that have been processed
    pub(crate) fn add_bytes(&mut self, bytes: u64) {
        self.info.processed_bytes += bytes;
    }

    pub(crate) fn processed_bytes(&self) -> u64 {
        self.info.processed_bytes
    }

    /// Emit the closing snapshot with every entry accounted for
    pub(crate) fn finish(&mut self, label: &str) {
        if !self.enabled {
            return;
        }
        self.info.processed_files = self.info.total_files;
        self.info.current_file.clear();
        self.info.current_file.push_str(label);
        self.observer.on_progress(&self.info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_observer_receives_snapshots() {
        let mut seen = Vec::new();
        let mut observer = |info: &ProgressInfo| seen.push(info.clone());
        {
            let mut tracker = Tracker::new(&mut observer, 2, 10);
            tracker.begin(0, "a");
            tracker.add_bytes(4);
            tracker.begin(1, "b");
            tracker.add_bytes(6);
            tracker.finish("");
        }

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].current_file, "b");
        assert_eq!(seen[1].processed_bytes, 4);
        assert!(seen[2].is_complete());
        assert_eq!(seen[2].processed_bytes, 10);
    }

    #[test]
    fn test_disabled_observer_still_counts_bytes() {
        let mut observer = NoProgress;
        let mut tracker = Tracker::new(&mut observer, 1, 5);
        tracker.begin(0, "a");
        tracker.add_bytes(5);
        tracker.finish("Complete");
        assert_eq!(tracker.processed_bytes(), 5);
    }

    #[test]
    fn test_channel_ends_when_observer_dropped() {
        let (mut observer, receiver) = channel();
        observer.on_progress(&ProgressInfo::new(1, 1));
        drop(observer);

        let snapshots: Vec<_> = receiver.iter().collect();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].total_files, 1);
    }
}

//! Pack and unpack round trips

use appx_core::archive::{pack, unpack, ArchiveReader, PackOptions, UnpackOptions};
use appx_core::progress::{self, NoProgress, ProgressInfo};
use appx_core::strategy::{CompressionLevel, EntryMethod};
use appx_core::{Error, FixedResolver};
use appx_testing::assertions::assert_dirs_equal;
use appx_testing::fixtures::create_package_layout;
use appx_testing::TestDir;
use std::fs;

fn unchecked() -> PackOptions {
    PackOptions {
        require_manifest: false,
        ..Default::default()
    }
}

#[test]
fn test_pack_unpack_round_trip() {
    let test_dir = TestDir::new().unwrap();
    let source = create_package_layout(&test_dir, "source").unwrap();
    let package = test_dir.join("out/app.appx");
    let extracted = test_dir.join("extracted");

    let report = pack(&source, &package, &PackOptions::default(), &mut NoProgress).unwrap();
    assert_eq!(report.entries, 6);
    assert_eq!(report.method, EntryMethod::Deflate);
    assert!(report.advisory.is_none());
    assert_eq!(report.archive_size, fs::metadata(&package).unwrap().len());

    let unpacked = unpack(
        &package,
        &extracted,
        &UnpackOptions::default(),
        &mut FixedResolver::skip(),
        &mut NoProgress,
    )
    .unwrap();
    assert_eq!(unpacked.extracted, 6);
    assert_eq!(unpacked.bytes_written, report.payload_bytes);
    assert!(unpacked.is_clean());

    assert_dirs_equal(&source, &extracted).unwrap();
}

#[test]
fn test_entries_follow_walk_order_with_forward_slashes() {
    let test_dir = TestDir::new().unwrap();
    let source = create_package_layout(&test_dir, "source").unwrap();
    let package = test_dir.join("app.appx");

    pack(&source, &package, &PackOptions::default(), &mut NoProgress).unwrap();

    let walked: Vec<String> = appx_core::walk::enumerate(&source)
        .unwrap()
        .into_iter()
        .map(|f| f.archive_path)
        .collect();
    let stored = ArchiveReader::open(&package).unwrap().list_entries().unwrap();
    assert_eq!(stored, walked);
    assert!(stored.iter().any(|name| name == "Assets/Icons/small.png"));
}

#[test]
fn test_store_level_writes_stored_entries() {
    let test_dir = TestDir::new().unwrap();
    let source = create_package_layout(&test_dir, "source").unwrap();
    let package = test_dir.join("app.appx");

    let options = PackOptions {
        compression: CompressionLevel::None,
        ..Default::default()
    };
    let report = pack(&source, &package, &options, &mut NoProgress).unwrap();
    assert_eq!(report.method, EntryMethod::Store);

    let entries = ArchiveReader::open(&package).unwrap().entries().unwrap();
    assert!(entries.iter().all(|e| e.method == Some(EntryMethod::Store)));
}

#[test]
fn test_large_payload_forces_store() {
    let test_dir = TestDir::new().unwrap();
    let source = create_package_layout(&test_dir, "source").unwrap();
    let package = test_dir.join("app.appx");

    for level in [CompressionLevel::Fast, CompressionLevel::Normal, CompressionLevel::Maximum] {
        let options = PackOptions {
            compression: level,
            large_payload_threshold: 1024,
            ..Default::default()
        };
        let report = pack(&source, &package, &options, &mut NoProgress).unwrap();
        assert_eq!(report.method, EntryMethod::Store);

        let advisory = report.advisory.expect("advisory for large payload");
        assert_eq!(advisory.requested, level);
        assert_eq!(advisory.threshold, 1024);

        let entries = ArchiveReader::open(&package).unwrap().entries().unwrap();
        assert!(entries.iter().all(|e| e.method == Some(EntryMethod::Store)));
        assert!(entries.iter().all(|e| e.compressed_size == e.size));
    }
}

#[test]
fn test_missing_manifest_fails_before_archive_io() {
    let test_dir = TestDir::new().unwrap();
    test_dir.create_file("source/App.exe", b"binary").unwrap();
    let package = test_dir.join("out/app.appx");

    let err = pack(
        test_dir.join("source"),
        &package,
        &PackOptions::default(),
        &mut NoProgress,
    )
    .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert!(!package.exists());
    assert!(!test_dir.join("out").exists());
}

#[test]
fn test_invalid_manifest_fails_validation() {
    let test_dir = TestDir::new().unwrap();
    test_dir
        .create_file("source/AppxManifest.xml", b"<Bundle></Bundle>")
        .unwrap();
    let package = test_dir.join("app.appx");

    let err = pack(
        test_dir.join("source"),
        &package,
        &PackOptions::default(),
        &mut NoProgress,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(!package.exists());
}

#[test]
fn test_pack_input_errors() {
    let test_dir = TestDir::new().unwrap();
    let file = test_dir.create_file("plain.txt", b"x").unwrap();
    let package = test_dir.join("app.appx");

    let err = pack(test_dir.join("missing"), &package, &unchecked(), &mut NoProgress).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = pack(&file, &package, &unchecked(), &mut NoProgress).unwrap_err();
    assert!(matches!(err, Error::NotADirectory(_)));

    test_dir.create_dir("empty").unwrap();
    let err = pack(test_dir.join("empty"), &package, &unchecked(), &mut NoProgress).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(!package.exists());
}

#[test]
fn test_unwritable_output_leaves_nothing() {
    let test_dir = TestDir::new().unwrap();
    let source = create_package_layout(&test_dir, "source").unwrap();
    test_dir.create_file("blocker", b"not a directory").unwrap();

    let err = pack(
        &source,
        test_dir.join("blocker/app.appx"),
        &PackOptions::default(),
        &mut NoProgress,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn test_repack_into_input_skips_previous_output() {
    let test_dir = TestDir::new().unwrap();
    let source = create_package_layout(&test_dir, "source").unwrap();
    let package = source.join("app.appx");

    pack(&source, &package, &PackOptions::default(), &mut NoProgress).unwrap();
    let report = pack(&source, &package, &PackOptions::default(), &mut NoProgress).unwrap();
    assert_eq!(report.entries, 6);

    let names = ArchiveReader::open(&package).unwrap().list_entries().unwrap();
    assert!(!names.iter().any(|n| n == "app.appx"));
}

fn assert_monotonic(snapshots: &[ProgressInfo]) {
    for pair in snapshots.windows(2) {
        assert!(pair[1].processed_files >= pair[0].processed_files);
        assert!(pair[1].processed_bytes >= pair[0].processed_bytes);
    }
    let last = snapshots.last().expect("at least one snapshot");
    assert_eq!(last.processed_files, last.total_files);
}

#[test]
fn test_pack_progress_snapshots() {
    let test_dir = TestDir::new().unwrap();
    let source = create_package_layout(&test_dir, "source").unwrap();
    let package = test_dir.join("app.appx");

    let mut snapshots = Vec::new();
    let mut observer = |info: &ProgressInfo| snapshots.push(info.clone());
    let report = pack(&source, &package, &PackOptions::default(), &mut observer).unwrap();

    assert_eq!(snapshots.len(), 7);
    assert_monotonic(&snapshots);

    // Each entry is announced with the totals from before it
    assert_eq!(snapshots[0].processed_files, 0);
    assert_eq!(snapshots[0].processed_bytes, 0);
    for (i, snapshot) in snapshots[..6].iter().enumerate() {
        assert_eq!(snapshot.processed_files, i as u64);
        assert!(!snapshot.current_file.is_empty());
    }

    let last = snapshots.last().unwrap();
    assert_eq!(last.current_file, "");
    assert_eq!(last.processed_bytes, report.payload_bytes);
    assert_eq!(last.total_bytes, report.payload_bytes);
}

#[test]
fn test_unpack_progress_snapshots() {
    let test_dir = TestDir::new().unwrap();
    let source = create_package_layout(&test_dir, "source").unwrap();
    let package = test_dir.join("app.appx");
    pack(&source, &package, &PackOptions::default(), &mut NoProgress).unwrap();

    let mut snapshots = Vec::new();
    let mut observer = |info: &ProgressInfo| snapshots.push(info.clone());
    unpack(
        &package,
        test_dir.join("out"),
        &UnpackOptions::default(),
        &mut FixedResolver::skip(),
        &mut observer,
    )
    .unwrap();

    assert_eq!(snapshots.len(), 7);
    assert_monotonic(&snapshots);
    let names = ArchiveReader::open(&package).unwrap().list_entries().unwrap();
    for (i, name) in names.iter().enumerate() {
        assert_eq!(&snapshots[i].current_file, name);
        assert_eq!(snapshots[i].processed_files, i as u64);
    }
    assert_eq!(snapshots.last().unwrap().current_file, "Complete");
}

#[test]
fn test_progress_channel_on_another_thread() {
    let test_dir = TestDir::new().unwrap();
    let source = create_package_layout(&test_dir, "source").unwrap();
    let package = test_dir.join("app.appx");

    let (mut observer, receiver) = progress::channel();
    let consumer = std::thread::spawn(move || receiver.iter().collect::<Vec<_>>());

    pack(&source, &package, &PackOptions::default(), &mut observer).unwrap();
    drop(observer);

    let snapshots = consumer.join().unwrap();
    assert_eq!(snapshots.len(), 7);
    assert_monotonic(&snapshots);
}

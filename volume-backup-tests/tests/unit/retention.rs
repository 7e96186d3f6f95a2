//! Unit tests for retention pruning across storage targets

use rstest::rstest;
use std::collections::BTreeMap;
use std::time::Duration;
use test_utils::{aged_archive, bucket_with_aged_backups, file_names, RetentionPolicy, StorageBackend};
use tempfile::TempDir;
use volume_backup::managers::retention::prune_all;
use volume_backup::utils::storage::LocalArchive;

fn policy(days: u32, prefix: &str) -> RetentionPolicy {
    RetentionPolicy {
        retention_days: Some(days),
        pruning_leeway: Duration::ZERO,
        pruning_prefix: prefix.to_string(),
    }
}

#[rstest]
#[case::mixed_ages(&[10, 10, 10, 2, 2], 3, false)]
#[case::all_expired(&[10, 10, 10, 10], 0, true)]
#[case::none_expired(&[1, 2, 3], 0, false)]
#[case::empty(&[], 0, false)]
fn test_bucket_pruning(
    #[case] ages: &[i64],
    #[case] expected_pruned: usize,
    #[case] expected_refused: bool,
) {
    let bucket = bucket_with_aged_backups("bucket", ages);
    let targets: Vec<Box<dyn StorageBackend>> = vec![Box::new(bucket.clone())];
    let mut storages = BTreeMap::new();

    prune_all(&targets, &policy(7, "backup-"), &mut storages).unwrap();

    let stats = &storages["bucket"];
    assert_eq!(stats.total, ages.len());
    assert_eq!(stats.pruned, expected_pruned);
    assert_eq!(stats.refused, expected_refused);
    assert_eq!(bucket.keys().len(), ages.len() - expected_pruned);
}

#[test]
fn test_local_archive_pruned_independently() {
    let archive_dir = TempDir::new().unwrap();
    aged_archive(archive_dir.path(), "backup-a.tar.gz", 10);
    aged_archive(archive_dir.path(), "backup-b.tar.gz", 10);
    aged_archive(archive_dir.path(), "backup-c.tar.gz", 1);
    aged_archive(archive_dir.path(), "notes.txt", 30);

    // Every bucket object is expired, so only the archive is pruned
    let bucket = bucket_with_aged_backups("bucket", &[10, 10]);
    let targets: Vec<Box<dyn StorageBackend>> = vec![
        Box::new(bucket.clone()),
        Box::new(LocalArchive::new(archive_dir.path())),
    ];
    let mut storages = BTreeMap::new();

    prune_all(&targets, &policy(7, "backup-"), &mut storages).unwrap();

    assert_eq!(bucket.keys().len(), 2);
    assert!(storages["bucket"].refused);
    assert_eq!(file_names(archive_dir.path()), vec!["backup-c.tar.gz", "notes.txt"]);
    assert_eq!(storages["local archive"].pruned, 2);
}

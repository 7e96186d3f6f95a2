//! Complete runs with everything succeeding or with retention in play

use flate2::read::GzDecoder;
use test_utils::{
    aged_archive, bucket_with_aged_backups, file_names, three_containers_two_marked, ConfigBuilder,
    MemoryStorage, StorageBackend, TestContext,
};
use volume_backup::managers::encryption::decrypt_bytes;
use volume_backup::utils::storage::LocalArchive;

#[test]
fn test_two_of_three_containers_paused_and_restarted() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().with_filename("backup-a.tar.gz"));
    let engine = three_containers_two_marked();
    let bucket = MemoryStorage::new("bucket");

    let outcome = ctx
        .pipeline(Some(engine.clone()), vec![Box::new(bucket.clone())])
        .run();

    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(engine.running_ids(), vec!["db", "proxy", "web"]);
    assert_eq!(engine.stopped_ids(), vec!["web", "db"]);
    assert_eq!(engine.started_ids(), vec!["web", "db"]);
    assert_eq!(bucket.keys(), vec!["backup-a.tar.gz"]);

    let stats = outcome.stats.containers;
    assert_eq!((stats.all, stats.to_stop, stats.stopped), (3, 2, 2));
    // The working copy is removed once distributed
    assert!(file_names(ctx.working_directory()).is_empty());
}

#[test]
fn test_uploaded_archive_contains_sources() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().with_filename("backup.tar.gz"));
    let bucket = MemoryStorage::new("bucket");

    let outcome = ctx.pipeline(None, vec![Box::new(bucket.clone())]).run();
    assert!(outcome.result.is_ok());

    let content = bucket.content("backup.tar.gz").unwrap();
    let mut archive = tar::Archive::new(GzDecoder::new(content.as_slice()));
    let entries: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
        .collect();
    assert!(entries.iter().any(|e| e == "backup/data.txt"));
}

#[test]
fn test_bucket_and_archive_both_receive_copy() {
    let builder = ConfigBuilder::new().with_archive().with_filename("backup.tar.gz");
    let archive_dir = builder.archive().unwrap();
    let ctx = TestContext::from_builder(builder);
    let bucket = MemoryStorage::new("bucket");

    let targets: Vec<Box<dyn StorageBackend>> = vec![
        Box::new(bucket.clone()),
        Box::new(LocalArchive::new(&archive_dir)),
    ];
    let outcome = ctx.pipeline(None, targets).run();

    assert!(outcome.result.is_ok());
    assert_eq!(bucket.keys(), vec!["backup.tar.gz"]);
    assert_eq!(file_names(&archive_dir), vec!["backup.tar.gz"]);
    assert_eq!(
        bucket.content("backup.tar.gz").unwrap(),
        std::fs::read(archive_dir.join("backup.tar.gz")).unwrap()
    );
}

#[test]
fn test_missing_archive_directory_is_skipped() {
    let builder = ConfigBuilder::new().with_missing_archive();
    let archive_dir = builder.archive().unwrap();
    let ctx = TestContext::from_builder(builder);

    let outcome = ctx
        .pipeline(None, vec![Box::new(LocalArchive::new(&archive_dir))])
        .run();

    assert!(outcome.result.is_ok());
    assert!(!archive_dir.exists());
    assert!(file_names(ctx.working_directory()).is_empty());
}

#[test]
fn test_run_without_targets_removes_working_copy() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().with_filename("backup-lonely.tar.gz"));

    let outcome = ctx.pipeline(None, vec![]).run();

    assert!(outcome.result.is_ok());
    assert!(file_names(ctx.working_directory()).is_empty());
    assert_eq!(outcome.stats.backup_file.unwrap().name, "backup-lonely.tar.gz");
}

#[test]
fn test_retention_prunes_only_expired_backups() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::new()
            .with_retention(7)
            .with_pruning_prefix("backup-"),
    );
    let bucket = bucket_with_aged_backups("bucket", &[10, 10, 10, 2, 2]);

    let outcome = ctx.pipeline(None, vec![Box::new(bucket.clone())]).run();

    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(
        bucket.removed_keys(),
        vec!["backup-1.tar.gz", "backup-2.tar.gz", "backup-3.tar.gz"]
    );
    // Two old-enough survivors plus the fresh backup
    assert_eq!(bucket.keys().len(), 3);
    assert_eq!(outcome.stats.storages["bucket"].pruned, 3);
}

#[test]
fn test_retention_refuses_to_delete_everything() {
    let builder = ConfigBuilder::new()
        .with_archive()
        .with_retention(7)
        .with_pruning_prefix("old-");
    let archive_dir = builder.archive().unwrap();
    for name in ["old-1.tar.gz", "old-2.tar.gz", "old-3.tar.gz", "old-4.tar.gz"] {
        aged_archive(&archive_dir, name, 10);
    }
    let ctx = TestContext::from_builder(builder);

    let outcome = ctx
        .pipeline(None, vec![Box::new(LocalArchive::new(&archive_dir))])
        .run();

    assert!(outcome.result.is_ok());
    let stats = &outcome.stats.storages["local archive"];
    assert!(stats.refused);
    assert_eq!(stats.pruned, 0);
    // The new backup does not match the prefix; all four old ones survive
    assert_eq!(file_names(&archive_dir).len(), 5);
}

#[test]
fn test_encrypted_run_uploads_only_ciphertext() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::new()
            .with_filename("backup.tar.gz")
            .with_passphrase("correct horse"),
    );
    let bucket = MemoryStorage::new("bucket");

    let outcome = ctx.pipeline(None, vec![Box::new(bucket.clone())]).run();

    assert!(outcome.result.is_ok());
    assert_eq!(bucket.keys(), vec!["backup.tar.gz.enc"]);

    let decrypted = decrypt_bytes(&bucket.content("backup.tar.gz.enc").unwrap(), "correct horse").unwrap();
    let mut archive = tar::Archive::new(GzDecoder::new(decrypted.content.as_slice()));
    assert!(archive.entries().unwrap().count() > 0);
    assert!(file_names(ctx.working_directory()).is_empty());
}

#[test]
fn test_stats_record_backup_file() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().with_filename("backup.tar.gz"));
    let outcome = ctx.pipeline(None, vec![Box::new(MemoryStorage::new("bucket"))]).run();

    let file = outcome.stats.backup_file.unwrap();
    assert_eq!(file.name, "backup.tar.gz");
    assert!(file.size > 0);
    assert!(outcome.stats.end_time.is_some());
}

//! Unit tests for the encryption stage

use std::fs;
use test_utils::TestContext;
use volume_backup::managers::archive::{self, BackupArtifact};
use volume_backup::managers::encryption;

fn build_artifact(ctx: &TestContext) -> BackupArtifact {
    let config = ctx.config();
    archive::build(
        &config.backup.sources,
        "backup-test.tar.gz",
        &config.backup.working_directory,
        &chrono::Utc::now(),
    )
    .unwrap()
}

#[test]
fn test_round_trip_restores_archive_bytes() {
    let ctx = TestContext::new();
    let artifact = build_artifact(&ctx);
    let original = fs::read(&artifact.path).unwrap();

    let encrypted = encryption::apply(artifact, Some("correct horse")).unwrap();
    let decrypted = encryption::decrypt_file(&encrypted.path, "correct horse").unwrap();

    assert_eq!(decrypted.content, original);
    assert_eq!(decrypted.file_name, "backup-test.tar.gz");
}

#[test]
fn test_no_passphrase_leaves_artifact_untouched() {
    let ctx = TestContext::new();
    let artifact = build_artifact(&ctx);
    let original = fs::read(&artifact.path).unwrap();

    let result = encryption::apply(artifact.clone(), None).unwrap();

    assert_eq!(result.path, artifact.path);
    assert_eq!(fs::read(&result.path).unwrap(), original);
}

#[test]
fn test_exactly_one_artifact_remains() {
    let ctx = TestContext::new();
    let artifact = build_artifact(&ctx);

    encryption::apply(artifact, Some("secret")).unwrap();

    let names: Vec<String> = fs::read_dir(ctx.working_directory())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["backup-test.tar.gz.enc"]);
}

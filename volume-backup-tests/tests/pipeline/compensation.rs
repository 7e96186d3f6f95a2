//! Runs where stopping, restarting or a later stage fails
//!
//! Whatever fails, every container that was stopped must be running again.

use test_utils::{
    three_containers_two_marked, BackupError, ConfigBuilder, MemoryStorage, MockDockerOps,
    StorageBackend, TestContext, STOP_LABEL,
};

#[test]
fn test_stop_failure_resumes_the_stopped_container() {
    let ctx = TestContext::new();
    let engine = MockDockerOps::new()
        .with_container("web", &[STOP_LABEL])
        .with_container("db", &[STOP_LABEL])
        .with_failing_stop("db");
    let bucket = MemoryStorage::new("bucket");

    let outcome = ctx
        .pipeline(Some(engine.clone()), vec![Box::new(bucket.clone())])
        .run();

    match outcome.result {
        Err(BackupError::StopContainers { count, .. }) => assert_eq!(count, 1),
        other => panic!("expected a stop failure, got {:?}", other),
    }
    // Only the container that actually stopped is started again
    assert_eq!(engine.started_ids(), vec!["web"]);
    assert_eq!(engine.running_ids(), vec!["db", "web"]);
    // No backup is taken while containers are in an unknown state
    assert!(bucket.keys().is_empty());
    assert_eq!(outcome.stats.containers.stop_errors, 1);
}

#[test]
fn test_failed_upload_still_restarts_containers() {
    let ctx = TestContext::new();
    let engine = three_containers_two_marked();

    let outcome = ctx
        .pipeline(
            Some(engine.clone()),
            vec![Box::new(MemoryStorage::new("bucket").with_failing_copy())],
        )
        .run();

    assert!(matches!(
        outcome.result,
        Err(BackupError::Distribution { .. })
    ));
    assert_eq!(engine.running_ids(), vec!["db", "proxy", "web"]);
}

#[test]
fn test_first_failing_target_stops_distribution() {
    let ctx = TestContext::new();
    let failing = MemoryStorage::new("bucket").with_failing_copy();
    let second = MemoryStorage::new("archive");
    let targets: Vec<Box<dyn StorageBackend>> = vec![Box::new(failing), Box::new(second.clone())];

    let outcome = ctx.pipeline(None, targets).run();

    match outcome.result {
        Err(BackupError::Distribution { target, .. }) => assert_eq!(target, "bucket"),
        other => panic!("expected a distribution failure, got {:?}", other),
    }
    assert!(second.keys().is_empty());
    // The working copy is kept for the operator
    assert_eq!(std::fs::read_dir(ctx.working_directory()).unwrap().count(), 1);
}

#[test]
fn test_restart_failure_is_reported_after_successful_backup() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().with_retention(7));
    let engine = three_containers_two_marked().with_failing_start("db");
    let bucket = MemoryStorage::new("bucket");

    let outcome = ctx
        .pipeline(Some(engine.clone()), vec![Box::new(bucket.clone())])
        .run();

    assert!(matches!(
        outcome.result,
        Err(BackupError::RestartContainers { count: 1, .. })
    ));
    assert_eq!(bucket.keys().len(), 1);
    assert!(outcome.stats.storages.contains_key("bucket"));
    assert_eq!(engine.running_ids(), vec!["proxy", "web"]);
}

#[test]
fn test_swarm_services_updated_instead_of_restarted() {
    let ctx = TestContext::new();
    let engine = MockDockerOps::new()
        .with_service_container("web.1", "stack_web", &[STOP_LABEL])
        .with_service_container("web.2", "stack_web", &[STOP_LABEL])
        .with_container("db", &[STOP_LABEL]);

    let outcome = ctx
        .pipeline(Some(engine.clone()), vec![Box::new(MemoryStorage::new("bucket"))])
        .run();

    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(engine.started_ids(), vec!["db"]);
    assert_eq!(engine.updated_services(), vec!["stack_web"]);
    assert_eq!(engine.running_ids(), vec!["db", "web.1", "web.2"]);
}

#[test]
fn test_vanished_service_counts_as_restart_failure() {
    let ctx = TestContext::new();
    let engine = MockDockerOps::new()
        .with_service_container("web.1", "stack_web", &[STOP_LABEL])
        .with_service_container("api.1", "stack_api", &[STOP_LABEL])
        .without_service("stack_web");

    let outcome = ctx
        .pipeline(Some(engine.clone()), vec![Box::new(MemoryStorage::new("bucket"))])
        .run();

    assert!(matches!(
        outcome.result,
        Err(BackupError::RestartContainers { count: 1, .. })
    ));
    assert_eq!(engine.updated_services(), vec!["stack_api"]);
}

#[test]
fn test_empty_label_value_stops_any_labelled_container() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().with_stop_label(""));
    let engine = MockDockerOps::new()
        .with_container("web", &[STOP_LABEL])
        .with_container("db", &[(STOP_LABEL.0, "nightly")])
        .with_container("proxy", &[]);

    let outcome = ctx
        .pipeline(Some(engine.clone()), vec![Box::new(MemoryStorage::new("bucket"))])
        .run();

    assert!(outcome.result.is_ok());
    assert_eq!(engine.stopped_ids(), vec!["web", "db"]);
    assert_eq!(engine.running_ids(), vec!["db", "proxy", "web"]);
}

#[test]
fn test_discovery_failure_aborts_before_backup() {
    let ctx = TestContext::new();
    let engine = MockDockerOps::new().with_failing_list();
    let bucket = MemoryStorage::new("bucket");

    let outcome = ctx
        .pipeline(Some(engine), vec![Box::new(bucket.clone())])
        .run();

    assert!(matches!(outcome.result, Err(BackupError::Discovery(_))));
    assert!(bucket.keys().is_empty());
}

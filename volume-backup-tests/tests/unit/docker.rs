//! Unit tests for the container engine seam
//!
//! These tests verify label filtering and call recording of the mock engine
//! the pipeline scenarios rely on.

use test_utils::{three_containers_two_marked, DockerCall, DockerOperations, MockDockerOps, STOP_LABEL};
use volume_backup::utils::docker::{LabelFilter, STOP_DURING_BACKUP_LABEL};

#[test]
fn test_filter_argument_for_value_and_presence() {
    assert_eq!(
        LabelFilter::stop_during_backup("true").as_filter_arg(),
        format!("label={}=true", STOP_DURING_BACKUP_LABEL)
    );
    assert_eq!(
        LabelFilter::stop_during_backup("").as_filter_arg(),
        format!("label={}", STOP_DURING_BACKUP_LABEL)
    );
}

#[test]
fn test_listing_records_filter() {
    let mock = three_containers_two_marked();
    let filter = LabelFilter::stop_during_backup("true");

    let marked = mock.list_containers(Some(&filter)).unwrap();

    assert_eq!(marked.len(), 2);
    assert_eq!(
        mock.get_calls(),
        vec![DockerCall::ListContainers {
            filter: Some(filter.as_filter_arg())
        }]
    );
}

#[test]
fn test_non_matching_value_is_not_selected() {
    let mock = MockDockerOps::new()
        .with_container("a", &[STOP_LABEL])
        .with_container("b", &[(STOP_DURING_BACKUP_LABEL, "weekly")]);

    let filter = LabelFilter::stop_during_backup("weekly");
    let selected = mock.list_containers(Some(&filter)).unwrap();

    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].id, "b");
}

#[test]
fn test_swarm_task_reports_service() {
    let mock = MockDockerOps::new().with_service_container("web.1", "stack_web", &[STOP_LABEL]);
    let containers = mock.list_containers(None).unwrap();

    assert_eq!(containers[0].swarm_service(), Some("stack_web"));
    assert_eq!(mock.list_services().unwrap()[0].name, "stack_web");
}

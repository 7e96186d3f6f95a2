//! Container engine abstraction for testability
//!
//! This module provides a trait-based abstraction for the container engine
//! calls the backup run needs, enabling dependency injection and mocking.

use super::docker::{Container, LabelFilter, SwarmService};
use anyhow::Result;
use std::time::Duration;

/// Abstraction for container engine operations, enabling mocking in tests
pub trait DockerOperations: Send + Sync {
    /// List running containers, optionally restricted by a label filter
    fn list_containers(&self, filter: Option<&LabelFilter>) -> Result<Vec<Container>>;

    /// Stop a container
    fn stop_container(&self, id: &str) -> Result<()>;

    /// Start a container
    fn start_container(&self, id: &str) -> Result<()>;

    /// List swarm services
    fn list_services(&self) -> Result<Vec<SwarmService>>;

    /// Force-update a swarm service
    fn force_update_service(&self, service: &SwarmService) -> Result<()>;
}

/// Default implementation using real Docker CLI calls
#[derive(Debug, Clone)]
pub struct RealDockerOps {
    timeout: Duration,
}

impl RealDockerOps {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl DockerOperations for RealDockerOps {
    fn list_containers(&self, filter: Option<&LabelFilter>) -> Result<Vec<Container>> {
        super::docker::list_containers(filter, self.timeout)
    }

    fn stop_container(&self, id: &str) -> Result<()> {
        super::docker::stop_container(id, self.timeout)
    }

    fn start_container(&self, id: &str) -> Result<()> {
        super::docker::start_container(id, self.timeout)
    }

    fn list_services(&self) -> Result<Vec<SwarmService>> {
        super::docker::list_services(self.timeout)
    }

    fn force_update_service(&self, service: &SwarmService) -> Result<()> {
        super::docker::force_update_service(service, self.timeout)
    }
}

/// Mock implementation for testing
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use crate::utils::docker::SWARM_SERVICE_LABEL;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    /// Recorded engine call
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum DockerCall {
        ListContainers { filter: Option<String> },
        StopContainer { id: String },
        StartContainer { id: String },
        ListServices,
        UpdateService { name: String },
    }

    /// In-memory container engine
    #[derive(Clone, Default)]
    pub struct MockDockerOps {
        /// Recorded operation calls
        pub calls: Arc<Mutex<Vec<DockerCall>>>,
        /// Containers currently running
        pub running: Arc<Mutex<Vec<Container>>>,
        /// Containers stopped by this engine, waiting to be started again
        pub stopped: Arc<Mutex<Vec<Container>>>,
        /// Swarm services known to the engine
        pub services: Arc<Mutex<Vec<SwarmService>>>,
        /// Container IDs whose stop fails
        pub failing_stops: Arc<Mutex<HashSet<String>>>,
        /// Container IDs whose start fails
        pub failing_starts: Arc<Mutex<HashSet<String>>>,
        /// Service names whose update fails
        pub failing_updates: Arc<Mutex<HashSet<String>>>,
        /// Whether listing fails
        pub should_fail_list: Arc<Mutex<bool>>,
    }

    impl MockDockerOps {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a running container with the given labels
        pub fn with_container(self, id: &str, labels: &[(&str, &str)]) -> Self {
            let labels: HashMap<String, String> = labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.running.lock().unwrap().push(Container {
                id: id.to_string(),
                name: id.to_string(),
                labels,
            });
            self
        }

        /// Add a running container that is a task of a swarm service,
        /// registering the service as well
        pub fn with_service_container(self, id: &str, service: &str, labels: &[(&str, &str)]) -> Self {
            let mut all_labels: Vec<(&str, &str)> = labels.to_vec();
            all_labels.push((SWARM_SERVICE_LABEL, service));
            let this = self.with_container(id, &all_labels);
            {
                let mut services = this.services.lock().unwrap();
                if !services.iter().any(|s| s.name == service) {
                    services.push(SwarmService {
                        id: format!("svc-{}", service),
                        name: service.to_string(),
                    });
                }
            }
            this
        }

        /// Remove a service from the engine, as if it was deleted mid-run
        pub fn without_service(self, service: &str) -> Self {
            self.services.lock().unwrap().retain(|s| s.name != service);
            self
        }

        pub fn with_failing_stop(self, id: &str) -> Self {
            self.failing_stops.lock().unwrap().insert(id.to_string());
            self
        }

        pub fn with_failing_start(self, id: &str) -> Self {
            self.failing_starts.lock().unwrap().insert(id.to_string());
            self
        }

        pub fn with_failing_update(self, service: &str) -> Self {
            self.failing_updates.lock().unwrap().insert(service.to_string());
            self
        }

        pub fn with_failing_list(self) -> Self {
            *self.should_fail_list.lock().unwrap() = true;
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<DockerCall> {
            self.calls.lock().unwrap().clone()
        }

        /// IDs of containers currently running, sorted
        pub fn running_ids(&self) -> Vec<String> {
            let mut ids: Vec<String> = self
                .running
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.id.clone())
                .collect();
            ids.sort();
            ids
        }

        /// IDs passed to `stop_container`, in call order
        pub fn stopped_ids(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|c| match c {
                    DockerCall::StopContainer { id } => Some(id.clone()),
                    _ => None,
                })
                .collect()
        }

        /// IDs passed to `start_container`, in call order
        pub fn started_ids(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|c| match c {
                    DockerCall::StartContainer { id } => Some(id.clone()),
                    _ => None,
                })
                .collect()
        }

        /// Service names passed to `force_update_service`, in call order
        pub fn updated_services(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|c| match c {
                    DockerCall::UpdateService { name } => Some(name.clone()),
                    _ => None,
                })
                .collect()
        }

        fn record_call(&self, call: DockerCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl DockerOperations for MockDockerOps {
        fn list_containers(&self, filter: Option<&LabelFilter>) -> Result<Vec<Container>> {
            self.record_call(DockerCall::ListContainers {
                filter: filter.map(LabelFilter::as_filter_arg),
            });
            if *self.should_fail_list.lock().unwrap() {
                anyhow::bail!("Mock list_containers failure");
            }
            Ok(self
                .running
                .lock()
                .unwrap()
                .iter()
                .filter(|c| filter.map_or(true, |f| f.matches(&c.labels)))
                .cloned()
                .collect())
        }

        fn stop_container(&self, id: &str) -> Result<()> {
            self.record_call(DockerCall::StopContainer { id: id.to_string() });
            if self.failing_stops.lock().unwrap().contains(id) {
                anyhow::bail!("Mock stop failure for container {}", id);
            }
            let mut running = self.running.lock().unwrap();
            match running.iter().position(|c| c.id == id) {
                Some(index) => {
                    let container = running.remove(index);
                    self.stopped.lock().unwrap().push(container);
                    Ok(())
                }
                None => anyhow::bail!("No such container: {}", id),
            }
        }

        fn start_container(&self, id: &str) -> Result<()> {
            self.record_call(DockerCall::StartContainer { id: id.to_string() });
            if self.failing_starts.lock().unwrap().contains(id) {
                anyhow::bail!("Mock start failure for container {}", id);
            }
            let mut stopped = self.stopped.lock().unwrap();
            match stopped.iter().position(|c| c.id == id) {
                Some(index) => {
                    let container = stopped.remove(index);
                    self.running.lock().unwrap().push(container);
                    Ok(())
                }
                None => anyhow::bail!("Container {} is not stopped", id),
            }
        }

        fn list_services(&self) -> Result<Vec<SwarmService>> {
            self.record_call(DockerCall::ListServices);
            if *self.should_fail_list.lock().unwrap() {
                anyhow::bail!("Mock list_services failure");
            }
            Ok(self.services.lock().unwrap().clone())
        }

        fn force_update_service(&self, service: &SwarmService) -> Result<()> {
            self.record_call(DockerCall::UpdateService {
                name: service.name.clone(),
            });
            if self.failing_updates.lock().unwrap().contains(&service.name) {
                anyhow::bail!("Mock update failure for service {}", service.name);
            }
            // Swarm reschedules the service's tasks
            let mut stopped = self.stopped.lock().unwrap();
            let (rescheduled, remaining): (Vec<Container>, Vec<Container>) = stopped
                .drain(..)
                .partition(|c| c.swarm_service() == Some(service.name.as_str()));
            *stopped = remaining;
            self.running.lock().unwrap().extend(rescheduled);
            Ok(())
        }
    }
}

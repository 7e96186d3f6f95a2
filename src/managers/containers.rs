//! Stopping labelled containers for the duration of a backup
//!
//! Containers carrying the stop-during-backup label are stopped before the
//! backup is taken. Every container that was actually stopped is brought back
//! afterwards: standalone containers are started again, while containers that
//! are swarm tasks are handed back to swarm by force-updating their service.
//!
//! [`PausedContainers`] owns the set of stopped containers. Resuming consumes
//! it, and dropping it without resuming resumes as well, so the containers are
//! restored on every exit path including a panic in the wrapped action.

use crate::error::{BackupError, ErrorAggregator};
use crate::managers::stats::ContainersStats;
use crate::utils::docker::{Container, LabelFilter};
use crate::utils::docker_ops::DockerOperations;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Running containers and the subset marked for stopping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSet {
    pub all: Vec<Container>,
    pub to_stop: Vec<Container>,
}

pub struct ContainerLifecycleManager {
    docker: Arc<dyn DockerOperations>,
    filter: LabelFilter,
}

impl ContainerLifecycleManager {
    pub fn new(docker: Arc<dyn DockerOperations>, stop_label_value: &str) -> Self {
        Self {
            docker,
            filter: LabelFilter::stop_during_backup(stop_label_value),
        }
    }

    pub fn filter(&self) -> &LabelFilter {
        &self.filter
    }

    /// Query all running containers and those matching the stop label
    pub fn discover(&self) -> Result<ContainerSet, BackupError> {
        let all = self
            .docker
            .list_containers(None)
            .map_err(|e| BackupError::Discovery(e.into()))?;
        let to_stop = self
            .docker
            .list_containers(Some(&self.filter))
            .map_err(|e| BackupError::Discovery(e.into()))?;

        debug!(
            "Found {} running containers, {} matching {}",
            all.len(),
            to_stop.len(),
            self.filter.as_filter_arg()
        );
        Ok(ContainerSet { all, to_stop })
    }

    /// Stop each container in turn
    ///
    /// Every stop is attempted. The returned guard holds exactly the
    /// containers that stopped; failures are folded into one error.
    pub fn pause(&self, to_stop: &[Container]) -> (PausedContainers, Result<(), BackupError>) {
        let mut stopped = Vec::with_capacity(to_stop.len());
        let mut errors = ErrorAggregator::new();

        for container in to_stop {
            match self.docker.stop_container(&container.id) {
                Ok(()) => {
                    debug!("Stopped container {}", container.name);
                    stopped.push(container.clone());
                }
                Err(e) => errors.push(e.context(format!("Failed to stop container {}", container.name))),
            }
        }

        let paused = PausedContainers {
            docker: Arc::clone(&self.docker),
            stopped,
            resumed: false,
        };
        let result = errors.finish(|count, source| BackupError::StopContainers { count, source });
        (paused, result)
    }

    /// Discover, stop, run `action`, then always resume what was stopped
    ///
    /// The action only runs when every stop succeeded.
    pub fn run_with_containers_paused<T, F>(&self, action: F) -> PausedRun<T>
    where
        F: FnOnce() -> Result<T, BackupError>,
    {
        let mut stats = ContainersStats::default();

        let set = match self.discover() {
            Ok(set) => set,
            Err(e) => {
                return PausedRun {
                    result: Err(e),
                    compensation: Ok(()),
                    stats,
                }
            }
        };
        stats.all = set.all.len();
        stats.to_stop = set.to_stop.len();

        if !set.to_stop.is_empty() {
            info!(
                "Stopping {} out of {} running containers",
                set.to_stop.len(),
                set.all.len()
            );
        }

        let (paused, stop_result) = self.pause(&set.to_stop);
        stats.stopped = paused.stopped().len();

        let result = match stop_result {
            Ok(()) => action(),
            Err(e) => {
                stats.stop_errors = e.failure_count();
                Err(e)
            }
        };

        let compensation = paused.resume();
        if let Err(ref e) = compensation {
            stats.restart_errors = e.failure_count();
        }

        PausedRun {
            result,
            compensation,
            stats,
        }
    }
}

/// Outcome of an action run with containers paused
#[derive(Debug)]
pub struct PausedRun<T> {
    /// Discovery or stop failure, otherwise the action's own result
    pub result: Result<T, BackupError>,
    /// Outcome of restarting what was stopped
    pub compensation: Result<(), BackupError>,
    pub stats: ContainersStats,
}

impl<T> PausedRun<T> {
    /// Run `action` directly when no container engine is configured
    pub fn without_engine<F>(action: F) -> Self
    where
        F: FnOnce() -> Result<T, BackupError>,
    {
        Self {
            result: action(),
            compensation: Ok(()),
            stats: ContainersStats::default(),
        }
    }
}

/// Containers stopped for the backup, restored on resume or drop
pub struct PausedContainers {
    docker: Arc<dyn DockerOperations>,
    stopped: Vec<Container>,
    resumed: bool,
}

impl PausedContainers {
    pub fn stopped(&self) -> &[Container] {
        &self.stopped
    }

    /// Restart standalone containers and force-update swarm services
    pub fn resume(mut self) -> Result<(), BackupError> {
        self.resumed = true;
        let stopped = std::mem::take(&mut self.stopped);
        resume_containers(self.docker.as_ref(), &stopped)
    }
}

impl Drop for PausedContainers {
    fn drop(&mut self) {
        if self.resumed {
            return;
        }
        let stopped = std::mem::take(&mut self.stopped);
        if let Err(e) = resume_containers(self.docker.as_ref(), &stopped) {
            error!("{}", e);
        }
    }
}

fn resume_containers(docker: &dyn DockerOperations, stopped: &[Container]) -> Result<(), BackupError> {
    if stopped.is_empty() {
        return Ok(());
    }

    let mut errors = ErrorAggregator::new();
    let mut services = BTreeSet::new();

    for container in stopped {
        if let Some(service) = container.swarm_service() {
            services.insert(service.to_string());
            continue;
        }
        match docker.start_container(&container.id) {
            Ok(()) => debug!("Started container {}", container.name),
            Err(e) => {
                error!("Failed to restart container {}: {}", container.name, e);
                errors.push(e.context(format!("Failed to restart container {}", container.name)));
            }
        }
    }

    if !services.is_empty() {
        match docker.list_services() {
            Ok(live) => {
                for name in &services {
                    let Some(service) = live.iter().find(|s| &s.name == name) else {
                        error!("Swarm service {} disappeared during the backup", name);
                        errors.push(anyhow::anyhow!("Couldn't find service with name {}", name));
                        continue;
                    };
                    match docker.force_update_service(service) {
                        Ok(()) => debug!("Force-updated service {}", name),
                        Err(e) => {
                            error!("Failed to update service {}: {}", name, e);
                            errors.push(e.context(format!("Failed to update service {}", name)));
                        }
                    }
                }
            }
            Err(e) => errors.push(e.context("Failed to list swarm services")),
        }
    }

    let result = errors.finish(|count, source| BackupError::RestartContainers { count, source });
    if result.is_ok() {
        info!(
            "Restarted {} container(s) and the swarm services of {} other(s)",
            stopped.iter().filter(|c| c.swarm_service().is_none()).count(),
            stopped.iter().filter(|c| c.swarm_service().is_some()).count()
        );
    }
    result
}

//! Docker CLI access for container and swarm service lifecycle

use super::command::run_command_stdout;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Label marking containers that must be stopped while the backup is taken
pub const STOP_DURING_BACKUP_LABEL: &str = "docker-volume-backup.stop-during-backup";

/// Label Docker sets on containers that are tasks of a swarm service
pub const SWARM_SERVICE_LABEL: &str = "com.docker.swarm.service.name";

/// A running container as seen by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
}

impl Container {
    /// Name of the swarm service owning this container, if any
    pub fn swarm_service(&self) -> Option<&str> {
        self.labels.get(SWARM_SERVICE_LABEL).map(String::as_str)
    }
}

/// A swarm service as listed by the engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SwarmService {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// Label filter restricting a container listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    pub key: String,
    /// `None` matches any value, including the empty one
    pub value: Option<String>,
}

impl LabelFilter {
    /// Filter for containers marked for stopping. An empty configured value
    /// matches every container that carries the label at all.
    pub fn stop_during_backup(value: &str) -> Self {
        Self {
            key: STOP_DURING_BACKUP_LABEL.to_string(),
            value: if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            },
        }
    }

    /// Argument for `docker ps --filter`
    pub fn as_filter_arg(&self) -> String {
        match self.value {
            Some(ref value) => format!("label={}={}", self.key, value),
            None => format!("label={}", self.key),
        }
    }

    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        match (labels.get(&self.key), &self.value) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InspectedContainer {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Config")]
    config: Option<InspectedConfig>,
}

#[derive(Debug, Deserialize)]
struct InspectedConfig {
    #[serde(rename = "Labels", default)]
    labels: Option<HashMap<String, String>>,
}

/// List running containers, optionally restricted by a label filter
pub fn list_containers(filter: Option<&LabelFilter>, timeout: Duration) -> Result<Vec<Container>> {
    let filter_arg = filter.map(LabelFilter::as_filter_arg);
    let mut args = vec!["ps", "--quiet", "--no-trunc"];
    if let Some(ref arg) = filter_arg {
        args.push("--filter");
        args.push(arg);
    }

    let output = run_command_stdout("docker", &args, None, Some(timeout))?;
    let ids: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if ids.is_empty() {
        return Ok(vec![]);
    }

    let mut inspect_args = vec!["inspect"];
    inspect_args.extend(ids.iter().copied());
    let output = run_command_stdout("docker", &inspect_args, None, Some(timeout))?;

    parse_inspect_output(&output)
}

fn parse_inspect_output(output: &str) -> Result<Vec<Container>> {
    let inspected: Vec<InspectedContainer> =
        serde_json::from_str(output).context("Failed to parse docker inspect output")?;

    Ok(inspected
        .into_iter()
        .map(|c| Container {
            id: c.id,
            name: c.name.trim_start_matches('/').to_string(),
            labels: c.config.and_then(|cfg| cfg.labels).unwrap_or_default(),
        })
        .collect())
}

/// Stop a container by ID
pub fn stop_container(id: &str, timeout: Duration) -> Result<()> {
    debug!("Stopping container {}", id);
    run_command_stdout("docker", &["stop", id], None, Some(timeout))
        .context(format!("Failed to stop container {}", id))?;
    Ok(())
}

/// Start a previously stopped container by ID
pub fn start_container(id: &str, timeout: Duration) -> Result<()> {
    debug!("Starting container {}", id);
    run_command_stdout("docker", &["start", id], None, Some(timeout))
        .context(format!("Failed to start container {}", id))?;
    Ok(())
}

/// List swarm services
pub fn list_services(timeout: Duration) -> Result<Vec<SwarmService>> {
    let output = run_command_stdout(
        "docker",
        &["service", "ls", "--format", "{{json .}}"],
        None,
        Some(timeout),
    )?;

    parse_service_lines(&output)
}

fn parse_service_lines(output: &str) -> Result<Vec<SwarmService>> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            serde_json::from_str::<SwarmService>(line)
                .context(format!("Failed to parse service line: {}", line))
        })
        .collect()
}

/// Force-update a swarm service so its tasks are rescheduled.
/// The engine bumps the service's ForceUpdate counter and checks the spec version.
pub fn force_update_service(service: &SwarmService, timeout: Duration) -> Result<()> {
    debug!("Force-updating service {} ({})", service.name, service.id);
    run_command_stdout(
        "docker",
        &["service", "update", "--force", "--detach", &service.id],
        None,
        Some(timeout),
    )
    .context(format!("Failed to update service {}", service.name))?;
    Ok(())
}

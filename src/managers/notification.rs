//! Webhook notification manager
//!
//! Posts a Discord-compatible embed describing the outcome of a backup run.

use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::{NotificationConfig, NotifyEvent};
use crate::managers::stats::{format_duration, RunStats};

/// Notification manager for sending webhooks
pub struct NotificationManager {
    config: NotificationConfig,
}

/// Discord embed color codes (decimal)
#[derive(Debug, Clone, Copy)]
pub enum NotificationColor {
    /// Red - for failures
    Failure = 15158332, // #E74C3C
    /// Green - for success
    Success = 3066993, // #2ECC71
}

impl NotificationColor {
    fn as_decimal(&self) -> u32 {
        *self as u32
    }
}

/// Notification payload to send
#[derive(Debug, Clone)]
pub struct Notification {
    pub event_type: NotifyEvent,
    pub message: String,
    pub error: Option<String>,
    pub duration: Option<Duration>,
    pub backup_file: Option<String>,
    pub containers: Option<String>,
}

impl Notification {
    fn from_stats(event_type: NotifyEvent, message: String, error: Option<String>, stats: &RunStats) -> Self {
        Self {
            event_type,
            message,
            error,
            duration: Some(stats.took_time),
            backup_file: stats
                .backup_file
                .as_ref()
                .map(|file| format!("{} ({} bytes)", file.name, file.size)),
            containers: (stats.containers.to_stop > 0).then(|| {
                format!(
                    "{} of {} stopped",
                    stats.containers.stopped, stats.containers.to_stop
                )
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct DiscordPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<DiscordField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<DiscordFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct DiscordField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct DiscordFooter {
    text: String,
}

impl NotificationManager {
    pub fn new(config: NotificationConfig) -> Self {
        Self { config }
    }

    /// Check if notifications are enabled for an event type
    pub fn is_enabled(&self, event: &NotifyEvent) -> bool {
        if self.config.webhook_url.is_empty() {
            return false;
        }
        self.config.notify_on.contains(event)
    }

    /// Send a notification if enabled
    pub fn send(&self, notification: Notification) -> Result<()> {
        if !self.is_enabled(&notification.event_type) {
            debug!(
                "Notification type {:?} not enabled, skipping",
                notification.event_type
            );
            return Ok(());
        }

        let payload = self.build_payload(&notification);
        self.send_webhook(&payload)?;

        info!("Sent {:?} notification", notification.event_type);
        Ok(())
    }

    pub fn send_failure(&self, error: &str, stats: &RunStats) -> Result<()> {
        self.send(Notification::from_stats(
            NotifyEvent::Failure,
            "Backup run failed".to_string(),
            Some(error.to_string()),
            stats,
        ))
    }

    pub fn send_success(&self, stats: &RunStats) -> Result<()> {
        self.send(Notification::from_stats(
            NotifyEvent::Success,
            "Backup run completed successfully".to_string(),
            None,
            stats,
        ))
    }

    fn build_payload(&self, notification: &Notification) -> DiscordPayload {
        let (color, emoji) = match notification.event_type {
            NotifyEvent::Failure => (NotificationColor::Failure, "\u{274C}"), // Red X
            NotifyEvent::Success => (NotificationColor::Success, "\u{2705}"), // Green check
        };

        let title = format!("{} Volume Backup: {:?}", emoji, notification.event_type);

        let mut fields = Vec::new();

        if let Some(ref file) = notification.backup_file {
            fields.push(DiscordField {
                name: "Backup".to_string(),
                value: file.clone(),
                inline: true,
            });
        }

        if let Some(ref containers) = notification.containers {
            fields.push(DiscordField {
                name: "Containers".to_string(),
                value: containers.clone(),
                inline: true,
            });
        }

        if let Some(duration) = notification.duration {
            fields.push(DiscordField {
                name: "Duration".to_string(),
                value: format_duration(duration),
                inline: true,
            });
        }

        if let Some(ref error) = notification.error {
            // Discord limits field values
            let error_display = if error.chars().count() > 500 {
                format!("{}...", error.chars().take(497).collect::<String>())
            } else {
                error.clone()
            };
            fields.push(DiscordField {
                name: "Error".to_string(),
                value: format!("```\n{}\n```", error_display),
                inline: false,
            });
        }

        let embed = DiscordEmbed {
            title,
            description: Some(notification.message.clone()),
            color: color.as_decimal(),
            fields,
            footer: Some(DiscordFooter {
                text: "volume-backup".to_string(),
            }),
            timestamp: Some(chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        };

        DiscordPayload {
            username: Some("Volume Backup".to_string()),
            embeds: vec![embed],
        }
    }

    fn send_webhook(&self, payload: &DiscordPayload) -> Result<()> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .post(&self.config.webhook_url)
            .json(payload)
            .send()
            .context("Failed to send webhook")?;

        let status = response.status();
        if status.is_success() {
            debug!("Webhook sent successfully");
            Ok(())
        } else {
            let body = response.text().unwrap_or_default();
            error!("Webhook failed with status {}: {}", status, body);
            anyhow::bail!("Webhook failed with status {}: {}", status, body)
        }
    }
}

//! Notification boundary.
//!
//! Rendered guidance leaves the core through [`NotificationChannel`]s. The
//! dispatcher tries every channel and records the outcome; a failing channel
//! is logged and reported, never propagated, so delivery problems cannot
//! change what the pipeline computed.

use crate::core::config::WardenConfig;
use crate::core::error::WardenError;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    /// Markdown body.
    pub body: String,
}

pub trait NotificationChannel {
    fn name(&self) -> &str;
    fn deliver(&self, notification: &Notification) -> Result<(), WardenError>;
}

/// Prints to stdout, for CI logs.
pub struct StdoutChannel;

impl NotificationChannel for StdoutChannel {
    fn name(&self) -> &str {
        "stdout"
    }

    fn deliver(&self, notification: &Notification) -> Result<(), WardenError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", notification.body)?;
        Ok(())
    }
}

/// Appends to a markdown file that PR-comment tooling picks up.
pub struct FileChannel {
    path: PathBuf,
}

impl FileChannel {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl NotificationChannel for FileChannel {
    fn name(&self) -> &str {
        "file"
    }

    fn deliver(&self, notification: &Notification) -> Result<(), WardenError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{}", notification.body)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    /// `(channel, error message)`
    pub failed: Vec<(String, String)>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
pub struct Dispatcher {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &WardenConfig) -> Self {
        let mut dispatcher = Self::new();
        if config.notify.stdout {
            dispatcher = dispatcher.with_channel(Box::new(StdoutChannel));
        }
        if let Some(file) = &config.notify.file {
            dispatcher = dispatcher.with_channel(Box::new(FileChannel::new(&config.resolve(file))));
        }
        dispatcher
    }

    pub fn with_channel(mut self, channel: Box<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn dispatch(&self, notification: &Notification) -> DispatchReport {
        let mut report = DispatchReport::default();
        for channel in &self.channels {
            match channel.deliver(notification) {
                Ok(()) => report.delivered.push(channel.name().to_string()),
                Err(e) => {
                    tracing::warn!(channel = channel.name(), error = %e, "notification delivery failed");
                    report.failed.push((channel.name().to_string(), e.to_string()));
                }
            }
        }
        report
    }
}

//! Real-time detection of newly started streams.
//!
//! [`TagWatcher`] reads the watch lane and fires a [`Notifier`] the first
//! time it sees each tag during the life of the process. Notifications are
//! fire-and-forget: a failing hook is logged and never retried.

use std::collections::HashSet;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::metrics::IngestMetrics;
use crate::model::{Tag, record_tag};

/// Hook invoked when a tag is seen for the first time.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, tag: &Tag) -> Result<()>;
}

/// Emits a log line per new tag.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, tag: &Tag) -> Result<()> {
        tracing::info!(%tag, "new stream started");
        Ok(())
    }
}

/// Runs an external program with the tag appended as its last argument.
///
/// The child is not awaited by the caller; its exit status is only logged.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    /// Builds a notifier from `[program, args...]`.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::InvalidInput("notify command must name a program".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(&self, tag: &Tag) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(tag.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Internal(format!("failed to spawn {}: {}", self.program, e)))?;

        let program = self.program.clone();
        let tag = tag.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::debug!(%program, %tag, "notify command finished");
                }
                Ok(status) => tracing::warn!(%program, %tag, %status, "notify command failed"),
                Err(e) => tracing::warn!(%program, %tag, error = %e, "notify command failed"),
            }
        });
        Ok(())
    }
}

pub struct TagWatcher {
    receiver: UnboundedReceiver<String>,
    cancel: CancellationToken,
    delimiter: char,
    notifier: Box<dyn Notifier>,
    metrics: IngestMetrics,
    seen: HashSet<Tag>,
}

impl TagWatcher {
    pub fn new(
        receiver: UnboundedReceiver<String>,
        cancel: CancellationToken,
        delimiter: char,
        notifier: Box<dyn Notifier>,
        metrics: IngestMetrics,
    ) -> Self {
        Self {
            receiver,
            cancel,
            delimiter,
            notifier,
            metrics,
            seen: HashSet::new(),
        }
    }

    /// Runs until cancelled or until the lane closes.
    ///
    /// Returns the set of tags seen.
    pub async fn run(mut self) -> HashSet<Tag> {
        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                message = self.receiver.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.observe(&message).await;
        }
        tracing::info!(tags = self.seen.len(), "tag watcher stopped");
        self.seen
    }

    async fn observe(&mut self, message: &str) {
        if !message.contains(self.delimiter) {
            return;
        }
        let Some(tag) = record_tag(message, self.delimiter) else {
            return;
        };
        if self.seen.contains(&tag) {
            return;
        }

        self.metrics.tags_discovered_total.inc();
        if let Err(e) = self.notifier.notify(&tag).await {
            tracing::warn!(%tag, error = %e, "new tag notification failed");
        }
        self.seen.insert(tag);
    }
}

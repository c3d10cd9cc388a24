use crate::code::{Code, Origin};
use crate::error::{CounterError, EventBusError, Result};
use crate::events::{EventBus, EventFilter, EventReceiver, ScanEvent};
use crate::scanner::{Resolution, ScanAttempt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One resolved attempt, as emitted for external logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub attempt_id: Uuid,
    pub origin: Origin,
    pub raw_input: String,
    pub code: Code,
    pub outcome: Resolution,
    pub order_id: Option<String>,
    pub operator_message: Option<String>,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(attempt: &ScanAttempt, resolution: &Resolution, now: Instant) -> Self {
        let operator_message = resolution
            .scan_error(&attempt.raw)
            .and_then(|e| e.operator_message())
            .map(str::to_string);

        Self {
            attempt_id: attempt.id,
            origin: attempt.origin,
            raw_input: attempt.raw.to_string(),
            code: attempt.code.clone(),
            outcome: resolution.clone(),
            order_id: resolution.order_id().map(str::to_string),
            operator_message,
            latency_ms: now.saturating_duration_since(attempt.started_at).as_millis() as u64,
            timestamp: Utc::now(),
        }
    }

    /// Short label for logs
    pub fn outcome_label(&self) -> &'static str {
        match self.outcome {
            Resolution::Success { .. } => "success",
            Resolution::NotFound => "not_found",
            Resolution::TransientError { .. } => "transient_error",
        }
    }
}

/// Appends every resolved attempt to a JSON-lines file
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(|e| {
                CounterError::component("audit", format!("Failed to create audit directory: {}", e))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                CounterError::component("audit", format!("Failed to open audit log: {}", e))
            })?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Audited attempt {} ({})", record.attempt_id, record.outcome_label());
        Ok(())
    }

    async fn write_event(&self, event: ScanEvent) {
        if let ScanEvent::Resolved(record) = event {
            if let Err(e) = self.append(&record).await {
                error!("Failed to write audit record {}: {}", record.attempt_id, e);
            }
        }
    }

    /// Follow the event bus and write each `Resolved` event until cancelled.
    ///
    /// Events already queued when the token fires are still written.
    pub fn spawn(self: Arc<Self>, event_bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let mut receiver = EventReceiver::new(
            event_bus.subscribe(),
            EventFilter::EventTypes(vec!["resolved"]),
            "audit".to_string(),
        );

        tokio::spawn(async move {
            info!("Audit log writing to {}", self.path.display());

            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = receiver.recv() => event,
                };

                match event {
                    Ok(event) => self.write_event(event).await,
                    Err(EventBusError::ChannelClosed) => break,
                    Err(e) => warn!("Audit log missed events: {}", e),
                }
            }

            let mut drained = 0;
            loop {
                match receiver.try_recv() {
                    Ok(Some(event)) => {
                        self.write_event(event).await;
                        drained += 1;
                    }
                    Ok(None) | Err(EventBusError::ChannelClosed) => break,
                    Err(e) => warn!("Audit log missed events: {}", e),
                }
            }
            if drained > 0 {
                debug!("Audit log flushed {} queued records on stop", drained);
            }

            info!("Audit log stopped");
        })
    }
}

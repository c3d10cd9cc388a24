use super::handle::{OcrReport, ScanCommand, ScanHandle};
use super::machine::ScanMachine;
use super::state::{Resolution, StateSnapshot, ValidationResult};
use crate::audit::AuditRecord;
use crate::code::{extract_candidate, Origin};
use crate::config::ScannerConfig;
use crate::decoder::CodeDecoder;
use crate::error::{CounterError, OcrError, RegistryError, Result, ScanError, ScannerError};
use crate::events::{EventBus, ScanEvent};
use crate::feedback::{Feedback, NoopFeedback};
use crate::ocr::OcrService;
use crate::registry::{OrderRecord, OrderRegistry};
use crate::source::{FrameLease, FrameSource};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const COMMAND_QUEUE: usize = 16;

/// Owns the scanner task for one terminal
pub struct ScanOrchestrator {
    config: ScannerConfig,
    source: Arc<dyn FrameSource>,
    decoder: Arc<dyn CodeDecoder>,
    registry: Arc<dyn OrderRegistry>,
    ocr: Option<Arc<dyn OcrService>>,
    ocr_timeout: Duration,
    feedback: Arc<dyn Feedback>,
    event_bus: Arc<EventBus>,
    timezone: Tz,
    command_tx: mpsc::Sender<ScanCommand>,
    command_rx: Option<mpsc::Receiver<ScanCommand>>,
    state_tx: Arc<watch::Sender<StateSnapshot>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ScanOrchestrator {
    pub fn builder() -> ScanOrchestratorBuilder {
        ScanOrchestratorBuilder::new()
    }

    pub fn handle(&self) -> ScanHandle {
        ScanHandle::new(self.command_tx.clone(), self.state_tx.subscribe())
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Acquire the frame source and start sampling
    pub async fn start(&mut self) -> Result<()> {
        let Some(commands) = self.command_rx.take() else {
            warn!("Scanner already started");
            return Ok(());
        };

        let lease = FrameLease::acquire(Arc::clone(&self.source))?;

        info!(
            "Starting scanner on '{}' with decoder '{}' (tick {}ms, cooldown {}ms, {:?})",
            lease.source_name(),
            self.decoder.name(),
            self.config.tick_interval_ms,
            self.config.cooldown_ms,
            self.config.success_policy
        );

        let worker = ScanWorker {
            machine: ScanMachine::new(&self.config),
            lease,
            decoder: Arc::clone(&self.decoder),
            registry: Arc::clone(&self.registry),
            ocr: self.ocr.clone(),
            ocr_timeout: self.ocr_timeout,
            lookup_timeout: self.config.lookup_timeout(),
            tick_interval: self.config.tick_interval(),
            feedback: Arc::clone(&self.feedback),
            event_bus: Arc::clone(&self.event_bus),
            timezone: self.timezone,
            state_tx: Arc::clone(&self.state_tx),
            cancel: self.cancel.clone(),
            last_frame_id: None,
        };

        self.task = Some(tokio::spawn(worker.run(commands)));
        Ok(())
    }

    /// Stop sampling and release the frame source
    pub async fn stop(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            debug!("Scanner is not running");
            return Ok(());
        };

        info!("Stopping scanner");
        self.cancel.cancel();

        task.await
            .map_err(|e| CounterError::component("scanner", format!("Scanner task failed: {}", e)))?;

        info!("Scanner stopped");
        Ok(())
    }
}

struct ScanWorker {
    machine: ScanMachine,
    lease: FrameLease,
    decoder: Arc<dyn CodeDecoder>,
    registry: Arc<dyn OrderRegistry>,
    ocr: Option<Arc<dyn OcrService>>,
    ocr_timeout: Duration,
    lookup_timeout: Duration,
    tick_interval: Duration,
    feedback: Arc<dyn Feedback>,
    event_bus: Arc<EventBus>,
    timezone: Tz,
    state_tx: Arc<watch::Sender<StateSnapshot>>,
    cancel: CancellationToken,
    last_frame_id: Option<u64>,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl ScanWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<ScanCommand>) {
        info!("Scanner task started");

        let cancel = self.cancel.clone();
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.sync().await;

        loop {
            let cooldown_deadline = self.machine.cooldown_deadline();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                _ = wait_until(cooldown_deadline) => {
                    self.machine.poll_cooldown(Instant::now());
                }
                _ = ticker.tick() => self.on_tick().await,
            }

            self.sync().await;
        }

        info!("Scanner task ended, releasing '{}'", self.lease.source_name());
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    async fn emit(&self, event: ScanEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            trace!("Scanner event not delivered: {}", e);
        }
    }

    /// Publish queued transitions and refresh the watched snapshot
    async fn sync(&mut self) {
        for (from, to) in self.machine.take_transitions() {
            self.emit(ScanEvent::StateChanged {
                from,
                to,
                timestamp: SystemTime::now(),
            })
            .await;
        }

        let snapshot = self.machine.snapshot();
        self.state_tx.send_if_modified(|current| {
            if *current != snapshot {
                *current = snapshot;
                true
            } else {
                false
            }
        });
    }

    async fn on_tick(&mut self) {
        let now = Instant::now();
        self.machine.poll_cooldown(now);

        if !self.machine.is_idle() {
            trace!("Tick skipped while {}", self.machine.kind());
            return;
        }

        let Some(frame) = self.lease.latest_frame() else {
            trace!("No frame available");
            return;
        };

        if self.last_frame_id == Some(frame.id) {
            trace!("Frame {} already sampled", frame.id);
            return;
        }
        let frame_id = frame.id;
        self.last_frame_id = Some(frame_id);

        // Decoding is CPU bound and the backend may panic; neither may stall the loop
        let decoder = Arc::clone(&self.decoder);
        let raw = match tokio::task::spawn_blocking(move || decoder.decode(&frame)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Decoder '{}' failed on frame {}: {}", self.decoder.name(), frame_id, e);
                None
            }
        };

        match self.machine.on_decode(raw, now) {
            Ok(Some(_)) => {
                self.validate().await;
            }
            Ok(None) => {}
            Err(ScanError::DecodeMiss) => trace!("No code in frame {}", frame_id),
            // Camera-path rejects are routine noise
            Err(e) => debug!("Frame {}: {}", frame_id, e),
        }
    }

    /// Run the registry lookup for the current candidate and resolve it
    async fn validate(&mut self) -> Option<AuditRecord> {
        let attempt = self.machine.begin_lookup()?;
        self.sync().await;
        self.emit(ScanEvent::LookupStarted {
            attempt_id: attempt.id,
            origin: attempt.origin,
            code: attempt.code.clone(),
        })
        .await;

        let lookup = tokio::time::timeout(self.lookup_timeout, self.registry.lookup(&attempt.code));
        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!("Lookup for {} abandoned on shutdown", attempt.code);
                return None;
            }
            result = lookup => result,
        };

        let validation = match result {
            Ok(Ok(Some(record))) => ValidationResult::Found(record),
            Ok(Ok(None)) => ValidationResult::NotFound(attempt.raw.clone()),
            Ok(Err(e)) => {
                if !e.is_transient() {
                    error!("Registry failed for {}: {}", attempt.code, e);
                }
                ValidationResult::TransientError {
                    details: e.to_string(),
                }
            }
            Err(_) => ValidationResult::TransientError {
                details: RegistryError::Timeout {
                    timeout_ms: self.lookup_timeout.as_millis() as u64,
                }
                .to_string(),
            },
        };

        if let ValidationResult::TransientError { details } = &validation {
            warn!(
                "Registry unavailable for raw code '{}' from {}: {}",
                attempt.raw, attempt.origin, details
            );
        }

        let audit = self
            .machine
            .resolve(validation, self.today(), Instant::now())?;
        self.sync().await;

        if let Resolution::Success { record, eligibility } = &audit.outcome {
            info!(
                "Order {} for {} validated ({})",
                record.id,
                record.holder_ref,
                eligibility.describe()
            );
            self.feedback.success(record);
            self.emit(ScanEvent::FeedbackSignal {
                order_id: record.id.clone(),
            })
            .await;
        }

        self.emit(ScanEvent::Resolved(audit.clone())).await;
        Some(audit)
    }

    async fn handle_command(&mut self, command: ScanCommand) {
        match command {
            ScanCommand::Manual { input, reply } => {
                let result = self.submit_manual(&input).await;
                self.sync().await;
                let _ = reply.send(result);
            }
            ScanCommand::RequestOcr { reply } => {
                let result = self.request_ocr().await;
                self.sync().await;
                let _ = reply.send(result);
            }
            ScanCommand::Reset { reply } => {
                info!("Operator reset from {}", self.machine.kind());
                self.machine.reset();
                self.last_frame_id = None;
                self.sync().await;
                let _ = reply.send(());
            }
            ScanCommand::Continue { reply } => {
                let result = self.machine.continue_scanning();
                self.sync().await;
                let _ = reply.send(result);
            }
            ScanCommand::ConfirmServe { reply } => {
                let result = self.confirm_serve().await;
                self.sync().await;
                let _ = reply.send(result);
            }
        }
    }

    async fn submit_manual(&mut self, input: &str) -> std::result::Result<AuditRecord, ScannerError> {
        let now = Instant::now();
        self.machine.poll_cooldown(now);

        if let Err(e) = self.machine.submit_manual(input, now) {
            match &e {
                ScannerError::Scan(ScanError::InvalidManualInput(reason)) => {
                    info!("Manual input rejected: {}", reason);
                    self.emit(ScanEvent::ManualInputRejected {
                        input: input.to_string(),
                        reason: reason.to_string(),
                    })
                    .await;
                }
                ScannerError::Scan(ScanError::ClassificationReject { raw }) => {
                    info!("Manual input '{}' is not an order code", raw);
                    self.emit(ScanEvent::CandidateRejected {
                        origin: Origin::Manual,
                        raw: raw.clone(),
                    })
                    .await;
                }
                other => debug!("Manual submission refused: {}", other),
            }
            return Err(e);
        }

        self.validate().await.ok_or(ScannerError::NotRunning)
    }

    async fn request_ocr(&mut self) -> std::result::Result<OcrReport, ScannerError> {
        let Some(ocr) = self.ocr.clone() else {
            return Err(OcrError::Disabled.into());
        };

        self.machine.poll_cooldown(Instant::now());
        self.machine.request_ocr()?;
        self.sync().await;

        let recognized = match self.lease.latest_frame() {
            None => Err(OcrError::NoSnapshot),
            Some(frame) => {
                info!("OCR fallback on frame {} via '{}'", frame.id, ocr.name());
                let timeout_ms = self.ocr_timeout.as_millis() as u64;
                let recognize = tokio::time::timeout(self.ocr_timeout, ocr.recognize(&frame));
                let cancel = self.cancel.clone();
                let finished = tokio::select! {
                    _ = cancel.cancelled() => None,
                    result = recognize => Some(result),
                };

                match finished {
                    Some(result) => result.unwrap_or(Err(OcrError::Timeout { timeout_ms })),
                    None => {
                        self.machine.abort_ocr();
                        return Err(ScannerError::NotRunning);
                    }
                }
            }
        };

        let text = match recognized {
            Ok(text) => text,
            Err(e) => {
                self.machine.abort_ocr();
                self.emit(ScanEvent::OcrFailed {
                    error: e.to_string(),
                })
                .await;
                return Err(e.into());
            }
        };

        let extraction = extract_candidate(&text);
        if !extraction.skipped_denylisted().is_empty() {
            warn!(
                "OCR skipped denylisted token(s) {:?}; an order code equal to one of them cannot be read by OCR",
                extraction.skipped_denylisted()
            );
        }
        self.emit(ScanEvent::OcrExtracted {
            extraction: extraction.clone(),
        })
        .await;

        match self.machine.finish_ocr(&extraction) {
            Ok(_) => {
                let resolution = self.validate().await;
                Ok(OcrReport {
                    extraction,
                    resolution,
                })
            }
            Err(e) => {
                info!("OCR text held no order code ({})", e);
                self.emit(ScanEvent::CandidateRejected {
                    origin: Origin::Ocr,
                    raw: text,
                })
                .await;
                Ok(OcrReport {
                    extraction,
                    resolution: None,
                })
            }
        }
    }

    async fn confirm_serve(&mut self) -> std::result::Result<OrderRecord, ScannerError> {
        let record = self.machine.serve_target(self.today())?;

        let mark = tokio::time::timeout(self.lookup_timeout, self.registry.mark_served(&record.id));
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ScannerError::NotRunning),
            result = mark => result,
        };

        match result {
            Ok(Ok(updated)) => {
                self.machine.record_served(&updated);
                self.emit(ScanEvent::ServeConfirmed {
                    order_id: updated.id.clone(),
                    timestamp: SystemTime::now(),
                })
                .await;
                Ok(updated)
            }
            Ok(Err(e)) => {
                warn!("Serve confirmation for {} failed: {}", record.id, e);
                Err(ScannerError::ServeFailed {
                    details: e.to_string(),
                })
            }
            Err(_) => Err(ScannerError::ServeFailed {
                details: RegistryError::Timeout {
                    timeout_ms: self.lookup_timeout.as_millis() as u64,
                }
                .to_string(),
            }),
        }
    }
}

/// Builder for ScanOrchestrator
pub struct ScanOrchestratorBuilder {
    config: Option<ScannerConfig>,
    source: Option<Arc<dyn FrameSource>>,
    decoder: Option<Arc<dyn CodeDecoder>>,
    registry: Option<Arc<dyn OrderRegistry>>,
    ocr: Option<Arc<dyn OcrService>>,
    ocr_timeout: Duration,
    feedback: Option<Arc<dyn Feedback>>,
    event_bus: Option<Arc<EventBus>>,
    timezone: Tz,
}

impl ScanOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            source: None,
            decoder: None,
            registry: None,
            ocr: None,
            ocr_timeout: Duration::from_secs(15),
            feedback: None,
            event_bus: None,
            timezone: chrono_tz::UTC,
        }
    }

    pub fn config(mut self, config: ScannerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn source(mut self, source: Arc<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn CodeDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn OrderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Enable the OCR fallback
    pub fn ocr(mut self, ocr: Arc<dyn OcrService>, timeout: Duration) -> Self {
        self.ocr = Some(ocr);
        self.ocr_timeout = timeout;
        self
    }

    pub fn feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Timezone that decides which orders are for today
    pub fn timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn build(self) -> Result<ScanOrchestrator> {
        let config = self
            .config
            .ok_or_else(|| CounterError::component("scanner_builder", "Config is required"))?;
        let source = self
            .source
            .ok_or_else(|| CounterError::component("scanner_builder", "Frame source is required"))?;
        let decoder = self
            .decoder
            .ok_or_else(|| CounterError::component("scanner_builder", "Decoder is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| CounterError::component("scanner_builder", "Registry is required"))?;
        let event_bus = self
            .event_bus
            .ok_or_else(|| CounterError::component("scanner_builder", "Event bus is required"))?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (state_tx, _) = watch::channel(StateSnapshot::default());

        Ok(ScanOrchestrator {
            config,
            source,
            decoder,
            registry,
            ocr: self.ocr,
            ocr_timeout: self.ocr_timeout,
            feedback: self.feedback.unwrap_or_else(|| Arc::new(NoopFeedback)),
            event_bus,
            timezone: self.timezone,
            command_tx,
            command_rx: Some(command_rx),
            state_tx: Arc::new(state_tx),
            cancel: CancellationToken::new(),
            task: None,
        })
    }
}

impl Default for ScanOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

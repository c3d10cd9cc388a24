use super::types::{ComponentState, ShutdownReason};
use crate::audit::AuditLog;
use crate::config::CounterConfig;
use crate::decoder::{DecodePolicy, QrDecoder};
use crate::error::Result;
use crate::events::EventBus;
use crate::feedback::{Feedback, NoopFeedback, TerminalBell};
use crate::keyboard_input::KeyboardInputHandler;
use crate::ocr::TesseractOcr;
use crate::registry::InMemoryRegistry;
use crate::scanner::{ScanHandle, ScanOrchestrator};
use crate::source::{LatestFrameSlot, ReplayFeed};
#[cfg(feature = "status")]
use crate::status::StatusServer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main application coordinator that wires and runs one counter terminal
pub struct CounterOrchestrator {
    pub(super) config: CounterConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) slot: Arc<LatestFrameSlot>,
    pub(super) registry: Arc<InMemoryRegistry>,

    // Components
    pub(super) replay_feed: Option<ReplayFeed>,
    pub(super) scanner: ScanOrchestrator,
    pub(super) audit_log: Option<Arc<AuditLog>>,
    pub(super) audit_task: Option<JoinHandle<()>>,
    pub(super) audit_cancel: CancellationToken,
    #[cfg(feature = "status")]
    pub(super) status_server: Option<Arc<StatusServer>>,
    #[cfg(feature = "status")]
    pub(super) status_task: Option<JoinHandle<Result<()>>>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl CounterOrchestrator {
    /// Create a new orchestrator with the given configuration
    pub async fn new(config: CounterConfig) -> Result<Self> {
        config.validate()?;
        let timezone = config.terminal.tz()?;

        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let slot = Arc::new(LatestFrameSlot::new("counter-camera"));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let replay_feed = config.feed.replay_dir.as_ref().map(|dir| {
            ReplayFeed::new(
                dir,
                Duration::from_millis(config.feed.replay_interval_ms),
                Arc::clone(&slot),
            )
        });

        let registry = Arc::new(
            InMemoryRegistry::from_json_file(&config.registry.orders_path, config.registry.persist)
                .await?,
        );

        let feedback: Arc<dyn Feedback> = if config.terminal.bell {
            Arc::new(TerminalBell)
        } else {
            Arc::new(NoopFeedback)
        };

        let mut scanner_builder = ScanOrchestrator::builder()
            .config(config.scanner.clone())
            .source(slot.clone())
            .decoder(Arc::new(QrDecoder::new(DecodePolicy::from(&config.decoder))))
            .registry(registry.clone())
            .feedback(feedback)
            .event_bus(Arc::clone(&event_bus))
            .timezone(timezone);

        if config.ocr.enabled {
            scanner_builder = scanner_builder.ocr(
                Arc::new(TesseractOcr::from_config(&config.ocr)),
                Duration::from_millis(config.ocr.timeout_ms),
            );
        }

        let scanner = scanner_builder.build()?;

        let audit_log = config
            .audit
            .enabled
            .then(|| Arc::new(AuditLog::new(&config.audit.path)));

        #[cfg(feature = "status")]
        let status_server = if config.status.enabled {
            Some(Arc::new(
                StatusServer::builder()
                    .config(config.status.clone())
                    .scanner(scanner.handle())
                    .event_bus(Arc::clone(&event_bus))
                    .source(slot.clone())
                    .build()?,
            ))
        } else {
            None
        };

        let keyboard_handler = Some(KeyboardInputHandler::new(
            scanner.handle(),
            Arc::clone(&event_bus),
        ));
        let keyboard_enabled = config.terminal.manual_entry;

        info!(
            "Counter terminal assembled (ocr: {}, audit: {}, status: {})",
            config.ocr.enabled, config.audit.enabled, config.status.enabled
        );

        Ok(Self {
            config,
            event_bus,
            slot,
            registry,
            replay_feed,
            scanner,
            audit_log,
            audit_task: None,
            audit_cancel: CancellationToken::new(),
            #[cfg(feature = "status")]
            status_server,
            #[cfg(feature = "status")]
            status_task: None,
            keyboard_handler,
            keyboard_enabled,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Enable or disable the keyboard operator surface
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    pub fn scanner_handle(&self) -> ScanHandle {
        self.scanner.handle()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn frame_slot(&self) -> Arc<LatestFrameSlot> {
        Arc::clone(&self.slot)
    }

    pub fn registry(&self) -> Arc<InMemoryRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &CounterConfig {
        &self.config
    }
}

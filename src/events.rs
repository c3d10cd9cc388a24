use crate::audit::AuditRecord;
use crate::code::{Code, OcrExtraction, Origin};
use crate::error::EventBusError;
use crate::scanner::StateKind;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events emitted by the scanning pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// The scanner moved between states
    StateChanged {
        from: StateKind,
        to: StateKind,
        timestamp: SystemTime,
    },
    /// A candidate is being checked against the registry
    LookupStarted {
        attempt_id: Uuid,
        origin: Origin,
        code: Code,
    },
    /// An attempt reached a terminal outcome
    Resolved(AuditRecord),
    /// Success feedback was signalled for an order
    FeedbackSignal { order_id: String },
    /// Input from the OCR or manual path did not classify as an order code
    CandidateRejected { origin: Origin, raw: String },
    /// Typed input failed length/charset checks
    ManualInputRejected { input: String, reason: String },
    /// The OCR heuristic ran over recognized text
    OcrExtracted { extraction: OcrExtraction },
    /// The OCR service did not produce text
    OcrFailed { error: String },
    /// The operator confirmed an order as served
    ServeConfirmed {
        order_id: String,
        timestamp: SystemTime,
    },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl ScanEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ScanEvent::StateChanged { from, to, .. } => format!("State {} -> {}", from, to),
            ScanEvent::LookupStarted { code, origin, .. } => {
                format!("Looking up {} ({})", code, origin)
            }
            ScanEvent::Resolved(record) => format!(
                "Resolved {} as {}",
                record.raw_input,
                record.outcome_label()
            ),
            ScanEvent::FeedbackSignal { order_id } => format!("Feedback for order {}", order_id),
            ScanEvent::CandidateRejected { origin, raw } => {
                format!("Rejected {} input '{}'", origin, raw)
            }
            ScanEvent::ManualInputRejected { input, reason } => {
                format!("Manual input '{}' rejected: {}", input, reason)
            }
            ScanEvent::OcrExtracted { extraction } => match extraction.code() {
                Some(code) => format!("OCR extracted {}", code),
                None => "OCR found no code".to_string(),
            },
            ScanEvent::OcrFailed { error } => format!("OCR failed: {}", error),
            ScanEvent::ServeConfirmed { order_id, .. } => format!("Order {} served", order_id),
            ScanEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            ScanEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::StateChanged { .. } => "state_changed",
            ScanEvent::LookupStarted { .. } => "lookup_started",
            ScanEvent::Resolved(_) => "resolved",
            ScanEvent::FeedbackSignal { .. } => "feedback_signal",
            ScanEvent::CandidateRejected { .. } => "candidate_rejected",
            ScanEvent::ManualInputRejected { .. } => "manual_input_rejected",
            ScanEvent::OcrExtracted { .. } => "ocr_extracted",
            ScanEvent::OcrFailed { .. } => "ocr_failed",
            ScanEvent::ServeConfirmed { .. } => "serve_confirmed",
            ScanEvent::SystemError { .. } => "system_error",
            ScanEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Fails only when nobody is subscribed.
    pub async fn publish(&self, event: ScanEvent) -> Result<usize, EventBusError> {
        match &event {
            ScanEvent::Resolved(record) => {
                info!(
                    "Attempt {} ({}, '{}') resolved: {}",
                    record.attempt_id,
                    record.origin,
                    record.raw_input,
                    record.outcome_label()
                );
            }
            ScanEvent::ServeConfirmed { order_id, .. } => {
                info!("Order {} confirmed as served", order_id);
            }
            ScanEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            ScanEvent::OcrFailed { error } => {
                warn!("OCR failed: {}", error);
            }
            ScanEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &ScanEvent) -> bool {
        match self {
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<ScanEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<ScanEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<ScanEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<ScanEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

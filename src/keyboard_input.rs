use crate::code::ManualEntryBuffer;
use crate::error::Result;
use crate::events::{EventBus, ScanEvent};
use crate::scanner::ScanHandle;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a single key press asks the scanner to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// Buffer changed; nothing to send yet
    Edited,
    Submit(String),
    Continue,
    RequestOcr,
    Reset,
    ConfirmServe,
    Quit,
    Ignored,
}

/// Map a key onto the manual entry buffer and the operator commands.
///
/// Enter submits the buffer, or acknowledges a success when the buffer is empty.
pub fn interpret_key(code: KeyCode, buffer: &mut ManualEntryBuffer) -> KeyAction {
    match code {
        KeyCode::Char('+') => KeyAction::ConfirmServe,
        KeyCode::Char(c) if c.is_ascii_alphanumeric() => {
            if buffer.push(c) {
                KeyAction::Edited
            } else {
                KeyAction::Ignored
            }
        }
        KeyCode::Backspace => {
            buffer.backspace();
            KeyAction::Edited
        }
        KeyCode::Enter if buffer.is_empty() => KeyAction::Continue,
        KeyCode::Enter => {
            let input = buffer.as_str().to_string();
            buffer.clear();
            KeyAction::Submit(input)
        }
        KeyCode::Tab => KeyAction::RequestOcr,
        KeyCode::Delete => {
            buffer.clear();
            KeyAction::Reset
        }
        KeyCode::Esc => KeyAction::Quit,
        _ => KeyAction::Ignored,
    }
}

/// Forward one action to the scanner and log what the operator should see
pub async fn dispatch(action: KeyAction, scanner: &ScanHandle, event_bus: &EventBus) {
    match action {
        KeyAction::Submit(input) => match scanner.submit_manual(&input).await {
            Ok(record) => match &record.operator_message {
                Some(message) => warn!("{}: {}", record.raw_input, message),
                None => info!(
                    "{} -> {} ({})",
                    record.raw_input,
                    record.outcome_label(),
                    record.order_id.as_deref().unwrap_or("-")
                ),
            },
            Err(e) => warn!("Manual entry '{}' refused: {}", input, e),
        },
        KeyAction::Continue => {
            if let Err(e) = scanner.continue_scanning().await {
                debug!("Continue ignored: {}", e);
            }
        }
        KeyAction::RequestOcr => match scanner.request_ocr().await {
            Ok(report) => match report.resolution {
                Some(record) => info!("OCR fallback resolved: {}", record.outcome_label()),
                None => info!("OCR fallback found no order code"),
            },
            Err(e) => warn!("OCR fallback refused: {}", e),
        },
        KeyAction::Reset => {
            if let Err(e) = scanner.reset().await {
                warn!("Reset failed: {}", e);
            }
        }
        KeyAction::ConfirmServe => match scanner.confirm_serve().await {
            Ok(record) => info!("Order {} served", record.id),
            Err(e) => warn!("Serve confirmation refused: {}", e),
        },
        KeyAction::Quit => {
            let shutdown_event = ScanEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "Operator requested via keyboard".to_string(),
            };
            if let Err(e) = event_bus.publish(shutdown_event).await {
                warn!("Failed to publish shutdown event: {}", e);
            }
        }
        KeyAction::Edited | KeyAction::Ignored => {}
    }
}

/// Raw-mode keyboard surface for the counter operator
pub struct KeyboardInputHandler {
    scanner: ScanHandle,
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(scanner: ScanHandle, event_bus: Arc<EventBus>) -> Self {
        Self {
            scanner,
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard input: type a code + Enter, Tab = OCR, Delete = reset, '+' = serve, Esc = quit");

        let scanner = self.scanner.clone();
        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            let mut buffer = ManualEntryBuffer::new();

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        let action = interpret_key(key_event.code, &mut buffer);
                        match action {
                            KeyAction::Edited => debug!("Manual entry: '{}'", buffer.as_str()),
                            KeyAction::Ignored => debug!("Key ignored: {:?}", key_event.code),
                            _ => {}
                        }

                        let quit = action == KeyAction::Quit;
                        let scanner = scanner.clone();
                        let event_bus = Arc::clone(&event_bus);
                        runtime_handle.spawn(async move {
                            dispatch(action, &scanner, &event_bus).await;
                        });

                        if quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Let the polling loop notice and restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

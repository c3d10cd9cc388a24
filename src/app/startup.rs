use super::{ComponentState, CounterOrchestrator};
use crate::error::Result;
#[cfg(feature = "status")]
use crate::events::ScanEvent;
use std::sync::Arc;
use tracing::{error, info};

impl CounterOrchestrator {
    /// Names of the components this terminal runs, in start order
    pub fn component_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.replay_feed.is_some() {
            names.push("feed");
        }
        names.push("scanner");
        if self.audit_log.is_some() {
            names.push("audit");
        }
        #[cfg(feature = "status")]
        if self.status_server.is_some() {
            names.push("status");
        }
        if self.keyboard_enabled {
            names.push("keyboard");
        }
        names
    }

    /// Register all configured components as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing counter terminal components");

        let names = self.component_names();
        let mut states = self.component_states.lock().await;
        for name in &names {
            states.insert(name.to_string(), ComponentState::Stopped);
        }
        drop(states);

        info!("Components initialized: {}", names.join(", "));
        Ok(())
    }

    /// Start all system components
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting counter terminal");

        if self.replay_feed.is_some() {
            self.set_component_state("feed", ComponentState::Starting).await;

            let started = match self.replay_feed.as_mut() {
                Some(replay_feed) => replay_feed.start().await,
                None => Ok(()),
            };
            if let Err(e) = started {
                error!("Failed to start replay feed: {}", e);
                self.set_component_state("feed", ComponentState::Failed).await;
                return Err(e);
            }

            self.set_component_state("feed", ComponentState::Running).await;
        }

        // The audit log subscribes before the scanner so no resolution is missed
        if let Some(audit_log) = &self.audit_log {
            self.set_component_state("audit", ComponentState::Starting).await;
            let task = Arc::clone(audit_log).spawn(&self.event_bus, self.audit_cancel.clone());
            self.audit_task = Some(task);
            self.set_component_state("audit", ComponentState::Running).await;
        }

        self.set_component_state("scanner", ComponentState::Starting).await;
        if let Err(e) = self.scanner.start().await {
            error!("Failed to start scanner: {}", e);
            self.set_component_state("scanner", ComponentState::Failed).await;
            return Err(e);
        }
        self.set_component_state("scanner", ComponentState::Running).await;

        #[cfg(feature = "status")]
        if let Some(server) = &self.status_server {
            self.set_component_state("status", ComponentState::Starting).await;

            let server = Arc::clone(server);
            let shutdown = self.cancellation_token.clone();
            let event_bus = Arc::clone(&self.event_bus);
            self.status_task = Some(tokio::spawn(async move {
                let result = server.run(shutdown).await;
                if let Err(e) = &result {
                    error!("Status server error: {}", e);
                    let _ = event_bus
                        .publish(ScanEvent::SystemError {
                            component: "status".to_string(),
                            error: e.to_string(),
                        })
                        .await;
                }
                result
            }));

            self.set_component_state("status", ComponentState::Running).await;
        }

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Starting).await;

                keyboard_handler.start().await.map_err(|e| {
                    error!("Failed to start keyboard handler: {}", e);
                    e
                })?;

                self.set_component_state("keyboard", ComponentState::Running).await;
            }
        }

        info!("Counter terminal started");
        Ok(())
    }
}

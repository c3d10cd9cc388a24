use super::{ComponentState, CounterOrchestrator};
use crate::error::{CounterError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const SCANNER_STOP_TIMEOUT: Duration = Duration::from_secs(10);
const COMPONENT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const KEYBOARD_STOP_TIMEOUT: Duration = Duration::from_secs(2);

impl CounterOrchestrator {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Stops the status server and the bus listeners
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        for name in self.stop_order() {
            if let Err(e) = self.stop_component(name).await {
                error!("Error stopping {}: {}", name, e);
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Operator surfaces first, then the scanner, so the audit log sees its
    /// last resolutions before it stops
    pub fn stop_order(&self) -> Vec<&'static str> {
        let names = self.component_names();
        ["keyboard", "status", "scanner", "audit", "feed"]
            .into_iter()
            .filter(|name| names.contains(name))
            .collect()
    }

    async fn stop_component(&mut self, component: &str) -> Result<()> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        let result = match component {
            "keyboard" => match &self.keyboard_handler {
                Some(handler) => bounded(component, KEYBOARD_STOP_TIMEOUT, handler.stop()).await,
                None => Ok(()),
            },
            #[cfg(feature = "status")]
            "status" => match self.status_task.take() {
                Some(task) => {
                    bounded(component, COMPONENT_STOP_TIMEOUT, async move {
                        task.await.map_err(|e| {
                            CounterError::component("status", format!("Server task failed: {}", e))
                        })?
                    })
                    .await
                }
                None => Ok(()),
            },
            "audit" => match self.audit_task.take() {
                Some(task) => {
                    self.audit_cancel.cancel();
                    bounded(component, COMPONENT_STOP_TIMEOUT, async move {
                        task.await.map_err(|e| {
                            CounterError::component("audit", format!("Audit task failed: {}", e))
                        })
                    })
                    .await
                }
                None => Ok(()),
            },
            "scanner" => bounded(component, SCANNER_STOP_TIMEOUT, self.scanner.stop()).await,
            "feed" => match self.replay_feed.as_mut() {
                Some(feed) => bounded(component, COMPONENT_STOP_TIMEOUT, feed.stop()).await,
                None => Ok(()),
            },
            other => Err(CounterError::component(other, "Unknown component")),
        };

        let state = if result.is_ok() {
            info!("{} component stopped", component);
            ComponentState::Stopped
        } else {
            ComponentState::Failed
        };
        self.set_component_state(component, state).await;

        result
    }
}

async fn bounded<F>(component: &str, limit: Duration, stop: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match timeout(limit, stop).await {
        Ok(result) => result,
        Err(_) => {
            error!("{} component stop timeout", component);
            Err(CounterError::System {
                message: format!("{} component stop timeout", component),
            })
        }
    }
}

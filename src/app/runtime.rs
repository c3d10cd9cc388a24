use super::{CounterOrchestrator, ShutdownReason};
use crate::error::{CounterError, EventBusError, Result};
use crate::events::{EventFilter, EventReceiver, ScanEvent};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

type SharedShutdown = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

async fn trigger(sender: &SharedShutdown, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}

impl CounterOrchestrator {
    /// Run until a signal or an operator asks to stop, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Counter terminal is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| CounterError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| CounterError::system("Shutdown receiver already taken"))?;

        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));
        self.setup_signal_handlers(Arc::clone(&shutdown_sender));
        self.listen_for_shutdown_requests(shutdown_sender);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| CounterError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Counter terminal shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self, shutdown_sender: SharedShutdown) {
        // SIGTERM (systemd stop), Unix only
        #[cfg(unix)]
        {
            let sender = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    trigger(&sender, ShutdownReason::Signal("SIGTERM".to_string())).await;
                }
            });
        }

        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received SIGINT signal (Ctrl+C)");
                trigger(&shutdown_sender, ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        });
    }

    /// Operator quit from the keyboard arrives as a bus event
    fn listen_for_shutdown_requests(&self, shutdown_sender: SharedShutdown) {
        let mut receiver = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "shutdown".to_string(),
        );
        let cancel = self.cancellation_token.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = receiver.recv() => event,
                };

                match event {
                    Ok(ScanEvent::ShutdownRequested { reason, .. }) => {
                        info!("Shutdown requested: {}", reason);
                        trigger(&shutdown_sender, ShutdownReason::UserRequest).await;
                        return;
                    }
                    Ok(_) => {}
                    Err(EventBusError::ChannelClosed) => {
                        trigger(
                            &shutdown_sender,
                            ShutdownReason::Error("Event bus closed".to_string()),
                        )
                        .await;
                        return;
                    }
                    Err(e) => warn!("Shutdown listener: {}", e),
                }
            }
        });
    }
}

use crate::config::StatusConfig;
use crate::error::{CounterError, Result, StatusError};
use crate::events::EventBus;
use crate::scanner::ScanHandle;
use crate::source::FrameSource;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::handlers::{
    confirm_serve_handler, continue_handler, events_handler, health_handler, manual_handler,
    ocr_handler, reset_handler, state_handler,
};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) scanner: ScanHandle,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) source: Arc<dyn FrameSource>,
}

/// Build the status routes
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/state", get(state_handler))
        .route("/events", get(events_handler))
        .route("/commands/manual", post(manual_handler))
        .route("/commands/reset", post(reset_handler))
        .route("/commands/continue", post(continue_handler))
        .route("/commands/ocr", post(ocr_handler))
        .route("/commands/serve", post(confirm_serve_handler))
        .layer(cors)
        .with_state(state)
}

pub struct StatusServer {
    pub(crate) config: StatusConfig,
    state: ServerState,
}

impl StatusServer {
    pub fn builder() -> StatusServerBuilder {
        StatusServerBuilder::new()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let app = router(self.state.clone());
        let addr = self.address();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| StatusError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;

        info!("Status server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| StatusError::ServerFailed {
                details: e.to_string(),
            })?;

        info!("Status server stopped");
        Ok(())
    }
}

/// Builder for StatusServer
pub struct StatusServerBuilder {
    config: Option<StatusConfig>,
    scanner: Option<ScanHandle>,
    event_bus: Option<Arc<EventBus>>,
    source: Option<Arc<dyn FrameSource>>,
}

impl StatusServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            scanner: None,
            event_bus: None,
            source: None,
        }
    }

    pub fn config(mut self, config: StatusConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn scanner(mut self, scanner: ScanHandle) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn source(mut self, source: Arc<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn build(self) -> Result<StatusServer> {
        let config = self
            .config
            .ok_or_else(|| CounterError::component("status_server", "Status configuration is required"))?;
        let scanner = self
            .scanner
            .ok_or_else(|| CounterError::component("status_server", "Scanner handle is required"))?;
        let event_bus = self
            .event_bus
            .ok_or_else(|| CounterError::component("status_server", "Event bus is required"))?;
        let source = self
            .source
            .ok_or_else(|| CounterError::component("status_server", "Frame source is required"))?;

        Ok(StatusServer {
            config,
            state: ServerState {
                scanner,
                event_bus,
                source,
            },
        })
    }
}

impl Default for StatusServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

use super::state::StateSnapshot;
use crate::audit::AuditRecord;
use crate::code::OcrExtraction;
use crate::error::ScannerError;
use crate::registry::OrderRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};

/// What an OCR fallback request produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrReport {
    pub extraction: OcrExtraction,
    /// Present when the extracted candidate went through a lookup
    pub resolution: Option<AuditRecord>,
}

pub(crate) enum ScanCommand {
    Manual {
        input: String,
        reply: oneshot::Sender<Result<AuditRecord, ScannerError>>,
    },
    RequestOcr {
        reply: oneshot::Sender<Result<OcrReport, ScannerError>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Continue {
        reply: oneshot::Sender<Result<(), ScannerError>>,
    },
    ConfirmServe {
        reply: oneshot::Sender<Result<OrderRecord, ScannerError>>,
    },
}

/// Cloneable operator-side access to a running scanner
#[derive(Clone)]
pub struct ScanHandle {
    commands: mpsc::Sender<ScanCommand>,
    state: watch::Receiver<StateSnapshot>,
}

impl ScanHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<ScanCommand>,
        state: watch::Receiver<StateSnapshot>,
    ) -> Self {
        Self { commands, state }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ScanCommand,
    ) -> Result<T, ScannerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ScannerError::NotRunning)?;
        response.await.map_err(|_| ScannerError::NotRunning)
    }

    /// Submit a typed code; resolves once the lookup finished
    pub async fn submit_manual(&self, input: &str) -> Result<AuditRecord, ScannerError> {
        let input = input.to_string();
        self.request(|reply| ScanCommand::Manual { input, reply })
            .await?
    }

    pub async fn request_ocr(&self) -> Result<OcrReport, ScannerError> {
        self.request(|reply| ScanCommand::RequestOcr { reply }).await?
    }

    pub async fn reset(&self) -> Result<(), ScannerError> {
        self.request(|reply| ScanCommand::Reset { reply }).await
    }

    pub async fn continue_scanning(&self) -> Result<(), ScannerError> {
        self.request(|reply| ScanCommand::Continue { reply }).await?
    }

    /// Mark the last successfully resolved order as served
    pub async fn confirm_serve(&self) -> Result<OrderRecord, ScannerError> {
        self.request(|reply| ScanCommand::ConfirmServe { reply })
            .await?
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<StateSnapshot> {
        self.state.clone()
    }
}

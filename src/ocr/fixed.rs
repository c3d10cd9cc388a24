use super::OcrService;
use crate::error::OcrError;
use crate::frame::FrameData;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// OCR stand-in that answers every request with preset text
pub struct FixedTextOcr {
    text: Mutex<Result<String, OcrError>>,
    requests: AtomicU64,
}

impl FixedTextOcr {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: Mutex::new(Ok(text.into())),
            requests: AtomicU64::new(0),
        }
    }

    pub fn set_text<S: Into<String>>(&self, text: S) {
        *self.text.lock() = Ok(text.into());
    }

    /// Make every following request fail
    pub fn set_failure(&self, error: OcrError) {
        *self.text.lock() = Err(error);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl OcrService for FixedTextOcr {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn recognize(&self, _frame: &FrameData) -> Result<String, OcrError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.text.lock().clone()
    }
}

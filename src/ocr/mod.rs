//! External OCR services used by the operator-triggered fallback path.

mod fixed;
mod tesseract;

pub use fixed::FixedTextOcr;
pub use tesseract::TesseractOcr;

use crate::error::OcrError;
use crate::frame::FrameData;

/// Turns one snapshot into best-effort multi-line text.
///
/// Implementations may take seconds; callers bound them with their own timeout
/// on top of whatever the service enforces.
#[async_trait::async_trait]
pub trait OcrService: Send + Sync {
    fn name(&self) -> &str;

    async fn recognize(&self, frame: &FrameData) -> Result<String, OcrError>;
}

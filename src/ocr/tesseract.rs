use super::OcrService;
use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::frame::FrameData;
use image::{DynamicImage, ImageOutputFormat};
use std::io::Cursor;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs a tesseract-compatible binary as `<command> stdin stdout`, feeding a
/// PNG snapshot and reading plain text back.
pub struct TesseractOcr {
    command: String,
    timeout: Duration,
}

impl TesseractOcr {
    pub fn new<S: Into<String>>(command: S, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(config.command.clone(), Duration::from_millis(config.timeout_ms))
    }

    /// Encode the frame's luminance as PNG
    pub fn snapshot_png(frame: &FrameData) -> Result<Vec<u8>, OcrError> {
        let luma = frame.to_luma().ok_or(OcrError::NoSnapshot)?;

        let mut png = Vec::new();
        DynamicImage::ImageLuma8(luma)
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .map_err(|e| OcrError::Snapshot {
                details: e.to_string(),
            })?;

        Ok(png)
    }

    async fn run(&self, png: Vec<u8>) -> Result<String, OcrError> {
        let mut child = Command::new(&self.command)
            .arg("stdin")
            .arg("stdout")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OcrError::ServiceFailed {
                details: format!("Failed to start '{}': {}", self.command, e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .await
                .map_err(|e| OcrError::ServiceFailed {
                    details: format!("Failed to send snapshot: {}", e),
                })?;
            // Dropping stdin closes the pipe so the process sees EOF
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OcrError::ServiceFailed {
                details: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("OCR command exited with {}: {}", output.status, stderr.trim());
            return Err(OcrError::ServiceFailed {
                details: format!("exit status {}", output.status),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait::async_trait]
impl OcrService for TesseractOcr {
    fn name(&self) -> &str {
        &self.command
    }

    async fn recognize(&self, frame: &FrameData) -> Result<String, OcrError> {
        let png = Self::snapshot_png(frame)?;
        debug!("Sending {} byte snapshot of frame {} to OCR", png.len(), frame.id);

        match tokio::time::timeout(self.timeout, self.run(png)).await {
            Ok(result) => result,
            Err(_) => Err(OcrError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

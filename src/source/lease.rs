use super::FrameSource;
use crate::error::DecodeError;
use crate::frame::FrameData;
use std::sync::Arc;
use tracing::debug;

/// Scoped use of a [`FrameSource`]. The source is released when the lease is dropped,
/// whichever way the owning task exits.
pub struct FrameLease {
    source: Arc<dyn FrameSource>,
}

impl FrameLease {
    pub fn acquire(source: Arc<dyn FrameSource>) -> Result<Self, DecodeError> {
        source.acquire()?;
        debug!("Acquired frame source '{}'", source.name());
        Ok(Self { source })
    }

    pub fn latest_frame(&self) -> Option<FrameData> {
        self.source.latest_frame()
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.source.release();
        debug!("Released frame source '{}'", self.source.name());
    }
}

mod lease;
mod replay;
mod slot;

pub use lease::FrameLease;
pub use replay::ReplayFeed;
pub use slot::{FrameSlotStats, LatestFrameSlot};

use crate::error::DecodeError;
use crate::frame::FrameData;

/// Pull-based access to whatever the camera most recently produced.
///
/// Implementations must never block: when nothing new is available
/// `latest_frame` returns `None` and the sampling tick becomes a no-op.
pub trait FrameSource: Send + Sync {
    /// Human readable name for logs
    fn name(&self) -> &str;

    /// Start using the source. Sources are shared, so this never takes exclusive ownership.
    fn acquire(&self) -> Result<(), DecodeError>;

    /// The most recent frame, if any
    fn latest_frame(&self) -> Option<FrameData>;

    /// Stop using the source
    fn release(&self);
}

mod mock;
mod policy;
mod qr;

pub use mock::MockDecoder;
pub use policy::DecodePolicy;
pub use qr::{DecodeStats, QrDecoder};

use crate::code::RawCode;
use crate::frame::FrameData;

/// Extracts a raw code string from a single frame.
///
/// Implementations must be deterministic and side-effect free with respect to
/// the result, and must answer `None` for frames they cannot use instead of
/// failing. The scanner runs each call on the blocking pool and treats a
/// panic as a miss, but a call should still return within one sampling tick.
pub trait CodeDecoder: Send + Sync {
    fn name(&self) -> &str;

    fn decode(&self, frame: &FrameData) -> Option<RawCode>;
}

use super::CodeDecoder;
use crate::code::RawCode;
use crate::frame::FrameData;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Decoder stand-in for tests and bench setups: reports whatever code is
/// currently "in front of the camera" for every usable frame.
#[derive(Default)]
pub struct MockDecoder {
    visible: Mutex<Option<String>>,
    calls: AtomicU64,
}

impl MockDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a code in view, or take it away with `None`
    pub fn show(&self, code: Option<&str>) {
        *self.visible.lock() = code.map(str::to_string);
    }

    /// Number of decode attempts made so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl CodeDecoder for MockDecoder {
    fn name(&self) -> &str {
        "mock"
    }

    fn decode(&self, frame: &FrameData) -> Option<RawCode> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if frame.is_empty() {
            return None;
        }
        self.visible.lock().clone().map(RawCode::new)
    }
}

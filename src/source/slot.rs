use super::FrameSource;
use crate::error::DecodeError;
use crate::frame::FrameData;
use image::GrayImage;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, trace};

/// Single-slot frame holder: the capture side overwrites, the scanner pulls the newest.
pub struct LatestFrameSlot {
    name: String,
    frame: RwLock<Option<FrameData>>,
    frame_counter: AtomicU64,
    leases: AtomicUsize,
    frames_pushed: AtomicU64,
    frames_retrieved: AtomicU64,
}

/// Snapshot of slot statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSlotStats {
    pub frames_pushed: u64,
    pub frames_retrieved: u64,
    pub active_leases: usize,
}

impl LatestFrameSlot {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            frame: RwLock::new(None),
            frame_counter: AtomicU64::new(0),
            leases: AtomicUsize::new(0),
            frames_pushed: AtomicU64::new(0),
            frames_retrieved: AtomicU64::new(0),
        }
    }

    /// Replace the current frame
    pub fn push_frame(&self, frame: FrameData) {
        trace!("Slot '{}' received frame {}", self.name, frame.id);
        *self.frame.write() = Some(frame);
        self.frames_pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Push a greyscale image, assigning the next frame id
    pub fn push_gray(&self, image: GrayImage) -> u64 {
        let id = self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.push_frame(FrameData::from_gray(id, image));
        id
    }

    pub fn stats(&self) -> FrameSlotStats {
        FrameSlotStats {
            frames_pushed: self.frames_pushed.load(Ordering::Relaxed),
            frames_retrieved: self.frames_retrieved.load(Ordering::Relaxed),
            active_leases: self.leases.load(Ordering::Relaxed),
        }
    }
}

impl FrameSource for LatestFrameSlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self) -> Result<(), DecodeError> {
        let leases = self.leases.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Frame slot '{}' now has {} lease(s)", self.name, leases);
        Ok(())
    }

    fn latest_frame(&self) -> Option<FrameData> {
        let frame = self.frame.read().clone();
        if frame.is_some() {
            self.frames_retrieved.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    fn release(&self) {
        let previous = self
            .leases
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);

        if previous <= 1 {
            // Last lease gone: a later lease must not see this frame
            *self.frame.write() = None;
            debug!("Frame slot '{}' released and cleared", self.name);
        }
    }
}

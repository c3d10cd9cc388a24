use crate::registry::OrderRecord;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Haptic/audio acknowledgement of a successful validation.
///
/// Fire-and-forget: implementations must not block and cannot fail.
pub trait Feedback: Send + Sync {
    fn success(&self, record: &OrderRecord);
}

/// Rings the terminal bell
pub struct TerminalBell;

impl Feedback for TerminalBell {
    fn success(&self, record: &OrderRecord) {
        trace!("Bell for order {}", record.id);
        let mut stdout = std::io::stdout();
        if let Err(e) = stdout.write_all(b"\x07").and_then(|_| stdout.flush()) {
            debug!("Terminal bell failed: {}", e);
        }
    }
}

pub struct NoopFeedback;

impl Feedback for NoopFeedback {
    fn success(&self, _record: &OrderRecord) {}
}

/// Counts signals; used to check the once-per-success guarantee
#[derive(Default)]
pub struct RecordingFeedback {
    count: AtomicU64,
    orders: Mutex<Vec<String>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn orders(&self) -> Vec<String> {
        self.orders.lock().clone()
    }
}

impl Feedback for RecordingFeedback {
    fn success(&self, record: &OrderRecord) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.orders.lock().push(record.id.clone());
    }
}

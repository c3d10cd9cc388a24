use super::state::DedupKey;
use crate::code::Code;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct Window {
    until: Instant,
    key: DedupKey,
}

/// Tracks the post-resolution cooldown window and what it suppresses
#[derive(Debug)]
pub struct CooldownController {
    duration: Duration,
    window: Option<Window>,
    suppressed: u64,
}

impl CooldownController {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            window: None,
            suppressed: 0,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn enter(&mut self, key: DedupKey, now: Instant) {
        debug!("Cooldown for '{}' ({:?})", key.as_str(), self.duration);
        self.window = Some(Window {
            until: now + self.duration,
            key,
        });
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.window.as_ref().map(|w| w.until)
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.window.as_ref().map_or(false, |w| now < w.until)
    }

    pub fn key(&self) -> Option<&DedupKey> {
        self.window.as_ref().map(|w| &w.key)
    }

    /// Close the window if it has run out. Returns true when it just closed.
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.window {
            Some(w) if now >= w.until => {
                self.window = None;
                true
            }
            _ => false,
        }
    }

    /// Whether `code` falls under the active window; counts the suppression
    pub fn suppresses(&mut self, code: &Code, now: Instant) -> bool {
        let hit = self
            .window
            .as_ref()
            .map_or(false, |w| now < w.until && w.key.covers(code));
        if hit {
            self.suppressed += 1;
        }
        hit
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    pub fn clear(&mut self) {
        self.window = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short(code: &str) -> Code {
        Code::ShortCode(code.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry() {
        let mut cooldown = CooldownController::new(Duration::from_millis(2500));
        let start = Instant::now();
        cooldown.enter(DedupKey::new(short("K7Q2XZ"), None), start);

        assert!(cooldown.is_active(start + Duration::from_millis(2499)));
        assert!(!cooldown.expire(start + Duration::from_millis(2499)));
        assert!(cooldown.expire(start + Duration::from_millis(2500)));
        assert!(cooldown.key().is_none());
        assert!(!cooldown.expire(start + Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppression_by_code_and_record() {
        let mut cooldown = CooldownController::new(Duration::from_secs(3));
        let now = Instant::now();
        cooldown.enter(
            DedupKey::new(short("K7Q2XZ"), Some("3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F".into())),
            now,
        );

        assert!(cooldown.suppresses(&short("K7Q2XZ"), now));
        assert!(cooldown.suppresses(
            &Code::LongIdentifier("3f2a9c1e-77b0-4d2a-9e11-0c5b8a1d2e3f".into()),
            now
        ));
        assert!(!cooldown.suppresses(&short("A1B2C3"), now));
        assert!(!cooldown.suppresses(&short("K7Q2XZ"), now + Duration::from_secs(3)));
        assert_eq!(cooldown.suppressed(), 2);
    }
}

use std::time::Duration;
use tokio::time::Instant;

/// Faster sampling while the dewar is being refilled, bounded by a timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillMode {
    expires_at: Option<Instant>,
}

impl FillMode {
    pub fn is_active(&self) -> bool {
        self.expires_at.is_some()
    }

    pub fn engage(&mut self, now: Instant, timeout: Duration) {
        self.expires_at = Some(now + timeout);
    }

    pub fn release(&mut self) {
        self.expires_at = None;
    }

    /// When fill mode switches itself off; `None` while inactive.
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Moves the expiry to `until`. No-op while inactive.
    pub fn postpone(&mut self, until: Instant) {
        if let Some(deadline) = self.expires_at.as_mut() {
            *deadline = until;
        }
    }
}

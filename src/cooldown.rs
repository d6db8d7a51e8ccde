//! Response cooldown
//!
//! Session-scoped gate between automated responses. A dispatch opens the
//! window and schedules a timer task that closes it again. The timer is
//! owned here and aborted on `cancel` or drop, so a finished session leaves
//! nothing running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownCheck {
    Permitted,
    Suppressed { remaining: Duration },
}

impl CooldownCheck {
    pub fn is_permitted(&self) -> bool {
        matches!(self, CooldownCheck::Permitted)
    }
}

pub struct Cooldown {
    duration: Duration,
    last_response_at: Option<Instant>,
    active: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
}

impl Cooldown {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            last_response_at: None,
            active: Arc::new(AtomicBool::new(false)),
            timer: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Whether a response may go out at `now`
    pub fn check(&self, now: Instant) -> CooldownCheck {
        let Some(at) = self.last_response_at else {
            return CooldownCheck::Permitted;
        };
        if !self.is_active() {
            return CooldownCheck::Permitted;
        }
        let elapsed = now.saturating_duration_since(at);
        if elapsed >= self.duration {
            CooldownCheck::Permitted
        } else {
            CooldownCheck::Suppressed {
                remaining: self.duration - elapsed,
            }
        }
    }

    /// Record a response sent at `now` and restart the window
    pub fn mark_dispatched(&mut self, now: Instant) {
        self.abort_timer();
        self.last_response_at = Some(now);
        self.active.store(true, Ordering::Release);

        // Without a runtime the elapsed-time check alone still closes the window
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        let active = Arc::clone(&self.active);
        let deadline = now + self.duration;
        self.timer = Some(handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            active.store(false, Ordering::Release);
            debug!("Cooldown window closed");
        }));
    }

    /// Abort the timer and close the window
    pub fn cancel(&mut self) {
        self.abort_timer();
        self.active.store(false, Ordering::Release);
    }

    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Cooldown {
    fn drop(&mut self) {
        self.abort_timer();
    }
}

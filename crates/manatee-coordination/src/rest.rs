//! Quiescence tracking
//!
//! Every unit of outstanding work (a queued event, an in-flight database
//! call, a pending write, a backoff timer) holds a [`MovingGuard`]. The
//! tracker is at rest when no guard is alive. Work that hands off to other
//! work must acquire the successor's guard before releasing its own, so the
//! count never touches zero while anything is still pending.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared count of outstanding work
#[derive(Clone)]
pub struct RestTracker {
    moving: Arc<watch::Sender<usize>>,
}

impl RestTracker {
    pub fn new() -> Self {
        let (moving, _) = watch::channel(0);
        Self {
            moving: Arc::new(moving),
        }
    }

    /// Mark one unit of work as started; it ends when the guard drops
    #[must_use = "work is considered finished as soon as the guard is dropped"]
    pub fn moving(&self) -> MovingGuard {
        self.moving.send_modify(|n| *n += 1);
        MovingGuard {
            tracker: self.clone(),
        }
    }

    pub fn is_at_rest(&self) -> bool {
        *self.moving.borrow() == 0
    }

    /// Units of work currently outstanding
    pub fn in_flight(&self) -> usize {
        *self.moving.borrow()
    }

    /// Wait until no work is outstanding
    pub async fn wait_for_rest(&self) {
        let mut rx = self.moving.subscribe();
        // the sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for RestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RestTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestTracker")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Token for one unit of outstanding work
pub struct MovingGuard {
    tracker: RestTracker,
}

impl Drop for MovingGuard {
    fn drop(&mut self) {
        self.tracker
            .moving
            .send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl fmt::Debug for MovingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MovingGuard")
    }
}

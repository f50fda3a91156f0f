//! Tap debounce: drops repeated identical button actions.
//!
//! Keyed by (actor, action). Entries older than five windows are pruned on
//! the way through so the map stays bounded.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// In-memory debounce cache.
pub struct Debounce {
    window: Duration,
    last_actions: DashMap<(i64, String), Instant>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_actions: DashMap::new(),
        }
    }

    /// Whether the action is allowed now. Records the attempt either way, so
    /// hammering a button keeps it suppressed.
    pub fn allow(&self, actor_id: i64, action: &str) -> bool {
        let now = Instant::now();
        let key = (actor_id, action.to_string());

        let allowed = match self.last_actions.get(&key) {
            Some(last) => now.duration_since(*last) >= self.window,
            None => true,
        };
        self.last_actions.insert(key, now);

        let horizon = self.window * 5;
        self.last_actions
            .retain(|_, last| now.duration_since(*last) <= horizon);

        if !allowed {
            tracing::debug!(actor_id, action, "Debounced repeated action");
        }
        allowed
    }

    /// Forget an action so the actor may immediately repeat it.
    pub fn clear(&self, actor_id: i64, action: &str) {
        self.last_actions.remove(&(actor_id, action.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_within_window_denied() {
        let debounce = Debounce::new(Duration::from_secs(2));
        assert!(debounce.allow(1, "accept_request_x"));
        assert!(!debounce.allow(1, "accept_request_x"));
        // Different actor or action is unaffected
        assert!(debounce.allow(2, "accept_request_x"));
        assert!(debounce.allow(1, "accept_request_y"));
    }

    #[test]
    fn test_clear_permits_repeat() {
        let debounce = Debounce::new(Duration::from_secs(2));
        assert!(debounce.allow(1, "menu"));
        debounce.clear(1, "menu");
        assert!(debounce.allow(1, "menu"));
    }

    #[test]
    fn test_zero_window_always_allows() {
        let debounce = Debounce::new(Duration::ZERO);
        assert!(debounce.allow(1, "menu"));
        assert!(debounce.allow(1, "menu"));
    }
}

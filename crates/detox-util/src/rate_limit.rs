//! Per-client request throttling for the control socket

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ClientId;

/// Fixed-window request counter keyed by client.
///
/// Each client may make `max_requests` calls per window; the window restarts
/// on the first call after it has elapsed.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: HashMap<ClientId, Window>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    used: u32,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: HashMap::new(),
        }
    }

    /// Count a request; `false` means the client is over its budget
    pub fn check(&mut self, client_id: &ClientId) -> bool {
        self.check_at(client_id, Instant::now())
    }

    pub fn check_at(&mut self, client_id: &ClientId, now: Instant) -> bool {
        let window = self.clients.entry(client_id.clone()).or_insert(Window {
            opened: now,
            used: 0,
        });

        if now.saturating_duration_since(window.opened) >= self.window {
            *window = Window {
                opened: now,
                used: 0,
            };
        }

        if window.used < self.max_requests {
            window.used += 1;
            true
        } else {
            false
        }
    }

    /// Forget a client that disconnected
    pub fn remove_client(&mut self, client_id: &ClientId) {
        self.clients.remove(client_id);
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_per_window() {
        let mut limiter = RateLimiter::new(30, Duration::from_secs(1));
        let client = ClientId::new();
        let t0 = Instant::now();

        assert!((0..30).all(|_| limiter.check_at(&client, t0)));
        assert!(!limiter.check_at(&client, t0 + Duration::from_millis(999)));

        // A new window opens once the old one has fully elapsed
        assert!(limiter.check_at(&client, t0 + Duration::from_secs(1)));
    }

    #[test]
    fn clients_are_independent() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(1));
        let busy = ClientId::new();
        let quiet = ClientId::new();

        assert!(limiter.check(&busy));
        assert!(!limiter.check(&busy));
        assert!(limiter.check(&quiet));
    }

    #[test]
    fn disconnect_forgets_client() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(1));
        let client = ClientId::new();

        limiter.check(&client);
        limiter.remove_client(&client);
        assert_eq!(limiter.tracked_clients(), 0);

        // Removal also resets the budget
        assert!(limiter.check(&client));
        assert_eq!(limiter.tracked_clients(), 1);
    }
}

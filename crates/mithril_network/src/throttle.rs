use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Failed-login limit inside the window before code 10 is returned.
pub const THROTTLE_LIMIT: usize = 5;

const WINDOW: Duration = Duration::from_secs(10);

/// Per-IP record of recent failed login attempts. Entries age out of the
/// window on query, so a quiet IP costs nothing.
#[derive(Default)]
pub struct LoginThrottle {
    attempts: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

impl LoginThrottle {
    /// Whether this IP has hit the failure limit.
    pub fn limited(&self, ip: IpAddr) -> bool {
        self.recent_at(ip, Instant::now()) >= THROTTLE_LIMIT
    }

    pub fn record(&self, ip: IpAddr) {
        self.record_at(ip, Instant::now());
    }

    pub(crate) fn recent_at(&self, ip: IpAddr, now: Instant) -> usize {
        let mut attempts = self.attempts.lock();
        let Some(entries) = attempts.get_mut(&ip) else {
            return 0;
        };
        entries.retain(|&at| now.duration_since(at) < WINDOW);
        if entries.is_empty() {
            attempts.remove(&ip);
            return 0;
        }
        entries.len()
    }

    pub(crate) fn record_at(&self, ip: IpAddr, now: Instant) {
        self.attempts.lock().entry(ip).or_default().push(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> IpAddr {
        [10, 0, 0, 1].into()
    }

    #[test]
    fn five_failures_trip_the_limit() {
        let throttle = LoginThrottle::default();
        let t0 = Instant::now();

        for _ in 0..THROTTLE_LIMIT - 1 {
            throttle.record_at(ip(), t0);
        }
        assert!(throttle.recent_at(ip(), t0) < THROTTLE_LIMIT);

        throttle.record_at(ip(), t0);
        assert_eq!(throttle.recent_at(ip(), t0), THROTTLE_LIMIT);
    }

    #[test]
    fn window_edge_empties_the_bucket() {
        let throttle = LoginThrottle::default();
        let t0 = Instant::now();

        for _ in 0..THROTTLE_LIMIT {
            throttle.record_at(ip(), t0);
        }

        // Just inside the window the attempts still count.
        let just_inside = t0 + Duration::from_millis(9_999);
        assert_eq!(throttle.recent_at(ip(), just_inside), THROTTLE_LIMIT);

        // At 10.001s the counter is effectively empty.
        let just_past = t0 + Duration::from_millis(10_001);
        assert_eq!(throttle.recent_at(ip(), just_past), 0);
    }

    #[test]
    fn ips_are_independent() {
        let throttle = LoginThrottle::default();
        let t0 = Instant::now();
        for _ in 0..THROTTLE_LIMIT {
            throttle.record_at(ip(), t0);
        }
        assert_eq!(throttle.recent_at([10, 0, 0, 2].into(), t0), 0);
    }
}

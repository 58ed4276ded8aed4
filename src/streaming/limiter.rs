//! Per-team image frame rate limiter
//!
//! Camera publishers push frames faster than dashboards can render
//! them. The limiter admits at most one frame per team per window and
//! silently drops the rest. The first frame for a team is always
//! admitted.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct FrameRateLimiter {
    window: Duration,
    last_admitted: Mutex<HashMap<String, Instant>>,
}

impl FrameRateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_admitted: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or drop a frame for `team_id` arriving now
    pub fn admit(&self, team_id: &str) -> bool {
        self.admit_at(team_id, Instant::now())
    }

    /// Admit or drop a frame arriving at `now` (injectable for tests)
    pub fn admit_at(&self, team_id: &str, now: Instant) -> bool {
        let mut last_admitted = self.last_admitted.lock();
        match last_admitted.get(team_id) {
            Some(&last) if now.duration_since(last) <= self.window => false,
            _ => {
                last_admitted.insert(team_id.to_string(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_always_admitted() {
        let limiter = FrameRateLimiter::new(Duration::from_millis(80));
        assert!(limiter.admit_at("TEAM_ASV_01", Instant::now()));
    }

    #[test]
    fn test_frames_inside_window_dropped() {
        let limiter = FrameRateLimiter::new(Duration::from_millis(80));
        let start = Instant::now();

        assert!(limiter.admit_at("TEAM_ASV_01", start));
        assert!(!limiter.admit_at("TEAM_ASV_01", start + Duration::from_millis(30)));
        assert!(!limiter.admit_at("TEAM_ASV_01", start + Duration::from_millis(80)));
        assert!(limiter.admit_at("TEAM_ASV_01", start + Duration::from_millis(81)));
    }

    #[test]
    fn test_drops_do_not_extend_window() {
        let limiter = FrameRateLimiter::new(Duration::from_millis(80));
        let start = Instant::now();

        assert!(limiter.admit_at("TEAM_ASV_01", start));
        // Dropped frame must not reset the stamp
        assert!(!limiter.admit_at("TEAM_ASV_01", start + Duration::from_millis(79)));
        assert!(limiter.admit_at("TEAM_ASV_01", start + Duration::from_millis(90)));
    }

    #[test]
    fn test_teams_limited_independently() {
        let limiter = FrameRateLimiter::new(Duration::from_millis(80));
        let start = Instant::now();

        assert!(limiter.admit_at("TEAM_ASV_01", start));
        assert!(limiter.admit_at("TEAM_ASV_02", start + Duration::from_millis(10)));
        assert!(!limiter.admit_at("TEAM_ASV_01", start + Duration::from_millis(20)));
        assert!(!limiter.admit_at("TEAM_ASV_02", start + Duration::from_millis(20)));
    }
}

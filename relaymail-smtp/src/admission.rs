//! Per-source connection admission.
//!
//! Each source address keeps the instants of its recent accepted attempts.
//! A new attempt is refused once the trailing window already holds
//! `max_attempts` of them. Records older than the horizon are pruned on
//! every check of that address.

use std::{
    net::IpAddr,
    time::{Duration, Instant},
};

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Number of tracked sources above which stale sources are swept.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionPolicy {
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: usize,

    #[serde(default = "defaults::window_secs")]
    pub window_secs: u64,

    #[serde(default = "defaults::horizon_secs")]
    pub horizon_secs: u64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            window_secs: defaults::window_secs(),
            horizon_secs: defaults::horizon_secs(),
        }
    }
}

impl AdmissionPolicy {
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// How long attempts are remembered. Never shorter than the window.
    pub const fn horizon(&self) -> Duration {
        let secs = if self.horizon_secs < self.window_secs {
            self.window_secs
        } else {
            self.horizon_secs
        };

        Duration::from_secs(secs)
    }
}

mod defaults {
    pub const fn max_attempts() -> usize {
        10
    }

    pub const fn window_secs() -> u64 {
        300
    }

    pub const fn horizon_secs() -> u64 {
        3600
    }
}

#[derive(Debug, Default)]
pub struct AdmissionController {
    policy: AdmissionPolicy,
    attempts: Mutex<AHashMap<IpAddr, Vec<Instant>>>,
}

impl AdmissionController {
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            policy,
            attempts: Mutex::default(),
        }
    }

    pub const fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// Decide whether a connection from `source` may proceed, recording it if so.
    pub fn allow(&self, source: IpAddr) -> bool {
        let mut attempts = self.attempts.lock();
        Self::check(&self.policy, &mut attempts, source, Instant::now())
    }

    /// [`AdmissionController::allow`] evaluated at `now`.
    ///
    /// An instant earlier than the last recorded attempt for `source` is
    /// treated as that attempt's instant, so records stay ordered.
    pub fn allow_at(&self, source: IpAddr, now: Instant) -> bool {
        let mut attempts = self.attempts.lock();
        Self::check(&self.policy, &mut attempts, source, now)
    }

    /// Number of sources currently holding a record.
    pub fn tracked_sources(&self) -> usize {
        self.attempts.lock().len()
    }

    fn check(
        policy: &AdmissionPolicy,
        attempts: &mut AHashMap<IpAddr, Vec<Instant>>,
        source: IpAddr,
        now: Instant,
    ) -> bool {
        let (window, horizon) = (policy.window(), policy.horizon());

        if attempts.len() > SWEEP_THRESHOLD {
            attempts.retain(|_, record| {
                record
                    .last()
                    .is_some_and(|last| now.saturating_duration_since(*last) < horizon)
            });
        }

        let record = attempts.entry(source).or_default();
        let now = record.last().map_or(now, |last| now.max(*last));

        record.retain(|at| now.duration_since(*at) < horizon);

        let recent = record
            .iter()
            .filter(|at| now.duration_since(**at) < window)
            .count();

        if recent >= policy.max_attempts {
            tracing::warn!(%source, recent, "Connection refused by admission control");
            return false;
        }

        record.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const SOURCE: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7));
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1));

    #[test]
    fn eleventh_attempt_in_window_is_refused() {
        let controller = AdmissionController::default();
        let start = Instant::now();

        for second in 0..10 {
            assert!(controller.allow_at(SOURCE, start + Duration::from_secs(second)));
        }

        assert!(!controller.allow_at(SOURCE, start + Duration::from_secs(10)));
    }

    #[test]
    fn attempt_after_window_is_allowed() {
        let controller = AdmissionController::default();
        let start = Instant::now();

        for _ in 0..10 {
            assert!(controller.allow_at(SOURCE, start));
        }
        assert!(!controller.allow_at(SOURCE, start + Duration::from_secs(299)));
        assert!(controller.allow_at(SOURCE, start + Duration::from_secs(300)));
    }

    #[test]
    fn sources_are_independent() {
        let controller = AdmissionController::default();
        let start = Instant::now();

        for _ in 0..10 {
            assert!(controller.allow_at(SOURCE, start));
        }

        assert!(!controller.allow_at(SOURCE, start));
        assert!(controller.allow_at(OTHER, start));
        assert_eq!(controller.tracked_sources(), 2);
    }

    #[test]
    fn refused_attempts_are_not_recorded() {
        let policy = AdmissionPolicy {
            max_attempts: 2,
            window_secs: 10,
            horizon_secs: 60,
        };
        let controller = AdmissionController::new(policy);
        let start = Instant::now();

        assert!(controller.allow_at(SOURCE, start));
        assert!(controller.allow_at(SOURCE, start + Duration::from_secs(5)));
        assert!(!controller.allow_at(SOURCE, start + Duration::from_secs(6)));
        // Only the first attempt has left the window.
        assert!(controller.allow_at(SOURCE, start + Duration::from_secs(10)));
        assert!(!controller.allow_at(SOURCE, start + Duration::from_secs(11)));
    }

    #[test]
    fn out_of_order_instants_are_clamped() {
        let policy = AdmissionPolicy {
            max_attempts: 1,
            window_secs: 10,
            horizon_secs: 60,
        };
        let controller = AdmissionController::new(policy);
        let start = Instant::now() + Duration::from_secs(100);

        assert!(controller.allow_at(SOURCE, start));
        assert!(!controller.allow_at(SOURCE, start - Duration::from_secs(50)));
        assert!(controller.allow_at(SOURCE, start + Duration::from_secs(10)));
    }

    #[test]
    fn horizon_never_shorter_than_window() {
        let policy = AdmissionPolicy {
            max_attempts: 1,
            window_secs: 300,
            horizon_secs: 10,
        };
        assert_eq!(policy.horizon(), Duration::from_secs(300));
    }

    #[test]
    fn concurrent_callers_share_the_limit() {
        let controller = std::sync::Arc::new(AdmissionController::default());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let controller = std::sync::Arc::clone(&controller);
                std::thread::spawn(move || (0..5).filter(|_| controller.allow(SOURCE)).count())
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 10);
    }
}

//! Server clock offset tracking.
//!
//! The server reports its time once at login and opportunistically on
//! keep-alive replies. All "current server time" reads are derived by adding
//! elapsed local monotonic time to the last recorded sample; the sample is
//! only ever replaced by a fresh observation.

use std::sync::Mutex;
use std::time::Instant;

#[derive(Clone, Copy)]
struct Sample {
    server_millis: i64,
    taken_at: Instant,
}

/// Per-session estimate of the server's wall clock.
#[derive(Default)]
pub struct ServerClock {
    sample: Mutex<Option<Sample>>,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh (server-time, local-time) observation.
    pub fn sync(&self, server_millis: i64) {
        if server_millis <= 0 {
            return;
        }
        let mut guard = self.sample.lock().expect("clock lock poisoned");
        *guard = Some(Sample {
            server_millis,
            taken_at: Instant::now(),
        });
    }

    /// Estimated server time in milliseconds. Falls back to the local wall
    /// clock until the first observation arrives.
    pub fn now_millis(&self) -> i64 {
        let guard = self.sample.lock().expect("clock lock poisoned");
        match *guard {
            Some(sample) => {
                let elapsed = sample.taken_at.elapsed().as_millis() as i64;
                sample.server_millis + elapsed
            }
            None => chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Estimated server time in whole seconds.
    pub fn now_secs(&self) -> i64 {
        self.now_millis() / 1000
    }

    /// True once at least one server observation has been recorded.
    pub fn is_synced(&self) -> bool {
        self.sample.lock().expect("clock lock poisoned").is_some()
    }
}

/// Normalize a raw server timestamp to seconds.
///
/// The protocol mixes second- and millisecond-precision fields; anything
/// above 1e12 is a millisecond value.
pub fn norm_secs(raw: i64) -> i64 {
    if raw <= 0 {
        return 0;
    }
    if raw > 1_000_000_000_000 {
        raw / 1000
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsynced_falls_back_to_local_time() {
        let clock = ServerClock::new();
        assert!(!clock.is_synced());
        let local = chrono::Utc::now().timestamp_millis();
        let got = clock.now_millis();
        assert!((got - local).abs() < 5_000);
    }

    #[test]
    fn test_sync_anchors_server_time() {
        let clock = ServerClock::new();
        clock.sync(1_700_000_000_000);
        assert!(clock.is_synced());
        let got = clock.now_millis();
        assert!(got >= 1_700_000_000_000);
        assert!(got < 1_700_000_005_000);
    }

    #[test]
    fn test_sync_ignores_zero_sample() {
        let clock = ServerClock::new();
        clock.sync(0);
        assert!(!clock.is_synced());
    }

    #[test]
    fn test_norm_secs_passes_seconds_through() {
        assert_eq!(norm_secs(1_700_000_000), 1_700_000_000);
    }

    #[test]
    fn test_norm_secs_converts_millis() {
        assert_eq!(norm_secs(1_700_000_000_123), 1_700_000_000);
    }

    #[test]
    fn test_norm_secs_clamps_non_positive() {
        assert_eq!(norm_secs(0), 0);
        assert_eq!(norm_secs(-5), 0);
    }
}

//! # Throttled Logging Utilities
//!
//! Rate-limited logging helpers used by the PHY driver and MAC engine to
//! avoid flooding logs when a flaky link keeps producing the same warning.
//!
//! ## Usage
//!
//! ```rust
//! use loramac_rs::util::logging::LogThrottle;
//!
//! let mut throttle = LogThrottle::new(1000, 5); // 5 messages per second
//! if throttle.allow() {
//!     log::warn!("radio_err received");
//! }
//! ```

use std::collections::HashMap;
use std::time::Instant;

/// Throttling structure for rate-limiting log messages.
#[derive(Debug)]
pub struct LogThrottle {
    /// Time window for throttling (in milliseconds)
    window_ms: u64,
    /// Maximum messages allowed per window
    cap: u32,
    /// Current message count in window
    count: u32,
    /// Start time of current window
    t0: Instant,
}

impl LogThrottle {
    /// Create new throttle with time window and message cap.
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            t0: Instant::now(),
        }
    }

    /// Check if logging is allowed (resets counter after window expires).
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.t0).as_millis() as u64;

        if elapsed_ms > self.window_ms {
            self.t0 = now;
            self.count = 0;
        }

        self.count += 1;
        self.count <= self.cap
    }

    /// Get current throttle statistics.
    pub fn stats(&self) -> ThrottleStats {
        ThrottleStats {
            window_ms: self.window_ms,
            cap: self.cap,
            count: self.count,
            window_remaining_ms: self
                .window_ms
                .saturating_sub(self.t0.elapsed().as_millis() as u64),
        }
    }

    /// Reset the throttle (start new window immediately).
    pub fn reset(&mut self) {
        self.t0 = Instant::now();
        self.count = 0;
    }
}

/// Statistics about a log throttle instance.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleStats {
    pub window_ms: u64,
    pub cap: u32,
    pub count: u32,
    pub window_remaining_ms: u64,
}

/// Per-category throttle manager, so unrelated warnings don't steal each
/// other's quota.
#[derive(Debug)]
pub struct ThrottleManager {
    throttles: HashMap<String, LogThrottle>,
}

impl ThrottleManager {
    pub fn new() -> Self {
        Self {
            throttles: HashMap::new(),
        }
    }

    pub fn allow(&mut self, category: &str, window_ms: u64, cap: u32) -> bool {
        let throttle = self
            .throttles
            .entry(category.to_string())
            .or_insert_with(|| LogThrottle::new(window_ms, cap));

        throttle.allow()
    }

    pub fn all_stats(&self) -> HashMap<String, ThrottleStats> {
        self.throttles
            .iter()
            .map(|(k, v)| (k.clone(), v.stats()))
            .collect()
    }

    pub fn reset_all(&mut self) {
        for throttle in self.throttles.values_mut() {
            throttle.reset();
        }
    }
}

impl Default for ThrottleManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Log frame data in hex format for debugging, capped to avoid flooding logs
/// with large payloads.
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 64;

    let display_data = if data.len() > MAX_LOG_BYTES {
        &data[..MAX_LOG_BYTES]
    } else {
        data
    };

    let hex_str = crate::util::hex::format_hex_compact(display_data);
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" ... ({} bytes total)", data.len())
    } else {
        String::new()
    };

    log::debug!("{prefix}: {hex_str}{suffix}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_throttle_basic() {
        let mut throttle = LogThrottle::new(1000, 3);

        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow());
        assert!(!throttle.allow());
    }

    #[test]
    fn test_log_throttle_reset() {
        let mut throttle = LogThrottle::new(1000, 2);

        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow());

        throttle.reset();
        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow());
    }

    #[test]
    fn test_throttle_manager() {
        let mut manager = ThrottleManager::new();

        assert!(manager.allow("crc_errors", 1000, 2));
        assert!(manager.allow("frame_errors", 1000, 2));
        assert!(manager.allow("crc_errors", 1000, 2));
        assert!(!manager.allow("crc_errors", 1000, 2));
        assert!(manager.allow("frame_errors", 1000, 2));
    }

    #[test]
    fn test_throttle_stats() {
        let mut throttle = LogThrottle::new(1000, 5);
        throttle.allow();
        throttle.allow();

        let stats = throttle.stats();
        assert_eq!(stats.window_ms, 1000);
        assert_eq!(stats.cap, 5);
        assert_eq!(stats.count, 2);
    }
}

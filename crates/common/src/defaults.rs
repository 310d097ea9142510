use serde::{Deserialize, Serialize};

use crate::timeout::Timeout;

pub const DEFAULT_TIMEOUT: Timeout = Timeout::from_secs(20);
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_WAIT: Timeout = Timeout::from_secs(1);
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_PING_COUNT: u32 = 10;
pub const DEFAULT_PING_INTERVAL: Timeout = Timeout::from_millis(100);
pub const DEFAULT_PING_SIZE: usize = 64;

/// Execution parameters inherited by bundles, and through them by checks,
/// whenever a value is left unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionDefaults {
    pub timeout: Timeout,
    pub retries: u32,
    pub wait: Timeout,
    pub concurrency: usize,
}

impl Default for ExecutionDefaults {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            wait: DEFAULT_WAIT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ExecutionDefaults {
    /// Replaces any zero or negative value with its hardcoded default.
    pub fn sanitized(self) -> Self {
        Self {
            timeout: self.timeout.or(DEFAULT_TIMEOUT),
            retries: if self.retries == 0 { DEFAULT_RETRIES } else { self.retries },
            wait: self.wait.or(DEFAULT_WAIT),
            concurrency: if self.concurrency == 0 {
                DEFAULT_CONCURRENCY
            } else {
                self.concurrency
            },
        }
    }
}

/// Echo parameters for ICMP probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingSettings {
    pub count: u32,
    pub interval: Timeout,
    pub size: usize,
}

impl Default for PingSettings {
    fn default() -> Self {
        Self {
            count: DEFAULT_PING_COUNT,
            interval: DEFAULT_PING_INTERVAL,
            size: DEFAULT_PING_SIZE,
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::check::Check;
use crate::defaults::{ExecutionDefaults, DEFAULT_CONCURRENCY, DEFAULT_RETRIES, DEFAULT_TIMEOUT, DEFAULT_WAIT};
use crate::outcome::CheckResult;
use crate::timeout::Timeout;

fn is_unset(value: &i64) -> bool {
    *value == 0
}

/// An ordered set of checks sharing execution defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Timeout::is_zero")]
    pub timeout: Timeout,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub retries: i64,
    #[serde(default, skip_serializing_if = "Timeout::is_zero")]
    pub wait: Timeout,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub concurrency: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<Check>,
}

impl Bundle {
    /// Fills every unset or non-positive bundle-level value from `defaults`.
    pub fn apply_defaults(&mut self, defaults: &ExecutionDefaults) {
        let defaults = defaults.sanitized();
        self.timeout = self.timeout.or(defaults.timeout);
        self.wait = self.wait.or(defaults.wait);
        if self.retries < 1 {
            self.retries = i64::from(defaults.retries);
        }
        if self.concurrency < 1 {
            self.concurrency = i64::try_from(defaults.concurrency).unwrap_or(i64::MAX);
        }
    }

    /// Number of concurrent workers to run this bundle with; at least one.
    pub fn concurrency(&self) -> usize {
        if self.concurrency < 1 {
            DEFAULT_CONCURRENCY
        } else {
            usize::try_from(self.concurrency).unwrap_or(usize::MAX)
        }
    }

    /// A copy of `check` with its unset timing fields taken from the bundle.
    ///
    /// Values the bundle itself leaves unset fall back to the hardcoded
    /// defaults, so the returned check always has a positive timeout, wait
    /// and retry count.
    pub fn resolve(&self, check: &Check) -> Check {
        let mut resolved = check.clone();
        resolved.timeout = check.timeout.or(self.timeout).or(DEFAULT_TIMEOUT);
        resolved.wait = check.wait.or(self.wait).or(DEFAULT_WAIT);
        if resolved.retries < 1 {
            resolved.retries = if self.retries < 1 {
                i64::from(DEFAULT_RETRIES)
            } else {
                self.retries
            };
        }
        resolved.outcome = None;
        resolved.cause = None;
        resolved.actions.clear();
        resolved
    }

    /// Writes results back into the checks they were produced for.
    pub fn record(&mut self, results: Vec<CheckResult>) {
        for result in results {
            if let Some(check) = self.checks.get_mut(result.id) {
                check.record(result.outcome, result.actions);
            }
        }
    }

    /// Whether every check has run and passed.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed() == Some(true))
    }
}

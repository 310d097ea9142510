use std::time::Duration;
use tracing::{debug, warn};

use netcheck_common::{Check, Outcome, ProbeError};

use crate::probes::Probe;
use crate::shutdown::Shutdown;

/// The final outcome of a check together with how many probe attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted {
    pub outcome: Outcome,
    pub attempts: u32,
}

/// Runs `check` through `probe` until it succeeds or its attempts run out,
/// sleeping the check's wait between failed attempts.
///
/// The reported failure is always the one from the last attempt made. A
/// shutdown observed before an attempt or during a wait ends the loop with
/// [`ProbeError::Cancelled`].
pub async fn run_with_retries(
    probe: &dyn Probe,
    id: usize,
    check: &Check,
    shutdown: &mut Shutdown,
) -> Attempted {
    let max_attempts = check.attempts();
    let wait = check.wait.to_std().unwrap_or(Duration::ZERO);
    let mut attempts = 0;

    loop {
        if shutdown.is_signalled() {
            debug!(check_id = id, address = %check.address, "Shutdown requested, cancelling check.");
            return Attempted {
                outcome: Outcome::Failure(ProbeError::Cancelled),
                attempts,
            };
        }

        attempts += 1;
        let error = match probe.probe(check).await {
            Ok(()) => {
                return Attempted {
                    outcome: Outcome::Success,
                    attempts,
                }
            }
            Err(error) => error,
        };
        warn!(
            check_id = id,
            address = %check.address,
            protocol = %check.protocol,
            attempt = attempts,
            max_attempts,
            error = %error,
            "Check attempt failed."
        );

        if attempts >= max_attempts {
            return Attempted {
                outcome: Outcome::Failure(error),
                attempts,
            };
        }

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.signalled() => {
                return Attempted {
                    outcome: Outcome::Failure(ProbeError::Cancelled),
                    attempts,
                };
            }
        }
    }
}

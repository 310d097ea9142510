use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use netcheck_common::{Action, Bundle, Check, CheckResult, Outcome, ProbeError};

use crate::probes::Probe;
use crate::retry::run_with_retries;
use crate::shutdown::Shutdown;
use crate::trigger::run_triggers;

type Job = (usize, Check);

/// Fans a bundle's checks out over a bounded pool of worker tasks and
/// collects exactly one result per check.
#[derive(Clone)]
pub struct Dispatcher {
    probe: Arc<dyn Probe>,
    triggers: bool,
    shutdown: Shutdown,
}

impl Dispatcher {
    pub fn new(probe: Arc<dyn Probe>) -> Self {
        Self {
            probe,
            triggers: true,
            shutdown: Shutdown::never(),
        }
    }

    /// Whether checks run their triggers once their outcome is known.
    pub fn with_triggers(mut self, enabled: bool) -> Self {
        self.triggers = enabled;
        self
    }

    /// Checks still queued or waiting between attempts once `true` is sent
    /// on this channel finish as cancelled.
    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = Shutdown::new(rx);
        self
    }

    /// Runs every check of `bundle` and returns their results ordered by
    /// check index.
    pub async fn run(&self, bundle: &Bundle) -> Vec<CheckResult> {
        let total = bundle.checks.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = bundle.concurrency().min(total);
        info!(bundle = %bundle.id, checks = total, workers, "Running bundle.");

        let (job_tx, job_rx) = mpsc::channel::<Job>(total);
        let (result_tx, mut result_rx) = mpsc::channel::<CheckResult>(total);
        let job_rx = Arc::new(Mutex::new(job_rx));

        for (id, check) in bundle.checks.iter().enumerate() {
            if job_tx.send((id, bundle.resolve(check))).await.is_err() {
                error!(check_id = id, "Job queue closed before submission finished.");
                break;
            }
        }
        drop(job_tx);

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&job_rx),
                    result_tx.clone(),
                    Arc::clone(&self.probe),
                    self.triggers,
                    self.shutdown.clone(),
                ))
            })
            .collect();
        drop(result_tx);

        let mut slots: Vec<Option<CheckResult>> = vec![None; total];
        while let Some(result) = result_rx.recv().await {
            let id = result.id;
            match slots.get_mut(id) {
                Some(slot) if slot.is_none() => *slot = Some(result),
                _ => error!(check_id = id, "Discarding unexpected result."),
            }
        }

        for (worker, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = joined {
                error!(worker, error = %e, "Worker task ended abnormally.");
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(id, slot)| {
                slot.unwrap_or_else(|| {
                    let check = &bundle.checks[id];
                    error!(check_id = id, address = %check.address, "Check produced no result.");
                    CheckResult {
                        id,
                        protocol: check.protocol,
                        endpoint: check.address.clone(),
                        outcome: Outcome::Failure(ProbeError::Aborted(
                            "worker stopped before reporting a result".to_string(),
                        )),
                        actions: Vec::new(),
                    }
                })
            })
            .collect()
    }

    /// Runs `bundle` and stores each result in the check it belongs to.
    pub async fn run_bundle(&self, bundle: &mut Bundle) {
        let results = self.run(bundle).await;
        bundle.record(results);
    }
}

/// Probes one check with retries, then runs the triggers its outcome selects.
async fn run_check(
    probe: &dyn Probe,
    id: usize,
    check: &Check,
    triggers: bool,
    shutdown: &mut Shutdown,
) -> (Outcome, Vec<Action>) {
    let attempted = run_with_retries(probe, id, check, shutdown).await;
    let cancelled = matches!(attempted.outcome, Outcome::Failure(ProbeError::Cancelled));
    let actions = if triggers && !cancelled {
        run_triggers(&check.triggers, attempted.outcome.is_success(), check.timeout).await
    } else {
        Vec::new()
    };
    (attempted.outcome, actions)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn worker_loop(
    worker: usize,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<CheckResult>,
    probe: Arc<dyn Probe>,
    triggers: bool,
    mut shutdown: Shutdown,
) {
    loop {
        let job = { jobs.lock().await.recv().await };
        let Some((id, check)) = job else { break };
        debug!(worker, check_id = id, address = %check.address, "Worker picked up check.");

        let step = run_check(probe.as_ref(), id, &check, triggers, &mut shutdown);
        let (outcome, actions) = match AssertUnwindSafe(step).catch_unwind().await {
            Ok(done) => done,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(worker, check_id = id, panic = %message, "Check panicked; worker continues.");
                (
                    Outcome::Failure(ProbeError::Aborted(format!("probe panicked: {message}"))),
                    Vec::new(),
                )
            }
        };

        let result = CheckResult {
            id,
            protocol: check.protocol,
            endpoint: check.address,
            outcome,
            actions,
        };
        if results.send(result).await.is_err() {
            error!(worker, check_id = id, "Result queue closed; stopping worker.");
            break;
        }
    }
    debug!(worker, "Worker finished.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netcheck_common::{Event, Protocol, Timeout, Trigger};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Passes checks on even ports and refuses the rest.
    struct EvenPorts {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Probe for EvenPorts {
        async fn probe(&self, check: &Check) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            let port: u32 = check.address.rsplit(':').next().unwrap().parse().unwrap();
            if port % 2 == 0 {
                Ok(())
            } else {
                Err(ProbeError::Dial {
                    address: check.address.clone(),
                    protocol: check.protocol.to_string(),
                    reason: "refused".to_string(),
                })
            }
        }
    }

    struct Panicking;

    #[async_trait]
    impl Probe for Panicking {
        async fn probe(&self, check: &Check) -> Result<(), ProbeError> {
            if check.address.ends_with(":1003") {
                panic!("probe blew up");
            }
            Ok(())
        }
    }

    struct Never;

    #[async_trait]
    impl Probe for Never {
        async fn probe(&self, _check: &Check) -> Result<(), ProbeError> {
            std::future::pending().await
        }
    }

    fn bundle(checks: usize, concurrency: i64) -> Bundle {
        Bundle {
            id: "pool".to_string(),
            concurrency,
            retries: 1,
            wait: Timeout::from_millis(1),
            checks: (0..checks)
                .map(|i| Check::new(Protocol::Tcp, format!("127.0.0.1:{}", 1000 + i)))
                .collect(),
            ..Bundle::default()
        }
    }

    #[tokio::test]
    async fn every_check_yields_exactly_one_result() {
        let checks = 7;
        for concurrency in 1..=(checks as i64 + 5) {
            let probe = Arc::new(EvenPorts {
                calls: AtomicUsize::new(0),
            });
            let dispatcher = Dispatcher::new(probe.clone());
            let results = dispatcher.run(&bundle(checks, concurrency)).await;

            assert_eq!(results.len(), checks);
            let ids: HashSet<usize> = results.iter().map(|r| r.id).collect();
            assert_eq!(ids.len(), checks);
            for result in &results {
                assert_eq!(result.endpoint, format!("127.0.0.1:{}", 1000 + result.id));
                assert_eq!(result.is_success(), result.id % 2 == 0);
            }
            assert_eq!(probe.calls.load(Ordering::SeqCst), checks);
        }
    }

    #[tokio::test]
    async fn empty_bundle_runs_nothing() {
        let dispatcher = Dispatcher::new(Arc::new(Never));
        assert!(dispatcher.run(&bundle(0, 3)).await.is_empty());
    }

    #[tokio::test]
    async fn outcomes_are_written_back_by_index() {
        let mut bundle = bundle(4, 2);
        let dispatcher = Dispatcher::new(Arc::new(EvenPorts {
            calls: AtomicUsize::new(0),
        }));
        dispatcher.run_bundle(&mut bundle).await;

        let passed: Vec<Option<bool>> = bundle.checks.iter().map(Check::passed).collect();
        assert_eq!(passed, [Some(true), Some(false), Some(true), Some(false)]);
        assert!(!bundle.passed());
    }

    #[tokio::test]
    async fn panic_aborts_only_its_own_check() {
        let bundle = bundle(5, 1);
        let results = Dispatcher::new(Arc::new(Panicking)).run(&bundle).await;

        assert_eq!(results.len(), 5);
        for result in &results {
            if result.id == 3 {
                match &result.outcome {
                    Outcome::Failure(ProbeError::Aborted(reason)) => {
                        assert!(reason.contains("probe blew up"), "{reason}")
                    }
                    other => panic!("expected check 3 to abort, got {other:?}"),
                }
            } else {
                assert!(result.is_success(), "check {} stranded: {}", result.id, result.outcome);
            }
        }
    }

    #[tokio::test]
    async fn panic_on_first_check_leaves_the_queue_running() {
        struct FirstPanics;

        #[async_trait]
        impl Probe for FirstPanics {
            async fn probe(&self, check: &Check) -> Result<(), ProbeError> {
                if check.address.ends_with(":1000") {
                    panic!("first check blew up");
                }
                Ok(())
            }
        }

        let results = Dispatcher::new(Arc::new(FirstPanics)).run(&bundle(4, 1)).await;
        assert!(matches!(
            results[0].outcome,
            Outcome::Failure(ProbeError::Aborted(_))
        ));
        assert!(results[1..].iter().all(CheckResult::is_success));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_waiting_checks() {
        let (tx, rx) = watch::channel(false);
        let mut bundle = bundle(3, 1);
        bundle.retries = 5;
        bundle.wait = Timeout::from_secs(3600);
        let dispatcher = Dispatcher::new(Arc::new(EvenPorts {
            calls: AtomicUsize::new(0),
        }))
        .with_shutdown(rx);

        let run = dispatcher.run(&bundle);
        let signal = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(true).unwrap();
        };
        let (results, ()) = tokio::join!(run, signal);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_success());
        assert_eq!(results[1].outcome, Outcome::Failure(ProbeError::Cancelled));
        assert_eq!(results[2].outcome, Outcome::Failure(ProbeError::Cancelled));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_check_runs_only_its_failure_trigger() {
        let mut bundle = bundle(2, 2);
        let trigger = |on: Event, text: &str| Trigger {
            on,
            command: "echo".to_string(),
            args: vec![text.to_string()],
            timeout: Timeout::from_secs(5),
        };
        bundle.checks[1].triggers = vec![
            trigger(Event::Success, "recovered"),
            trigger(Event::Failure, "down"),
        ];

        let results = Dispatcher::new(Arc::new(EvenPorts {
            calls: AtomicUsize::new(0),
        }))
        .run(&bundle)
        .await;
        assert_eq!(results[1].actions.len(), 1);
        assert_eq!(results[1].actions[0].stdout, "down\n");

        let silent = Dispatcher::new(Arc::new(EvenPorts {
            calls: AtomicUsize::new(0),
        }))
        .with_triggers(false)
        .run(&bundle)
        .await;
        assert!(silent[1].actions.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_trigger_is_bounded_by_the_check_timeout() {
        let mut bundle = bundle(1, 1);
        bundle.checks[0].address = "127.0.0.1:1001".to_string();
        bundle.checks[0].timeout = Timeout::from_millis(100);
        bundle.checks[0].triggers = vec![Trigger {
            on: Event::Failure,
            command: "sleep".to_string(),
            args: vec!["30".to_string()],
            timeout: Timeout::ZERO,
        }];
        let dispatcher = Dispatcher::new(Arc::new(EvenPorts {
            calls: AtomicUsize::new(0),
        }));

        let results = tokio::time::timeout(Duration::from_secs(10), dispatcher.run(&bundle))
            .await
            .expect("run finishes once the trigger times out");
        assert!(!results[0].is_success());
        assert!(results[0].actions.is_empty());
    }
}

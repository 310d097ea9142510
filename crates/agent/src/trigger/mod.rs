//! Post-check hooks: external commands run according to a check's outcome.
mod encoding;
mod execution;

pub use encoding::decode_output;
pub use execution::{execute, TriggerError};

use tracing::{debug, error};

use netcheck_common::{Action, Timeout, Trigger};

/// Runs, in declaration order, every trigger whose event matches the outcome.
///
/// Triggers without a timeout of their own are bounded by `fallback`, the
/// check's resolved timeout. A trigger that fails to execute is logged and
/// contributes no action; it never affects the check or the remaining
/// triggers.
pub async fn run_triggers(
    triggers: &[Trigger],
    passed: bool,
    fallback: Timeout,
) -> Vec<Action> {
    let mut actions = Vec::new();
    for trigger in triggers {
        if !trigger.on.fires(passed) {
            debug!(on = %trigger.on, passed, "Trigger does not fire for this outcome.");
            continue;
        }
        match execute(trigger, fallback).await {
            Ok(action) => actions.push(action),
            Err(e) => error!(on = %trigger.on, error = %e, "Failed to execute trigger."),
        }
    }
    actions
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use netcheck_common::Event;

    fn echo(on: Event, text: &str) -> Trigger {
        Trigger {
            on,
            command: "echo".to_string(),
            args: vec![text.to_string()],
            timeout: Timeout::from_secs(5),
        }
    }

    #[tokio::test]
    async fn only_matching_triggers_fire() {
        let triggers = vec![
            echo(Event::Success, "up"),
            echo(Event::Failure, "down"),
            echo(Event::Always, "done"),
        ];

        let failed = run_triggers(&triggers, false, Timeout::from_secs(5)).await;
        let outputs: Vec<&str> = failed.iter().map(|a| a.stdout.as_str()).collect();
        assert_eq!(outputs, ["down\n", "done\n"]);

        let passed = run_triggers(&triggers, true, Timeout::from_secs(5)).await;
        let outputs: Vec<&str> = passed.iter().map(|a| a.stdout.as_str()).collect();
        assert_eq!(outputs, ["up\n", "done\n"]);
    }

    #[tokio::test]
    async fn broken_trigger_does_not_block_the_rest() {
        let mut broken = echo(Event::Always, "unused");
        broken.command = "netcheck-no-such-program".to_string();
        let triggers = vec![broken, echo(Event::Always, "still runs")];

        let actions = run_triggers(&triggers, true, Timeout::from_secs(5)).await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].stdout, "still runs\n");
        assert_eq!(actions[0].exit_code, 0);
    }

    #[tokio::test]
    async fn non_zero_exit_is_recorded() {
        let failing = Trigger {
            on: Event::Failure,
            command: "false".to_string(),
            args: Vec::new(),
            timeout: Timeout::ZERO,
        };
        let actions = run_triggers(&[failing], false, Timeout::from_secs(5)).await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].exit_code, 1);
        assert_eq!(actions[0].command, ["false"]);
    }

    #[tokio::test]
    async fn hung_trigger_without_timeout_does_not_stall_the_rest() {
        let hung = Trigger {
            on: Event::Failure,
            command: "sleep".to_string(),
            args: vec!["30".to_string()],
            timeout: Timeout::ZERO,
        };
        let triggers = vec![hung, echo(Event::Failure, "after")];

        let actions = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            run_triggers(&triggers, false, Timeout::from_millis(100)),
        )
        .await
        .expect("triggers are bounded by the check timeout");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].stdout, "after\n");
    }
}

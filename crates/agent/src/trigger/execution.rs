use std::ffi::OsString;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempPath;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use netcheck_common::defaults::DEFAULT_TIMEOUT;
use netcheck_common::{Action, Timeout, Trigger};

use super::encoding::decode_output;

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("'{command}' did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("failed to stage inline script: {0}")]
    Script(#[source] io::Error),
    #[error("inline scripts need the SHELL environment variable to be set")]
    NoShell,
    #[error("failed to wait for '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Writes an inline script to a temporary file that lives as long as the
/// returned path.
async fn stage_script(content: &str) -> Result<TempPath, TriggerError> {
    let path = tempfile::Builder::new()
        .prefix("netcheck-trigger-")
        .tempfile()
        .map_err(TriggerError::Script)?
        .into_temp_path();
    tokio::fs::write(&path, content)
        .await
        .map_err(TriggerError::Script)?;
    Ok(path)
}

/// Builds the program invocation for a trigger, plus the staged script that
/// must outlive the process when the trigger is inline.
async fn invocation(
    trigger: &Trigger,
    shell: Option<OsString>,
) -> Result<(Vec<String>, Command, Option<TempPath>), TriggerError> {
    if trigger.is_script() {
        let shell = shell.ok_or(TriggerError::NoShell)?;
        let script = stage_script(&trigger.command).await?;
        let mut command = Command::new(&shell);
        command.arg(&*script).args(&trigger.args);

        let mut command_line = vec![
            shell.to_string_lossy().into_owned(),
            script.to_string_lossy().into_owned(),
        ];
        command_line.extend(trigger.args.iter().cloned());
        return Ok((command_line, command, Some(script)));
    }

    let mut command = Command::new(&trigger.command);
    command.args(&trigger.args);
    let mut command_line = vec![trigger.command.clone()];
    command_line.extend(trigger.args.iter().cloned());
    Ok((command_line, command, None))
}

/// Runs one trigger's command to completion and records what it did.
///
/// The trigger's own timeout bounds the command; when it has none, `fallback`
/// does, and `DEFAULT_TIMEOUT` when that is unset too. A command that runs and
/// exits non-zero still yields an [`Action`]; only failing to start, wait for
/// or finish the command in time is an error.
pub async fn execute(trigger: &Trigger, fallback: Timeout) -> Result<Action, TriggerError> {
    let (command_line, mut command, _script) =
        invocation(trigger, std::env::var_os("SHELL")).await?;
    let command_text = command_line.join(" ");
    let limit = trigger
        .timeout
        .or(fallback)
        .or(DEFAULT_TIMEOUT)
        .to_std()
        .unwrap_or(Duration::from_secs(20));

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| TriggerError::Spawn {
        command: command_text.clone(),
        source,
    })?;
    debug!(pid = ?child.id(), command = %command_text, timeout = ?limit, "Spawned trigger command.");

    let output = tokio::time::timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| TriggerError::Timeout {
            command: command_text.clone(),
            timeout: limit,
        })?
        .map_err(|source| TriggerError::Wait {
            command: command_text.clone(),
            source,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    info!(command = %command_text, exit_code, "Trigger command finished.");
    Ok(Action {
        command: command_line,
        exit_code,
        stdout: decode_output(&output.stdout),
        stderr: decode_output(&output.stderr),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use netcheck_common::Event;

    fn trigger(command: &str, args: &[&str]) -> Trigger {
        Trigger {
            on: Event::Always,
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout: Timeout::ZERO,
        }
    }

    #[tokio::test]
    async fn captures_exit_code_and_both_streams() {
        let command = trigger("sh", &["-c", "echo out; echo err >&2; exit 3"]);
        let action = execute(&command, Timeout::ZERO).await.unwrap();
        assert_eq!(action.exit_code, 3);
        assert_eq!(action.stdout, "out\n");
        assert_eq!(action.stderr, "err\n");
        assert_eq!(action.command[0], "sh");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let error = execute(&trigger("netcheck-no-such-program", &[]), Timeout::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(error, TriggerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn slow_command_is_stopped_at_its_timeout() {
        let mut slow = trigger("sleep", &["5"]);
        slow.timeout = Timeout::from_millis(100);
        let error = execute(&slow, Timeout::from_secs(30)).await.unwrap_err();
        assert!(matches!(error, TriggerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn command_without_timeout_is_bounded_by_the_fallback() {
        let hung = trigger("sleep", &["30"]);
        let started = std::time::Instant::now();
        let error = execute(&hung, Timeout::from_millis(100)).await.unwrap_err();

        match error {
            TriggerError::Timeout { timeout, .. } => {
                assert_eq!(timeout, Duration::from_millis(100))
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn inline_script_runs_through_the_shell() {
        let script = trigger("#!/bin/sh\necho \"hello $1\"\n", &["world"]);
        let (command_line, mut command, staged) =
            invocation(&script, Some(OsString::from("/bin/sh"))).await.unwrap();
        assert_eq!(command_line[0], "/bin/sh");
        assert_eq!(command_line.last().map(String::as_str), Some("world"));

        let output = command.output().await.unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello world\n");
        drop(staged);
    }

    #[tokio::test]
    async fn inline_script_without_shell_is_rejected() {
        let script = trigger("#!/bin/sh\ntrue\n", &[]);
        assert!(matches!(
            invocation(&script, None).await,
            Err(TriggerError::NoShell)
        ));
    }
}

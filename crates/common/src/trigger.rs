use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::timeout::Timeout;

/// The outcome a trigger reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Success,
    Failure,
    Always,
}

impl Event {
    /// Whether a trigger bound to this event fires for a check that passed
    /// (`true`) or failed (`false`).
    pub fn fires(&self, passed: bool) -> bool {
        match self {
            Event::Success => passed,
            Event::Failure => !passed,
            Event::Always => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Success => "success",
            Event::Failure => "failure",
            Event::Always => "always",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "success" => Ok(Event::Success),
            "failure" => Ok(Event::Failure),
            "always" => Ok(Event::Always),
            other => Err(ParseError::Event(other.to_string())),
        }
    }
}

/// A post-check hook: an external command run when the check's outcome
/// matches `on`.
///
/// A `command` starting with `#!` is an inline script rather than a program
/// name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub on: Event,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Execution limit for the command; zero means the check's own timeout.
    #[serde(default, skip_serializing_if = "Timeout::is_zero")]
    pub timeout: Timeout,
}

impl Trigger {
    pub fn is_script(&self) -> bool {
        self.command.trim_start().starts_with("#!")
    }
}

/// What running a trigger produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub command: Vec<String>,
    #[serde(rename = "exitcode")]
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

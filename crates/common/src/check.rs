use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;
use crate::protocol::Protocol;
use crate::timeout::Timeout;
use crate::trigger::{Action, Trigger};

fn is_unset(value: &i64) -> bool {
    *value == 0
}

/// A single reachability probe: what to dial and how hard to try.
///
/// Timing fields left at zero (or set negative) inherit the bundle's values
/// when the check is submitted; see [`crate::Bundle::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Timeout::is_zero")]
    pub timeout: Timeout,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub retries: i64,
    #[serde(default, skip_serializing_if = "Timeout::is_zero")]
    pub wait: Timeout,
    pub address: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
    /// Filled in once the check has run.
    #[serde(
        default,
        rename = "result",
        skip_deserializing,
        skip_serializing_if = "Option::is_none"
    )]
    pub outcome: Option<Outcome>,
    /// Stable tag of the failure cause, set together with `outcome`.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

impl Check {
    pub fn new(protocol: Protocol, address: impl Into<String>) -> Self {
        Self {
            protocol,
            address: address.into(),
            ..Self::default()
        }
    }

    /// Effective number of attempts; never below one.
    pub fn attempts(&self) -> u32 {
        u32::try_from(self.retries.max(1)).unwrap_or(u32::MAX)
    }

    /// Display label: the name when present, the address otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }

    /// Stores the outcome of a finished run along with its cause tag and the
    /// actions its triggers produced.
    pub fn record(&mut self, outcome: Outcome, actions: Vec<Action>) {
        self.cause = outcome.error().map(|error| error.kind().to_string());
        self.outcome = Some(outcome);
        self.actions = actions;
    }

    pub fn passed(&self) -> Option<bool> {
        self.outcome.as_ref().map(Outcome::is_success)
    }
}

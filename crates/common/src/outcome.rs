use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::error::ProbeError;
use crate::protocol::Protocol;
use crate::trigger::Action;

/// Final verdict of a check: success, or the cause of the last failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(ProbeError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn error(&self) -> Option<&ProbeError> {
        match self {
            Outcome::Success => None,
            Outcome::Failure(error) => Some(error),
        }
    }
}

impl From<Result<(), ProbeError>> for Outcome {
    fn from(result: Result<(), ProbeError>) -> Self {
        match result {
            Ok(()) => Outcome::Success,
            Err(error) => Outcome::Failure(error),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            Outcome::Failure(error) => write!(f, "{error}"),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One result per submitted check, correlated to it by submission index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Index of the originating check in its bundle.
    pub id: usize,
    pub protocol: Protocol,
    pub endpoint: String,
    pub outcome: Outcome,
    pub actions: Vec<Action>,
}

impl CheckResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

impl Serialize for CheckResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CheckResult", 6)?;
        state.serialize_field("protocol", &self.protocol)?;
        state.serialize_field("endpoint", &self.endpoint)?;
        state.serialize_field("success", &self.outcome.is_success())?;
        state.serialize_field("cause", &self.outcome.error().map(ProbeError::kind))?;
        state.serialize_field("result", &self.outcome)?;
        state.serialize_field("actions", &self.actions)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_summarises_as_text() {
        assert_eq!(Outcome::Success.to_string(), "success");
        let failed = Outcome::Failure(ProbeError::Echo {
            address: "10.0.0.1".to_string(),
            reason: "network unreachable".to_string(),
        });
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            "\"error running ping against 10.0.0.1: network unreachable\""
        );
    }

    #[test]
    fn result_serializes_structured_detail() {
        let result = CheckResult {
            id: 3,
            protocol: Protocol::Tcp,
            endpoint: "127.0.0.1:1".to_string(),
            outcome: Outcome::Failure(ProbeError::Cancelled),
            actions: Vec::new(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["protocol"], "tcp");
        assert_eq!(value["success"], false);
        assert_eq!(value["cause"], "cancelled");
        assert_eq!(value["result"], "check cancelled before completion");
        assert!(value.get("id").is_none());
    }
}

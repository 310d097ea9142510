//! Data model shared by the netcheck engine and its collaborators.
//!
//! Everything here is plain, serializable data: bundles of checks, their
//! timing policy, the triggers attached to them and the results they produce.
//! No network or process I/O happens in this crate.

pub mod address;
pub mod bundle;
pub mod check;
pub mod defaults;
pub mod error;
pub mod outcome;
pub mod protocol;
pub mod timeout;
pub mod trigger;

pub use address::split_host_port;
pub use bundle::Bundle;
pub use check::Check;
pub use defaults::{ExecutionDefaults, PingSettings};
pub use error::{ParseError, ProbeError};
pub use outcome::{CheckResult, Outcome};
pub use protocol::Protocol;
pub use timeout::Timeout;
pub use trigger::{Action, Event, Trigger};

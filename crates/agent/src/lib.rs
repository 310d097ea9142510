//! The netcheck engine: protocol probes, the retry policy, the bounded
//! worker pool that runs a bundle, and trigger execution, together with the
//! loading, rendering, configuration and logging used by the binary.

pub mod config;
pub mod dispatcher;
pub mod loader;
pub mod logging;
pub mod probes;
pub mod render;
pub mod retry;
pub mod shutdown;
pub mod trigger;
pub mod version;

pub use dispatcher::Dispatcher;
pub use probes::{NetworkProber, Probe};
pub use retry::{run_with_retries, Attempted};
pub use shutdown::Shutdown;

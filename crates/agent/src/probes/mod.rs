//! Protocol probes: the network operation behind one attempt of a check.
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use netcheck_common::defaults::DEFAULT_TIMEOUT;
use netcheck_common::{Check, PingSettings, ProbeError, Protocol};

pub mod datagram;
pub mod dial;
pub mod icmp;
pub mod ssh;
pub mod tls;

pub use tls::Transport;

/// Performs a single attempt of a check against the network.
///
/// Implementations hold no per-check state; the retry loop calls `probe`
/// once per attempt.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, check: &Check) -> Result<(), ProbeError>;
}

/// The real prober, dispatching on the check's protocol.
#[derive(Debug, Clone, Default)]
pub struct NetworkProber {
    ping: PingSettings,
}

impl NetworkProber {
    pub fn new(ping: PingSettings) -> Self {
        Self { ping }
    }
}

/// The check's timeout as an active deadline.
pub(crate) fn deadline_of(check: &Check) -> Duration {
    check
        .timeout
        .to_std()
        .or_else(|| DEFAULT_TIMEOUT.to_std())
        .unwrap_or(Duration::from_secs(20))
}

#[async_trait]
impl Probe for NetworkProber {
    async fn probe(&self, check: &Check) -> Result<(), ProbeError> {
        let timeout = deadline_of(check);
        debug!(address = %check.address, protocol = %check.protocol, ?timeout, "Probing endpoint.");
        let result = match check.protocol {
            Protocol::Tcp => dial::probe_stream(&check.address, timeout).await,
            Protocol::Udp => dial::probe_datagram(&check.address, timeout).await,
            Protocol::Tls => tls::probe(&check.address, timeout, Transport::Stream).await,
            Protocol::Dtls => tls::probe(&check.address, timeout, Transport::Datagram).await,
            Protocol::Icmp => icmp::probe(&check.address, timeout, &self.ping).await,
            Protocol::Ssh => ssh::probe(&check.address, timeout).await,
        };
        if result.is_ok() {
            info!(address = %check.address, protocol = %check.protocol, "Successfully tested connection.");
        }
        result
    }
}

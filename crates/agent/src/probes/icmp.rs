//! ICMP echo probing.
//!
//! Lost echoes are not a failure: only resolving the host, opening the ICMP
//! socket or sending a request can fail the probe. Loss shows up in the
//! statistics logged at debug level.
use rand::random;
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError, ICMP};
use tokio::net::lookup_host;
use tracing::debug;

use netcheck_common::{split_host_port, PingSettings, ProbeError};

/// Counters for one run of echoes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingStatistics {
    pub sent: u32,
    pub received: u32,
    rtts: Vec<Duration>,
}

impl PingStatistics {
    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn record_reply(&mut self, rtt: Duration) {
        self.received += 1;
        self.rtts.push(rtt);
    }

    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        f64::from(self.sent - self.received.min(self.sent)) * 100.0 / f64::from(self.sent)
    }

    pub fn min_rtt(&self) -> Option<Duration> {
        self.rtts.iter().min().copied()
    }

    pub fn max_rtt(&self) -> Option<Duration> {
        self.rtts.iter().max().copied()
    }

    pub fn avg_rtt(&self) -> Option<Duration> {
        let count = u32::try_from(self.rtts.len()).ok().filter(|n| *n > 0)?;
        Some(self.rtts.iter().sum::<Duration>() / count)
    }
}

async fn resolve(host: &str, address: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let resolve_error = |reason: String| ProbeError::Resolve {
        address: address.to_string(),
        reason,
    };
    let mut addrs = lookup_host((host, 0))
        .await
        .map_err(|e| resolve_error(e.to_string()))?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| resolve_error("no addresses found for host".to_string()))
}

async fn echo_run(
    client: &Client,
    ip: IpAddr,
    timeout: Duration,
    settings: &PingSettings,
    stats: &mut PingStatistics,
) -> Result<(), SurgeError> {
    let mut pinger = client.pinger(ip, PingIdentifier(random())).await;
    pinger.timeout(timeout);
    let payload = vec![0u8; settings.size];
    let interval = settings.interval.to_std().unwrap_or_default();

    for seq in 0..settings.count {
        if seq > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        stats.record_sent();
        let sequence = PingSequence(u16::try_from(seq % 65_536).unwrap_or_default());
        match pinger.ping(sequence, &payload).await {
            Ok((_, rtt)) => {
                debug!(endpoint = %ip, sequence = seq, ?rtt, "Received ping response.");
                stats.record_reply(rtt);
            }
            Err(SurgeError::Timeout { .. }) => {
                debug!(endpoint = %ip, sequence = seq, "Ping response timed out.");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub async fn probe(
    address: &str,
    timeout: Duration,
    settings: &PingSettings,
) -> Result<(), ProbeError> {
    let (host, _) = split_host_port(address);
    let ip = tokio::time::timeout(timeout, resolve(host, address))
        .await
        .map_err(|_| ProbeError::Resolve {
            address: address.to_string(),
            reason: format!("resolution timed out after {timeout:?}"),
        })??;

    let echo_error = |reason: String| ProbeError::Echo {
        address: address.to_string(),
        reason,
    };
    let config = Config::builder()
        .kind(if ip.is_ipv4() { ICMP::V4 } else { ICMP::V6 })
        .sock_type_hint(socket2::Type::RAW)
        .build();
    let client = Client::new(&config).map_err(|e| echo_error(e.to_string()))?;

    let mut stats = PingStatistics::default();
    let run = tokio::time::timeout(timeout, echo_run(&client, ip, timeout, settings, &mut stats)).await;
    debug!(
        destination = %ip,
        transmitted = stats.sent,
        received = stats.received,
        loss_percent = stats.loss_percent(),
        roundtrip_min = ?stats.min_rtt(),
        roundtrip_avg = ?stats.avg_rtt(),
        roundtrip_max = ?stats.max_rtt(),
        "Ping statistics."
    );
    match run {
        Ok(Ok(())) | Err(_) => Ok(()),
        Ok(Err(e)) => Err(echo_error(e.to_string())),
    }
}

//! ICMP echo engine
//!
//! The collector only talks to the [`Pinger`] trait. [`IcmpPinger`] is the
//! production implementation on top of `surge-ping`; tests substitute their
//! own.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use socket2::Type;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval, timeout_at};
use tracing::{debug, instrument, trace};

use crate::config::{MAXIMUM_DURATION_MS, Target};

/// Errors that end a probe round without statistics
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no addresses found for {0}")]
    NoAddress(String),

    /// Raw socket permission missing, unknown interface, ...
    #[error("failed to open ICMP socket: {0}")]
    Socket(#[source] std::io::Error),

    #[error("failed to reach {host}: {reason}")]
    Unreachable { host: String, reason: String },

    #[error("probe did not finish within {0:?}")]
    Timeout(Duration),

    #[error("probe task aborted: {0}")]
    Aborted(String),
}

/// Aggregate statistics for one probe round
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProbeResult {
    pub avg_rtt: Duration,
    pub min_rtt: Duration,
    pub max_rtt: Duration,
    pub std_dev_rtt: Duration,
    pub packets_sent: u32,
    pub packets_recv: u32,

    /// Percentage of echoes without a reply, 0 to 100
    pub packet_loss: f64,
}

impl ProbeResult {
    /// Build statistics from the number of echoes sent and the RTTs of the
    /// replies that came back.
    pub fn from_round(packets_sent: u32, rtts: &[Duration]) -> ProbeResult {
        let packets_recv = rtts.len() as u32;

        let packet_loss = if packets_sent == 0 {
            0.0
        } else {
            f64::from(packets_sent.saturating_sub(packets_recv)) / f64::from(packets_sent) * 100.0
        };

        if rtts.is_empty() {
            return ProbeResult {
                packets_sent,
                packets_recv,
                packet_loss,
                ..Default::default()
            };
        }

        // nanosecond arithmetic keeps equal RTTs free of rounding noise
        let nanos: Vec<f64> = rtts.iter().map(|rtt| rtt.as_nanos() as f64).collect();
        let n = nanos.len() as f64;
        let mean = nanos.iter().sum::<f64>() / n;
        let variance = nanos.iter().map(|ns| (ns - mean).powi(2)).sum::<f64>() / n;

        ProbeResult {
            avg_rtt: Duration::from_nanos(mean.round() as u64),
            min_rtt: rtts.iter().min().copied().unwrap_or_default(),
            max_rtt: rtts.iter().max().copied().unwrap_or_default(),
            std_dev_rtt: Duration::from_nanos(variance.sqrt().round() as u64),
            packets_sent,
            packets_recv,
            packet_loss,
        }
    }
}

/// Parameters for one probe round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingRequest {
    pub host: String,
    pub interface: Option<String>,
    pub count: u32,
    pub interval: Duration,
    pub size: usize,
    pub ttl: Option<u32>,

    /// Deadline for the whole round
    pub timeout: Duration,

    /// Use a raw socket instead of an unprivileged datagram socket
    pub privileged: bool,
}

impl PingRequest {
    pub fn new(target: &Target, timeout: Duration) -> Self {
        Self {
            host: target.host.clone(),
            interface: target.interface.clone().filter(|name| !name.is_empty()),
            count: target.count,
            interval: Duration::from_millis(target.interval),
            size: target.size,
            ttl: (target.ttl != 0).then_some(target.ttl),
            timeout,
            privileged: true,
        }
    }
}

#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, request: &PingRequest) -> Result<ProbeResult, ProbeError>;
}

/// Resolve a host name or IP literal to the first address found.
async fn resolve_host(host: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host(format!("{host}:0"))
        .await
        .map_err(|source| ProbeError::Resolve {
            host: host.to_string(),
            source,
        })?;

    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| ProbeError::NoAddress(host.to_string()))
}

/// ICMP echo engine backed by `surge-ping`. Every round opens its own socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcmpPinger;

impl IcmpPinger {
    fn client_config(request: &PingRequest, ip: IpAddr) -> Config {
        let kind = match ip {
            IpAddr::V4(_) => ICMP::V4,
            IpAddr::V6(_) => ICMP::V6,
        };
        let sock_type = if request.privileged {
            Type::RAW
        } else {
            Type::DGRAM
        };

        let mut builder = Config::builder().kind(kind).sock_type_hint(sock_type);
        if let Some(interface) = &request.interface {
            builder = builder.interface(interface);
        }
        if let Some(ttl) = request.ttl {
            builder = builder.ttl(ttl);
        }
        builder.build()
    }
}

/// RTT of one echo's reply, `None` when no reply arrived in time
type EchoOutcome = Result<Option<Duration>, ProbeError>;

/// Send `request.count` echoes, one per `request.interval` tick, until
/// `deadline`.
///
/// Every echo runs as its own task and waits for its reply at most until the
/// deadline, so an unanswered echo never holds back the ones after it.
async fn run_round<F, Fut>(
    request: &PingRequest,
    deadline: Instant,
    mut send_echo: F,
) -> Result<ProbeResult, ProbeError>
where
    F: FnMut(u16, Duration) -> Fut,
    Fut: Future<Output = EchoOutcome> + Send + 'static,
{
    let mut ticker = interval(request.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut echoes = JoinSet::new();
    let mut sent = 0;
    let mut rtts = Vec::with_capacity(request.count as usize);

    for seq in 0..request.count {
        if timeout_at(deadline, ticker.tick()).await.is_err() {
            break;
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }

        // a send error ends the round before the next echo goes out
        while let Some(joined) = echoes.try_join_next() {
            record(joined, &mut rtts)?;
        }

        // sequence numbers wrap at u16::MAX
        echoes.spawn(send_echo(seq as u16, deadline - now));
        sent += 1;
    }

    while let Some(joined) = echoes.join_next().await {
        record(joined, &mut rtts)?;
    }

    Ok(ProbeResult::from_round(sent, &rtts))
}

fn record(
    joined: Result<EchoOutcome, JoinError>,
    rtts: &mut Vec<Duration>,
) -> Result<(), ProbeError> {
    let outcome = joined.map_err(|e| ProbeError::Aborted(e.to_string()))?;
    if let Some(rtt) = outcome? {
        rtts.push(rtt);
    }
    Ok(())
}

#[async_trait]
impl Pinger for IcmpPinger {
    #[instrument(skip_all, fields(host = %request.host))]
    async fn ping(&self, request: &PingRequest) -> Result<ProbeResult, ProbeError> {
        let start = Instant::now();
        let deadline = start
            .checked_add(request.timeout)
            .unwrap_or_else(|| start + Duration::from_millis(MAXIMUM_DURATION_MS));
        let ip = resolve_host(&request.host).await?;

        let client = Client::new(&Self::client_config(request, ip)).map_err(ProbeError::Socket)?;
        let ident: u16 = rand::random();
        let payload: Arc<[u8]> = vec![0u8; request.size].into();

        debug!("starting ping of {ip} with {request:?}");

        let result = run_round(request, deadline, |seq, wait| {
            let client = client.clone();
            let payload = payload.clone();
            let host = request.host.clone();

            async move {
                let mut pinger = client.pinger(ip, PingIdentifier(ident)).await;
                pinger.timeout(wait);

                match pinger.ping(PingSequence(seq), &payload).await {
                    Ok((_, rtt)) => {
                        trace!("reply from {ip}: seq={seq} rtt={rtt:?}");
                        Ok(Some(rtt))
                    }
                    Err(SurgeError::Timeout { .. }) => {
                        trace!("no reply from {ip}: seq={seq}");
                        Ok(None)
                    }
                    Err(e) => Err(ProbeError::Unreachable {
                        host,
                        reason: e.to_string(),
                    }),
                }
            }
        })
        .await?;

        debug!("finished ping of {ip}: {result:?}");

        Ok(result)
    }
}

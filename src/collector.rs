//! Probing orchestrator
//!
//! Every scrape fans out one task per configured target, all started at once.
//! Each task runs a probe round through the [`Pinger`] and, on success, writes
//! its seven gauge samples to the sink in a single burst. `collect` joins every
//! task before returning and hands back a [`ScrapeReport`] with one
//! [`TargetOutcome`] per target.
//!
//! ```text
//! collect ──spawn──► task(target 1) ──ping──► 7 samples ──► sink
//!    │     ──spawn──► task(target 2) ──ping──► error (logged, no samples)
//!    │     ──spawn──► task(target N) ──ping──► 7 samples ──► sink
//!    └──── join all ─► ScrapeReport
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace};

use crate::config::{Config, Target};
use crate::ping::{PingRequest, Pinger, ProbeError, ProbeResult};

/// Label names attached to every sample, in exposition order
pub const LABELS: [&str; 2] = ["host", "interface"];

/// The seven gauges this collector produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    AvgRtt,
    MinRtt,
    MaxRtt,
    StdDevRtt,
    PacketsSent,
    PacketsRecv,
    PacketLoss,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::AvgRtt,
        MetricKind::MinRtt,
        MetricKind::MaxRtt,
        MetricKind::StdDevRtt,
        MetricKind::PacketsSent,
        MetricKind::PacketsRecv,
        MetricKind::PacketLoss,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            MetricKind::AvgRtt => "icmp_avg_rtt",
            MetricKind::MinRtt => "icmp_min_rtt",
            MetricKind::MaxRtt => "icmp_max_rtt",
            MetricKind::StdDevRtt => "icmp_std_dev_rtt",
            MetricKind::PacketsSent => "icmp_packets_sent",
            MetricKind::PacketsRecv => "icmp_packets_recv",
            MetricKind::PacketLoss => "icmp_packet_loss",
        }
    }

    pub const fn help(self) -> &'static str {
        match self {
            MetricKind::AvgRtt => "Average round trip time to the target in seconds.",
            MetricKind::MinRtt => "Minimum round trip time to the target in seconds.",
            MetricKind::MaxRtt => "Maximum round trip time to the target in seconds.",
            MetricKind::StdDevRtt => {
                "Standard deviation of round trip time to the target in seconds."
            }
            MetricKind::PacketsSent => "Number of packets sent in this run.",
            MetricKind::PacketsRecv => "Number of packets received in this run.",
            MetricKind::PacketLoss => "Percentage of packets lost in this run.",
        }
    }

    pub fn descriptor(self) -> Descriptor {
        Descriptor {
            kind: self,
            name: self.name(),
            help: self.help(),
            labels: &LABELS,
        }
    }

    /// Gauge value for this kind, RTTs in seconds
    pub fn value(self, result: &ProbeResult) -> f64 {
        match self {
            MetricKind::AvgRtt => result.avg_rtt.as_secs_f64(),
            MetricKind::MinRtt => result.min_rtt.as_secs_f64(),
            MetricKind::MaxRtt => result.max_rtt.as_secs_f64(),
            MetricKind::StdDevRtt => result.std_dev_rtt.as_secs_f64(),
            MetricKind::PacketsSent => f64::from(result.packets_sent),
            MetricKind::PacketsRecv => f64::from(result.packets_recv),
            MetricKind::PacketLoss => result.packet_loss,
        }
    }
}

/// Static metadata for one gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub kind: MetricKind,
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

/// One gauge value for one target
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub kind: MetricKind,
    pub host: String,
    pub interface: String,
    pub value: f64,
}

impl Sample {
    /// All seven samples for one successful probe, in [`MetricKind::ALL`] order
    pub fn from_result(target: &Target, result: &ProbeResult) -> Vec<Sample> {
        MetricKind::ALL
            .iter()
            .map(|&kind| Sample {
                kind,
                host: target.host.clone(),
                interface: target.interface_label().to_string(),
                value: kind.value(result),
            })
            .collect()
    }
}

/// Result of probing one target during a scrape
#[derive(Debug)]
pub struct TargetOutcome {
    pub host: String,
    pub interface: String,
    pub result: Result<ProbeResult, ProbeError>,
}

impl TargetOutcome {
    pub fn is_emitted(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of one scrape, in configuration order
#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub outcomes: Vec<TargetOutcome>,
}

impl ScrapeReport {
    pub fn emitted(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_emitted())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_emitted())
    }
}

/// Concurrent ICMP collector over a fixed configuration
pub struct Collector {
    config: Arc<Config>,
    pinger: Arc<dyn Pinger>,
}

impl Collector {
    pub fn new(config: Arc<Config>, pinger: Arc<dyn Pinger>) -> Self {
        Self { config, pinger }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Descriptors for every gauge this collector can produce
    pub fn describe() -> impl Iterator<Item = Descriptor> {
        MetricKind::ALL.into_iter().map(MetricKind::descriptor)
    }

    /// Probe every target concurrently and write the samples of each
    /// successful probe to `sink`.
    ///
    /// Returns once every probe has finished. `deadline`, when given, cuts
    /// off any probe still running after that long; the cut-off probe is
    /// reported as [`ProbeError::Timeout`].
    #[instrument(skip_all, fields(targets = self.config.targets.len()))]
    pub async fn collect(
        &self,
        sink: UnboundedSender<Sample>,
        deadline: Option<Duration>,
    ) -> ScrapeReport {
        let timeout = Duration::from_millis(self.config.timeout);

        let handles: Vec<(&Target, JoinHandle<Result<ProbeResult, ProbeError>>)> = self
            .config
            .targets
            .iter()
            .map(|target| {
                let handle = tokio::spawn(probe_target(
                    target.clone(),
                    self.pinger.clone(),
                    timeout,
                    deadline,
                    sink.clone(),
                ));
                (target, handle)
            })
            .collect();

        debug!("probing {} targets", handles.len());

        let mut report = ScrapeReport::default();
        for (target, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(host = %target.host, "probe task failed: {e}");
                    Err(ProbeError::Aborted(e.to_string()))
                }
            };

            report.outcomes.push(TargetOutcome {
                host: target.host.clone(),
                interface: target.interface_label().to_string(),
                result,
            });
        }

        debug!(
            "scrape finished: {} emitted, {} failed",
            report.emitted().count(),
            report.failed().count()
        );

        report
    }
}

async fn probe_target(
    target: Target,
    pinger: Arc<dyn Pinger>,
    timeout: Duration,
    deadline: Option<Duration>,
    sink: UnboundedSender<Sample>,
) -> Result<ProbeResult, ProbeError> {
    let request = PingRequest::new(&target, timeout);
    trace!(host = %target.host, "probing");

    let probe = pinger.ping(&request);
    let result = match deadline {
        Some(deadline) => tokio::time::timeout(deadline, probe)
            .await
            .unwrap_or(Err(ProbeError::Timeout(deadline))),
        None => probe.await,
    };

    match &result {
        Ok(stats) => {
            for sample in Sample::from_result(&target, stats) {
                if sink.send(sample).is_err() {
                    trace!(host = %target.host, "sink closed, dropping sample");
                }
            }
            trace!(host = %target.host, "emitted");
        }
        Err(e) => {
            error!(
                host = %target.host,
                interface = %target.interface_label(),
                "failed to ping target: {e}"
            );
        }
    }

    result
}

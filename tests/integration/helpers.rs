//! Test helpers: a scripted ping engine and config builders

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use icmp_exporter::{
    collector::{Collector, Sample},
    config::Config,
    ping::{PingRequest, Pinger, ProbeError, ProbeResult},
};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

/// What the scripted engine does for one host
#[derive(Debug, Clone)]
pub enum Behavior {
    Reply { delay: Duration, result: ProbeResult },
    Fail { delay: Duration },
    Hang,
    Panic,
}

/// Ping engine test double that counts started and finished probes
#[derive(Debug, Default)]
pub struct ScriptedPinger {
    behaviors: HashMap<String, Behavior>,
    pub started: AtomicUsize,
    pub completed: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub requests: Mutex<Vec<PingRequest>>,
}

impl ScriptedPinger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(host.to_string(), behavior);
        self
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PingRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pinger for ScriptedPinger {
    async fn ping(&self, request: &PingRequest) -> Result<ProbeResult, ProbeError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let behavior = self
            .behaviors
            .get(&request.host)
            .cloned()
            .unwrap_or(Behavior::Reply {
                delay: Duration::ZERO,
                result: probe_result(request.count, request.count),
            });

        let result = match behavior {
            Behavior::Reply { delay, result } => {
                tokio::time::sleep(delay).await;
                Ok(result)
            }
            Behavior::Fail { delay } => {
                tokio::time::sleep(delay).await;
                Err(ProbeError::NoAddress(request.host.clone()))
            }
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Behavior::Panic => panic!("scripted panic for {}", request.host),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Statistics for `recv` replies out of `sent` echoes, 10ms each
pub fn probe_result(sent: u32, recv: u32) -> ProbeResult {
    let rtts = vec![Duration::from_millis(10); recv as usize];
    ProbeResult::from_round(sent, &rtts)
}

pub fn load_config(yaml: &str) -> Arc<Config> {
    Arc::new(Config::load(yaml.as_bytes()).unwrap())
}

/// Config with one default target per host
pub fn config_for_hosts(hosts: &[&str]) -> Arc<Config> {
    let mut yaml = String::from("timeout: 5000\ntargets:\n");
    for host in hosts {
        yaml.push_str(&format!("  - host: {host}\n"));
    }
    load_config(&yaml)
}

pub fn collector(config: Arc<Config>, pinger: Arc<ScriptedPinger>) -> Collector {
    Collector::new(config, pinger)
}

pub fn drain(mut rx: UnboundedReceiver<Sample>) -> Vec<Sample> {
    let mut samples = Vec::new();
    while let Ok(sample) = rx.try_recv() {
        samples.push(sample);
    }
    samples
}

/// Run one scrape and return the report together with every emitted sample
pub async fn scrape(
    collector: &Collector,
    deadline: Option<Duration>,
) -> (icmp_exporter::collector::ScrapeReport, Vec<Sample>) {
    let (tx, rx) = unbounded_channel();
    let report = collector.collect(tx, deadline).await;
    (report, drain(rx))
}

pub fn samples_for<'a>(samples: &'a [Sample], host: &str) -> Vec<&'a Sample> {
    samples.iter().filter(|s| s.host == host).collect()
}

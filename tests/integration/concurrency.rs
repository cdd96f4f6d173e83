//! Fan-out and join barrier behaviour

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_collect_waits_for_every_probe() {
    let hosts = ["slow.test", "fast.test", "failing.test", "medium.test"];
    let config = config_for_hosts(&hosts);
    let pinger = Arc::new(
        ScriptedPinger::new()
            .with(
                "slow.test",
                Behavior::Reply {
                    delay: Duration::from_millis(200),
                    result: probe_result(1, 1),
                },
            )
            .with(
                "failing.test",
                Behavior::Fail {
                    delay: Duration::from_millis(150),
                },
            )
            .with(
                "medium.test",
                Behavior::Reply {
                    delay: Duration::from_millis(50),
                    result: probe_result(1, 0),
                },
            ),
    );
    let collector = collector(config, pinger.clone());

    let (report, samples) = scrape(&collector, None).await;

    // every task reached a terminal state before collect returned
    assert_eq!(pinger.completed(), hosts.len());
    assert_eq!(report.outcomes.len(), hosts.len());
    assert_eq!(samples.len(), 7 * 3);
}

#[tokio::test]
async fn test_probes_run_concurrently() {
    let hosts: Vec<String> = (0..20).map(|i| format!("host-{i}.test")).collect();
    let host_refs: Vec<&str> = hosts.iter().map(String::as_str).collect();
    let config = config_for_hosts(&host_refs);

    let mut pinger = ScriptedPinger::new();
    for host in &hosts {
        pinger = pinger.with(
            host,
            Behavior::Reply {
                delay: Duration::from_millis(200),
                result: probe_result(1, 1),
            },
        );
    }
    let pinger = Arc::new(pinger);
    let collector = collector(config, pinger.clone());

    let started = tokio::time::Instant::now();
    let (_, samples) = scrape(&collector, None).await;
    let elapsed = started.elapsed();

    assert_eq!(samples.len(), 7 * 20);
    assert_eq!(pinger.max_in_flight(), 20);
    // sequential probing would take 4s
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
}

#[tokio::test]
async fn test_samples_of_one_target_are_contiguous() {
    let hosts: Vec<String> = (0..10).map(|i| format!("host-{i}.test")).collect();
    let host_refs: Vec<&str> = hosts.iter().map(String::as_str).collect();
    let collector = collector(config_for_hosts(&host_refs), Arc::new(ScriptedPinger::new()));

    let (_, samples) = scrape(&collector, None).await;

    for burst in samples.chunks(7) {
        let host = &burst[0].host;
        assert!(burst.iter().all(|s| &s.host == host));
    }
}

#[tokio::test]
async fn test_concurrent_scrapes_share_the_collector() {
    let config = config_for_hosts(&["a.test", "b.test", "c.test"]);
    let pinger = Arc::new(ScriptedPinger::new());
    let collector = Arc::new(collector(config, pinger.clone()));

    let mut tasks = vec![];
    for _ in 0..5 {
        let collector = collector.clone();
        tasks.push(tokio::spawn(async move { scrape(&collector, None).await }));
    }

    for task in tasks {
        let (report, samples) = task.await.unwrap();
        assert_eq!(report.emitted().count(), 3);
        assert_eq!(samples.len(), 21);
    }
    assert_eq!(pinger.completed(), 15);
}

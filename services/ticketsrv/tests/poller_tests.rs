//! Alarm poller: dueness, fast path and the periodic loop

mod support;

use std::time::Duration;

use chrono::Utc;
use support::{alarm, config, harness};
use ticketsrv::domain::TicketStatus;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_expiration_boundary() {
    let now = Utc::now();
    let h = harness(&config());

    h.monitor.set_alarms(vec![alarm("A", 3, 3600, now)]);
    let report = h.service.poller().poll_once(now).await.unwrap();
    assert_eq!(report.due, 0);
    assert_eq!(h.tracker.calls().create, 0);

    h.monitor.set_alarms(vec![alarm("A", 3, 3601, now)]);
    let report = h.service.poller().poll_once(now).await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.created, 1);
}

#[tokio::test]
async fn test_disabled_severities_are_ignored() {
    let now = Utc::now();
    let h = harness(&config());
    h.monitor.set_alarms(vec![
        alarm("info", 1, 1_000_000, now),
        alarm("unclassified", 0, 1_000_000, now),
    ]);

    let report = h.service.poller().poll_once(now).await.unwrap();

    assert_eq!(report.seen, 2);
    assert_eq!(report.due, 0);
    assert_eq!(h.tracker.calls().search, 0);
}

#[tokio::test]
async fn test_cached_ticket_skips_reconciliation() {
    let now = Utc::now();
    let h = harness(&config());
    h.tracker.seed(1, TicketStatus::Open, Some("A"), now);
    h.monitor.set_alarms(vec![alarm("A", 5, 1000, now)]);

    let report = h.service.poller().poll_once(now).await.unwrap();

    assert_eq!(report.existing, 1);
    // Only the cache population searched; no rejected-ticket lookup
    assert_eq!(h.tracker.calls().search, 1);
    assert_eq!(h.tracker.write_calls(), 0);
}

#[tokio::test]
async fn test_monitoring_failure_fails_the_poll() {
    let h = harness(&config());
    h.monitor.fail(true);

    assert!(h.service.poller().poll_once(Utc::now()).await.is_err());
    assert_eq!(h.tracker.calls().search, 0);
}

#[tokio::test(start_paused = true)]
async fn test_loop_survives_monitoring_outage() {
    let now = Utc::now();
    let h = harness(&config());
    h.monitor.set_alarms(vec![alarm("A", 5, 1000, now)]);
    h.monitor.fail(true);

    let token = CancellationToken::new();
    let poller = h.service.poller().clone();
    let task = {
        let token = token.clone();
        tokio::spawn(async move { poller.run(token).await })
    };

    // Ticks at 0s and 10s fail, the one at 20s succeeds
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(h.monitor.polls(), 2);
    assert_eq!(h.tracker.calls().create, 0);

    h.monitor.fail(false);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.monitor.polls(), 3);
    assert_eq!(h.tracker.calls().create, 1);

    token.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_on_start_rejects_open_tickets() {
    let now = Utc::now();
    let mut config = config();
    config.behavior.invalidate_on_start = true;
    let h = harness(&config);
    let a = h.tracker.seed(1, TicketStatus::Open, Some("A"), now);
    let b = h.tracker.seed(2, TicketStatus::Stalled, Some("B"), now);

    let token = CancellationToken::new();
    let poller = h.service.poller().clone();
    let task = {
        let token = token.clone();
        tokio::spawn(async move { poller.run(token).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    token.cancel();
    task.await.unwrap();

    assert_eq!(h.tracker.ticket(&a).unwrap().status, TicketStatus::Rejected);
    assert_eq!(h.tracker.ticket(&b).unwrap().status, TicketStatus::Rejected);
    assert!(h.service.cache().is_empty());
}

//! Controller wiring and shutdown

mod support;

use std::time::Duration;

use chrono::Utc;
use support::{alarm, config, harness};
use ticketsrv::monitor::StaticMonitor;
use ticketsrv::tracker::MemoryTracker;
use ticketsrv::{TicketError, TicketService};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_run_until_cancelled() {
    let h = harness(&config());
    h.monitor.set_alarms(vec![alarm("T-42", 3, 3601, Utc::now())]);

    let token = CancellationToken::new();
    let stopper = {
        let token = token.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(35)).await;
            token.cancel();
        }
    };
    tokio::join!(h.service.run(token.clone()), stopper);

    assert!(h.monitor.polls() >= 3);
    assert_eq!(h.tracker.calls().create, 1);
    assert_eq!(h.tracker.tickets().len(), 1);
}

#[test]
fn test_build_rejects_invalid_config() {
    let mut config = config();
    config.templates.update_body = "reminder for {{alarm_id}}".to_string();

    let result = TicketService::build(
        &config,
        std::sync::Arc::new(StaticMonitor::default()),
        std::sync::Arc::new(MemoryTracker::new("zabbix_trigger")),
    );
    assert!(matches!(result, Err(TicketError::UnknownPlaceholder { .. })));
}

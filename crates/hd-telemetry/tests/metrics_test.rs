use hd_telemetry::metrics::*;

#[test]
fn counters_are_tracked_per_label_set() {
    let m = MetricsCollector::new();
    m.increment_counter(TICKS_TOTAL, &[("outcome", "processed")]);
    m.increment_counter(TICKS_TOTAL, &[("outcome", "processed")]);
    m.increment_counter(TICKS_TOTAL, &[("outcome", "idle")]);
    m.increment_counter_by(REQUEUED_TOTAL, &[], 3);

    assert_eq!(m.get_counter(TICKS_TOTAL, &[("outcome", "processed")]), 2);
    assert_eq!(m.get_counter(TICKS_TOTAL, &[("outcome", "idle")]), 1);
    assert_eq!(m.get_counter(TICKS_TOTAL, &[("outcome", "error")]), 0);
    assert_eq!(m.get_counter(REQUEUED_TOTAL, &[]), 3);
}

#[test]
fn gauges_overwrite() {
    let m = MetricsCollector::new();
    m.set_gauge(QUEUE_TICKETS, &[("status", "Queued")], 5);
    m.set_gauge(QUEUE_TICKETS, &[("status", "Queued")], 2);
    assert_eq!(m.get_gauge(QUEUE_TICKETS, &[("status", "Queued")]), 2);
    assert_eq!(m.get_gauge(QUEUE_TICKETS, &[("status", "Assigned")]), 0);
}

#[test]
fn prometheus_export_contains_all_series() {
    let m = MetricsCollector::with_defaults();
    m.increment_counter(DECISIONS_TOTAL, &[("decision", "AutoAssigned")]);
    m.set_gauge(QUEUE_TICKETS, &[("status", "Queued")], 4);
    m.record_histogram(TICK_DURATION_SECONDS, 0.003);

    let text = m.export_prometheus();
    assert!(text.contains("# TYPE helpdesk_decisions_total counter"));
    assert!(text.contains("helpdesk_decisions_total{decision=\"AutoAssigned\"} 1"));
    assert!(text.contains("# TYPE helpdesk_queue_tickets gauge"));
    assert!(text.contains("helpdesk_queue_tickets{status=\"Queued\"} 4"));
    assert!(text.contains("# TYPE helpdesk_tick_duration_seconds histogram"));
    assert!(text.contains("helpdesk_tick_duration_seconds_bucket{le=\"+Inf\"} 1"));
    assert!(text.contains("helpdesk_tick_duration_seconds_count 1"));
}

#[test]
fn json_export_has_sections() {
    let m = MetricsCollector::with_defaults();
    m.increment_counter(TICK_ERRORS_TOTAL, &[]);
    let json = m.export_json();
    assert_eq!(json["counters"]["helpdesk_tick_errors_total"], 1);
    assert_eq!(json["histograms"][TICK_DURATION_SECONDS]["count"], 0);
    assert!(json["gauges"].as_object().unwrap().is_empty());
}

#[test]
fn concurrent_increments_are_not_lost() {
    let m = std::sync::Arc::new(MetricsCollector::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let m = std::sync::Arc::clone(&m);
            std::thread::spawn(move || {
                for _ in 0..500 {
                    m.increment_counter(TICKS_TOTAL, &[("outcome", "idle")]);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(m.get_counter(TICKS_TOTAL, &[("outcome", "idle")]), 4000);
}

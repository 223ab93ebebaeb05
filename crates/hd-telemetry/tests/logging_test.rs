use hd_telemetry::logging::{init, init_logging, init_logging_json};

#[test]
fn repeated_initialisation_is_harmless() {
    init_logging("helpdesk-test", "debug");
    init_logging_json("helpdesk-test", "info");
    init("helpdesk-test", "warn", true);
    init("helpdesk-test", "warn", false);
    tracing::info!(ticket_id = "t-1", "still logging");
}

//! Logging and in-process metrics for the helpdesk agent.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`
//! - **Metrics**: counters, gauges and histograms with Prometheus text export

pub mod logging;
pub mod metrics;

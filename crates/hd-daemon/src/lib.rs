//! Background runtime for the helpdesk agent: driving loops, stale-ticket
//! patrol, queue snapshots and cooperative shutdown.

pub mod daemon;
pub mod kpi;
pub mod patrol;
pub mod shutdown;
pub mod worker;

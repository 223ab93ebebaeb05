use hd_agent::{Intake, TicketAgent};
use serde_json::{json, Value};
use uuid::Uuid;

use super::Context;

fn intake(ctx: &Context) -> Intake {
    Intake::new(ctx.store.clone(), ctx.clock.clone())
}

pub async fn enqueue(ctx: &Context, customer: &str, subject: &str, body: &str) -> anyhow::Result<Value> {
    let ticket = intake(ctx).enqueue_ticket(customer, subject, body).await?;
    Ok(serde_json::to_value(ticket)?)
}

pub async fn show(ctx: &Context, id: Uuid) -> anyhow::Result<Value> {
    let view = intake(ctx).ticket_view(id).await?;
    Ok(serde_json::to_value(view)?)
}

pub async fn seed(ctx: &Context) -> anyhow::Result<Value> {
    let seeded = intake(ctx).seed_samples().await?;
    let ids: Vec<Uuid> = seeded.iter().map(|t| t.id).collect();
    Ok(json!({ "seeded": ids.len(), "ticket_ids": ids }))
}

/// One sense/think/act tick against the store.
pub async fn step(ctx: &Context) -> anyhow::Result<Value> {
    match TicketAgent::new(ctx.store.clone()).step().await? {
        Some(result) => Ok(serde_json::to_value(result)?),
        None => Ok(json!({ "status": "idle", "message": "no queued tickets" })),
    }
}

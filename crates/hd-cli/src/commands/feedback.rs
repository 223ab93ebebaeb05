use hd_agent::FeedbackService;
use hd_core::types::{TicketCategory, TicketPriority};
use serde_json::Value;
use uuid::Uuid;

use super::Context;

pub async fn run(
    ctx: &Context,
    id: Uuid,
    category: TicketCategory,
    priority: TicketPriority,
    note: Option<String>,
) -> anyhow::Result<Value> {
    let service = FeedbackService::new(ctx.store.clone(), ctx.clock.clone());
    let entry = service.submit_feedback(id, category, priority, note).await?;
    Ok(serde_json::to_value(entry)?)
}

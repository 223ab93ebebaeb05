use serde_json::{json, Value};

use super::Context;

/// Queue counts plus the current global settings.
pub async fn run(ctx: &Context) -> anyhow::Result<Value> {
    let snapshot = ctx.store.queue_snapshot().await?;
    let settings = ctx.store.get_settings().await?;
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "queue": snapshot,
        "settings": settings,
    }))
}

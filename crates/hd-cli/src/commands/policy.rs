use anyhow::bail;
use hd_agent::LearningEngine;
use hd_core::types::TicketCategory;
use serde_json::{json, Value};

use super::Context;

/// Learned rows plus the threshold each category would use right now.
pub async fn list(ctx: &Context) -> anyhow::Result<Value> {
    let learning = LearningEngine::new(ctx.store.clone());
    let mut effective = serde_json::Map::new();
    for category in TicketCategory::ALL {
        let threshold = learning.effective_threshold(category).await?;
        effective.insert(category.to_string(), json!(threshold));
    }
    Ok(json!({
        "parameters": learning.all_policy_parameters().await?,
        "effective_thresholds": effective,
    }))
}

/// Print the settings, applying any overrides first.
pub async fn settings(
    ctx: &Context,
    threshold: Option<f64>,
    auto_assign: Option<bool>,
    auto_ask: Option<bool>,
) -> anyhow::Result<Value> {
    let mut settings = ctx.store.get_settings().await?;
    if threshold.is_none() && auto_assign.is_none() && auto_ask.is_none() {
        return Ok(serde_json::to_value(settings)?);
    }

    if let Some(t) = threshold {
        if !(0.0..=1.0).contains(&t) {
            bail!("threshold must be between 0 and 1, got {t}");
        }
        settings.confidence_threshold = t;
    }
    if let Some(v) = auto_assign {
        settings.enable_auto_assign = v;
    }
    if let Some(v) = auto_ask {
        settings.enable_auto_ask_clarifying_questions = v;
    }
    ctx.store.save_settings(&settings).await?;
    tracing::info!(
        threshold = settings.confidence_threshold,
        auto_assign = settings.enable_auto_assign,
        auto_ask = settings.enable_auto_ask_clarifying_questions,
        "agent settings updated"
    );
    Ok(serde_json::to_value(settings)?)
}

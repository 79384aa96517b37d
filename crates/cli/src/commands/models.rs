//! `mindrelay models` - List the aggregator catalog by tier.

use mindrelay_config::AppConfig;
use mindrelay_core::Vendor;
use mindrelay_core::model::{ModelMetadata, ModelTier};
use mindrelay_providers::ModelCatalog;

pub async fn run(tier: Option<String>, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let tiers: Vec<ModelTier> = match tier {
        Some(t) => vec![t.parse()?],
        None => ModelTier::ALL.to_vec(),
    };

    let Some(key) = config.credential(Vendor::OpenRouter) else {
        return Err("The model catalog needs OPENROUTER_API_KEY".into());
    };

    let catalog = ModelCatalog::new(config.base_url(Vendor::OpenRouter));
    let models = catalog.refresh(key).await?;

    println!("  {} models in catalog", models.len());
    for tier in tiers {
        let in_tier = catalog.by_tier(tier);
        println!();
        println!("  {tier} ({} models)", in_tier.len());
        if let Some(best) = catalog.best_model(tier) {
            println!("  best: {}", best.id);
        }
        for model in in_tier.iter().take(limit) {
            println!("    {}", format_row(model));
        }
        if in_tier.len() > limit {
            println!("    … {} more", in_tier.len() - limit);
        }
    }

    Ok(())
}

fn format_row(model: &ModelMetadata) -> String {
    let mut flags = Vec::new();
    if model.is_free {
        flags.push("free");
    }
    if model.is_reasoning {
        flags.push("reasoning");
    }
    format!(
        "{:<48} {:>9} ctx  {}",
        model.id,
        model.context_length,
        flags.join(",")
    )
}

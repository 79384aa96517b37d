//! `mindrelay config` - Configuration management commands.

use mindrelay_config::AppConfig;
use mindrelay_core::Vendor;

const REDACTED: &str = "***";

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let mut warnings = Vec::new();

            if !config.has_any_credential() && !config.mock_mode {
                warnings.push(
                    "No vendor API key set and mock mode is off: chat will refuse to start"
                        .to_string(),
                );
            }
            if config.credential(Vendor::OpenRouter).is_none() {
                warnings.push(
                    "No OpenRouter key: the catalog stays empty and the economy rung is skipped"
                        .to_string(),
                );
            }
            if config.fallback.xai_model_priority.is_empty() {
                warnings.push("fallback.xai_model_priority is empty".to_string());
            }

            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            let vendors: Vec<String> = config
                .credentialed_vendors()
                .iter()
                .map(|v| v.to_string())
                .collect();
            println!("   Vendors:   {}", if vendors.is_empty() { "none".into() } else { vendors.join(", ") });
            println!(
                "   Model:     {}",
                config
                    .preferred_model
                    .clone()
                    .unwrap_or_else(|| config.vendor_model(Vendor::OpenRouter))
            );
            println!("   Mock:      {}", config.mock_mode);
            println!("   Window:    {} messages", config.memory.window_size);
            println!("   Timeout:   {}s per attempt", config.fallback.attempt_timeout_secs);
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", render_redacted(config)?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    let config_path = dir.join("config.toml");
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }
    std::fs::create_dir_all(&dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Wrote default config to {}", config_path.display());
    Ok(())
}

/// Serialize the config with every credential masked.
fn render_redacted(mut config: AppConfig) -> Result<String, toml::ser::Error> {
    for vendor in [
        &mut config.vendors.openrouter,
        &mut config.vendors.xai,
        &mut config.vendors.google,
    ] {
        if vendor.api_key.is_some() {
            vendor.api_key = Some(REDACTED.to_string());
        }
    }
    toml::to_string_pretty(&config)
}

//! Config command implementations.
//!
//! - `show` - Saved settings plus the effective values after env overrides
//! - `set` - Merge settings into `~/.docembed/config.json`
//! - `reset` - Remove saved settings

use crate::cli::ConfigCommands;
use crate::embeddings::config::{settings_from_env, DEFAULT_TIMEOUT_SECS};
use crate::embeddings::{
    get_embedding_settings, model_config, reset_embedding_settings, save_embedding_settings,
    EmbeddingProviderType, EmbeddingSettings, ResolvedSettings,
};
use crate::error::{Error, Result};
use serde::Serialize;

/// Output for config show.
#[derive(Serialize)]
struct ShowOutput {
    saved: Option<EmbeddingSettings>,
    effective: EffectiveSettings,
}

#[derive(Serialize)]
struct EffectiveSettings {
    provider: String,
    model: String,
    dimensions: usize,
    endpoint: Option<String>,
    api_key_set: bool,
    chunk_size: usize,
    chunk_overlap: usize,
    concurrency: usize,
    timeout_secs: u64,
}

/// Output for config set.
#[derive(Serialize)]
struct SetOutput {
    success: bool,
    message: String,
    settings: EmbeddingSettings,
}

/// Execute config commands.
///
/// # Errors
///
/// `Config` for an unknown provider or an unreadable config file.
pub fn execute(command: &ConfigCommands, json: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => show(json),
        ConfigCommands::Set {
            provider,
            model,
            endpoint,
            api_key,
            chunk_size,
            chunk_overlap,
            concurrency,
            timeout_secs,
        } => {
            let provider = provider
                .as_deref()
                .map(|p| p.parse::<EmbeddingProviderType>().map_err(Error::Config))
                .transpose()?;
            let settings = EmbeddingSettings {
                provider,
                model: model.clone(),
                endpoint: endpoint.clone(),
                api_key: api_key.clone(),
                chunk_size: *chunk_size,
                chunk_overlap: *chunk_overlap,
                concurrency: *concurrency,
                timeout_secs: *timeout_secs,
            };
            set(&settings, json)
        }
        ConfigCommands::Reset => reset(json),
    }
}

fn show(json: bool) -> Result<()> {
    let saved = get_embedding_settings()?;
    let merged = saved.clone().unwrap_or_default().merged_with(&settings_from_env()?);
    let resolved = ResolvedSettings::from_settings(&merged);

    let effective = EffectiveSettings {
        provider: resolved.provider.to_string(),
        dimensions: model_config(resolved.provider, &resolved.model).dimensions,
        model: resolved.model,
        endpoint: resolved.endpoint,
        api_key_set: resolved.api_key.is_some(),
        chunk_size: resolved.chunk.chunk_size,
        chunk_overlap: resolved.chunk.chunk_overlap,
        concurrency: resolved.concurrency,
        timeout_secs: resolved.timeout.as_secs(),
    };

    if json {
        let output = ShowOutput {
            saved: saved.map(|s| s.redacted()),
            effective,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("Provider:    {} ({})", effective.provider, effective.model);
    println!("Dimensions:  {}", effective.dimensions);
    if let Some(endpoint) = &effective.endpoint {
        println!("Endpoint:    {endpoint}");
    }
    println!("API key:     {}", if effective.api_key_set { "set" } else { "not set" });
    println!(
        "Chunking:    size {}, overlap {}",
        effective.chunk_size, effective.chunk_overlap
    );
    println!("Concurrency: {}", effective.concurrency);
    println!("Timeout:     {}s", effective.timeout_secs);
    if saved_is_empty(saved.as_ref()) {
        println!();
        println!("No saved settings; using defaults and environment.");
    }
    Ok(())
}

fn saved_is_empty(saved: Option<&EmbeddingSettings>) -> bool {
    saved.is_none_or(|s| *s == EmbeddingSettings::default())
}

fn set(settings: &EmbeddingSettings, json: bool) -> Result<()> {
    if *settings == EmbeddingSettings::default() {
        return Err(Error::InvalidParameter(
            "nothing to set: pass at least one option (see --help)".into(),
        ));
    }

    // Reject a combination the pipeline could never run with
    let preview = get_embedding_settings()?.unwrap_or_default().merged_with(settings);
    let resolved = ResolvedSettings::from_settings(&preview);
    resolved.chunk.validate()?;

    let merged = save_embedding_settings(settings)?;

    if json {
        let output = SetOutput {
            success: true,
            message: "Settings saved".to_string(),
            settings: merged.redacted(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Settings saved.");
        let timeout = merged.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        println!("  Provider: {}", resolved.provider);
        println!("  Model:    {}", resolved.model);
        println!("  Timeout:  {timeout}s");
    }
    Ok(())
}

fn reset(json: bool) -> Result<()> {
    reset_embedding_settings()?;
    if json {
        println!("{}", serde_json::json!({ "success": true, "message": "Settings reset" }));
    } else {
        println!("Settings reset to defaults.");
    }
    Ok(())
}

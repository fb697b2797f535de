//! Agent settings command implementations.
//!
//! - `get` - Saved retrieval settings of one agent
//! - `set` - Create or change them

use crate::cli::commands::{format_timestamp, open_storage};
use crate::cli::AgentSettingsCommands;
use crate::config::resolve_owner;
use crate::error::{Error, Result};
use crate::model::{AgentSettings, AgentSettingsUpdate, DEFAULT_SEARCH_LIMIT, DEFAULT_SEARCH_THRESHOLD};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

/// Output for get.
#[derive(Serialize)]
struct GetOutput<'a> {
    agent_id: &'a str,
    saved: bool,
    settings: Option<AgentSettings>,
}

/// Execute agent settings commands.
///
/// # Errors
///
/// `InvalidParameter` for a blank agent id, an empty `set`, a zero limit or
/// a threshold outside [-1, 1].
pub fn execute(
    command: &AgentSettingsCommands,
    db_path: Option<&PathBuf>,
    owner: Option<&str>,
    json: bool,
) -> Result<()> {
    match command {
        AgentSettingsCommands::Get { agent } => get(agent, db_path, owner, json),
        AgentSettingsCommands::Set {
            agent,
            enabled,
            limit,
            threshold,
        } => {
            let update = AgentSettingsUpdate {
                enabled: *enabled,
                limit: *limit,
                threshold: *threshold,
            };
            set(agent, &update, db_path, owner, json)
        }
    }
}

fn get(agent: &str, db_path: Option<&PathBuf>, owner: Option<&str>, json: bool) -> Result<()> {
    let owner_id = resolve_owner(owner)?;
    let (storage, _) = open_storage(db_path)?;
    let settings = storage.get_agent_settings(owner_id, agent)?;

    if json {
        let output = GetOutput {
            agent_id: agent,
            saved: settings.is_some(),
            settings,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    match &settings {
        Some(settings) => print_settings(settings),
        None => println!(
            "No settings saved for {agent}; searches use limit {DEFAULT_SEARCH_LIMIT}, threshold {DEFAULT_SEARCH_THRESHOLD}."
        ),
    }
    Ok(())
}

fn set(
    agent: &str,
    update: &AgentSettingsUpdate,
    db_path: Option<&PathBuf>,
    owner: Option<&str>,
    json: bool,
) -> Result<()> {
    if update.is_empty() {
        return Err(Error::InvalidParameter(
            "nothing to set: pass --enabled, --limit or --threshold".into(),
        ));
    }
    let owner_id = resolve_owner(owner)?;
    let (mut storage, _) = open_storage(db_path)?;
    let settings = storage.save_agent_settings(owner_id, agent, update)?;

    if json {
        println!("{}", serde_json::to_string(&settings)?);
    } else {
        println!("Saved settings for {}.", settings.agent_id);
        print_settings(&settings);
    }
    Ok(())
}

fn print_settings(settings: &AgentSettings) {
    let state = if settings.enabled {
        "enabled".green()
    } else {
        "disabled".red()
    };
    println!("{} {state}", settings.agent_id);
    println!("  Limit:     {}", settings.limit);
    println!("  Threshold: {}", settings.threshold);
    println!("  Updated:   {}", format_timestamp(settings.updated_at));
}

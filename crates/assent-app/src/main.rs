//! assent binary - composition root.
//!
//! 1. Resolve and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite intent store
//! 4. Run the requested command (sweeper loop, a dry-run reply or an operator query)

mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;

use assent_action::sweeper::STUCK_NOTE;
use assent_action::{Coordinator, ExecutorRegistry, ExpirySweeper, PendingIntentManager};
use assent_core::config::AssentConfig;
use assent_core::preview::PreviewSanitizer;
use assent_core::types::PendingIntent;
use assent_storage::{ChoicePromptRepository, Database};

use cli::{CliArgs, Command};

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

fn print_intent_line(intent: &PendingIntent) {
    println!(
        "{}  {:<18} {:<9}  expires {}  {}",
        intent.intent_id,
        intent.kind.as_str(),
        intent.status.as_str(),
        intent.expires_at,
        intent.preview_text
    );
}

async fn serve(
    manager: Arc<PendingIntentManager>,
    prompts: ChoicePromptRepository,
    config: &AssentConfig,
) {
    let sweeper = Arc::new(ExpirySweeper::new(manager, prompts, config.intents.clone()));

    let worker = Arc::clone(&sweeper);
    let handle = tokio::spawn(async move { worker.run().await });

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
    }
    sweeper.shutdown();
    if let Err(e) = handle.await {
        tracing::error!(error = %e, "Sweeper task ended abnormally");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let loaded = AssentConfig::load(&config_file);
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => AssentConfig::default(),
    };
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting assent v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Configuration not loaded, using defaults"
        ),
    }

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join(&config.storage.db_file);
    let db = Arc::new(Database::open(
        &db_path,
        Duration::from_millis(config.storage.busy_timeout_ms),
    )?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let manager = Arc::new(PendingIntentManager::new(
        Arc::clone(&db),
        config.intents.clone(),
        PreviewSanitizer::new(config.preview.max_chars),
    ));
    let prompts = ChoicePromptRepository::new(Arc::clone(&db));

    match args.command {
        Command::Serve => serve(manager, prompts, &config).await,
        Command::Sweep => {
            let sweeper = ExpirySweeper::new(Arc::clone(&manager), prompts, config.intents.clone());
            let report = sweeper.run_once()?;
            println!("expired:          {}", report.expired);
            println!("prompts purged:   {}", report.prompts_purged);
            println!("stuck executing:  {}", report.stuck.len());
            println!("stuck cancelled:  {}", report.stuck_cancelled);
            for (status, count) in manager.count_by_status()? {
                println!("{:<17} {}", format!("{}:", status.as_str()), count);
            }
        }
        Command::List { session, limit } => {
            let intents = manager.list_by_owner(&session, limit)?;
            if intents.is_empty() {
                println!("No intents for session {}", session);
            }
            for intent in &intents {
                print_intent_line(intent);
            }
        }
        Command::Show { intent_id } => {
            let intent = manager.get(intent_id)?;
            let view = json!({
                "intent_id": intent.intent_id,
                "kind": intent.kind,
                "status": intent.status,
                "preview_text": intent.preview_text,
                "owner_session_id": intent.owner_session_id,
                "created_at": intent.created_at.to_string(),
                "expires_at": intent.expires_at.to_string(),
                "resolved_at": intent.resolved_at.map(|t| t.to_string()),
                "resolution_note": intent.resolution_note,
                "locked_at": intent.locked_at.map(|t| t.to_string()),
                "attempts": intent.attempts,
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Reply {
            session,
            kind,
            text,
        } => {
            let mut registry = ExecutorRegistry::new();
            registry.register_dry_run();
            let coordinator = Coordinator::new(
                Arc::clone(&manager),
                prompts,
                registry,
                config.intents.choice_ttl_secs,
            );
            let outcome = coordinator
                .resolve_confirmation(&session, &text, &kind)
                .await?;
            println!("{}", outcome.user_message());
        }
        Command::Stuck { cancel } => {
            let stuck = manager.find_stuck_executing(config.intents.stuck_executing_after_secs)?;
            if stuck.is_empty() {
                println!("No intents stuck in executing");
            }
            for intent in &stuck {
                print_intent_line(intent);
                if cancel && manager.cancel_stuck(intent.intent_id, STUCK_NOTE)? {
                    println!("  -> cancelled");
                }
            }
        }
    }

    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deckconf::DeckConfig;
use deckhand::capability::Origin;
use deckhand::plugin::dirs::{candidate_dirs, resolve_plugin_dir};
use deckhand::plugin::{PluginBridge, PluginChange, PluginWatcher, SandboxConfig};
use deckhand::ProviderInfo;
use tokio::sync::{broadcast, mpsc};

/// Deckhand - remote control surface core
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (overrides ./deckhand.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive, e.g. "debug" or "info,deckhand.plugin=debug"
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the effective configuration as TOML
    Config,

    /// Inspect the plugin directory
    Plugins {
        #[command(subcommand)]
        command: PluginCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PluginCommands {
    /// Load every plugin and list the providers in dispatch order
    List {
        /// Plugin directory (defaults to the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Load plugins, then report changes until interrupted
    Watch {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = DeckConfig::load_from(cli.config.as_deref()).context("Failed to load config")?;
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.infra.telemetry.log_level.clone());
    deckhand::telemetry::init(&log_level)?;

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml());
        }
        Commands::Plugins { command } => match command {
            PluginCommands::List { dir } => {
                let bridge = offline_bridge(&config, dir)?;
                print_providers(&bridge.load_all().await);
            }
            PluginCommands::Watch { dir } => {
                let bridge = Arc::new(offline_bridge(&config, dir)?);
                watch_plugins(bridge).await?;
            }
        },
    }

    Ok(())
}

/// A plugin bridge with no remote behind it: plugins get no `host` table.
fn offline_bridge(config: &DeckConfig, dir: Option<PathBuf>) -> Result<PluginBridge> {
    let dir = match dir {
        Some(dir) => dir,
        None => {
            let candidates = candidate_dirs(
                config.infra.paths.plugin_dir.as_deref(),
                &config.infra.paths.data_dir,
            );
            resolve_plugin_dir(&candidates)?
        }
    };
    let sandbox = SandboxConfig {
        timeout: config.lua_timeout(),
    };
    Ok(PluginBridge::new(dir, None, sandbox))
}

fn print_providers(providers: &[ProviderInfo]) {
    if providers.is_empty() {
        println!("no plugins loaded");
        return;
    }
    for provider in providers {
        let file = match &provider.origin {
            Origin::External { file } => file.as_str(),
            Origin::BuiltIn => "built-in",
        };
        println!(
            "{:>6}  {} v{}  ({})",
            provider.priority, provider.name, provider.version, file
        );
    }
}

async fn watch_plugins(bridge: Arc<PluginBridge>) -> Result<()> {
    tracing::info!("Plugin directory: {}", bridge.dir().display());
    print_providers(&bridge.load_all().await);

    let (tx, mut changes) = mpsc::unbounded_channel();
    let _watcher = PluginWatcher::spawn(bridge.clone(), tx)?;

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down...");
            }
            _ = sigterm() => {
                tracing::info!("Received SIGTERM, shutting down...");
            }
        }
        let _ = shutdown_tx.send(());
    });

    loop {
        tokio::select! {
            change = changes.recv() => {
                let Some(change) = change else { break };
                match change {
                    PluginChange::ReloadRequired { path } => {
                        println!("changed: {}", path.display());
                        bridge.reset();
                        print_providers(&bridge.load_all().await);
                    }
                    PluginChange::Removed { path, names } => {
                        println!("removed: {} ({})", path.display(), names.join(", "));
                    }
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn sigterm() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to setup SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_bridge_has_no_host_table() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("offline.lua"),
            r#"
            if host == nil then
                deck.register { name = "offline", can_handle = function() return false end, execute = function() end }
            end
            "#,
        )
        .unwrap();

        let bridge = offline_bridge(&DeckConfig::default(), Some(dir.path().to_path_buf())).unwrap();
        let providers = bridge.load_all().await;
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "offline");
    }
}

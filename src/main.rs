//! gitstate CLI entry point

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use gitstate::cli::{Cli, Commands, StatusArgs, WatchArgs, WatchCommand};
use gitstate::sync::{bridge, GitPoller, RepoWatcher};
use gitstate::{
    ConfigFile, EventEmitter, GitStateError, Layer, LayerSet, RefreshOptions, RepoEvent,
    RepoSnapshot, RepoStateManager, ResourceKey, SubscribeOptions,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<GitStateError>()
                .map(GitStateError::exit_code)
                .unwrap_or(ExitCode::FAILURE)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    init_logging(&config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Status(args) => run_status(&config, args).await,
        Commands::Watch(args) => run_watch(&config, args).await,
        Commands::Config(args) => {
            let rendered = toml::to_string_pretty(&config).context("rendering config")?;
            let path = cli.config.or_else(ConfigFile::default_path);
            if let Some(path) = &path {
                println!("# {}", path.display());
            }
            print!("{}", rendered);
            if args.write {
                let path = path.ok_or_else(|| GitStateError::ConfigError {
                    message: "no config directory; pass --config".to_string(),
                })?;
                config.save_to(&path)?;
                tracing::info!("wrote {}", path.display());
            }
            Ok(())
        }
    }
}

/// Logs go to stderr; stdout carries JSON
fn init_logging(level: &str, verbose: bool) -> anyhow::Result<()> {
    let directive = if verbose {
        "gitstate=debug".to_string()
    } else {
        format!("gitstate={}", level)
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().context("invalid logging.level")?),
        )
        .init();
    Ok(())
}

fn key_for(path: &Path) -> ResourceKey {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    ResourceKey::from_path(&absolute)
}

async fn run_status(config: &ConfigFile, args: StatusArgs) -> anyhow::Result<()> {
    let manager = RepoStateManager::git(config.cache_config());
    let key = key_for(&args.path);

    let mut layers = LayerSet::BASIC_AND_STATUS;
    if args.detailed {
        layers.insert(Layer::Detailed);
    }
    manager
        .refresh(&key, RefreshOptions::new(layers).reason("cli"))
        .await
        .map_err(GitStateError::from)?;

    let snapshot = manager.get_state(&key).ok_or(GitStateError::Disposed)?;
    let json = if args.pretty {
        serde_json::to_string_pretty(snapshot.as_ref())?
    } else {
        serde_json::to_string(snapshot.as_ref())?
    };
    println!("{}", json);

    manager.dispose();
    if !snapshot.is_repository() {
        return Err(GitStateError::NotGitRepo.into());
    }
    Ok(())
}

fn snapshot_line(next: &RepoSnapshot, changed: LayerSet) -> Option<String> {
    serde_json::to_string(&serde_json::json!({
        "type": "snapshot",
        "key": next.key,
        "changed_layers": changed,
        "snapshot": next,
    }))
    .ok()
}

async fn run_watch(config: &ConfigFile, args: WatchArgs) -> anyhow::Result<()> {
    let manager = RepoStateManager::git(config.cache_config());
    let keys: Vec<ResourceKey> = args.paths.iter().map(|p| key_for(p)).collect();

    // Print every bus event
    let mut events = manager.event_bus().subscribe();
    let printer = tokio::spawn(async move {
        let emitter = EventEmitter::new(true);
        loop {
            match events.recv().await {
                Ok(event) => emitter.emit(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("event printer lagged, {} events dropped", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    let bridge = bridge::start(manager.clone());

    let mut initial = LayerSet::BASIC_AND_STATUS;
    if args.detailed {
        initial.insert(Layer::Detailed);
    }

    let mut subscriptions = Vec::new();
    let mut watchers = Vec::new();
    for key in &keys {
        manager.set_visibility(key, true)?;
        subscriptions.push(manager.subscribe(
            key,
            |next, _prev, changed| {
                if let Some(line) = snapshot_line(next, changed) {
                    println!("{}", line);
                }
            },
            SubscribeOptions::default(),
        )?);

        let refresh = manager.refresh(key, RefreshOptions::new(initial).reason("startup"));
        let refresh_key = key.clone();
        tokio::spawn(async move {
            if let Err(e) = refresh.await {
                tracing::warn!("initial refresh of {} failed: {}", refresh_key, e);
            }
        });

        if let (false, Some(watcher_config)) = (args.no_watch, config.watcher_config()) {
            match RepoWatcher::with_config(key.clone(), watcher_config).start(manager.event_bus().clone()) {
                Ok(handle) => watchers.push(handle),
                Err(e) => tracing::warn!("not watching {}: {}", key, e),
            }
        }
    }

    let poller = match (args.no_poll, config.poller_config()) {
        (false, Some(poller_config)) => Some(
            GitPoller::with_config(keys.clone(), poller_config).start(manager.event_bus().clone()),
        ),
        _ => None,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match WatchCommand::parse(&line) {
                    Ok(Some(command)) => {
                        if !apply_command(&manager, command)? {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(poller);
    drop(watchers);
    drop(subscriptions);
    drop(bridge);
    manager.dispose();
    printer.abort();
    Ok(())
}

/// Returns `false` when the loop should stop
fn apply_command(manager: &RepoStateManager, command: WatchCommand) -> anyhow::Result<bool> {
    match command {
        WatchCommand::Focus => {
            manager.event_bus().publish(RepoEvent::focus_regained());
        }
        WatchCommand::Operation { key, operation } => {
            manager
                .event_bus()
                .publish(RepoEvent::operation_completed(key, operation));
        }
        WatchCommand::Refresh { key, detailed } => {
            let mut layers = LayerSet::BASIC_AND_STATUS;
            if detailed {
                layers.insert(Layer::Detailed);
            }
            let refresh = manager.refresh(&key, RefreshOptions::new(layers).force(true).reason("cli"));
            tokio::spawn(async move {
                if let Err(e) = refresh.await {
                    tracing::warn!("refresh of {} failed: {}", key, e);
                }
            });
        }
        WatchCommand::Show(key) => manager.set_visibility(&key, true)?,
        WatchCommand::Hide(key) => manager.set_visibility(&key, false)?,
        WatchCommand::Quit => return Ok(false),
    }
    Ok(true)
}

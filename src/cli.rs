//! CLI argument definitions using clap with subcommand architecture
//!
//! Also parses the line commands `gitstate watch` reads from stdin.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::error::{GitStateError, Result};
use crate::state::ResourceKey;
use crate::sync::OperationKind;

/// Layered git working-tree state cache
#[derive(Parser, Debug)]
#[command(name = "gitstate")]
#[command(about = "Cached, debounced git working-tree state with change notifications")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: <config dir>/gitstate/config.toml)
    #[arg(long, global = true, env = "GITSTATE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh one repository and print its snapshot as JSON
    #[command(visible_alias = "s")]
    Status(StatusArgs),

    /// Keep repositories cached and stream state changes as JSON Lines
    #[command(visible_alias = "w")]
    Watch(WatchArgs),

    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Also write it to the config file, filling in every default
    #[arg(long)]
    pub write: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Repository path
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Include branches and recent commits
    #[arg(long)]
    pub detailed: bool,

    /// Pretty-print the JSON
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Repository paths to keep in view
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Do not poll HEAD for external commits and checkouts
    #[arg(long)]
    pub no_poll: bool,

    /// Do not watch the working tree for file changes
    #[arg(long)]
    pub no_watch: bool,

    /// Also load the detailed layer on start
    #[arg(long)]
    pub detailed: bool,
}

/// One line of input to `gitstate watch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    /// `focus`
    Focus,
    /// `op <PATH> <KIND>`
    Operation {
        key: ResourceKey,
        operation: OperationKind,
    },
    /// `refresh <PATH> [detailed]`
    Refresh { key: ResourceKey, detailed: bool },
    /// `show <PATH>`
    Show(ResourceKey),
    /// `hide <PATH>`
    Hide(ResourceKey),
    /// `quit`
    Quit,
}

impl WatchCommand {
    /// Parse one input line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };

        let mut key = |usage: &str| {
            words
                .next()
                .map(ResourceKey::new)
                .ok_or_else(|| GitStateError::ConfigError {
                    message: format!("usage: {}", usage),
                })
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "focus" => WatchCommand::Focus,
            "quit" | "exit" => WatchCommand::Quit,
            "show" => WatchCommand::Show(key("show <PATH>")?),
            "hide" => WatchCommand::Hide(key("hide <PATH>")?),
            "refresh" => {
                let key = key("refresh <PATH> [detailed]")?;
                let detailed = words.next().is_some_and(|w| w == "detailed");
                WatchCommand::Refresh { key, detailed }
            }
            "op" => {
                let key = key("op <PATH> <KIND>")?;
                let operation = words
                    .next()
                    .map(|kind| kind.parse::<OperationKind>().unwrap_or(OperationKind::Unknown))
                    .ok_or_else(|| GitStateError::ConfigError {
                        message: "usage: op <PATH> <KIND>".to_string(),
                    })?;
                WatchCommand::Operation { key, operation }
            }
            other => {
                return Err(GitStateError::ConfigError {
                    message: format!("unknown command: {}", other),
                })
            }
        };
        Ok(Some(command))
    }
}

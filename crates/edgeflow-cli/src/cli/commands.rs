//! Config resolution and dispatch.
//!
//! 1. Parse arguments and install logging (before config loading, so config
//!    problems are logged too).
//! 2. Resolve and load the configuration.
//! 3. Run exactly one command.

use super::logging::{self, Verbosity};
use super::render;
use super::setup::{Cli, Commands, Component, RepoAction, StateAction};
use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use edgeflow::config::{AgentConfig, CONFIG_FILENAME};
use edgeflow::flow::RecordingSession;
use edgeflow::listing::ListFile;
use edgeflow::state::{FileStateStore, StateStore};
use edgeflow::store::ContentStore;
use edgeflow::tail::TailFile;
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(Verbosity::from_flags(cli.verbose, cli.quiet));

    let config_path = resolve_config_path(cli.config.as_deref());
    debug!(path = ?config_path, "Loading configuration");
    let config = AgentConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::List => handle_list(&config),
        Commands::Tail => handle_tail(&config),
        Commands::State { action } => handle_state(&config, action),
        Commands::Repo {
            action: RepoAction::Stats,
        } => handle_repo_stats(&config),
        Commands::Config { template } => handle_config(&config, template),
    }
}

/// Explicit `--config`, else `./edgeflow.toml`, else the user config
/// directory's `edgeflow.toml` if it exists.
fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.is_file() {
        return Some(local);
    }
    ProjectDirs::from("", "", "edgeflow")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
        .filter(|path| path.is_file())
}

fn state_store(config: &AgentConfig, component: Component) -> FileStateStore {
    FileStateStore::new(config.state.directory(), component.state_name())
}

fn handle_list(config: &AgentConfig) -> Result<()> {
    let list = ListFile::on_schedule(&config.listing, state_store(config, Component::ListFile))
        .context("Invalid [listing] configuration")?;
    let mut session = RecordingSession::new();
    let report = list.on_trigger(&mut session).context("Listing pass failed")?;
    print!("{}", render::listing(&session.transferred, &report));
    Ok(())
}

fn handle_tail(config: &AgentConfig) -> Result<()> {
    let repository = config
        .content_repository
        .open()
        .context("Failed to open the content repository")?;
    let content = ContentStore::with_repository(repository);
    let mut tail = TailFile::on_schedule(&config.tail, state_store(config, Component::TailFile))
        .context("Invalid [tail] configuration")?;
    let mut session = RecordingSession::new();
    let report = tail
        .on_trigger(&content, &mut session)
        .context("Tailing pass failed")?;
    print!("{}", render::fragments(&session.transferred, &report));
    Ok(())
}

fn handle_state(config: &AgentConfig, action: StateAction) -> Result<()> {
    match action {
        StateAction::Show { component } => {
            let store = state_store(config, component);
            match store.get()? {
                Some(map) => println!("{}", render::state(&map)?),
                None => println!("No state stored for {}", component.state_name()),
            }
        }
        StateAction::Clear { component } => {
            state_store(config, component).clear()?;
            println!("Cleared {} state", component.state_name());
        }
    }
    Ok(())
}

fn handle_repo_stats(config: &AgentConfig) -> Result<()> {
    let repository = config
        .content_repository
        .open()
        .context("Failed to open the content repository")?;
    let stats = ContentStore::with_repository(repository).stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn handle_config(config: &AgentConfig, template: bool) -> Result<()> {
    if template {
        print!("{}", AgentConfig::template());
    } else {
        println!("{}", serde_json::to_string_pretty(config)?);
    }
    Ok(())
}

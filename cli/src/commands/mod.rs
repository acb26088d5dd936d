//! CLI command definitions and dispatch.

mod attach;
mod attach_index;
mod create_ref_index;
mod login;
mod logout;
mod promote;
mod refs;

use std::path::PathBuf;

use a3s_refs_core::config::RefsConfig;
use a3s_refs_runtime::{IndexTarget, RemoteRegistry};
use clap::{Args, Parser, Subcommand};

/// A3S Refs - attach artifacts to OCI images and indexes.
#[derive(Parser)]
#[command(name = "a3s-refs", version, about)]
pub struct Cli {
    /// Config file (default: ~/.a3s/refs.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Reach this registry over plain HTTP (repeatable)
    #[arg(long = "insecure", global = true, value_name = "REGISTRY")]
    pub insecure: Vec<String>,

    /// Per-request registry timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Attach a file to an image or index
    Attach(attach::AttachArgs),
    /// Attach a file to the reference index of an image index
    AttachIndex(attach_index::AttachIndexArgs),
    /// Turn an image index into a reference index
    #[command(alias = "init-ref-index")]
    Promote(promote::PromoteArgs),
    /// Show the reference index an index would be promoted to
    CreateRefIndex(create_ref_index::CreateRefIndexArgs),
    /// List artifacts attached to an image or index
    Refs(refs::RefsArgs),
    /// Store registry credentials
    Login(login::LoginArgs),
    /// Remove stored registry credentials
    Logout(logout::LogoutArgs),
}

impl Cli {
    /// Config file overlaid with command-line flags.
    pub fn load_config(&self) -> a3s_refs_core::Result<RefsConfig> {
        let mut config = RefsConfig::load(self.config.as_deref())?;
        for registry in &self.insecure {
            if !config.insecure_registries.contains(registry) {
                config.insecure_registries.push(registry.clone());
            }
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Where a written reference index goes.
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Write to the `<alg>-<hex>` tag of the original index instead
    #[arg(long, conflicts_with = "tag")]
    pub fallback_tag: bool,

    /// Write to this tag instead of the original one
    #[arg(long)]
    pub tag: Option<String>,
}

impl TargetArgs {
    pub fn target(&self) -> IndexTarget {
        match (self.fallback_tag, &self.tag) {
            (true, _) => IndexTarget::FallbackTag,
            (false, Some(tag)) => IndexTarget::Tag(tag.clone()),
            (false, None) => IndexTarget::OriginalTag,
        }
    }
}

/// Registry gateway configured from `config`.
pub(crate) fn open_registry(config: &RefsConfig) -> RemoteRegistry {
    RemoteRegistry::new(config)
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli, config: RefsConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Attach(args) => attach::execute(args, &config).await,
        Command::AttachIndex(args) => attach_index::execute(args, &config).await,
        Command::Promote(args) => promote::execute(args, &config).await,
        Command::CreateRefIndex(args) => create_ref_index::execute(args, &config).await,
        Command::Refs(args) => refs::execute(args, &config).await,
        Command::Login(args) => login::execute(args).await,
        Command::Logout(args) => logout::execute(args).await,
    }
}

//! Flare CLI
//!
//! A command-line tool for inspecting Intents, previewing what the operator
//! derives from a manifest and deleting Intents together with the objects
//! garbage collection does not reach.

mod commands;
mod config;
mod output;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use commands::{intents, render};
use std::path::PathBuf;

/// Flare CLI
#[derive(Parser)]
#[command(name = "flarectl")]
#[command(author, version, about = "CLI for Flare Intents", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Namespace holding Solver objects
    #[arg(long, env = "FLARE_FLUIDOS_NAMESPACE")]
    pub fluidos_namespace: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List resources
    #[command(subcommand)]
    Get(GetCommands),

    /// Show an Intent's conditions
    Describe {
        /// Intent name
        name: String,

        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Print the solver filter and runtime objects for a manifest, offline
    Render {
        /// Intent manifest (YAML or JSON)
        #[arg(long, short = 'f')]
        file: PathBuf,

        /// Namespace to render into, overriding the manifest
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Delete an Intent and reclaim its Solver and NamespaceOffloading
    Delete {
        /// Intent name
        name: String,

        #[arg(long, short)]
        namespace: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum GetCommands {
    /// List Intents
    Intents {
        #[arg(long, short, conflicts_with = "all_namespaces")]
        namespace: Option<String>,

        /// List Intents across all namespaces
        #[arg(long, short = 'A')]
        all_namespaces: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;
    let fluidos_namespace = cli
        .fluidos_namespace
        .clone()
        .or_else(|| config.fluidos_namespace.clone())
        .unwrap_or_else(|| "fluidos".to_string());

    if let Commands::Render { file, namespace } = cli.command {
        return render::render(&file, namespace, cli.format);
    }

    let store = commands::connect(cli.kubeconfig.as_deref()).await?;

    match cli.command {
        Commands::Get(GetCommands::Intents {
            namespace,
            all_namespaces,
        }) => {
            let namespace = (!all_namespaces).then(|| config.namespace(namespace));
            intents::get_intents(&store, namespace.as_deref(), cli.format).await?;
        }
        Commands::Describe { name, namespace } => {
            let namespace = config.namespace(namespace);
            intents::describe_intent(&store, &namespace, &name, cli.format).await?;
        }
        Commands::Delete { name, namespace } => {
            let namespace = config.namespace(namespace);
            intents::delete_intent(&store, &namespace, &name, &fluidos_namespace).await?;
        }
        Commands::Render { .. } => bail!("render does not need a cluster"),
    }

    Ok(())
}

//! flowstead - workflow execution engine
//!
//! One-shot commands against per-tenant, WAL-backed workflow stores.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowstead")]
#[command(about = "Workflow execution engine with durable, auditable instances")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, env = "FLOWSTEAD_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides config)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Tenant whose store the command runs against
    #[arg(short, long, env = "FLOWSTEAD_TENANT", default_value = "default")]
    tenant: String,

    /// Reject graphs and moves that would otherwise fall back to defaults
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a workflow graph for structural problems
    Validate {
        /// Graph JSON (or @file.json / @file.yaml)
        graph: String,
    },

    /// Start a workflow instance
    Start {
        /// Workflow name
        #[arg(short, long)]
        workflow: String,

        /// Graph JSON (or @file.json / @file.yaml)
        graph: String,

        /// Initial context JSON object
        #[arg(short, long)]
        ctx: Option<String>,

        /// Business entity as type:id
        #[arg(short, long)]
        entity: Option<String>,
    },

    /// Move an instance to its next node
    Advance {
        /// Instance ID
        id: String,

        /// Jump to this node instead of resolving the next one
        #[arg(long)]
        to: Option<String>,

        /// Edge label to record on the transition
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Merge keys into an instance's context
    Context {
        /// Instance ID
        id: String,

        /// JSON object of keys to set
        patch: String,
    },

    /// Show an instance
    Show {
        /// Instance ID
        id: String,
    },

    /// Show an instance's transition history
    History {
        /// Instance ID
        id: String,
    },

    /// Show an instance's action log
    Actions {
        /// Instance ID
        id: String,
    },

    /// List the tenant's instances
    List,

    /// Pause a running instance
    Pause {
        /// Instance ID
        id: String,
    },

    /// Resume a paused instance
    Resume {
        /// Instance ID
        id: String,
    },

    /// Delete an instance and its history
    Delete {
        /// Instance ID
        id: String,
    },

    /// Evaluate a condition against a context
    Eval {
        /// Context variable (dotted paths allowed)
        variable: String,

        /// One of ==, !=, <, >, <=, >=
        operator: String,

        /// Value to compare with
        value: String,

        /// Context JSON object
        #[arg(short, long, default_value = "{}")]
        ctx: String,
    },

    /// List tenants with data on disk
    Tenants,

    /// Verify the tenant's WAL, optionally truncating a damaged tail
    Check {
        /// Truncate damaged segments at the last valid record
        #[arg(long)]
        repair: bool,
    },

    /// Fold the tenant's log into a snapshot and drop covered segments
    Compact,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    if cli.strict {
        config.engine.strict = true;
    }

    match commands::execute(&config, &cli.tenant, cli.command) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}

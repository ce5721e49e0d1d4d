//! Faultline CLI - unsupervised failure discovery for agent traces.
//!
//! Commands:
//! - `faultline discover` - Run the discovery pipeline over a project
//! - `faultline inspect` - Summarize a project's span corpus before a run

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "faultline")]
#[command(about = "Unsupervised failure discovery for AI-agent execution traces")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the discovery pipeline and print the report
    Discover {
        /// Project name (directory under the data root)
        #[arg(short, long)]
        project: String,

        /// Root directory holding per-project span exports
        #[arg(short, long, default_value = "data")]
        data_dir: String,

        /// Number of days to analyze
        #[arg(long, default_value_t = 7)]
        days_back: i64,

        /// Pipeline configuration file (YAML)
        #[arg(short, long)]
        config: Option<String>,

        /// Output path for the full JSON report
        #[arg(short, long)]
        output: Option<String>,

        /// Skip the embedding phase even when a credential is present
        #[arg(long)]
        skip_embeddings: bool,
    },

    /// Summarize the span corpus for a project
    Inspect {
        /// Project name (directory under the data root)
        #[arg(short, long)]
        project: String,

        /// Root directory holding per-project span exports
        #[arg(short, long, default_value = "data")]
        data_dir: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Discover {
            project,
            data_dir,
            days_back,
            config,
            output,
            skip_embeddings,
        } => {
            commands::discover::run(
                &project,
                &data_dir,
                days_back,
                config.as_deref(),
                output.as_deref(),
                skip_embeddings,
            )
            .await
        }
        Commands::Inspect { project, data_dir } => {
            commands::inspect::run(&project, &data_dir).await
        }
    }
}

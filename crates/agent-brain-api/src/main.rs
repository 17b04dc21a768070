//! The `agent-brain` binary
//!
//! Per-project background retrieval service: `start` runs an instance in
//! the foreground, `stop` terminates the instance discovered through the
//! runtime file, `status` prints its health.

use agent_brain_api::server::{self, StartOptions};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agent-brain", version, about = "Local-first retrieval service for a project's documents and code")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the instance for the current (or given) project
    Start {
        /// Project directory (defaults to the current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Explicit configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Port override; 0 picks a free port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Stop the running instance for a project
    Stop {
        /// Project directory (defaults to the current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show the running instance's status
    Status {
        /// Project directory (defaults to the current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agent_brain_common::init::initialize_environment();
    let cli = Cli::parse();

    match cli.command {
        Command::Start { dir, config, port } => {
            server::start(StartOptions {
                dir,
                config_path: config,
                port,
            })
            .await
        }
        Command::Stop { dir } => server::stop(dir).await,
        Command::Status { dir } => server::status(dir).await,
    }
}

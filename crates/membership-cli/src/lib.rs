//! membershipctl library

pub mod commands;
pub mod config;

use clap::{Parser, Subcommand};

use config::GlobalArgs;

/// membershipctl - register Kubernetes clusters with a fleet Hub
#[derive(Parser, Debug)]
#[command(name = "membershipctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register the cluster as a new membership
    Register(commands::register::RegisterArgs),
    /// Unregister a membership
    Unregister(commands::unregister::UnregisterArgs),
    /// Install or upgrade the connect agent
    ConnectAgent(commands::connect_agent::ConnectAgentArgs),
    /// Show a membership
    Describe(commands::describe::DescribeArgs),
}

impl Cli {
    /// Run the selected command
    pub async fn run(self) -> anyhow::Result<()> {
        let global = self.global;
        match self.command {
            Commands::Register(args) => commands::register::run(&global, args).await,
            Commands::Unregister(args) => commands::unregister::run(&global, args).await,
            Commands::ConnectAgent(args) => commands::connect_agent::run(&global, args).await,
            Commands::Describe(args) => commands::describe::run(&global, args).await,
        }
    }
}

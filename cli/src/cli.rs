//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;

/// All-or-nothing release deployment to hosts and registries
#[derive(Parser)]
#[command(
    name = "shipyard",
    version,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy a module to every selected target, rolling back on failure
    Deploy(commands::deploy::DeployArgs),

    /// Print the version a module would be deployed as
    ResolveVersion(commands::resolve_version::ResolveVersionArgs),

    /// List configured targets
    Targets(commands::targets::TargetsArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            no_color,
            quiet,
            json,
            verbose: _,
            command,
        } = self;
        let yes = matches!(&command, Command::Deploy(args) if args.yes);
        let app = AppContext::new(&AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes },
        });
        match command {
            Command::Deploy(args) => commands::deploy::run(&app, args).await,
            Command::ResolveVersion(args) => commands::resolve_version::run(&app, args).await,
            Command::Targets(args) => commands::targets::run(&app, &args),
            Command::Version => commands::version::run(&app),
        }
    }
}

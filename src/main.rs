use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use cryptorate::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for cryptorate::AppCommand {
    fn from(cmd: Commands) -> cryptorate::AppCommand {
        match cmd {
            Commands::Seed => cryptorate::AppCommand::Seed,
            Commands::Ingest => cryptorate::AppCommand::Ingest,
            Commands::Rates { query } => cryptorate::AppCommand::Rates { query },
            Commands::Currencies => cryptorate::AppCommand::Currencies,
            Commands::Subscribe { user_id, minutes } => cryptorate::AppCommand::Subscribe {
                user_id,
                interval_minutes: minutes,
            },
            Commands::Unsubscribe { user_id } => cryptorate::AppCommand::Unsubscribe { user_id },
            Commands::Chat { user_id, text } => cryptorate::AppCommand::Chat {
                user_id,
                text: text.join(" "),
            },
            Commands::Run => cryptorate::AppCommand::Run,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Store the configured currencies
    Seed,
    /// Fetch current prices once
    Ingest,
    /// Display latest rates with day range and hourly change
    Rates {
        /// Currency symbol or name
        query: Option<String>,
    },
    /// List tracked currencies
    Currencies,
    /// Turn on periodic digests for a user
    Subscribe {
        user_id: i64,
        /// Minutes between digests (at least 5)
        minutes: u32,
    },
    /// Turn off periodic digests for a user
    Unsubscribe { user_id: i64 },
    /// Answer a chat command as the bot would, e.g. `chat 42 /rates BTC`
    Chat {
        user_id: i64,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Poll prices and deliver digests until interrupted
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => cryptorate::cli::setup::setup(),
        Some(cmd) => cryptorate::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use coinlens::cli::markets::MarketsOptions;
use coinlens::core::log::init_logging;
use coinlens::core::market::{ChangePeriod, SortKey};

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

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display the market listing
    Markets(MarketsArgs),
    /// Display one asset in detail, by id or symbol
    Show { id: String },
}

#[derive(Args)]
struct MarketsArgs {
    /// Number of assets to list
    #[arg(long, value_parser = parse_limit)]
    limit: Option<u32>,

    /// Sort column: rank, change or price
    #[arg(long)]
    sort: Option<SortKey>,

    /// Sort ascending instead of descending
    #[arg(long, requires = "sort")]
    ascending: bool,

    /// Period for percentage change: 24h, 7d or 30d
    #[arg(long)]
    period: Option<ChangePeriod>,

    /// Filter by name or symbol substring
    #[arg(long)]
    search: Option<String>,

    /// Fetch fresh data even when the cache is still valid
    #[arg(long)]
    refresh: bool,
}

fn parse_limit(s: &str) -> Result<u32, String> {
    match s {
        "100" => Ok(100),
        "300" => Ok(300),
        "500" => Ok(500),
        _ => Err("limit must be one of 100, 300 or 500".to_string()),
    }
}

impl From<Commands> for coinlens::AppCommand {
    fn from(cmd: Commands) -> coinlens::AppCommand {
        match cmd {
            Commands::Markets(args) => coinlens::AppCommand::Markets(MarketsOptions {
                limit: args.limit,
                sort: args.sort,
                ascending: args.ascending,
                period: args.period,
                search: args.search,
                force_refresh: args.refresh,
            }),
            Commands::Show { id } => coinlens::AppCommand::Show { id },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => coinlens::cli::setup::setup(),
        Some(cmd) => coinlens::run_command(cmd.into(), cli.config_path.as_deref()).await,
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

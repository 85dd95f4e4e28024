// Perpetual grid bot - command line entry point

use clap::{Parser, Subcommand};
use perp_grid_bot::clients::factory::{account_name_from_env, load_env_file, ExchangeKind};
use perp_grid_bot::config::{BotConfig, ConfigError};
use perp_grid_bot::core::GracefulShutdown;
use perp_grid_bot::logging::{init_logging, run_tag};
use perp_grid_bot::recorder::LogPaths;
use perp_grid_bot::{TradingError, TradingResult};
use std::path::Path;
use tracing::{error, info, info_span, warn, Instrument};

// Load command modules from cli directory
#[path = "../cli/run_commands.rs"]
mod run_commands;
#[path = "../cli/hedge_commands.rs"]
mod hedge_commands;
#[path = "../cli/mm_commands.rs"]
mod mm_commands;

use hedge_commands::HedgeArgs;
use mm_commands::MmArgs;
use run_commands::RunArgs;

#[derive(Parser)]
#[command(name = "grid-bot")]
#[command(version)]
#[command(about = "Take-profit grid, hedged pyramid and simple market maker for perpetual futures", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run the take-profit grid on one venue
    Run(RunArgs),

    /// Run the maker pyramid hedged on a second venue
    Hedge(HedgeArgs),

    /// Quote both sides of one venue with inventory limits
    Mm(MmArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { force } => {
            init_logging(cli.verbose, None)?;
            init_config(&cli.config, force)
        }
        Commands::Run(args) => run(args, &cli.config, cli.verbose).await,
        Commands::Hedge(args) => hedge(args, &cli.config, cli.verbose).await,
        Commands::Mm(args) => mm(args, &cli.config, cli.verbose).await,
    };

    if let Err(e) = result {
        if tracing::dispatcher::has_been_set() {
            error!("❌ {} error: {}", e.category(), e.user_message());
        } else {
            eprintln!("❌ {} error: {}", e.category(), e.user_message());
        }
        std::process::exit(1);
    }
    Ok(())
}

fn init_config(path: &str, force: bool) -> TradingResult<()> {
    if Path::new(path).exists() && !force {
        warn!("⚠️  {} already exists, skipping (use --force to overwrite)", path);
        return Ok(());
    }
    BotConfig::default().to_file(path)?;
    info!("📝 Created {}", path);
    info!("💡 Next steps:");
    info!("   1. Put venue credentials in .env");
    info!("   2. Try: grid-bot run --exchange paper --ticker ETH");
    Ok(())
}

fn load_config(path: &str) -> TradingResult<BotConfig> {
    let config = BotConfig::load_or_default(path).map_err(|e| {
        if matches!(e, ConfigError::Parse(_)) {
            eprintln!("💡 Fix {} or regenerate it with: grid-bot init --force", path);
        }
        e
    })?;
    config.validate()?;
    Ok(config)
}

/// Load the env file before logging starts; `ACCOUNT_NAME` may live in it.
/// A missing file is tolerated for the paper venue only.
/// The returned flag is true when the failure can be ignored.
fn prepare_env(env_file: &Path, exchanges: &[ExchangeKind]) -> Option<(TradingError, bool)> {
    let paper_only = exchanges.iter().all(|k| *k == ExchangeKind::Paper);
    load_env_file(env_file).err().map(|e| (e, paper_only))
}

fn report_env(env_error: Option<(TradingError, bool)>) -> TradingResult<()> {
    match env_error {
        None => Ok(()),
        Some((e, true)) => {
            warn!("⚠️  {}; continuing without credentials", e);
            Ok(())
        }
        Some((e, false)) => Err(e),
    }
}

fn start_logging(config: &BotConfig, verbose: bool, paths: &LogPaths) -> TradingResult<()> {
    let activity = config.logging.log_to_file.then_some(paths.activity.as_path());
    init_logging(verbose, activity)
}

fn account_label(config: &BotConfig) -> Option<String> {
    account_name_from_env().or_else(|| config.logging.account_name.clone())
}

async fn run(args: RunArgs, config_path: &str, verbose: bool) -> TradingResult<()> {
    let config = load_config(config_path)?;
    let exchange = args.exchange_kind()?;
    let env_error = prepare_env(&args.env_file, &[exchange]);

    let account = account_label(&config);
    let ticker = args.ticker.to_uppercase();
    let paths = LogPaths::new(&config.logging.log_dir, exchange.as_str(), &ticker, account.as_deref());
    start_logging(&config, verbose, &paths)?;

    report_env(env_error)?;

    let params = args.to_params()?;
    let shutdown = GracefulShutdown::new();
    shutdown.listen_for_ctrl_c();

    let span = info_span!("run", tag = %run_tag(exchange.as_str(), &ticker));
    run_commands::run_grid(params, &config, &paths, shutdown).instrument(span).await?;
    Ok(())
}

async fn hedge(args: HedgeArgs, config_path: &str, verbose: bool) -> TradingResult<()> {
    let config = load_config(config_path)?;
    let primary: ExchangeKind = args.exchange.parse()?;
    let secondary: ExchangeKind = args.hedge_exchange.parse()?;
    let env_error = prepare_env(&args.env_file, &[primary, secondary]);

    let account = account_label(&config);
    let ticker = args.ticker.to_uppercase();
    let primary_paths = LogPaths::new(&config.logging.log_dir, primary.as_str(), &ticker, account.as_deref());
    let secondary_label = if primary == secondary {
        format!("{}-hedge", secondary)
    } else {
        secondary.to_string()
    };
    let secondary_paths = LogPaths::new(&config.logging.log_dir, &secondary_label, &ticker, account.as_deref());
    start_logging(&config, verbose, &primary_paths)?;

    report_env(env_error)?;

    let params = args.to_params()?;
    let shutdown = GracefulShutdown::new();
    shutdown.listen_for_ctrl_c();

    let span = info_span!("hedge", tag = %run_tag(primary.as_str(), &ticker));
    hedge_commands::run_hedge(params, &config, &primary_paths, &secondary_paths, shutdown)
        .instrument(span)
        .await?;
    Ok(())
}

async fn mm(args: MmArgs, config_path: &str, verbose: bool) -> TradingResult<()> {
    let config = load_config(config_path)?;
    let exchange = args.exchange_kind()?;
    let env_error = prepare_env(&args.env_file, &[exchange]);

    let account = account_label(&config);
    let ticker = args.ticker.to_uppercase();
    let paths = LogPaths::new(&config.logging.log_dir, exchange.as_str(), &ticker, account.as_deref());
    start_logging(&config, verbose, &paths)?;

    report_env(env_error)?;

    let params = args.to_params()?;
    let shutdown = GracefulShutdown::new();
    shutdown.listen_for_ctrl_c();

    let span = info_span!("mm", tag = %run_tag(exchange.as_str(), &ticker));
    mm_commands::run_mm(params, &config, &paths, shutdown).instrument(span).await?;
    Ok(())
}

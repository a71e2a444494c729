use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use equity_agent::cli::OutputFormat;
use equity_agent::cli::commands::{clean, config, run, status};
use equity_agent::cli::{ConfigOverrides, ui::Output};
use equity_agent::types::{AgentError, ExitClass};

#[derive(Parser)]
#[command(name = "equity-agent")]
#[command(
    version,
    about = "Resumable equity research pipeline: SEC filings to a valuation report"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the research pipeline for one ticker
    Run {
        #[arg(long, short, help = "Ticker symbol, e.g. AAPL")]
        ticker: String,
        #[arg(long, conflicts_with = "fresh", help = "Continue from the saved checkpoint (default)")]
        resume: bool,
        #[arg(long, help = "Ignore the saved checkpoint and start over")]
        fresh: bool,
        #[arg(long, value_name = "SECS", help = "Periodic checkpoint interval while a step runs")]
        save_every: Option<u64>,
        #[arg(long, value_name = "SECS", help = "Re-run every N seconds after success (0 runs once)")]
        loop_interval: Option<u64>,
    },

    /// Show saved pipeline state
    Status {
        #[arg(long, short, help = "Ticker to inspect; omit for an overview")]
        ticker: Option<String>,
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove cached responses, checkpoints or outputs
    Clean {
        #[arg(long, help = "Remove the whole data directory")]
        all: bool,
        #[arg(long, help = "Clear the fetch cache")]
        cache: bool,
        #[arg(long, help = "Remove saved checkpoints")]
        checkpoints: bool,
        #[arg(long, help = "Remove generated artifacts and reports")]
        outputs: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration (merged from all sources)
    Show {
        #[arg(long, help = "Print JSON instead of TOML")]
        json: bool,
    },
    /// Show configuration file paths
    Path,
    /// Write a project configuration file
    Init {
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mequity-agent encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!("\x1b[33mSaved checkpoints are intact; rerun with --resume.\x1b[0m\n");

        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            Output::new().error(&format!("{:#}", e));
            let class = e
                .downcast_ref::<AgentError>()
                .map(AgentError::exit_class)
                .unwrap_or(ExitClass::Fatal);
            ExitCode::from(class.code())
        }
    }
}

fn run_cli() -> anyhow::Result<u8> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Run {
            ticker,
            resume: _,
            fresh,
            save_every,
            loop_interval,
        } => {
            let rt = Runtime::new()?;
            let outcome = rt.block_on(run::run(run::RunOptions {
                ticker,
                fresh,
                overrides: ConfigOverrides {
                    save_every_secs: save_every,
                    loop_interval_secs: loop_interval,
                },
            }))?;
            return Ok(outcome.exit_code());
        }
        Commands::Status { ticker, format } => {
            status::run(ticker.as_deref(), format)?;
        }
        Commands::Clean {
            all,
            cache,
            checkpoints,
            outputs,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(clean::run(clean::CleanTargets {
                cache,
                checkpoints,
                outputs,
                all,
            }))?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { json } => config::show(json)?,
            ConfigAction::Path => config::path()?,
            ConfigAction::Init { force } => config::init(force)?,
        },
    }

    Ok(0)
}

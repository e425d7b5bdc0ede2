//! usage-relay - deliver metered usage batches and manage the spool.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use relay_config_and_utils::{init_logging, parse_level, Config, Paths};
use std::path::PathBuf;
use tracing::debug;
use usage_records::DEFAULT_KEY_PREFIX;

/// Deliver usage batches to the metering API with spooling and dead-letter.
#[derive(Parser)]
#[command(name = "usage-relay")]
#[command(about = "Reliable delivery of metered usage records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Path to config.json (default: ~/.usage-relay/config.json)
    #[arg(long, global = true, env = "USAGE_RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver one batch of records read from a JSON array
    Send {
        /// Input file (default: stdin)
        #[arg(short = 'F', long)]
        file: Option<PathBuf>,

        /// Prefix for generated record idempotency keys
        #[arg(long, default_value = DEFAULT_KEY_PREFIX)]
        key_prefix: String,
    },

    /// Retry every spooled batch, dead-lettering those over the ceiling
    ResendSpooled,

    /// Inspect the spool
    Spool {
        #[command(subcommand)]
        command: SpoolCommands,
    },

    /// Manage dead-lettered batches
    Failed {
        #[command(subcommand)]
        command: FailedCommands,
    },
}

#[derive(Subcommand)]
enum SpoolCommands {
    /// List spooled batches, oldest first
    List,
}

#[derive(Subcommand)]
enum FailedCommands {
    /// List dead-lettered batches
    List,
    /// Show one dead-letter file
    Show {
        /// Dead-letter file name (failed_*.json)
        file: String,
    },
    /// Delete one dead-letter file
    Delete {
        /// Dead-letter file name (failed_*.json)
        file: String,
    },
    /// Make one delivery attempt for a dead-letter file
    Resend {
        /// Dead-letter file name (failed_*.json)
        file: String,

        /// Keep the file after a successful delivery
        #[arg(long)]
        keep: bool,
    },
}

fn load_config(cli: &Cli, paths: &Paths) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_with_file(path)?,
        None => Config::load(paths)?,
    };
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    let setup = Paths::new()
        .map_err(anyhow::Error::from)
        .and_then(|paths| load_config(&cli, &paths).map(|config| (paths, config)));
    let (paths, config) = match setup {
        Ok(setup) => setup,
        Err(e) => {
            output::print_error(&format!("{:#}", e), &format);
            std::process::exit(1);
        }
    };

    let level = parse_level(&config.log_level);
    init_logging("usage-relay", level.as_str(), Some(&paths));
    debug!(base_dir = %paths.base_dir().display(), "Configuration loaded");

    let ctx = commands::Context::new(config, paths, format);

    let result = match cli.command {
        Commands::Send { file, key_prefix } => {
            commands::send(&ctx, file.as_deref(), &key_prefix).await
        }
        Commands::ResendSpooled => commands::resend_spooled(&ctx).await,
        Commands::Spool { command } => match command {
            SpoolCommands::List => commands::spool_list(&ctx),
        },
        Commands::Failed { command } => match command {
            FailedCommands::List => commands::failed_list(&ctx),
            FailedCommands::Show { file } => commands::failed_show(&ctx, &file),
            FailedCommands::Delete { file } => commands::failed_delete(&ctx, &file),
            FailedCommands::Resend { file, keep } => {
                commands::failed_resend(&ctx, &file, keep).await
            }
        },
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &format);
        std::process::exit(1);
    }
}

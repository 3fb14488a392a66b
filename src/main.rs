//! cityquery CLI entry point

use cityquery::{
    commands::{
        cmd_ask, cmd_chart, cmd_history, cmd_init, cmd_tables, friendly_message, print_ask_report,
        print_chart, print_history, print_init_summary, print_tables, AskOptions, InitOptions,
    },
    config::Config,
    error::Result,
    progress::LogWriterFactory,
};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cityquery")]
#[command(version, about = "Ask questions about City of Toronto open data", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "CITYQUERY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config, sample table catalog and prompt templates
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// List catalogued tables
    Tables,

    /// Answer a question about the data
    Ask {
        /// The question, in plain language
        question: String,

        /// Also pick and publish a chart for the results
        #[arg(long)]
        chart: bool,

        /// Do not store the answer in the query log
        #[arg(long)]
        no_log: bool,
    },

    /// Chart a previously answered question
    Chart {
        /// Query id shown by `ask` or `history`
        query_id: i64,
    },

    /// Show recently answered questions
    History {
        /// Maximum number of entries
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        match friendly_message(&e) {
            Some(message) => {
                println!("{}", message);
            }
            None => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { force } => {
            let (base_dir, config_path) = init_locations(cli.config.as_deref());
            let summary = cmd_init(InitOptions {
                base_dir,
                config_path,
                force,
            })
            .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_init_summary(&summary);
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "cityquery", &mut std::io::stdout());
        }

        Commands::Tables => {
            let config = load_config(cli.config.as_deref())?;
            let tables = cmd_tables(&config)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                print_tables(&tables);
            }
        }

        Commands::Ask {
            question,
            chart,
            no_log,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let options = AskOptions {
                chart,
                log: !no_log,
                ..AskOptions::default()
            };
            let report = cmd_ask(&config, &question, options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_ask_report(&report);
            }
        }

        Commands::Chart { query_id } => {
            let config = load_config(cli.config.as_deref())?;
            let report = cmd_chart(&config, query_id).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_chart(&report);
            }
        }

        Commands::History { limit } => {
            let config = load_config(cli.config.as_deref())?;
            let records = cmd_history(&config, limit).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_history(&records);
            }
        }
    }

    Ok(())
}

/// Base directory and config file for `init`: a `.toml` path names the file,
/// any other path names the directory
fn init_locations(config: Option<&Path>) -> (PathBuf, PathBuf) {
    match config {
        Some(path) if path.extension().map_or(false, |e| e == "toml") => {
            let base = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            (base, path.to_path_buf())
        }
        Some(dir) => (dir.to_path_buf(), dir.join("config.toml")),
        None => {
            let base = Config::default_base_dir();
            (base.clone(), base.join("config.toml"))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => Config::load(p),
        None => Config::load_default(),
    }
}

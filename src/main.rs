//! # Day Zero lab CLI (`dayzero`)
//!
//! Runs the lab backend: the HTTP API for the game frontend plus offline
//! commands for the retrieval rig, the eval simulator, run artifacts and
//! telemetry reports.
//!
//! ## Usage
//!
//! ```bash
//! dayzero --config ./config/dayzero.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dayzero init` | Create the SQLite database and schema |
//! | `dayzero serve` | Start the HTTP API |
//! | `dayzero docs` | List the loaded reference documents |
//! | `dayzero rag "<question>"` | Run the retrieval test rig |
//! | `dayzero eval` | Run the eval simulator |
//! | `dayzero runs <rag\|eval>` | List recent runs |
//! | `dayzero get <rag\|eval> <id>` | Print one run as JSON |
//! | `dayzero telemetry summary` | Windowed telemetry summary |
//! | `dayzero telemetry series <metric>` | Bucketed telemetry series |
//! | `dayzero verdict ...` | Evaluate the release verdict |
//! | `dayzero reset` | Wipe all runs and telemetry |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dayzero_lab::cli::{self as commands, VerdictArgs};
use dayzero_lab::config;
use dayzero_lab::logging;
use dayzero_lab::models::{ChunkSize, RunKind};

/// Day Zero lab backend: retrieval rig, eval simulator, telemetry and
/// release verdicts for the incident-response game.
#[derive(Parser)]
#[command(name = "dayzero", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dayzero.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// List reference documents found under `[corpus].root`.
    Docs,

    /// Run the retrieval test rig against the corpus and store the run.
    Rag {
        question: String,

        /// small, medium or large.
        #[arg(long, default_value = "small")]
        chunk_size: ChunkSize,

        #[arg(long, default_value_t = 3)]
        top_k: i64,

        #[arg(long)]
        require_citations: bool,
    },

    /// Run the eval simulator and store the run.
    Eval {
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        rag_score: i64,

        #[arg(long)]
        rag_passed: bool,

        #[arg(long)]
        rag_run_id: Option<String>,
    },

    /// List recent runs, newest first.
    Runs {
        /// rag or eval.
        kind: RunKind,

        #[arg(long)]
        limit: Option<i64>,
    },

    /// Print one run as JSON.
    Get {
        /// rag or eval.
        kind: RunKind,
        id: String,
    },

    /// Telemetry reports.
    Telemetry {
        #[command(subcommand)]
        action: TelemetryAction,
    },

    /// Evaluate the release verdict from game meters.
    Verdict {
        /// Distinct advisors consulted.
        #[arg(long)]
        consulted: i64,

        #[arg(long)]
        rag_passed: bool,

        #[arg(long, allow_negative_numbers = true)]
        eval_pass_rate: i64,

        #[arg(long, allow_negative_numbers = true)]
        reliability: i64,

        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        cost: i64,

        #[arg(long, allow_negative_numbers = true)]
        risk: i64,

        #[arg(long, allow_negative_numbers = true)]
        reg_heat: i64,
    },

    /// Wipe every run and telemetry event.
    Reset,
}

#[derive(Subcommand)]
enum TelemetryAction {
    /// Latency percentiles and rates over a window.
    Summary {
        #[arg(long)]
        scenario: Option<String>,

        /// Window such as 15m, 24h or 7d.
        #[arg(long)]
        window: Option<String>,
    },

    /// One metric bucketed over a window.
    Series {
        /// latency, latency_p50, latency_p95, error_rate, escalation_rate,
        /// citation_coverage or eval_pass_rate.
        metric: String,

        #[arg(long)]
        scenario: Option<String>,

        #[arg(long)]
        window: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // verdict is pure and needs no config
    if let Commands::Verdict {
        consulted,
        rag_passed,
        eval_pass_rate,
        reliability,
        cost,
        risk,
        reg_heat,
    } = cli.command
    {
        return commands::run_verdict(VerdictArgs {
            consulted,
            rag_passed,
            eval_pass_rate,
            reliability,
            cost,
            risk,
            reg_heat,
        });
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.log.level)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Serve => commands::run_serve(&cfg).await?,
        Commands::Docs => commands::run_docs(&cfg)?,
        Commands::Rag {
            question,
            chunk_size,
            top_k,
            require_citations,
        } => commands::run_rag(&cfg, &question, chunk_size, top_k, require_citations).await?,
        Commands::Eval {
            rag_score,
            rag_passed,
            rag_run_id,
        } => commands::run_eval(&cfg, rag_score, rag_passed, rag_run_id).await?,
        Commands::Runs { kind, limit } => commands::run_runs(&cfg, kind, limit).await?,
        Commands::Get { kind, id } => commands::run_get(&cfg, kind, &id).await?,
        Commands::Telemetry { action } => match action {
            TelemetryAction::Summary { scenario, window } => {
                commands::run_telemetry_summary(&cfg, scenario, window).await?
            }
            TelemetryAction::Series {
                metric,
                scenario,
                window,
            } => commands::run_telemetry_series(&cfg, &metric, scenario, window).await?,
        },
        Commands::Reset => commands::run_reset(&cfg).await?,
        // handled before config loading
        Commands::Verdict { .. } => {}
    }

    Ok(())
}

//! Command implementations for the `dayzero` binary.
//!
//! Each `run_*` function opens what it needs from the config, calls one
//! service operation and prints a human-readable rendering to stdout.
//! Record lookups and telemetry reports print JSON so they can be piped.

use anyhow::Result;

use crate::config::Config;
use crate::corpus::Corpus;
use crate::migrate;
use crate::models::{ChunkSize, Meters, RagConfig, RunKind};
use crate::server;
use crate::service::{EvalRunRequest, LabService, RagRunRequest};
use crate::verdict::{self, VerdictRequest};

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    println!("Database initialized at {}", config.db.path.display());
    Ok(())
}

pub async fn run_serve(config: &Config) -> Result<()> {
    server::run_server(config).await
}

/// List the documents the retrieval engine would see.
pub fn run_docs(config: &Config) -> Result<()> {
    let corpus = Corpus::load_dir(&config.corpus)?;
    if corpus.is_empty() {
        println!("No documents under {}.", config.corpus.root.display());
        return Ok(());
    }

    println!("{} document(s) under {}:", corpus.len(), config.corpus.root.display());
    for doc in corpus.documents() {
        let paragraphs = crate::chunk::split_paragraphs(&doc.text).len();
        println!("  {:<28} {:>3} para  {}", doc.id, paragraphs, doc.title);
    }
    Ok(())
}

pub async fn run_rag(
    config: &Config,
    question: &str,
    chunk_size: ChunkSize,
    top_k: i64,
    require_citations: bool,
) -> Result<()> {
    let service = LabService::open(config).await?;
    let resp = service
        .run_retrieval(&RagRunRequest {
            question: question.to_string(),
            config: RagConfig {
                chunk_size,
                top_k,
                require_citations,
            },
        })
        .await?;

    for line in &resp.lines {
        println!("{}", line);
    }
    println!();
    println!("run:       {}", resp.run_id);
    println!("created:   {}", resp.created_at);
    if resp.rag.retrieved.is_empty() {
        println!("retrieved: (none)");
    } else {
        println!("retrieved:");
        for chunk in &resp.rag.retrieved {
            println!("  [{}] {}", chunk.id, chunk.title);
        }
    }
    Ok(())
}

pub async fn run_eval(
    config: &Config,
    rag_score: i64,
    rag_passed: bool,
    rag_run_id: Option<String>,
) -> Result<()> {
    let service = LabService::open(config).await?;
    let resp = service
        .run_eval(&EvalRunRequest {
            rag_score,
            rag_passed,
            rag_run_id,
        })
        .await?;

    for line in &resp.lines {
        println!("{}", line);
    }
    for failure in &resp.eval.failures {
        println!("  {}: {}", failure.id, failure.reason);
    }
    println!("run:     {}", resp.run_id);
    println!("created: {}", resp.created_at);
    Ok(())
}

pub async fn run_runs(config: &Config, kind: RunKind, limit: Option<i64>) -> Result<()> {
    let service = LabService::open(config).await?;
    match kind {
        RunKind::Rag => {
            let runs = service.list_rag_runs(limit).await?;
            if runs.is_empty() {
                println!("No retrieval runs.");
            }
            for r in runs {
                println!(
                    "{}  {}  {:>3}  {}  {}/{}/{}",
                    r.id,
                    r.created_at,
                    r.score,
                    if r.passed { "PASS" } else { "FAIL" },
                    r.config.chunk_size,
                    r.config.top_k,
                    if r.config.require_citations { "cite" } else { "nocite" },
                );
            }
        }
        RunKind::Eval => {
            let runs = service.list_eval_runs(limit).await?;
            if runs.is_empty() {
                println!("No eval runs.");
            }
            for r in runs {
                println!(
                    "{}  {}  {:>3}%  rag={}",
                    r.id,
                    r.created_at,
                    r.pass_rate,
                    r.rag_run_id.as_deref().unwrap_or("-"),
                );
            }
        }
    }
    Ok(())
}

pub async fn run_get(config: &Config, kind: RunKind, id: &str) -> Result<()> {
    let service = LabService::open(config).await?;
    let json = match kind {
        RunKind::Rag => serde_json::to_string_pretty(&service.get_rag_run(id).await?)?,
        RunKind::Eval => serde_json::to_string_pretty(&service.get_eval_run(id).await?)?,
    };
    println!("{}", json);
    Ok(())
}

pub async fn run_telemetry_summary(
    config: &Config,
    scenario: Option<String>,
    window: Option<String>,
) -> Result<()> {
    let service = LabService::open(config).await?;
    let summary = service
        .telemetry_summary(scenario.as_deref(), window.as_deref())
        .await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub async fn run_telemetry_series(
    config: &Config,
    metric: &str,
    scenario: Option<String>,
    window: Option<String>,
) -> Result<()> {
    let service = LabService::open(config).await?;
    let points = service
        .telemetry_timeseries(metric, scenario.as_deref(), window.as_deref())
        .await?;
    if points.is_empty() {
        println!("No data.");
    }
    for p in points {
        println!("{}  {}", p.timestamp, p.value);
    }
    Ok(())
}

/// Flags for `dayzero verdict`.
pub struct VerdictArgs {
    pub consulted: i64,
    pub rag_passed: bool,
    pub eval_pass_rate: i64,
    pub reliability: i64,
    pub cost: i64,
    pub risk: i64,
    pub reg_heat: i64,
}

pub fn run_verdict(args: VerdictArgs) -> Result<()> {
    let resp = verdict::evaluate(&VerdictRequest {
        consulted_count: args.consulted,
        rag_passed: args.rag_passed,
        eval_pass_rate: args.eval_pass_rate,
        meters: Meters {
            reliability: args.reliability,
            cost: args.cost,
            risk: args.risk,
            reg_heat: args.reg_heat,
        },
    });

    for line in &resp.lines {
        println!("{}", line);
    }
    if !resp.reasons.is_empty() {
        println!();
        println!("Reasons:");
        for reason in &resp.reasons {
            println!("  - {}", reason);
        }
    }
    println!();
    println!("verdict: {}", serde_json::to_string(&resp.verdict)?.trim_matches('"'));
    Ok(())
}

pub async fn run_reset(config: &Config) -> Result<()> {
    let service = LabService::open(config).await?;
    let resp = service.reset(true).await?;
    if resp.wiped {
        println!("All runs and telemetry wiped.");
    }
    Ok(())
}

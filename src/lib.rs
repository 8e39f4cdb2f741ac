//! # Day Zero lab
//!
//! Backend for the Day Zero incident-response training game. Players talk
//! to scripted advisors, run a toy retrieval-augmented answer check and a
//! toy eval pass, then ask the whiteboard referee for a ship/revise/block
//! verdict. Every run is persisted and emits telemetry that feeds the
//! dashboard's windowed summaries and charts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Corpus  │──▶│ RetrievalEng │──▶│              │
//! │ lab_docs │   │ EvalSim      │   │  EventStore  │
//! └──────────┘   └──────┬───────┘   │ SQLite (WAL) │
//!                       │ sink      │              │
//!                       └──────────▶│  telemetry   │
//!                                   └──────┬───────┘
//!                      ┌───────────────────┤ summary / series
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │(dayzero) │       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dayzero init
//! dayzero rag "Can we restart the tripped feeder automatically?" --top-k 3
//! dayzero telemetry summary --window 1h
//! dayzero serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | tracing subscriber setup |
//! | [`error`] | Boundary error kinds |
//! | [`models`] | Core data types |
//! | [`corpus`] | Reference document loader |
//! | [`chunk`] | Paragraph chunking |
//! | [`retrieval`] | Retrieval-and-scoring engine |
//! | [`eval`] | Evaluation simulator |
//! | [`telemetry`] | Ingest, summaries and time series |
//! | [`verdict`] | Release verdict rules |
//! | [`advisors`] | Advisor scripts |
//! | [`store`] | Event store trait and backends |
//! | [`migrate`] | Schema creation |
//! | [`service`] | Boundary operations |
//! | [`server`] | HTTP API |
//! | [`cli`] | Command implementations |

pub mod advisors;
pub mod chunk;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod error;
pub mod eval;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod verdict;

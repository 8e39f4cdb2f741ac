//! Retrieval-and-scoring engine behind the RAG test rig.
//!
//! # Algorithm
//!
//! 1. Tokenize the question: lowercase, replace anything outside
//!    `[a-z0-9]` and whitespace with a space, split on whitespace, keep
//!    tokens longer than two characters, collapse duplicates.
//! 2. Chunk every document with the requested [`ChunkSize`] policy.
//! 3. Score each chunk by the size of the token-set intersection with the
//!    question.
//! 4. Rank by score, document id, title, then chunk text, all descending,
//!    and keep the first `topK`.
//! 5. Evidence is the summed score of the kept chunks;
//!    `score = min(100, evidence * 12)` and the run passes at 55.
//!
//! The engine is pure: persistence and telemetry live in
//! [`crate::service`].

use std::collections::HashSet;
use std::sync::Arc;

use crate::chunk::chunk_text;
use crate::corpus::Corpus;
use crate::error::{LabError, LabResult};
use crate::models::{ChunkSize, Document, Effects, RagConfig, RagResult, RetrievedChunk};

pub const PASS_THRESHOLD: i64 = 55;
pub const SCORE_PER_EVIDENCE: i64 = 12;
pub const SNIPPET_CHARS: usize = 220;
/// Citations quoted inline when `requireCitations` is on.
pub const ANSWER_CITATIONS: usize = 2;

pub const SAFE_ANSWER: &str = "Do not authorize automatic restart by default. \
Confirm circuit/location, verify relay state, and escalate if context is missing.";

/// Tokenize text into its set of distinct terms longer than two characters.
pub fn tokenize(text: &str) -> HashSet<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

/// A chunk with its lexical-overlap score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredChunk<'a> {
    pub score: usize,
    pub document: &'a Document,
    /// Position of the chunk within its document.
    pub position: usize,
    pub text: String,
}

/// Score every chunk of the corpus against the question and return the
/// `top_k` best in rank order.
pub fn rank_chunks<'a>(
    corpus: &'a Corpus,
    question: &str,
    chunk_size: ChunkSize,
    top_k: usize,
) -> Vec<ScoredChunk<'a>> {
    let question_tokens = tokenize(question);

    let mut scored: Vec<ScoredChunk<'a>> = corpus
        .documents()
        .iter()
        .flat_map(|doc| {
            chunk_text(&doc.text, chunk_size)
                .into_iter()
                .enumerate()
                .map(|(position, text)| {
                    let score = tokenize(&text).intersection(&question_tokens).count();
                    ScoredChunk {
                        score,
                        document: doc,
                        position,
                        text,
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.document.id.cmp(&a.document.id))
            .then_with(|| b.document.title.cmp(&a.document.title))
            .then_with(|| b.text.cmp(&a.text))
    });
    scored.truncate(top_k);
    scored
}

/// Truncate chunk text for display, marking the cut with an ellipsis.
pub fn snippet(text: &str) -> String {
    match text.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn compose_answer(citations: &[String], require_citations: bool) -> String {
    let mut answer = SAFE_ANSWER.to_string();
    if require_citations {
        let quoted: Vec<String> = citations
            .iter()
            .take(ANSWER_CITATIONS)
            .map(|c| format!("[{}]", c))
            .collect();
        answer.push_str(" Evidence: ");
        answer.push_str(&quoted.join(", "));
    }
    answer
}

pub fn score_from_evidence(evidence: usize) -> i64 {
    let evidence = i64::try_from(evidence).unwrap_or(i64::MAX);
    evidence.saturating_mul(SCORE_PER_EVIDENCE).min(100)
}

pub fn effects_for(passed: bool) -> Effects {
    if passed {
        Effects {
            reliability: 3,
            cost: 1,
            risk: -3,
            reg_heat: -2,
        }
    } else {
        Effects {
            reliability: -2,
            cost: 1,
            risk: 2,
            reg_heat: 2,
        }
    }
}

/// Reject configs the engine cannot run, returning the usable `top_k`.
pub fn validate_config(config: &RagConfig) -> LabResult<usize> {
    usize::try_from(config.top_k)
        .ok()
        .filter(|k| *k > 0)
        .ok_or_else(|| LabError::validation(format!("topK must be > 0 (got {})", config.top_k)))
}

/// Result of one engine pass, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct RagOutcome {
    pub result: RagResult,
    pub evidence: usize,
    pub effects: Effects,
}

/// Retrieval engine bound to an immutable corpus.
#[derive(Debug, Clone)]
pub struct RagEngine {
    corpus: Arc<Corpus>,
}

impl RagEngine {
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self { corpus }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn run(&self, question: &str, config: &RagConfig) -> LabResult<RagOutcome> {
        let top_k = validate_config(config)?;
        let top = rank_chunks(&self.corpus, question, config.chunk_size, top_k);

        let mut retrieved: Vec<RetrievedChunk> = Vec::with_capacity(top.len());
        let mut citations: Vec<String> = Vec::with_capacity(top.len());
        let mut evidence = 0usize;

        for chunk in &top {
            evidence += chunk.score;
            let citation = format!("{}:{}", chunk.document.id, retrieved.len());
            retrieved.push(RetrievedChunk {
                id: citation.clone(),
                title: chunk.document.title.clone(),
                snippet: snippet(&chunk.text),
            });
            citations.push(citation);
        }

        let score = score_from_evidence(evidence);
        let passed = score >= PASS_THRESHOLD;
        let answer = compose_answer(&citations, config.require_citations);

        Ok(RagOutcome {
            result: RagResult {
                passed,
                score,
                answer,
                citations,
                retrieved,
                config: config.clone(),
            },
            evidence,
            effects: effects_for(passed),
        })
    }
}

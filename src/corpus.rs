//! Reference document corpus.
//!
//! The corpus is built once at startup and shared read-only with the
//! retrieval engine. [`Corpus::load_dir`] walks a directory for markdown
//! files; tests use [`Corpus::from_documents`] with a fixed in-memory set.
//!
//! A document's id is its file stem and its title is the first line of the
//! text with leading `#` and space characters stripped. Documents are kept
//! sorted by id so ranking never depends on filesystem enumeration order.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::models::Document;

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<Document>,
}

impl Corpus {
    /// Build a corpus from an explicit document set.
    pub fn from_documents(mut documents: Vec<Document>) -> Self {
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Self { documents }
    }

    /// Build a document from raw source text, deriving the title.
    pub fn document(id: impl Into<String>, text: impl Into<String>) -> Document {
        let id = id.into();
        let text = text.into();
        let title = derive_title(&text).unwrap_or_else(|| id.clone());
        Document { id, title, text }
    }

    /// Load every file under `config.root` matching the include globs.
    ///
    /// A missing root yields an empty corpus: retrieval then fails every
    /// run with score 0 rather than refusing to start.
    pub fn load_dir(config: &CorpusConfig) -> Result<Self> {
        let root = &config.root;
        if !root.exists() {
            warn!(root = %root.display(), "corpus root does not exist; starting with no documents");
            return Ok(Self::default());
        }

        let include_set = build_globset(&config.include_globs)?;
        let exclude_set = build_globset(&config.exclude_globs)?;

        let mut seen = HashSet::new();
        let mut documents = Vec::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }

            let Some(id) = document_id(path) else {
                continue;
            };
            if !seen.insert(id.clone()) {
                warn!(id = %id, path = %rel_str, "duplicate document id; keeping the first file");
                continue;
            }

            let text = std::fs::read_to_string(path)?;
            debug!(id = %id, bytes = text.len(), "loaded document");
            documents.push(Self::document(id, text));
        }

        Ok(Self::from_documents(documents))
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn document_id(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
}

fn derive_title(text: &str) -> Option<String> {
    let first = text.lines().next()?;
    Some(first.trim_start_matches(['#', ' ']).to_string())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

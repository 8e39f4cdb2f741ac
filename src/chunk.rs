//! Paragraph-boundary chunking.
//!
//! Document text is split on blank lines (`\n\n`) into trimmed, non-empty
//! paragraphs. A [`ChunkSize`] policy then groups those paragraphs:
//!
//! | Policy | Grouping |
//! |--------|----------|
//! | `small` | one chunk per paragraph |
//! | `medium` | consecutive pairs; the last group may hold one |
//! | `large` | the whole document as a single chunk |
//!
//! Grouped paragraphs are rejoined with a blank line. Chunks are computed
//! per request and never persisted.

use crate::models::ChunkSize;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Split text into trimmed, non-empty paragraphs.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    text.split(PARAGRAPH_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Chunk a document body under the given policy, in paragraph order.
///
/// A document with no paragraphs yields no chunks under `small` and
/// `medium`, and a single empty chunk under `large`.
pub fn chunk_text(text: &str, size: ChunkSize) -> Vec<String> {
    let paragraphs = split_paragraphs(text);
    match size {
        ChunkSize::Small => paragraphs.into_iter().map(str::to_string).collect(),
        ChunkSize::Medium => paragraphs
            .chunks(2)
            .map(|group| group.join(PARAGRAPH_SEPARATOR))
            .collect(),
        ChunkSize::Large => vec![paragraphs.join(PARAGRAPH_SEPARATOR)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE_PARAGRAPHS: &str = "# Restart Runbook\n\nStep one.\n\n\n\nStep two.\n\n  Step three.  \n\nStep four.";

    #[test]
    fn test_split_drops_blank_and_trims() {
        let paras = split_paragraphs(FIVE_PARAGRAPHS);
        assert_eq!(
            paras,
            vec![
                "# Restart Runbook",
                "Step one.",
                "Step two.",
                "Step three.",
                "Step four."
            ]
        );
    }

    #[test]
    fn test_small_one_chunk_per_paragraph() {
        assert_eq!(chunk_text(FIVE_PARAGRAPHS, ChunkSize::Small).len(), 5);
    }

    #[test]
    fn test_medium_pairs_with_trailing_single() {
        let chunks = chunk_text(FIVE_PARAGRAPHS, ChunkSize::Medium);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "# Restart Runbook\n\nStep one.");
        assert_eq!(chunks[1], "Step two.\n\nStep three.");
        assert_eq!(chunks[2], "Step four.");
    }

    #[test]
    fn test_large_single_chunk() {
        let chunks = chunk_text(FIVE_PARAGRAPHS, ChunkSize::Large);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with("# Restart Runbook\n\nStep one."));
        assert!(chunks[0].ends_with("Step three.\n\nStep four."));
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", ChunkSize::Small).is_empty());
        assert!(chunk_text("   \n\n ", ChunkSize::Medium).is_empty());
        assert_eq!(chunk_text("", ChunkSize::Large), vec![String::new()]);
    }

    #[test]
    fn test_deterministic() {
        let a = chunk_text(FIVE_PARAGRAPHS, ChunkSize::Medium);
        let b = chunk_text(FIVE_PARAGRAPHS, ChunkSize::Medium);
        assert_eq!(a, b);
    }
}

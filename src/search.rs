//! The `rag query` command: nearest-chunk lookup against a saved snapshot.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::index::{ScoredChunk, VectorIndex};

const EXCERPT_CHARS: usize = 240;

/// Load the snapshot, embed `query`, and print the `k` nearest chunks.
pub fn run_query(config: &Config, query: &str, k: usize) -> Result<()> {
    let index = VectorIndex::from_config(config)?;
    index
        .load(&config.index.path)
        .with_context(|| "Failed to load index (run `rag ingest` first)")?;

    let hits = index.search(query, k)?;
    print_hits(&hits);
    Ok(())
}

fn print_hits(hits: &[ScoredChunk]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.4}] chunk #{}", i + 1, hit.distance, hit.position);
        println!("    excerpt: \"{}\"", excerpt(&hit.text, EXCERPT_CHARS));
        println!();
    }
}

/// First `max_chars` characters of `text` on one line, cut at a word boundary.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }

    let cut: String = flat.chars().take(max_chars).collect();
    match cut.rfind(' ') {
        Some(pos) if pos > 0 => format!("{}...", &cut[..pos]),
        _ => format!("{}...", cut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("one\n\ntwo  three", 100), "one two three");
        assert_eq!(excerpt("alpha beta gamma", 12), "alpha beta...");
        assert_eq!(excerpt("ééééé", 3), "ééé...");
    }
}

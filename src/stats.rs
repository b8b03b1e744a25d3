//! Snapshot statistics.
//!
//! Summarizes what a saved index holds: vector and chunk counts, dimension,
//! file sizes and chunk lengths. Used by `rag stats`; reads the snapshot
//! files directly, so no embedding provider is needed.

use anyhow::Result;
use std::path::Path;
use std::time::SystemTime;

use crate::snapshot::{Snapshot, CHUNKS_FILE, INDEX_FILE};

/// Summary of a snapshot directory.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotStats {
    pub vectors: usize,
    pub chunks: usize,
    pub dimension: usize,
    pub size_bytes: u64,
    pub mean_chunk_chars: usize,
    pub longest_chunk_chars: usize,
    pub modified: Option<SystemTime>,
}

impl SnapshotStats {
    pub fn collect(dir: &Path) -> Result<Self> {
        let snapshot = Snapshot::read(dir)?;

        let lengths: Vec<usize> = snapshot.chunks.iter().map(|c| c.chars().count()).collect();
        let total_chars: usize = lengths.iter().sum();
        let mean_chunk_chars = if lengths.is_empty() {
            0
        } else {
            total_chars / lengths.len()
        };

        let index_meta = std::fs::metadata(dir.join(INDEX_FILE))?;
        let chunks_meta = std::fs::metadata(dir.join(CHUNKS_FILE))?;

        Ok(Self {
            vectors: snapshot.index.ntotal(),
            chunks: snapshot.chunks.len(),
            dimension: snapshot.index.dimension(),
            size_bytes: index_meta.len() + chunks_meta.len(),
            mean_chunk_chars,
            longest_chunk_chars: lengths.into_iter().max().unwrap_or(0),
            modified: index_meta.modified().ok(),
        })
    }
}

/// Run the stats command: read the snapshot and print a summary.
pub fn run_stats(dir: &Path) -> Result<()> {
    let stats = SnapshotStats::collect(dir)?;

    println!("Snapshot Stats");
    println!("==============");
    println!();
    println!("  Path:        {}", dir.display());
    println!("  Size:        {}", format_bytes(stats.size_bytes));
    if let Some(modified) = stats.modified {
        println!("  Saved:       {}", format_age(modified));
    }
    println!();
    println!("  Vectors:     {}", stats.vectors);
    println!("  Chunks:      {}", stats.chunks);
    println!("  Dimension:   {}", stats.dimension);
    println!(
        "  Chunk chars: mean {}, max {}",
        stats.mean_chunk_chars, stats.longest_chunk_chars
    );
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// How long ago `time` was, e.g. "3 hours ago".
fn format_age(time: SystemTime) -> String {
    let delta = match SystemTime::now().duration_since(time) {
        Ok(d) => d.as_secs(),
        Err(_) => return "just now".to_string(),
    };

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}

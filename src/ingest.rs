//! Folder ingestion: walk the data directory, extract each document, and
//! feed its text to the index.
//!
//! ```text
//! data_dir ──► walkdir ──► include/exclude globs ──► sort by path
//!                                                       │
//!          FileType::from_path ──► Extractor ──► VectorIndex::ingest_text
//! ```
//!
//! Files are processed in path order so repeated runs over the same folder
//! build identical indexes. A file with no extractor stops the run; a file
//! that extracts to nothing is skipped with a warning.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::{Config, IngestConfig};
use crate::extract::{extractor_for, DocumentMetadata, FileType};
use crate::index::{IndexError, VectorIndex};

/// Patterns excluded in addition to `exclude_globs`.
const DEFAULT_EXCLUDES: &[&str] = &["**/.*"];

/// Outcome of a folder ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub files_ingested: usize,
    pub files_skipped: usize,
    pub chunks_added: usize,
    /// Metadata of each ingested file, in ingestion order.
    pub documents: Vec<DocumentMetadata>,
}

/// Ingest every matching file under `config.data_dir` into `index`.
///
/// # Errors
///
/// Fails if the directory does not exist, a glob is invalid, a file has an
/// unsupported type or cannot be read or extracted, or embedding fails.
/// Files ingested before the failure stay in the index.
pub fn ingest_folder(index: &VectorIndex, config: &IngestConfig) -> Result<IngestReport> {
    let root = &config.data_dir;
    if !root.is_dir() {
        bail!("Data directory does not exist: {}", root.display());
    }

    let mut report = IngestReport::default();
    for path in collect_files(config)? {
        let file_type = FileType::from_path(&path)?;
        let bytes =
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let extractor = extractor_for(file_type);
        let text = extractor
            .extract_text(&bytes)
            .with_context(|| format!("Failed to extract text from {}", path.display()))?;

        if text.trim().is_empty() {
            warn!(path = %path.display(), "no text extracted; skipping");
            report.files_skipped += 1;
            continue;
        }

        let metadata = extractor
            .extract_metadata(&path, &bytes)
            .with_context(|| format!("Failed to read metadata of {}", path.display()))?;
        info!(
            path = %path.display(),
            file_type = metadata.file_type.as_str(),
            size_bytes = metadata.size_bytes,
            title = metadata.title.as_deref().unwrap_or(""),
            "ingesting"
        );
        let before = index.len();
        index
            .ingest_text(Some(&text), None)
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        report.files_ingested += 1;
        report.chunks_added += index.len() - before;
        report.documents.push(metadata);
    }

    Ok(report)
}

/// Run the ingest command: build a fresh index from the data folder
/// (`data_dir` overrides `[ingest].data_dir`) and save it.
pub fn run_ingest(config: &Config, data_dir: Option<PathBuf>) -> Result<()> {
    let mut ingest_config = config.ingest.clone();
    if let Some(dir) = data_dir {
        ingest_config.data_dir = dir;
    }

    let index = VectorIndex::from_config(config)?;
    let report = ingest_folder(&index, &ingest_config)?;
    index.save(&config.index.path)?;

    println!("ingest {}", ingest_config.data_dir.display());
    println!("  files ingested: {}", report.files_ingested);
    println!("  files skipped: {}", report.files_skipped);
    println!("  chunks added: {}", report.chunks_added);
    println!("  saved: {}", config.index.path.display());
    println!("ok");
    Ok(())
}

/// Load the snapshot at `config.index.path`; if there is none, ingest the
/// data folder and save the result there.
///
/// Returns the ingestion report when ingestion ran, `None` when the snapshot
/// was loaded. Load failures other than a missing snapshot are returned.
pub fn load_or_ingest(index: &VectorIndex, config: &Config) -> Result<Option<IngestReport>> {
    match index.load(&config.index.path) {
        Ok(()) => Ok(None),
        Err(IndexError::NotFound(path)) => {
            info!(path = %path.display(), "index not found; ingesting documents");
            let report = ingest_folder(index, &config.ingest)?;
            index.save(&config.index.path)?;
            Ok(Some(report))
        }
        Err(e) => Err(e.into()),
    }
}

/// Matching files under `data_dir`, sorted by path.
fn collect_files(config: &IngestConfig) -> Result<Vec<PathBuf>> {
    let root = &config.data_dir;
    let include_set = build_globset(&config.include_globs)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut walker = WalkDir::new(root).min_depth(1);
    if !config.recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = relative_str(root, path);
        if exclude_set.is_match(&relative) || !include_set.is_match(&relative) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

fn relative_str(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(dir: &Path) -> IngestConfig {
        IngestConfig {
            data_dir: dir.to_path_buf(),
            ..IngestConfig::default()
        }
    }

    #[test]
    fn test_collect_files_sorted_top_level_only() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        fs::write(tmp.path().join("a.md"), "a").unwrap();
        fs::write(tmp.path().join(".hidden.txt"), "h").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("c.txt"), "c").unwrap();

        let files = collect_files(&config_for(tmp.path())).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| relative_str(tmp.path(), p))
            .collect();
        assert_eq!(names, vec!["a.md", "b.txt"]);
    }

    #[test]
    fn test_collect_files_recursive_with_excludes() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("sub").join("drafts")).unwrap();
        fs::write(tmp.path().join("top.txt"), "t").unwrap();
        fs::write(tmp.path().join("sub").join("c.txt"), "c").unwrap();
        fs::write(tmp.path().join("sub").join("drafts").join("d.txt"), "d").unwrap();

        let config = IngestConfig {
            recursive: true,
            exclude_globs: vec!["**/drafts/**".to_string()],
            ..config_for(tmp.path())
        };
        let files = collect_files(&config).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("sub/c.txt"));
        assert!(files[1].ends_with("top.txt"));
    }

    #[test]
    fn test_invalid_glob_is_reported() {
        let tmp = TempDir::new().unwrap();
        let config = IngestConfig {
            include_globs: vec!["[".to_string()],
            ..config_for(tmp.path())
        };
        let err = collect_files(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid glob"));
    }
}

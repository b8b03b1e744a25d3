//! The vector index: an ordered chunk store paired with an exact L2 index.
//!
//! Position `i` of the chunk list always corresponds to the `i`-th vector
//! in the flat index. Both structures live behind one [`RwLock`], so they
//! are only ever mutated together.
//!
//! # Ingestion
//!
//! ```text
//! text ──► Chunker ──► chunks ──► EmbeddingProvider (one call per chunk)
//!                                      │
//!                         all succeeded? ──► append vectors + chunks (write lock)
//! ```
//!
//! Embeddings are computed before the lock is taken. If any call fails the
//! index is left exactly as it was.
//!
//! # Retrieval
//!
//! The query is embedded once, compared against every stored vector by
//! squared Euclidean distance, and the nearest `k` chunks are returned,
//! nearest first. Ties go to the chunk inserted earlier.
//!
//! # Persistence
//!
//! [`VectorIndex::save`] and [`VectorIndex::load`] read and write a
//! [`Snapshot`] directory (`index.faiss` + `chunks.npy`).

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, info};

use crate::chunk::{Chunker, ParagraphChunker};
use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::flat::{DimensionError, FlatL2Index};
use crate::snapshot::Snapshot;

/// Embedding width of `text-embedding-3-large`.
pub const DEFAULT_DIMENSION: usize = 3072;
/// Chunks returned by a retrieval when the caller does not say otherwise.
pub const DEFAULT_NUM_CHUNKS: usize = 5;
pub const DEFAULT_SNAPSHOT_DIR: &str = "./faiss_index";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("an enabled embedding provider is required")]
    NoEmbeddingProvider,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no snapshot at {}", .0.display())]
    NotFound(PathBuf),

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DimensionError> for IndexError {
    fn from(e: DimensionError) -> Self {
        IndexError::DimensionMismatch {
            expected: e.expected,
            actual: e.actual,
        }
    }
}

/// A retrieved chunk with its position and squared L2 distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub position: usize,
    pub distance: f32,
    pub text: String,
}

struct State {
    vectors: FlatL2Index,
    chunks: Vec<String>,
}

pub struct VectorIndex {
    dimension: usize,
    provider: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
    state: RwLock<State>,
}

impl VectorIndex {
    /// Create an empty index of the given dimension.
    ///
    /// # Errors
    ///
    /// - [`IndexError::InvalidArgument`] if `dimension` is zero.
    /// - [`IndexError::NoEmbeddingProvider`] if `provider` is the disabled placeholder.
    /// - [`IndexError::DimensionMismatch`] if the provider's dimensionality differs.
    pub fn new(
        dimension: usize,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::InvalidArgument(
                "dimension must be greater than zero".to_string(),
            ));
        }
        if !provider.is_enabled() {
            return Err(IndexError::NoEmbeddingProvider);
        }
        if provider.dims() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: provider.dims(),
            });
        }

        Ok(Self {
            dimension,
            provider,
            chunker: Box::new(ParagraphChunker::default()),
            state: RwLock::new(State {
                vectors: FlatL2Index::new(dimension),
                chunks: Vec::new(),
            }),
        })
    }

    /// Build an empty index with the provider from `[embedding]` and the
    /// chunker from `[chunking]`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let provider = create_provider(&config.embedding)?;
        let chunker =
            ParagraphChunker::new(config.chunking.max_tokens, config.chunking.overlap_tokens);
        Ok(Self::new(config.index.dimension, provider)?.with_chunker(chunker))
    }

    /// Replace the chunking policy used by [`ingest_text`](Self::ingest_text).
    pub fn with_chunker(mut self, chunker: impl Chunker + 'static) -> Self {
        self.chunker = Box::new(chunker);
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Number of stored chunks (equal to the number of stored vectors).
    pub fn len(&self) -> usize {
        self.read().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of the stored chunks in insertion order.
    pub fn chunks(&self) -> Vec<String> {
        self.read().chunks.clone()
    }

    /// Embed and append text to the index.
    ///
    /// Pre-split `chunks` take precedence when non-empty; otherwise `text` is
    /// split with the configured chunker. Returns `Ok(true)` on success.
    ///
    /// # Errors
    ///
    /// [`IndexError::InvalidArgument`] if neither input carries content,
    /// [`IndexError::Embedding`] or [`IndexError::DimensionMismatch`] if any
    /// chunk fails to embed. The index is unchanged on error.
    pub fn ingest_text(
        &self,
        text: Option<&str>,
        chunks: Option<Vec<String>>,
    ) -> Result<bool, IndexError> {
        let chunks = match (chunks, text) {
            (Some(chunks), _) if !chunks.is_empty() => chunks,
            (_, Some(text)) if !text.is_empty() => self.chunker.split(text),
            _ => {
                return Err(IndexError::InvalidArgument(
                    "either text or chunks must be provided".to_string(),
                ))
            }
        };

        if chunks.is_empty() {
            return Err(IndexError::InvalidArgument(
                "text contains no content to chunk".to_string(),
            ));
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            vectors.push(self.embed(chunk)?);
        }

        let mut state = self.write();
        state.vectors.add_all(&vectors)?;
        state.chunks.extend(chunks);
        debug!(added = vectors.len(), total = state.chunks.len(), "ingested chunks");
        Ok(true)
    }

    /// Ingest pre-split chunks.
    pub fn ingest_chunks(&self, chunks: Vec<String>) -> Result<bool, IndexError> {
        self.ingest_text(None, Some(chunks))
    }

    /// Ingest raw text, splitting it with the configured chunker.
    pub fn ingest_str(&self, text: &str) -> Result<bool, IndexError> {
        self.ingest_text(Some(text), None)
    }

    /// The `num_chunks` chunks nearest to `query`, nearest first.
    ///
    /// Returns every stored chunk when `num_chunks` exceeds the index size,
    /// and an empty list for an empty index.
    pub fn retrieve_chunks(&self, query: &str, num_chunks: usize) -> Result<Vec<String>, IndexError> {
        Ok(self
            .search(query, num_chunks)?
            .into_iter()
            .map(|hit| hit.text)
            .collect())
    }

    /// Like [`retrieve_chunks`](Self::retrieve_chunks), with positions and distances.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embed(query)?;
        let state = self.read();
        let hits = state.vectors.search(&query_vector, k)?;

        Ok(hits
            .into_iter()
            .filter_map(|(position, distance)| {
                state.chunks.get(position).map(|text| ScoredChunk {
                    position,
                    distance,
                    text: text.clone(),
                })
            })
            .collect())
    }

    /// Write the index and chunks to `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        let state = self.read();
        Snapshot::write(dir, &state.vectors, &state.chunks)?;
        info!(path = %dir.display(), chunks = state.chunks.len(), "saved snapshot");
        Ok(())
    }

    /// Replace the contents of the index with the snapshot in `dir`.
    ///
    /// # Errors
    ///
    /// - [`IndexError::NotFound`] if `dir` does not exist.
    /// - [`IndexError::Corrupt`] if a file is missing or malformed, or the
    ///   vector and chunk counts differ.
    /// - [`IndexError::DimensionMismatch`] if the snapshot was built with a
    ///   different dimension.
    ///
    /// The index is unchanged on error.
    pub fn load(&self, dir: &Path) -> Result<(), IndexError> {
        let snapshot = Snapshot::read(dir)?;
        if snapshot.index.dimension() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: snapshot.index.dimension(),
            });
        }

        let count = snapshot.chunks.len();
        let mut state = self.write();
        state.vectors = snapshot.index;
        state.chunks = snapshot.chunks;
        info!(path = %dir.display(), chunks = count, "loaded snapshot");
        Ok(())
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let vector = self.provider.embed(text).map_err(IndexError::Embedding)?;
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledProvider;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps a string to its character count repeated `dims` times.
    struct LengthProvider {
        dims: usize,
    }

    impl EmbeddingProvider for LengthProvider {
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![text.chars().count() as f32; self.dims])
        }
    }

    /// Fails on the `fail_on`-th call (1-based).
    struct FlakyProvider {
        calls: AtomicUsize,
        fail_on: usize,
    }

    impl EmbeddingProvider for FlakyProvider {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            2
        }
        fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.fail_on {
                bail!("upstream unavailable");
            }
            Ok(vec![n as f32; 2])
        }
    }

    struct WrongWidthProvider;

    impl EmbeddingProvider for WrongWidthProvider {
        fn model_name(&self) -> &str {
            "wrong"
        }
        fn dims(&self) -> usize {
            4
        }
        fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![0.0; 3])
        }
    }

    fn length_index(dims: usize) -> VectorIndex {
        VectorIndex::new(dims, Arc::new(LengthProvider { dims })).unwrap()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_rejects_zero_dimension() {
        let err = VectorIndex::new(0, Arc::new(LengthProvider { dims: 0 })).err().unwrap();
        assert!(matches!(err, IndexError::InvalidArgument(_)));
    }

    #[test]
    fn test_new_rejects_disabled_provider() {
        let err = VectorIndex::new(4, Arc::new(DisabledProvider)).err().unwrap();
        assert!(matches!(err, IndexError::NoEmbeddingProvider));
    }

    #[test]
    fn test_new_rejects_provider_dimension_mismatch() {
        let err = VectorIndex::new(4, Arc::new(LengthProvider { dims: 8 })).err().unwrap();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch { expected: 4, actual: 8 }
        ));
    }

    #[test]
    fn test_nearest_chunk_by_length() {
        let index = length_index(4);
        assert!(index.ingest_chunks(strings(&["cat", "caterpillar"])).unwrap());
        assert_eq!(index.retrieve_chunks("cats", 1).unwrap(), vec!["cat"]);
    }

    #[test]
    fn test_search_reports_distances() {
        let index = length_index(2);
        index.ingest_chunks(strings(&["ab", "abcd"])).unwrap();
        let hits = index.search("abc", 2).unwrap();
        // "abc" is equidistant from both; the earlier chunk wins the tie.
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 1);
        assert_eq!(hits[0].distance, 2.0);
        assert_eq!(hits[1].distance, 2.0);
    }

    #[test]
    fn test_k_larger_than_index_returns_all() {
        let index = length_index(3);
        index.ingest_chunks(strings(&["a", "bbb", "cc"])).unwrap();
        let got = index.retrieve_chunks("bb", 10).unwrap();
        assert_eq!(got, vec!["cc", "a", "bbb"]);
    }

    #[test]
    fn test_empty_index_and_zero_k() {
        let index = length_index(4);
        assert!(index.retrieve_chunks("anything", 5).unwrap().is_empty());
        index.ingest_chunks(strings(&["x"])).unwrap();
        assert!(index.retrieve_chunks("anything", 0).unwrap().is_empty());
    }

    #[test]
    fn test_ingest_requires_input() {
        let index = length_index(4);
        assert!(matches!(
            index.ingest_text(None, None),
            Err(IndexError::InvalidArgument(_))
        ));
        assert!(matches!(
            index.ingest_text(Some(""), Some(Vec::new())),
            Err(IndexError::InvalidArgument(_))
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_chunks_take_precedence_over_text() {
        let index = length_index(4);
        index
            .ingest_text(Some("ignored text"), Some(strings(&["kept"])))
            .unwrap();
        assert_eq!(index.chunks(), vec!["kept"]);
    }

    #[test]
    fn test_text_is_split_by_chunker() {
        let index = length_index(4).with_chunker(ParagraphChunker::new(2, 0));
        index.ingest_str("first paragraph\n\nsecond one").unwrap();
        assert!(index.len() >= 2);
        assert!(index.chunks().iter().all(|c| c.chars().count() <= 8));
    }

    #[test]
    fn test_failed_ingest_leaves_index_unchanged() {
        let provider = FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_on: 3,
        };
        let index = VectorIndex::new(2, Arc::new(provider)).unwrap();
        index.ingest_chunks(strings(&["one"])).unwrap();

        let err = index.ingest_chunks(strings(&["two", "three"])).unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
        assert_eq!(index.chunks(), vec!["one"]);
    }

    #[test]
    fn test_wrong_width_embedding_is_rejected() {
        let index = VectorIndex::new(4, Arc::new(WrongWidthProvider)).unwrap();
        let err = index.ingest_chunks(strings(&["x"])).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch { expected: 4, actual: 3 }
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_load_rejects_other_dimension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let small = length_index(2);
        small.ingest_chunks(strings(&["a"])).unwrap();
        small.save(tmp.path()).unwrap();

        let big = length_index(4);
        big.ingest_chunks(strings(&["kept"])).unwrap();
        let err = big.load(tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch { expected: 4, actual: 2 }
        ));
        assert_eq!(big.chunks(), vec!["kept"]);
    }

    #[test]
    fn test_shared_across_threads_keeps_counts_aligned() {
        let index = Arc::new(length_index(4));
        let writers = 4;
        let per_writer = 25;

        let mut handles = Vec::new();
        for w in 0..writers {
            let index = Arc::clone(&index);
            handles.push(std::thread::spawn(move || {
                for i in 0..per_writer {
                    let chunk = format!("writer {} chunk {}", w, i);
                    assert!(index.ingest_chunks(vec![chunk]).unwrap());
                }
            }));
        }
        for _ in 0..writers {
            let index = Arc::clone(&index);
            handles.push(std::thread::spawn(move || {
                for _ in 0..per_writer {
                    let found = index.retrieve_chunks("writer 0 chunk 0", 3).unwrap();
                    assert!(found.len() <= 3);
                    assert!(found.len() <= index.len());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(index.len(), writers * per_writer);
        assert_eq!(index.chunks().len(), writers * per_writer);

        let tmp = tempfile::TempDir::new().unwrap();
        index.save(tmp.path()).unwrap();
        let restored = length_index(4);
        restored.load(tmp.path()).unwrap();
        assert_eq!(restored.len(), writers * per_writer);
        assert_eq!(restored.chunks(), index.chunks());
    }
}

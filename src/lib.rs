//! # ragchat
//!
//! A retrieval-augmented chat assistant: documents are split into chunks,
//! embedded, and stored in an exact-search vector index; each chat turn
//! retrieves the nearest chunks and hands them, with the conversation so
//! far, to a language model.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌─────────────────────┐
//! │ data/ docs │──▶│ Extract + │──▶│ VectorIndex          │
//! │ pdf/docx/… │   │  Chunk    │   │ chunks + flat L2     │
//! └────────────┘   └───────────┘   └──────────┬──────────┘
//!                        ▲                     │ save/load
//!                  Embedding API               ▼
//!                        │           index.faiss + chunks.npy
//!                        ▼
//!  user ──▶ retrieve top-k ──▶ context + history ──▶ LLM ──▶ reply
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag ingest                    # build ./faiss_index from ./data
//! rag query "refund policy" -k 3
//! rag chat                      # interactive loop; `exit` quits
//! rag stats                     # inspect the saved snapshot
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`index`] | Chunk store + exact L2 vector index |
//! | [`flat`] | Brute-force L2 index and its Faiss-compatible encoding |
//! | [`npy`] | NumPy `.npy` encoding of the chunk list |
//! | [`snapshot`] | On-disk snapshot directory |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`chunk`] | Text chunking |
//! | [`extract`] | PDF/DOCX/HTML/CSV/text extraction |
//! | [`ingest`] | Data-folder ingestion |
//! | [`llm`] | Chat-completion clients and prompt assembly |
//! | [`chat`] | Retrieval-augmented chat turns |
//! | [`search`] | `rag query` |
//! | [`stats`] | `rag stats` |
//! | [`http`] | Blocking HTTP with retry |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod flat;
pub mod http;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod npy;
pub mod search;
pub mod snapshot;
pub mod stats;

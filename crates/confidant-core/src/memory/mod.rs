//! Long-term memory for Confidant.
//!
//! - `Embedder` / `BoxEmbedder`: text to vector collaborator
//! - `VectorMemoryStore` / `BoxVectorMemoryStore`: similarity search collaborator
//! - `ScopedMemoryStore`: session/user/server adapter over both
//! - `MemoryExtractor`: background extraction after a turn

pub mod box_embedder;
pub mod box_vector;
pub mod embedder;
pub mod extractor;
pub mod scoring;
pub mod store;
pub mod vector;

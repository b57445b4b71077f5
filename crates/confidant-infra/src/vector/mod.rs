//! Vector memory infrastructure.
//!
//! Provides the LanceDB-backed vector store and the HTTP embedding client
//! that together back `ScopedMemoryStore`.

pub mod embedder;
pub mod lance;
pub mod schema;
pub mod store;

//! Infrastructure layer for Confidant.
//!
//! Contains implementations of the collaborator traits defined in
//! `confidant-core`: SQLite session and vector storage, the OpenAI-compatible
//! HTTP provider, the embedding client, SearXNG web search, and the
//! `confidant.toml` loader.

pub mod config;
pub mod llm;
pub mod search;
pub mod sqlite;
pub mod vector;

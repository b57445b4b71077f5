//! Shared domain types for Confidant.
//!
//! This crate contains the domain types used across the Confidant workspace:
//! messages and sessions, scoped memories, reasoning traces, configuration,
//! and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod reasoning;
pub mod search;

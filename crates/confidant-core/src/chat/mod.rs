//! Conversation orchestration.
//!
//! - `SessionRepository`: persistence port for sessions and messages
//! - `HistoryCache`: process-local short-term history
//! - `HistoryCompactor` / `SessionMaintainer`: keep sessions within budget
//! - `SessionScheduler`: background refresh, compaction, memory cleanup
//! - `ChatService`: the per-message pipeline

pub mod compactor;
pub mod history;
pub mod maintenance;
pub mod repository;
pub mod scheduler;
pub mod service;

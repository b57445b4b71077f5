//! Reasoning pass run before the final generation.
//!
//! - `engine`: the bounded think-then-act loop
//! - `thought`: defensive parsing of structured decisions
//! - `tone`, `context`: local heuristics behind two of the actions
//! - `search`: the web-search collaborator interface

pub mod context;
pub mod engine;
pub mod search;
pub mod thought;
pub mod tone;

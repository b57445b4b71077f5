//! Conversation core for Confidant.
//!
//! Business logic and collaborator traits ("ports") only. Concrete
//! providers, stores, and search clients live in `confidant-infra`; this
//! crate depends on `confidant-types` and never on infrastructure crates.

pub mod chat;
pub mod gate;
pub mod llm;
pub mod memory;
pub mod reasoning;

#[cfg(test)]
pub(crate) mod test_support;

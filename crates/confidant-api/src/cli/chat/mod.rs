//! Interactive CLI chat for Confidant.
//!
//! The terminal plays the part of a chat platform: each line is an inbound
//! message for one conversation, and replies are rendered as markdown.
//! Entry point: `loop_runner::run_chat_loop`.

pub mod banner;
pub mod commands;
pub mod input;
pub mod loop_runner;
pub mod renderer;

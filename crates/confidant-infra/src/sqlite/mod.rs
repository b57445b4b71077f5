//! SQLite persistence: the shared pool and the session repository.

pub mod pool;
pub mod session;

//! Web search result types.

use serde::{Deserialize, Serialize};

/// A single result from the web-search collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

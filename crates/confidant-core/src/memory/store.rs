//! Scoped memory store adapter.
//!
//! Sits between the conversation core and the two memory collaborators (the
//! embedder and the vector store). Creation scores, sizes, and embeds a
//! memory; retrieval searches session, user, and server scopes independently
//! and renders one budgeted text block for the prompt.
//!
//! Every failure here is local to the memory call. Retrieval degrades to
//! "no memory context" instead of erroring.

use chrono::Utc;
use uuid::Uuid;

use confidant_types::config::MemoryConfig;
use confidant_types::error::MemoryError;
use confidant_types::memory::{MemoryFilter, MemoryMatch, MemoryRecord, MemoryScope, NewMemory};

use super::box_embedder::BoxEmbedder;
use super::box_vector::BoxVectorMemoryStore;
use super::scoring::{clamp_importance, score_importance};
use crate::llm::tokens::TokenEstimator;

pub const SESSION_HEADER: &str = "From this conversation:";
pub const USER_HEADER: &str = "From your previous conversations:";
pub const SERVER_HEADER: &str = "Server shared knowledge:";

/// Memory adapter over an embedder and a vector store.
pub struct ScopedMemoryStore {
    vectors: BoxVectorMemoryStore,
    embedder: BoxEmbedder,
    tokens: TokenEstimator,
    config: MemoryConfig,
}

impl ScopedMemoryStore {
    pub fn new(
        vectors: BoxVectorMemoryStore,
        embedder: BoxEmbedder,
        tokens: TokenEstimator,
        config: MemoryConfig,
    ) -> Self {
        Self {
            vectors,
            embedder,
            tokens,
            config,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Score, size, embed, and persist a memory.
    ///
    /// # Errors
    /// - `BelowImportanceThreshold` when the (computed or supplied) importance is under the minimum
    /// - `EmbeddingUnavailable` when the embedder fails
    /// - `StoreDegraded` when the vector store rejects the write
    #[tracing::instrument(
        name = "memory_create",
        skip(self, new),
        fields(session_id = %new.session_id, scope = %new.scope, memory_type = %new.memory_type)
    )]
    pub async fn create(&self, new: NewMemory) -> Result<MemoryRecord, MemoryError> {
        let content = new.content.trim().to_string();
        if content.is_empty() {
            return Err(MemoryError::EmptyContent);
        }

        let importance = match new.importance {
            Some(explicit) => clamp_importance(explicit),
            None => score_importance(&content, new.memory_type, new.scope),
        };
        if importance < self.config.min_importance {
            tracing::debug!(importance, minimum = self.config.min_importance, "Memory below importance threshold");
            return Err(MemoryError::BelowImportanceThreshold {
                importance,
                minimum: self.config.min_importance,
            });
        }

        let estimated_tokens = self.tokens.estimate(&content);

        let embedding = self
            .embedder
            .embed(&content)
            .await
            .map_err(|e| MemoryError::EmbeddingUnavailable(e.to_string()))?;

        let record = MemoryRecord {
            id: Uuid::now_v7(),
            session_id: new.session_id,
            user_id: new.user_id,
            server_id: new.server_id,
            scope: new.scope,
            content,
            memory_type: new.memory_type,
            importance,
            estimated_tokens,
            embedding,
            created_at: Utc::now(),
        };

        self.vectors
            .upsert(&record)
            .await
            .map_err(|e| MemoryError::StoreDegraded(e.to_string()))?;

        tracing::debug!(memory_id = %record.id, importance, "Memory stored");
        Ok(record)
    }

    /// Search all applicable scopes and render one prompt block.
    ///
    /// Returns `None` when no scope produced a match or the memory layer is
    /// unavailable; callers proceed without memory context.
    #[tracing::instrument(name = "memory_query_combined", skip(self, query), fields(session_id = %session_id))]
    pub async fn query_combined(
        &self,
        session_id: Uuid,
        user_id: Option<&str>,
        server_id: Option<&str>,
        query: &str,
    ) -> Option<String> {
        if !self.config.enabled || query.trim().is_empty() {
            return None;
        }

        let vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(error = %e, "Embedding unavailable, proceeding without memory context");
                return None;
            }
        };

        let session = self
            .search_scope(&vector, MemoryFilter::session(session_id), self.config.session_top_k)
            .await;
        let user = match user_id {
            Some(user_id) => {
                self.search_scope(&vector, MemoryFilter::user(user_id), self.config.user_top_k)
                    .await
            }
            None => Vec::new(),
        };
        let server = match server_id {
            Some(server_id) => {
                self.search_scope(
                    &vector,
                    MemoryFilter::server(server_id),
                    self.config.server_top_k,
                )
                .await
            }
            None => Vec::new(),
        };

        self.render(&[
            (SESSION_HEADER, session),
            (USER_HEADER, user),
            (SERVER_HEADER, server),
        ])
    }

    async fn search_scope(
        &self,
        vector: &[f32],
        filter: MemoryFilter,
        top_k: usize,
    ) -> Vec<MemoryMatch> {
        if top_k == 0 {
            return Vec::new();
        }
        match self
            .vectors
            .query_similar(vector, &filter, top_k, self.config.similarity_threshold)
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, scope = ?filter.scope, "Memory store degraded, skipping scope");
                Vec::new()
            }
        }
    }

    /// Render grouped matches, stopping once the token budget is spent.
    fn render(&self, groups: &[(&str, Vec<MemoryMatch>)]) -> Option<String> {
        let budget = self.config.context_token_budget;
        let mut used: u32 = 0;
        let mut sections: Vec<String> = Vec::new();
        let mut exhausted = false;

        for (header, matches) in groups {
            if exhausted {
                break;
            }
            let mut lines: Vec<String> = Vec::new();
            for m in matches {
                let line = format!("- {}", m.record.content);
                let cost = self.tokens.estimate(&line);
                if used + cost > budget {
                    exhausted = true;
                    break;
                }
                used += cost;
                lines.push(line);
            }
            if !lines.is_empty() {
                sections.push(format!("{header}\n{}", lines.join("\n")));
            }
        }

        if sections.is_empty() {
            None
        } else {
            Some(sections.join("\n\n"))
        }
    }

    /// Ranked memories for one user.
    ///
    /// With a query, runs a similarity search in the user's scope; without
    /// one, lists the user's memories by importance.
    pub async fn query_user(
        &self,
        user_id: &str,
        query: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<MemoryMatch>, MemoryError> {
        let filter = MemoryFilter::user(user_id);
        match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => {
                let vector = self
                    .embedder
                    .embed(query)
                    .await
                    .map_err(|e| MemoryError::EmbeddingUnavailable(e.to_string()))?;
                self.vectors
                    .query_similar(&vector, &filter, max_results, self.config.similarity_threshold)
                    .await
                    .map_err(|e| MemoryError::StoreDegraded(e.to_string()))
            }
            None => {
                let records = self
                    .vectors
                    .list(&filter, max_results)
                    .await
                    .map_err(|e| MemoryError::StoreDegraded(e.to_string()))?;
                Ok(records
                    .into_iter()
                    .map(|record| MemoryMatch {
                        record,
                        similarity: 1.0,
                    })
                    .collect())
            }
        }
    }

    /// Delete memories older than `max_age` whose importance is below `importance_below`.
    pub async fn cleanup(
        &self,
        max_age: chrono::Duration,
        importance_below: f32,
    ) -> Result<u64, MemoryError> {
        let filter = MemoryFilter {
            created_before: Some(Utc::now() - max_age),
            importance_below: Some(importance_below),
            ..Default::default()
        };
        let deleted = self
            .vectors
            .delete_where(&filter)
            .await
            .map_err(|e| MemoryError::StoreDegraded(e.to_string()))?;
        tracing::info!(deleted, importance_below, "Memory cleanup finished");
        Ok(deleted)
    }

    /// Cleanup using the configured age and importance cut-offs.
    pub async fn cleanup_default(&self) -> Result<u64, MemoryError> {
        self.cleanup(
            chrono::Duration::days(i64::from(self.config.cleanup_max_age_days)),
            self.config.cleanup_importance_below,
        )
        .await
    }

    /// Erase every memory tied to `user_id`, in any scope.
    pub async fn forget_user(&self, user_id: &str) -> Result<u64, MemoryError> {
        let filter = MemoryFilter {
            user_id: Some(user_id.to_string()),
            ..Default::default()
        };
        let deleted = self
            .vectors
            .delete_where(&filter)
            .await
            .map_err(|e| MemoryError::StoreDegraded(e.to_string()))?;
        tracing::info!(user_id, deleted, "Erased user memories");
        Ok(deleted)
    }
}

/// Scope used for an extracted or explicit memory given who is known.
pub fn scope_for(preferred: MemoryScope, user_id: Option<&str>, server_id: Option<&str>) -> MemoryScope {
    match preferred {
        MemoryScope::User if user_id.is_none() => MemoryScope::Session,
        MemoryScope::Server if server_id.is_none() => MemoryScope::Session,
        other => other,
    }
}

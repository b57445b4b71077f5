//! Application state wiring all services together.
//!
//! Core services are generic over their collaborators; `AppState` pins them
//! to the SQLite, LanceDB, HTTP, and OpenAI-compatible implementations in
//! `confidant-infra`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use confidant_core::chat::compactor::HistoryCompactor;
use confidant_core::chat::history::HistoryCache;
use confidant_core::chat::maintenance::SessionMaintainer;
use confidant_core::chat::scheduler::SessionScheduler;
use confidant_core::chat::service::ChatService;
use confidant_core::gate::ConversationGate;
use confidant_core::gate::sweeper::spawn_idle_sweeper;
use confidant_core::llm::executor::ProviderExecutor;
use confidant_core::llm::tokens::TokenEstimator;
use confidant_core::memory::box_embedder::BoxEmbedder;
use confidant_core::memory::box_vector::BoxVectorMemoryStore;
use confidant_core::memory::extractor::MemoryExtractor;
use confidant_core::memory::store::ScopedMemoryStore;
use confidant_core::reasoning::engine::ReasoningLoop;
use confidant_core::reasoning::search::BoxWebSearch;
use confidant_infra::config::{load_config, resolve_data_dir};
use confidant_infra::llm::{build_executor, env_lookup};
use confidant_infra::search::SearxngSearch;
use confidant_infra::sqlite::pool::DatabasePool;
use confidant_infra::sqlite::session::SqliteSessionRepository;
use confidant_infra::vector::embedder::HttpEmbedder;
use confidant_infra::vector::lance::LanceVectorStore;
use confidant_infra::vector::store::LanceMemoryStore;
use confidant_types::config::CompanionConfig;

pub type ConcreteChatService = ChatService<SqliteSessionRepository, ProviderExecutor>;

pub type ConcreteScheduler = SessionScheduler<SqliteSessionRepository, ProviderExecutor>;

/// Shared application state holding all services.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: CompanionConfig,
    pub sessions: Arc<SqliteSessionRepository>,
    pub executor: Arc<ProviderExecutor>,
    pub memory: Option<Arc<ScopedMemoryStore>>,
    pub gate: Arc<ConversationGate>,
    pub chat_service: Arc<ConcreteChatService>,
    pub scheduler: Arc<ConcreteScheduler>,
}

impl AppState {
    /// Initialize the application state: load config, open the database, wire services.
    pub async fn init(data_dir: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir(data_dir);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;
        let db_pool = DatabasePool::open_in(&data_dir)
            .await
            .with_context(|| format!("Failed to open database in {}", data_dir.display()))?;

        tracing::info!(
            data_dir = %data_dir.display(),
            providers = config.providers.len(),
            "Initializing Confidant"
        );

        let tokens = TokenEstimator::heuristic();
        let memory = build_memory(&config, &data_dir, tokens.clone()).await;

        Ok(Self::wire(data_dir, config, db_pool, memory, tokens))
    }

    /// Build every service from an already-opened pool and memory store.
    fn wire(
        data_dir: PathBuf,
        config: CompanionConfig,
        db_pool: DatabasePool,
        memory: Option<Arc<ScopedMemoryStore>>,
        tokens: TokenEstimator,
    ) -> Self {
        let sessions = Arc::new(SqliteSessionRepository::new(db_pool));
        let executor = Arc::new(build_executor(&config, env_lookup));
        if executor.provider_names().is_empty() {
            tracing::warn!("No providers configured; every reply will be the fallback apology");
        }

        let gate = Arc::new(ConversationGate::from_config(&config.gate));
        let history = Arc::new(HistoryCache::new());
        let extractor = memory
            .as_ref()
            .filter(|m| m.config().extraction_enabled)
            .map(|m| Arc::new(MemoryExtractor::new(Arc::clone(&executor), Arc::clone(m))));

        let compactor = HistoryCompactor::new(Arc::clone(&executor), tokens, &config.compaction);
        let stale_after = chrono::Duration::minutes(
            config.scheduler.stale_after_mins.min(u64::from(u32::MAX)) as i64,
        );
        let mut maintainer =
            SessionMaintainer::new(Arc::clone(&sessions), compactor, Arc::clone(&history), stale_after);
        if let Some(extractor) = &extractor {
            maintainer = maintainer.with_extractor(Arc::clone(extractor));
        }
        let maintainer = Arc::new(maintainer);

        let mut chat = ChatService::new(
            Arc::clone(&sessions),
            Arc::clone(&executor),
            Arc::clone(&gate),
            history,
            Arc::clone(&maintainer),
            config.persona.clone(),
        );
        if let Some(memory) = &memory {
            chat = chat.with_memory(Arc::clone(memory));
        }
        if config.reasoning.enabled {
            chat = chat.with_reasoning(build_reasoning(&config, &executor, memory.as_ref()));
        }
        if let Some(extractor) = extractor {
            chat = chat.with_extractor(extractor);
        }

        let mut scheduler = SessionScheduler::new(
            Arc::clone(&sessions),
            maintainer,
            Arc::clone(&gate),
            config.scheduler.clone(),
        );
        if let Some(memory) = &memory {
            scheduler = scheduler.with_memory_cleanup(Arc::clone(memory));
        }

        Self {
            data_dir,
            config,
            sessions,
            executor,
            memory,
            gate,
            chat_service: Arc::new(chat),
            scheduler: Arc::new(scheduler),
        }
    }

    /// Start the session scheduler and the idle-lock sweeper.
    ///
    /// Both stop when `cancel` fires.
    pub fn spawn_background(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = vec![spawn_idle_sweeper(
            Arc::clone(&self.gate),
            Duration::from_secs(self.config.gate.sweep_interval_secs),
            cancel.clone(),
            {
                let chat = Arc::clone(&self.chat_service);
                move |evicted: &[_]| chat.release_idle(evicted)
            },
        )];
        if self.config.scheduler.enabled {
            handles.push(Arc::clone(&self.scheduler).spawn(cancel.clone()));
        }
        handles
    }

    /// The memory store, or an error explaining why it is unavailable.
    pub fn require_memory(&self) -> anyhow::Result<&Arc<ScopedMemoryStore>> {
        self.memory.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "Long-term memory is disabled or its embedder could not be created. \
                 Check the [memory] and [embeddings] sections of confidant.toml."
            )
        })
    }
}

async fn build_memory(
    config: &CompanionConfig,
    data_dir: &Path,
    tokens: TokenEstimator,
) -> Option<Arc<ScopedMemoryStore>> {
    if !config.memory.enabled {
        tracing::debug!("Long-term memory disabled");
        return None;
    }

    let embedder = match HttpEmbedder::new(&config.embeddings, env_lookup) {
        Ok(embedder) => embedder,
        Err(e) => {
            tracing::warn!(error = %e, "Embedder unavailable; long-term memory disabled");
            return None;
        }
    };

    let vectors = match LanceVectorStore::open(data_dir.join("vectors")).await {
        Ok(vectors) => vectors,
        Err(e) => {
            tracing::warn!(error = %e, "Vector store unavailable; long-term memory disabled");
            return None;
        }
    };

    Some(Arc::new(ScopedMemoryStore::new(
        BoxVectorMemoryStore::new(LanceMemoryStore::new(vectors)),
        BoxEmbedder::new(embedder),
        tokens,
        config.memory.clone(),
    )))
}

fn build_reasoning(
    config: &CompanionConfig,
    executor: &Arc<ProviderExecutor>,
    memory: Option<&Arc<ScopedMemoryStore>>,
) -> ReasoningLoop<ProviderExecutor> {
    let mut reasoning = ReasoningLoop::new(Arc::clone(executor), config.reasoning.clone());
    if let Some(memory) = memory {
        reasoning = reasoning.with_memory(Arc::clone(memory));
    }

    if let Some(url) = config.web_search.searxng_url.as_deref() {
        match SearxngSearch::new(url, Duration::from_secs(config.web_search.timeout_secs)) {
            Ok(search) => {
                reasoning = reasoning.with_search(Arc::new(BoxWebSearch::new(search)));
            }
            Err(e) => tracing::warn!(error = %e, "Web search unavailable"),
        }
    }
    reasoning
}

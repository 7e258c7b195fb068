//! HTTP front door: the only way a turn gets started, redirected, or
//! cancelled from outside this process. Adapted from the teacher's
//! `factory::server`/`factory::api` axum surface — same `AppState` +
//! `api_router()` + `build_router()` split, same `ApiError` → `IntoResponse`
//! pattern — pointed at the turn engine instead of a project/issue board.

pub mod routes;
pub mod sse;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::document::Mode;
use crate::injection::InjectionManager;
use crate::llm::{HttpLlmClient, LlmClient};
use crate::memory::MemoryCandidate;
use crate::orchestrator::{Orchestrator, TurnEvent};
use crate::persistence::index::TurnIndex;
use crate::persistence::TurnWriter;
use crate::phases::context_retrieval::ExternalCandidates;
use crate::phases::PhaseContext;
use crate::recipes::RecipeRegistry;
use crate::session::SessionRegistry;
use crate::tools::ToolRegistry;
use crate::workflows::WorkflowRegistry;

/// Everything a turn needs to run, built once at process start. Exists so
/// a [`PhaseContext`] can be constructed per-request without re-reading
/// config or re-loading registries on every `/chat` call.
pub struct Engine {
    config: Config,
    llm: Box<dyn LlmClient>,
    recipes: RecipeRegistry,
    tools: ToolRegistry,
    workflows: WorkflowRegistry,
    turn_writer: TurnWriter,
    turn_index: TurnIndex,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        config.ensure_directories().context("failed to prepare .turnkit directories")?;
        let llm = Box::new(HttpLlmClient::new(config.llm_endpoint(), config.llm_model()));
        let recipes = RecipeRegistry::load(None).context("failed to load recipes")?;
        let tools = ToolRegistry::new();
        let workflows = WorkflowRegistry::default();
        let turn_writer = TurnWriter::new(config.turns_dir.clone());
        let turn_index = TurnIndex::new(config.turns_dir.clone());
        Ok(Self { config, llm, recipes, tools, workflows, turn_writer, turn_index })
    }

    pub fn phase_context(&self) -> PhaseContext<'_> {
        PhaseContext {
            config: &self.config,
            llm: self.llm.as_ref(),
            recipes: &self.recipes,
            tools: &self.tools,
            workflows: &self.workflows,
            turn_writer: &self.turn_writer,
            turn_index: &self.turn_index,
        }
    }

    /// Loads the forever-memory and research-cache candidate pools Phase
    /// 2.1 stages from, on top of the recent/older turns it already pulls
    /// from the turn index. Both stores are one-JSON-object-per-line files
    /// under their configured path; a missing file just means an empty
    /// pool rather than an error, since neither exists until something has
    /// written to it.
    pub fn external_candidates(&self) -> ExternalCandidates {
        ExternalCandidates {
            forever_memory: load_candidate_pool(&self.config.memory_store_path.join("forever.jsonl")),
            research_cache: load_candidate_pool(&self.config.research_cache_path.join("cache.jsonl")),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn load_candidate_pool(path: &std::path::Path) -> Vec<MemoryCandidate> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<StoredCandidate>(line).ok())
        .map(|c| MemoryCandidate::new(c.text, c.source, c.recorded_at))
        .collect()
}

#[derive(serde::Deserialize)]
struct StoredCandidate {
    text: String,
    source: crate::document::ContextSource,
    recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Shared state every Gateway handler closes over. `events` fans out to
/// whichever `/chat` caller is currently streaming a given turn; turns
/// with no subscriber still run to completion, same as the teacher's
/// `ws_tx` broadcast that keeps publishing with zero connected clients.
pub struct AppState {
    pub engine: Arc<Engine>,
    pub injections: Arc<InjectionManager>,
    pub sessions: Arc<SessionRegistry>,
    pub interventions: Arc<routes::InterventionRegistry>,
    pub events: broadcast::Sender<TurnEvent>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(engine: Engine) -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self {
            engine: Arc::new(engine),
            injections: Arc::new(InjectionManager::new()),
            sessions: Arc::new(SessionRegistry::new()),
            interventions: Arc::new(routes::InterventionRegistry::new()),
            events,
        }
    }

    /// Builds an [`Orchestrator`] borrowing this request's [`PhaseContext`]
    /// and the shared injection manager and event bus. The `PhaseContext`
    /// and `InjectionManager` reference must outlive the orchestrator, so
    /// callers keep both alive across the `run_turn` await.
    pub fn orchestrator<'a>(&'a self, ctx: &'a PhaseContext<'a>) -> Orchestrator<'a> {
        Orchestrator::new(ctx, &self.injections, self.events.clone())
    }
}

pub fn build_router(state: SharedState) -> Router {
    routes::api_router().layer(CorsLayer::permissive()).with_state(state)
}

pub struct ServerConfig {
    pub port: u16,
    pub project_dir: PathBuf,
    pub engine_toml_path: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 4173, project_dir: PathBuf::from("."), engine_toml_path: None, verbose: false }
    }
}

/// Builds the engine, binds the port, and serves until Ctrl-C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let engine_config = Config::new(config.project_dir, config.verbose, config.engine_toml_path)
        .context("failed to resolve engine configuration")?;
    let engine = Engine::new(engine_config).context("failed to initialize engine")?;
    let state = Arc::new(AppState::new(engine));

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "gateway listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server error")
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

/// Mirrors [`Mode`]'s wire representation in request bodies; kept separate
/// from [`Mode`] itself so a malformed `mode` field produces a clean 400
/// instead of a generic deserialize failure bubbling out of `/chat`.
pub(crate) fn parse_mode(raw: &str) -> Option<Mode> {
    match raw {
        "chat" => Some(Mode::Chat),
        "code" => Some(Mode::Code),
        _ => None,
    }
}

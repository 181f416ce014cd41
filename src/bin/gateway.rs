//! Ambient transport shim (§6.1): a minimal Axum router exposing the
//! orchestrator's three-request surface over HTTP. Session routing,
//! channel plugins, PDF rendering, and static file serving are out of
//! scope here -- this binary exists to drive `OrchestratorHandle`
//! end to end, not to replace a real gateway deployment.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use secrecy::ExposeSecret;
use tracing::info;

use agentflow::agent::OrchestratorModelClient;
use agentflow::config::Config;
use agentflow::core::provider::LlmProvider;
use agentflow::core::storage::StorageBackend;
use agentflow::database::{init_pool, MemoryStore, PostgresSessionStore};
use agentflow::gateway::{
    EvaluationSink, FollowUpRequest, GatewayEvent, OrchestratorHandle, OrchestratorService,
    RunAgentRequest, SubmitEvaluationRequest,
};
use agentflow::memory::{EmbeddingService, MemoryCache, MemoryRetriever};
use agentflow::rl::RlSelector;
use agentflow::sandbox::create_executor;
use agentflow::tools::{DuckDuckGoSearchTool, ToolCatalog};
use agentflow::{agent::OpenRouterClient, Error, Result};

struct AppState {
    handle: Arc<dyn OrchestratorHandle>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("agentflow=debug".parse().unwrap()),
        )
        .init();

    info!("Starting agentflow gateway v{}", agentflow::VERSION);

    let config = Config::from_env()?;
    let service = build_service(&config).await?;
    let state = Arc::new(AppState { handle: Arc::new(service) });

    let app = Router::new()
        .route("/run_agent", post(run_agent))
        .route("/follow_up_response", post(follow_up_response))
        .route("/submit_evaluation", post(submit_evaluation))
        .with_state(state);

    let bind = format!("{}:{}", config.gateway.bind, config.gateway.port);
    info!("Listening on {bind}");
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_service(config: &Config) -> Result<OrchestratorService> {
    let openrouter_config = config
        .provider
        .openrouter
        .clone()
        .ok_or_else(|| Error::Config("provider.openrouter is required to run the gateway".to_string()))?;
    if openrouter_config.api_key.expose_secret().is_empty() {
        return Err(Error::Config("OPENROUTER_API_KEY is required".to_string()));
    }

    let cloud: Arc<dyn LlmProvider> = Arc::new(OpenRouterClient::new(openrouter_config)?);
    let local_base_url =
        std::env::var("LOCAL_MODEL_BASE_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
    let model_client = Arc::new(OrchestratorModelClient::new(cloud, local_base_url));

    let postgres_config = config
        .storage
        .postgres
        .clone()
        .ok_or_else(|| Error::Config("storage.postgres is required to run the gateway".to_string()))?;
    let pool = init_pool(&postgres_config).await?;
    let session_store: Arc<dyn StorageBackend> = Arc::new(PostgresSessionStore::new(pool.clone()));

    let executor: Arc<dyn agentflow::sandbox::CodeExecutor> =
        Arc::from(create_executor(&config.sandbox).await?);

    let catalog = ToolCatalog::new().with_builtins().build();

    let search_tool = DuckDuckGoSearchTool::new();
    let memory_retriever =
        MemoryRetriever::new(MemoryStore::new(pool), EmbeddingService::new()?, MemoryCache::new());

    let rl_search_tool: Arc<dyn agentflow::tools::Tool> = Arc::new(DuckDuckGoSearchTool::new());
    let rl_retriever = Arc::new(memory_retriever.clone());
    let rl_selector = Arc::new(
        RlSelector::load(
            model_client.clone(),
            config.agent.model.clone(),
            session_store.clone(),
            Some(rl_retriever),
            Some(rl_search_tool),
            config.rl.clone(),
        )
        .await?,
    );
    let evaluation_sink: Arc<dyn EvaluationSink> = rl_selector;

    Ok(OrchestratorService {
        model_client,
        model: config.agent.model.clone(),
        executor,
        session_store,
        orchestrator_config: config.orchestrator.clone(),
        deep_search_config: config.deep_search.clone(),
        catalog,
        evaluation_sink: Some(evaluation_sink),
        search_tool,
        memory_retriever,
    })
}

async fn run_agent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunAgentRequest>,
) -> Result<Json<Vec<GatewayEvent>>> {
    let events = state.handle.run_agent(request).await?;
    Ok(Json(events))
}

async fn follow_up_response(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FollowUpRequest>,
) -> Result<Json<serde_json::Value>> {
    state.handle.follow_up_response(request).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn submit_evaluation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitEvaluationRequest>,
) -> Result<Json<Vec<GatewayEvent>>> {
    let events = state.handle.submit_evaluation(request).await?;
    Ok(Json(events))
}

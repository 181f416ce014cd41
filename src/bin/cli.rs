//! Operator CLI for agentflow
//!
//! Command-line interface for configuration, migrations, and driving the
//! orchestrator directly without going through the gateway's HTTP surface.

use clap::{Parser, Subcommand};
use console::style;

use agentflow::agent::{
    AgenticLoop, DeepSearchOutcome, DeepSearchPlanner, OpenRouterClient, OrchestratorModelClient,
};
use agentflow::config::{config_path, save_config, Config};
use agentflow::core::provider::{GenerationOptions, LlmProvider, Message};
use agentflow::core::storage::StorageBackend;
use agentflow::database::{init_pool, init_pool_for_migrations, migrations, MemoryStore, PostgresSessionStore};
use agentflow::memory::{EmbeddingService, MemoryCache, MemoryRetriever};
use agentflow::rl::RlSelector;
use agentflow::sandbox::create_executor;
use agentflow::tools::{DuckDuckGoSearchTool, ToolCatalog};
use agentflow::{Error, Result, VERSION};
use secrecy::ExposeSecret;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "agentflow",
    author = "agentflow contributors",
    version = VERSION,
    about = "agentflow - a multi-strategy LLM agent orchestrator",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample configuration file to the default config path
    InitConfig,

    /// Check configuration, provider, and database connectivity
    Status,

    /// Run database migrations
    Migrate,

    /// List models available from the configured provider
    Models,

    /// Send one message through the provider directly, bypassing the loop
    TestLlm {
        /// Model override
        #[arg(short, long)]
        model: Option<String>,
        /// Prompt text
        prompt: String,
    },

    /// Run one session through the plan/execute/evaluate loop to completion
    Run {
        /// Session ID (generated if omitted)
        #[arg(long)]
        session: Option<String>,
        /// The request to plan and execute
        goal: String,
    },

    /// Run one session through the deep-search DAG planner
    DeepSearch {
        /// Session ID (generated if omitted)
        #[arg(long)]
        session: Option<String>,
        /// Minimum number of agents the planner should propose
        #[arg(long, default_value_t = 2)]
        min_agents: u32,
        /// The research goal
        goal: String,
    },

    /// Deliver a follow-up reply into a suspended deep-search session
    FollowUp {
        /// Session ID to resume
        session: String,
        /// The reply text
        answer: String,
    },

    /// Run one query through the RL meta-selector's retrieval strategy
    Retrieve {
        /// Session ID the resulting rating (if any) will be recorded under
        #[arg(long)]
        session: Option<String>,
        /// The query to answer
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig => cmd_init_config(),
        Commands::Status => cmd_status().await,
        Commands::Migrate => cmd_migrate().await,
        Commands::Models => cmd_models().await,
        Commands::TestLlm { model, prompt } => cmd_test_llm(model, prompt).await,
        Commands::Run { session, goal } => cmd_run(session, goal).await,
        Commands::DeepSearch { session, min_agents, goal } => cmd_deep_search(session, min_agents, goal).await,
        Commands::FollowUp { session, answer } => cmd_follow_up(session, answer).await,
        Commands::Retrieve { session, query } => cmd_retrieve(session, query).await,
    }
}

fn cmd_init_config() -> Result<()> {
    let path = config_path();
    if path.exists() {
        println!("{} config already exists at {}", style("!").yellow(), path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    save_config(&Config::default(), &path)?;
    println!("{} wrote sample configuration to {}", style("✓").green(), path.display());
    Ok(())
}

async fn cmd_status() -> Result<()> {
    let config = Config::from_env()?;
    println!("agentflow v{VERSION}");
    println!("  model:       {}", config.agent.model);
    println!("  execution:   {:?}", config.sandbox.execution_env);

    match &config.provider.openrouter {
        Some(openrouter) if !openrouter.api_key.expose_secret().is_empty() => {
            match OpenRouterClient::new(openrouter.clone()) {
                Ok(client) => match client.health_check().await {
                    Ok(true) => println!("  provider:    {}", style("connected").green()),
                    Ok(false) | Err(_) => println!("  provider:    {}", style("unreachable").red()),
                },
                Err(e) => println!("  provider:    {} ({e})", style("misconfigured").red()),
            }
        }
        _ => println!("  provider:    {}", style("no API key configured").yellow()),
    }

    match &config.storage.postgres {
        Some(pg) => match init_pool(pg).await {
            Ok(_) => println!("  database:    {}", style("connected").green()),
            Err(e) => println!("  database:    {} ({e})", style("unreachable").red()),
        },
        None => println!("  database:    {}", style("not configured").yellow()),
    }

    Ok(())
}

async fn cmd_migrate() -> Result<()> {
    let config = Config::from_env()?;
    let pg = config
        .storage
        .postgres
        .ok_or_else(|| Error::Config("storage.postgres is required to run migrations".to_string()))?;
    let pool = init_pool_for_migrations(&pg).await?;
    migrations::run(&pool).await?;
    println!("{} migrations applied", style("✓").green());
    Ok(())
}

async fn cmd_models() -> Result<()> {
    let config = Config::from_env()?;
    let openrouter = config
        .provider
        .openrouter
        .ok_or_else(|| Error::Config("provider.openrouter is required".to_string()))?;
    let client = OpenRouterClient::new(openrouter)?;
    for model in client.list_models().await? {
        println!("{}", model.id);
    }
    Ok(())
}

async fn cmd_test_llm(model: Option<String>, prompt: String) -> Result<()> {
    let config = Config::from_env()?;
    let openrouter = config
        .provider
        .openrouter
        .ok_or_else(|| Error::Config("provider.openrouter is required".to_string()))?;
    let client = OpenRouterClient::new(openrouter)?;
    let model = model.unwrap_or(config.agent.model);
    let options = GenerationOptions { model: Some(model.clone()), ..Default::default() };
    let response = client.generate(&[Message::user(prompt)], &options).await?;
    println!("{}", response.content);
    Ok(())
}

async fn cmd_run(session: Option<String>, goal: String) -> Result<()> {
    let config = Config::from_env()?;
    let openrouter = config
        .provider
        .openrouter
        .ok_or_else(|| Error::Config("provider.openrouter is required".to_string()))?;
    let cloud: Arc<dyn LlmProvider> = Arc::new(OpenRouterClient::new(openrouter)?);
    let local_base_url =
        std::env::var("LOCAL_MODEL_BASE_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
    let model_client = OrchestratorModelClient::new(cloud, local_base_url);
    let executor = create_executor(&config.sandbox).await?;
    let catalog = ToolCatalog::new().with_builtins().build();
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let loop_runner = AgenticLoop::new(&model_client, &config.agent.model, executor.as_ref(), &config.orchestrator);
    let output = loop_runner.run(&goal, "", &catalog, &session_id).await?;

    println!("{}", output.final_answer);
    eprintln!(
        "{} {} iteration(s), ceiling reached: {}",
        style("·").dim(),
        output.iterations_used,
        output.max_iterations_reached
    );
    Ok(())
}

async fn cmd_deep_search(session: Option<String>, min_agents: u32, goal: String) -> Result<()> {
    let config = Config::from_env()?;
    let openrouter = config
        .provider
        .openrouter
        .ok_or_else(|| Error::Config("provider.openrouter is required".to_string()))?;
    let cloud: Arc<dyn LlmProvider> = Arc::new(OpenRouterClient::new(openrouter)?);
    let local_base_url =
        std::env::var("LOCAL_MODEL_BASE_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
    let model_client = OrchestratorModelClient::new(cloud, local_base_url);

    let pg = config
        .storage
        .postgres
        .ok_or_else(|| Error::Config("storage.postgres is required for deep-search sessions".to_string()))?;
    let pool = init_pool(&pg).await?;
    let search_tool = DuckDuckGoSearchTool::new();
    let memory_retriever =
        MemoryRetriever::new(MemoryStore::new(pool.clone()), EmbeddingService::new()?, MemoryCache::new());
    let session_store: Box<dyn StorageBackend> = Box::new(PostgresSessionStore::new(pool));

    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let planner = DeepSearchPlanner::new(
        &model_client,
        &config.agent.model,
        session_store.as_ref(),
        Some(&search_tool),
        Some(&memory_retriever),
        &config.deep_search,
    );

    let outcome = planner.start(&session_id, None, &goal, min_agents).await?;
    print_deep_search_outcome(&session_id, outcome);
    Ok(())
}

async fn cmd_follow_up(session: String, answer: String) -> Result<()> {
    let config = Config::from_env()?;
    let openrouter = config
        .provider
        .openrouter
        .ok_or_else(|| Error::Config("provider.openrouter is required".to_string()))?;
    let cloud: Arc<dyn LlmProvider> = Arc::new(OpenRouterClient::new(openrouter)?);
    let local_base_url =
        std::env::var("LOCAL_MODEL_BASE_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
    let model_client = OrchestratorModelClient::new(cloud, local_base_url);

    let pg = config
        .storage
        .postgres
        .ok_or_else(|| Error::Config("storage.postgres is required for deep-search sessions".to_string()))?;
    let pool = init_pool(&pg).await?;
    let search_tool = DuckDuckGoSearchTool::new();
    let memory_retriever =
        MemoryRetriever::new(MemoryStore::new(pool.clone()), EmbeddingService::new()?, MemoryCache::new());
    let session_store: Box<dyn StorageBackend> = Box::new(PostgresSessionStore::new(pool));

    let planner = DeepSearchPlanner::new(
        &model_client,
        &config.agent.model,
        session_store.as_ref(),
        Some(&search_tool),
        Some(&memory_retriever),
        &config.deep_search,
    );

    let outcome = planner.answer_question(&session, &answer).await?;
    print_deep_search_outcome(&session, outcome);
    Ok(())
}

async fn cmd_retrieve(session: Option<String>, query: String) -> Result<()> {
    let config = Config::from_env()?;
    let openrouter = config
        .provider
        .openrouter
        .ok_or_else(|| Error::Config("provider.openrouter is required".to_string()))?;
    let cloud: Arc<dyn LlmProvider> = Arc::new(OpenRouterClient::new(openrouter)?);
    let local_base_url =
        std::env::var("LOCAL_MODEL_BASE_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
    let model_client = Arc::new(OrchestratorModelClient::new(cloud, local_base_url));

    let pg = config
        .storage
        .postgres
        .ok_or_else(|| Error::Config("storage.postgres is required for RL-tracked sessions".to_string()))?;
    let pool = init_pool(&pg).await?;
    let search_tool: Arc<dyn agentflow::tools::Tool> = Arc::new(DuckDuckGoSearchTool::new());
    let memory_retriever = Arc::new(MemoryRetriever::new(
        MemoryStore::new(pool.clone()),
        EmbeddingService::new()?,
        MemoryCache::new(),
    ));
    let session_store: Arc<dyn StorageBackend> = Arc::new(PostgresSessionStore::new(pool));

    let selector = RlSelector::load(
        model_client,
        config.agent.model,
        session_store,
        Some(memory_retriever),
        Some(search_tool),
        config.rl,
    )
    .await?;

    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let answer = selector.retrieve(&session_id, &query).await?;
    println!("{answer}");
    eprintln!(
        "{} session {session_id} -- submit a rating via the gateway's /submit_evaluation route to train the selector",
        style("·").dim()
    );
    Ok(())
}

fn print_deep_search_outcome(session_id: &str, outcome: DeepSearchOutcome) {
    match outcome {
        DeepSearchOutcome::Completed { final_answer } => {
            println!("{final_answer}");
        }
        DeepSearchOutcome::Suspended { agent_nickname, questions } => {
            println!(
                "{} session {session_id} is waiting on {agent_nickname} for:",
                style("?").yellow()
            );
            for question in questions {
                println!("  - {question}");
            }
            println!("Resume with: agentflow follow-up {session_id} \"<answer>\"");
        }
    }
}

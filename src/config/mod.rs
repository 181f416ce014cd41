//! Configuration module - Modular configuration management
//!
//! Splits configuration into focused modules:
//! - types/mod.rs: Core configuration types (Config, AgentConfig, etc.)
//! - types/provider.rs: LLM provider configuration
//! - types/orchestrator.rs: Plan/evaluate loop, deep-search, RL tuning
//! - types/storage.rs: Storage backend configuration
//! - types/sandbox.rs: Sandbox/execution configuration
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{Config, AgentConfig, GatewayConfig, ThinkingLevel};

// Re-export provider types
pub use types::provider::{
    ProviderConfig, OpenRouterConfig, AnthropicConfig, OpenAIConfig, FailoverConfig,
};

// Re-export orchestrator types
pub use types::orchestrator::{
    OrchestratorConfig, DeepSearchConfig, RlConfig, RlEstimatorMode,
};

// Re-export storage types
pub use types::storage::{
    StorageConfig, PostgresConfig, SqliteConfig, EmbeddingConfig,
};

// Backward compatibility aliases
pub type DatabaseConfig = PostgresConfig;

// Re-export sandbox types
pub use types::sandbox::{
    SandboxConfig, ExecutionEnv, ContainerConfig,
};

// Re-export IO and utilities
pub use io::{load_config, save_config, ConfigSnapshot};
pub use paths::{config_dir, config_path, state_dir, workspace_dir};
pub use validation::{validate_config, ConfigValidationResult};

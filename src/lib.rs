//! # agentflow
//!
//! A multi-strategy LLM agent orchestrator: a code-generation-and-execution
//! agent for direct requests, a DAG-based deep-search planner for
//! multi-step research, and a reinforcement-learning meta-selector that
//! picks between them.
//!
//! ## Architecture
//!
//! - **Core traits** (`core`): abstract interfaces for model providers and storage backends
//! - **Configuration** (`config`): modular configuration with focused type modules
//! - **Agent** (`agent`): model-gateway client, conversation state, and the plan/validate/execute/repair/evaluate loop
//! - **Domain** (`domain`): the shared data model — plans, steps, DAG nodes, knowledge-graph nodes, RL state
//! - **Validator** (`validator`): static pre-execution checks for generated step scripts
//! - **Tools** (`tools`): external-source bindings a step script can invoke by name
//! - **Storage** (`database`): persistence backends (PostgreSQL + pgvector)
//! - **Sandbox** (`sandbox`): secure code execution environments (OS, in-process script, container)
//! - **RL** (`rl`): the meta-selector's Q-value estimators and action selection
//! - **Gateway** (`gateway`): the control-plane transport shim
//!
//! ## Design Principles
//!
//! 1. **Trait-based abstraction**: model providers and storage backends are swappable behind traits
//! 2. **Modular configuration**: split into focused modules (provider, sandbox, storage, orchestrator)
//! 3. **Bounded repair**: every retry loop (validation, execution, iteration) carries an explicit budget
//! 4. **Security first**: multi-tier sandboxing, no unchecked code execution on the host
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agentflow::config::load_config;
//! use agentflow::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration from file or environment
//!     let config = load_config()?;
//!
//!     // Your orchestrator code here...
//!     Ok(())
//! }
//! ```

// Core abstractions (traits and fundamental types)
pub mod core;

// Agent logic and LLM interaction
pub mod agent;

// Modular configuration (now a directory module)
#[path = "config/mod.rs"]
pub mod config;

// Shared data model: plans, steps, DAG nodes, knowledge-graph nodes, RL state
pub mod domain;

// Database and storage backends
pub mod database;

// Memory: embedding generation, caching, and retrieval
pub mod memory;

// Error types
pub mod error;

// Secure execution sandboxes
pub mod sandbox;

// External-source bindings callable from generated step scripts
pub mod tools;

// Static validation of generated step scripts before execution
pub mod validator;

// Reinforcement-learning meta-selector for retrieval strategy
pub mod rl;

// Gateway transport shim (control plane)
#[path = "gateway/mod.rs"]
pub mod gateway;

// Re-export commonly used items
pub use error::{Error, Result};

// Re-export core traits for convenience
pub use core::{
    LlmProvider, LlmResponse, StreamingChunk,
    MemoryBackend, SearchBackend, StorageBackend,
    Message, Role,
};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");

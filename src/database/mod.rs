//! Database module - PostgreSQL + pgvector
//!
//! Provides storage for:
//! - PostgreSQL with pgvector: Long-term semantic memory and structured data
//! - PostgreSQL tsvector: Full-text search across memories

mod postgres;
mod memory;
mod session_store;

pub use postgres::{PostgresPool, init_pool, init_pool_for_migrations, migrations};
pub use memory::{Memory, MemoryStore};
pub use session_store::{followup_key, graph_key, planner_key, rl_update_key, PostgresSessionStore};

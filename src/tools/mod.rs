//! Tools module - Modular tool system for agent capabilities
//!
//! Each tool is a self-contained module that implements the `Tool` trait.
//! Tools are exposed to the RL meta-selector and the deep-search planner
//! as `Arc<dyn Tool>` retrieval back-ends, and described to the planner
//! prompt via the separate [`ToolCatalog`].
//!
//! ## Built-in Tools
//!
//! - **duckduckgo_search**: Web search (no API key required)
//!
//! ## Adding a New Tool
//!
//! 1. Create a new file in `src/tools/` (e.g., `my_tool.rs`)
//! 2. Implement the `Tool` trait
//! 3. Add `mod my_tool;` and `pub use` in this file

mod traits;
mod catalog;
mod duckduckgo_search;

// Core trait and types
pub use traits::{Tool, ToolResult};

// Tool catalog (§4.2): ToolDescriptor assembly for the planner prompt
pub use catalog::{ToolCatalog, ToolkitAdapter};

// Built-in tools
pub use duckduckgo_search::DuckDuckGoSearchTool;

// Shared types
pub use duckduckgo_search::SearchResult;

/// Format search results for display
pub(crate) fn format_search_results(results: &[SearchResult]) -> String {
    let mut output = String::new();

    for (i, result) in results.iter().enumerate() {
        output.push_str(&format!(
            "{}. **{}**\n   URL: {}\n   {}\n\n",
            i + 1,
            result.title,
            result.url,
            result.snippet
        ));
    }

    output
}

/// URL encoding helper
pub(crate) mod urlencoding {
    pub fn encode(s: &str) -> String {
        url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
    }

    pub fn decode(s: &str) -> Result<String, ()> {
        url::form_urlencoded::parse(s.as_bytes())
            .next()
            .map(|(k, _)| k.to_string())
            .ok_or(())
    }
}

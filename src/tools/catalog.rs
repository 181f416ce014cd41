//! Tool Catalog (§4.2): assembles the [`ToolDescriptor`] list handed to the
//! planner prompt from built-in tools, user-supplied entries, and toolkit
//! adapters, then resolves `${var}`-style placeholders against a configured
//! variable table.
//!
//! Distinct from [`crate::tools::ToolRegistry`]: the registry dispatches
//! function-call tools at execution time, while the catalog only describes
//! tools to the model and the step validator's import allow-list. A single
//! built-in entry here is typically backed by one [`crate::tools::Tool`]
//! impl in the registry, but the two collections are assembled and consumed
//! independently.

use std::collections::HashMap;

use crate::domain::{ToolDescriptor, ToolOrigin};

/// A toolkit adapter module contributes one or more [`ToolDescriptor`]
/// entries derived from its own metadata, rather than being authored by
/// hand. Kept intentionally small: adapters in this codebase are thin
/// wrappers over a single external API.
pub struct ToolkitAdapter {
    pub name: String,
    pub allowed_libraries: Vec<String>,
    pub instructions: String,
    pub code_example: String,
}

impl ToolkitAdapter {
    fn into_descriptor(self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name,
            allowed_libraries: self.allowed_libraries,
            instructions: self.instructions,
            code_example: self.code_example,
            use_exact_example: false,
            origin: ToolOrigin::ExternalToolkitAdapter,
        }
    }
}

/// Builds the catalog handed to the planner: the union of built-in tools,
/// user-supplied descriptors, and toolkit-adapter-derived entries, with
/// placeholder substitution applied over every string field.
#[derive(Default)]
pub struct ToolCatalog {
    entries: Vec<ToolDescriptor>,
    vars: HashMap<String, String>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        ToolCatalog::default()
    }

    /// Seed with the built-in descriptors every orchestrator instance ships.
    pub fn with_builtins(mut self) -> Self {
        self.entries.extend(builtin_descriptors());
        self
    }

    pub fn with_user_tool(mut self, descriptor: ToolDescriptor) -> Self {
        self.entries.push(descriptor);
        self
    }

    pub fn with_toolkit_adapter(mut self, adapter: ToolkitAdapter) -> Self {
        self.entries.push(adapter.into_descriptor());
        self
    }

    /// Configure the placeholder substitution table applied when the
    /// catalog is materialized.
    pub fn with_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    /// Later entries with a name matching an earlier one replace it: a
    /// user-supplied tool may shadow a built-in of the same name.
    pub fn build(self) -> Vec<ToolDescriptor> {
        let mut by_name: Vec<ToolDescriptor> = Vec::new();
        for entry in self.entries {
            if let Some(slot) = by_name.iter_mut().find(|d: &&mut ToolDescriptor| d.name == entry.name) {
                *slot = entry;
            } else {
                by_name.push(entry);
            }
        }
        by_name
            .into_iter()
            .map(|d| d.substitute_placeholders(&self.vars))
            .collect()
    }
}

fn builtin_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "web_search".to_string(),
            allowed_libraries: vec!["http".to_string()],
            instructions: "Search the web via ${search_provider} and return the top results as a list of {title, url, snippet}.".to_string(),
            code_example: String::new(),
            use_exact_example: false,
            origin: ToolOrigin::Builtin,
        },
        ToolDescriptor {
            name: "read_file".to_string(),
            allowed_libraries: vec!["fs".to_string()],
            instructions: "Read a file from the workspace at the given relative path.".to_string(),
            code_example: String::new(),
            use_exact_example: false,
            origin: ToolOrigin::Builtin,
        },
        ToolDescriptor {
            name: "write_file".to_string(),
            allowed_libraries: vec!["fs".to_string()],
            instructions: "Write content to a file in the workspace at the given relative path.".to_string(),
            code_example: String::new(),
            use_exact_example: false,
            origin: ToolOrigin::Builtin,
        },
        ToolDescriptor {
            name: "memory_search".to_string(),
            allowed_libraries: vec!["memory".to_string()],
            instructions: "Search long-term memory for entries relevant to a query.".to_string(),
            code_example: String::new(),
            use_exact_example: false,
            origin: ToolOrigin::Builtin,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_tool_shadows_builtin_of_same_name() {
        let catalog = ToolCatalog::new().with_builtins().with_user_tool(ToolDescriptor {
            name: "web_search".to_string(),
            allowed_libraries: vec!["custom_http".to_string()],
            instructions: "custom override".to_string(),
            code_example: String::new(),
            use_exact_example: true,
            origin: ToolOrigin::User,
        });
        let built = catalog.build();
        let web_search = built.iter().find(|d| d.name == "web_search").unwrap();
        assert_eq!(web_search.instructions, "custom override");
        assert_eq!(built.iter().filter(|d| d.name == "web_search").count(), 1);
    }

    #[test]
    fn placeholder_substitution_applies_across_catalog() {
        let mut vars = HashMap::new();
        vars.insert("search_provider".to_string(), "DuckDuckGo".to_string());
        let built = ToolCatalog::new().with_builtins().with_vars(vars).build();
        let web_search = built.iter().find(|d| d.name == "web_search").unwrap();
        assert!(web_search.instructions.contains("DuckDuckGo"));
    }

    #[test]
    fn toolkit_adapter_entries_are_marked_as_such() {
        let catalog = ToolCatalog::new().with_toolkit_adapter(ToolkitAdapter {
            name: "notion_pages".to_string(),
            allowed_libraries: vec!["notion".to_string()],
            instructions: "List pages from a connected Notion workspace.".to_string(),
            code_example: String::new(),
        });
        let built = catalog.build();
        assert_eq!(built[0].origin, ToolOrigin::ExternalToolkitAdapter);
    }
}

//! Plan generation: turns a goal plus tool catalog into a [`Plan`] (§4.5).

use crate::agent::client::OrchestratorModelClient;
use crate::agent::prompts;
use crate::core::provider::GenerationOptions;
use crate::core::types::Message;
use crate::domain::{Plan, ToolDescriptor};
use crate::error::{Error, Result};

/// Generates plans by prompting the model gateway with the goal, a summary
/// of conversation so far, and the available tool catalog.
pub struct Planner<'a> {
    model_client: &'a OrchestratorModelClient,
    model: &'a str,
}

impl<'a> Planner<'a> {
    pub fn new(model_client: &'a OrchestratorModelClient, model: &'a str) -> Self {
        Planner { model_client, model }
    }

    /// Produce a [`Plan`] for `goal`, validating its shape before returning.
    pub async fn plan(&self, goal: &str, history_summary: &str, catalog: &[ToolDescriptor]) -> Result<Plan> {
        let prompt = prompts::planner_prompt(goal, history_summary, catalog);
        let history = vec![Message::user(prompt)];
        let options = GenerationOptions {
            model: Some(self.model.to_string()),
            response_format: Some(crate::core::provider::ResponseFormat::JsonObject),
            ..Default::default()
        };

        let response = self.model_client.chat(&history, self.model, &options).await?;
        let plan = prompts::parse_plan_response(&response)?;

        plan.validate_shape().map_err(Error::PlanShape)?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ToolOrigin;

    #[test]
    fn catalog_is_embedded_in_prompt() {
        let catalog = vec![ToolDescriptor {
            name: "web_search".to_string(),
            allowed_libraries: vec!["http".to_string()],
            instructions: "search the web".to_string(),
            code_example: "".to_string(),
            use_exact_example: false,
            origin: ToolOrigin::Builtin,
        }];
        let prompt = prompts::planner_prompt("find the weather", "", &catalog);
        assert!(prompt.contains("web_search"));
    }
}

//! Evaluation phase of the plan/evaluate loop (§4.5): reviews the execution
//! log against the original request and decides whether to accept the
//! answer, replan, or stop at the iteration ceiling.

use crate::agent::client::OrchestratorModelClient;
use crate::agent::prompts::{self, EvaluationOutcome};
use crate::core::provider::GenerationOptions;
use crate::core::types::Message;
use crate::domain::{ExecutionLog, Plan};
use crate::error::Result;

/// Reviews a plan's execution log and produces an [`EvaluationOutcome`].
pub struct Reflector<'a> {
    model_client: &'a OrchestratorModelClient,
    model: &'a str,
}

impl<'a> Reflector<'a> {
    pub fn new(model_client: &'a OrchestratorModelClient, model: &'a str) -> Self {
        Reflector { model_client, model }
    }

    /// Evaluate `plan`'s execution against `root_request`. `iteration` is
    /// 1-based; `max_iterations` is the configured ceiling from
    /// [`crate::config::OrchestratorConfig`].
    pub async fn reflect(
        &self,
        root_request: &str,
        plan: &Plan,
        iteration: u32,
        max_iterations: u32,
        log: &ExecutionLog,
    ) -> Result<EvaluationOutcome> {
        let prompt = prompts::evaluator_prompt(root_request, plan, iteration, max_iterations, log);
        let history = vec![Message::user(prompt)];
        let options = GenerationOptions {
            model: Some(self.model.to_string()),
            response_format: Some(crate::core::provider::ResponseFormat::JsonObject),
            ..Default::default()
        };

        let response = self.model_client.chat(&history, self.model, &options).await?;
        prompts::parse_evaluation_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Plan;

    #[test]
    fn evaluator_prompt_embeds_iteration_counter() {
        let plan = Plan { main_task: "t".into(), main_task_thought: "".into(), steps: vec![] };
        let log = ExecutionLog::new();
        let prompt = prompts::evaluator_prompt("do the thing", &plan, 2, 5, &log);
        assert!(prompt.contains("Iteration 2 of a maximum of 5"));
    }
}

//! Step Executor (§4.4): validate -> repair-on-error -> execute ->
//! repair-on-execution-error for one step of a [`Plan`], mutating the plan
//! in place when a repair succeeds.

use crate::agent::client::OrchestratorModelClient;
use crate::agent::prompts;
use crate::core::provider::GenerationOptions;
use crate::core::types::Message;
use crate::domain::{CarryDict, ExecutionLog, Plan, Step, ToolDescriptor};
use crate::error::{Error, Result};
use crate::sandbox::{CodeExecutor, ExecutionRequest, Language};
use crate::validator::{StepValidator, Validation};

/// Drives one step of a plan through validation and execution, repairing
/// the step in place against either budget before giving up.
pub struct StepExecutor<'a> {
    model_client: &'a OrchestratorModelClient,
    model: &'a str,
    validator: StepValidator,
    executor: &'a dyn CodeExecutor,
    validation_repair_budget: u32,
    execution_repair_budget: u32,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        model_client: &'a OrchestratorModelClient,
        model: &'a str,
        executor: &'a dyn CodeExecutor,
        validation_repair_budget: u32,
        execution_repair_budget: u32,
    ) -> Self {
        StepExecutor {
            model_client,
            model,
            validator: StepValidator::new(),
            executor,
            validation_repair_budget,
            execution_repair_budget,
        }
    }

    /// Run the step at `step_index`, repairing it in `plan.steps[step_index]`
    /// as needed. Returns the step's carry output on success.
    pub async fn run_step(
        &self,
        root_request: &str,
        plan: &mut Plan,
        step_index: usize,
        catalog: &[ToolDescriptor],
        session_id: &str,
        carry_input: Option<CarryDict>,
        log: &mut ExecutionLog,
    ) -> Result<CarryDict> {
        let canonical = self
            .validate_with_repair(root_request, plan, step_index, catalog, carry_input.as_ref(), log)
            .await?;

        self.execute_with_repair(
            root_request,
            plan,
            step_index,
            catalog,
            session_id,
            carry_input,
            canonical,
            log,
        )
        .await
    }

    async fn validate_with_repair(
        &self,
        root_request: &str,
        plan: &mut Plan,
        step_index: usize,
        catalog: &[ToolDescriptor],
        carry_input: Option<&CarryDict>,
        log: &mut ExecutionLog,
    ) -> Result<String> {
        for attempt in 0..=self.validation_repair_budget {
            let step = &plan.steps[step_index];
            let allowed_libraries = allowed_libraries_for(catalog, &step.chosen_tool);
            match self.validator.validate(step_index, &step.name, &allowed_libraries, &step.code, carry_input) {
                Validation::Ok { canonical_source } => return Ok(canonical_source),
                Validation::Err(errors) => {
                    log.error(format!("step '{}' failed validation: {}", step.name, errors.join("; ")));
                    if attempt == self.validation_repair_budget {
                        return Err(Error::RepairBudgetExhausted { step: step.name.clone(), kind: "validation" });
                    }
                    self.repair_step(root_request, plan, step_index, &errors.join("; ")).await?;
                }
            }
        }
        unreachable!("loop always returns or errors before exhausting its range")
    }

    async fn execute_with_repair(
        &self,
        root_request: &str,
        plan: &mut Plan,
        step_index: usize,
        catalog: &[ToolDescriptor],
        session_id: &str,
        carry_input: Option<CarryDict>,
        mut canonical_source: String,
        log: &mut ExecutionLog,
    ) -> Result<CarryDict> {
        for attempt in 0..=self.execution_repair_budget {
            let mark = log.mark();
            let mut request = ExecutionRequest::new(canonical_source.clone(), Language::Script)
                .with_session_id(session_id.to_string());
            if let Some(ref carry) = carry_input {
                request = request.with_carry_input(serde_json::Value::Object(carry.clone()));
            }

            let result = self.executor.execute(request).await?;
            if !result.stdout.is_empty() {
                log.info(result.stdout.clone());
            }
            if !result.stderr.is_empty() {
                log.push(crate::domain::LogLevel::Error, result.stderr.clone(), crate::domain::LogFlags::default());
            }

            // A step can report success at the sandbox level yet still have
            // logged an `[ERROR]` line; both cases route through the same
            // execution-repair path.
            let failure_text = if !result.success {
                Some(result.stderr.clone())
            } else {
                log.contains_error_since(mark)
            };

            let Some(error_text) = failure_text else {
                let output = result.carry_output.unwrap_or_else(|| serde_json::json!({}));
                return Ok(match output {
                    serde_json::Value::Object(map) => map,
                    other => {
                        let mut map = CarryDict::new();
                        map.insert("value".to_string(), other);
                        map
                    }
                });
            };

            if attempt == self.execution_repair_budget {
                return Err(Error::RepairBudgetExhausted { step: plan.steps[step_index].name.clone(), kind: "execution" });
            }
            canonical_source = self
                .repair_and_retry_execution(
                    root_request,
                    plan,
                    step_index,
                    catalog,
                    carry_input.as_ref(),
                    &error_text,
                    log,
                )
                .await?;
        }
        unreachable!("loop always returns or errors before exhausting its range")
    }

    /// Applies the model's fix for the execution error, then retries from
    /// (a): the repaired step re-enters the full validate-with-repair cycle,
    /// with its own validation-repair budget and the real predecessor carry
    /// dict, rather than a single bypass check.
    async fn repair_and_retry_execution(
        &self,
        root_request: &str,
        plan: &mut Plan,
        step_index: usize,
        catalog: &[ToolDescriptor],
        carry_input: Option<&CarryDict>,
        error_text: &str,
        log: &mut ExecutionLog,
    ) -> Result<String> {
        self.repair_step(root_request, plan, step_index, error_text).await?;
        self.validate_with_repair(root_request, plan, step_index, catalog, carry_input, log).await
    }

    /// Re-prompt the model with the root request, current plan, failing
    /// step, and error text; replace the step in place with the correction.
    async fn repair_step(&self, root_request: &str, plan: &mut Plan, step_index: usize, errors: &str) -> Result<()> {
        let failing_step = plan.steps[step_index].clone();
        let prompt = prompts::repair_prompt(root_request, plan, &failing_step, errors);
        let history = vec![Message::user(prompt)];
        let options = GenerationOptions {
            model: Some(self.model.to_string()),
            response_format: Some(crate::core::provider::ResponseFormat::JsonObject),
            ..Default::default()
        };
        let response = self.model_client.chat(&history, self.model, &options).await?;
        let repaired = prompts::parse_repair_response(&response)?;
        plan.steps[step_index] = repaired.corrected_subtask;
        Ok(())
    }
}

fn allowed_libraries_for(catalog: &[ToolDescriptor], tool_name: &str) -> Vec<String> {
    catalog
        .iter()
        .find(|t| t.name == tool_name)
        .map(|t| t.allowed_libraries.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_libraries_defaults_empty_for_unknown_tool() {
        let libs = allowed_libraries_for(&[], "missing");
        assert!(libs.is_empty());
    }
}

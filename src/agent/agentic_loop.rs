//! The plan/validate/execute/repair/evaluate loop (§4.5): drives a session
//! from an initial request to a rendered answer, replanning against the
//! evaluator's feedback until satisfied or the iteration ceiling is hit.

use tracing::{info, warn};

use crate::agent::client::OrchestratorModelClient;
use crate::agent::planner::Planner;
use crate::agent::reflector::Reflector;
use crate::agent::state_machine::StepExecutor;
use crate::config::OrchestratorConfig;
use crate::domain::{CarryDict, ExecutionLog, Plan, ToolDescriptor};
use crate::error::Result;
use crate::sandbox::CodeExecutor;

/// Outcome of a full loop run.
#[derive(Debug, Clone)]
pub struct AgenticLoopOutput {
    pub final_answer: String,
    pub iterations_used: u32,
    pub max_iterations_reached: bool,
    pub plan: Plan,
    pub log: ExecutionLog,
}

/// Ties the planner, step executor, and evaluator together for one request.
pub struct AgenticLoop<'a> {
    model_client: &'a OrchestratorModelClient,
    model: &'a str,
    executor: &'a dyn CodeExecutor,
    config: &'a OrchestratorConfig,
}

impl<'a> AgenticLoop<'a> {
    pub fn new(
        model_client: &'a OrchestratorModelClient,
        model: &'a str,
        executor: &'a dyn CodeExecutor,
        config: &'a OrchestratorConfig,
    ) -> Self {
        AgenticLoop { model_client, model, executor, config }
    }

    /// Run the loop for `goal` against `catalog`, within `session_id`'s
    /// sandbox namespace.
    pub async fn run(
        &self,
        goal: &str,
        history_summary: &str,
        catalog: &[ToolDescriptor],
        session_id: &str,
    ) -> Result<AgenticLoopOutput> {
        let planner = Planner::new(self.model_client, self.model);
        let reflector = Reflector::new(self.model_client, self.model);
        let step_executor = StepExecutor::new(
            self.model_client,
            self.model,
            self.executor,
            self.config.validation_repair_budget,
            self.config.execution_repair_budget,
        );

        let mut plan = planner.plan(goal, history_summary, catalog).await?;
        let mut log = ExecutionLog::new();
        let mut iteration: u32 = 1;

        loop {
            log.info(format!("iteration {iteration}: executing plan '{}'", plan.main_task));
            self.run_plan_steps(&step_executor, goal, &mut plan, catalog, session_id, &mut log).await?;

            let outcome = reflector
                .reflect(goal, &plan, iteration, self.config.max_iterations, &log)
                .await?;

            if outcome.satisfactory {
                let final_answer = materialize_answer(
                    outcome.final_answer.unwrap_or_default(),
                    &self.config.static_answer_dir,
                )?;
                return Ok(AgenticLoopOutput {
                    final_answer,
                    iterations_used: iteration,
                    max_iterations_reached: false,
                    plan,
                    log,
                });
            }

            // §8 decided semantics: the loop body runs while
            // `iteration <= max_iterations + 1`, i.e. up to max_iterations + 2
            // total passes, before returning the unsatisfactory answer as-is.
            if iteration > self.config.max_iterations + 1 || outcome.max_iterations_reached {
                warn!(iteration, max = self.config.max_iterations, "iteration ceiling reached, returning best effort");
                let final_answer = outcome
                    .final_answer
                    .unwrap_or_else(|| outcome.thoughts.clone());
                return Ok(AgenticLoopOutput {
                    final_answer,
                    iterations_used: iteration,
                    max_iterations_reached: true,
                    plan,
                    log,
                });
            }

            info!(iteration, "evaluator rejected plan, replanning");
            plan = outcome.new_json_plan.unwrap_or(plan);
            iteration += 1;
        }
    }

    async fn run_plan_steps(
        &self,
        step_executor: &StepExecutor<'_>,
        goal: &str,
        plan: &mut Plan,
        catalog: &[ToolDescriptor],
        session_id: &str,
        log: &mut ExecutionLog,
    ) -> Result<()> {
        let mut carry: Option<CarryDict> = None;
        for step_index in 0..plan.steps.len() {
            let output = step_executor
                .run_step(goal, plan, step_index, catalog, session_id, carry.clone(), log)
                .await?;
            carry = Some(output);
        }
        Ok(())
    }
}

/// Rewrites `src="/tmp/..."` references in the final answer and moves the
/// referenced file into the stable static-answer directory, per §4.5's
/// file-materialization pass.
fn materialize_answer(answer: String, static_dir: &std::path::Path) -> Result<String> {
    let tmp_src = regex::Regex::new(r#"src="(/tmp/[^"]+)""#).expect("static pattern is valid");

    if !tmp_src.is_match(&answer) {
        return Ok(answer);
    }

    std::fs::create_dir_all(static_dir)?;
    let mut rewritten = answer;
    let matches: Vec<String> = tmp_src
        .captures_iter(&rewritten.clone())
        .map(|c| c[1].to_string())
        .collect();

    for tmp_path in matches {
        let Some(file_name) = std::path::Path::new(&tmp_path).file_name() else { continue };
        let dest = static_dir.join(file_name);
        if std::path::Path::new(&tmp_path).exists() {
            std::fs::rename(&tmp_path, &dest)?;
        }
        rewritten = rewritten.replace(&tmp_path, &dest.to_string_lossy());
    }

    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_answer_leaves_plain_text_untouched() {
        let dir = std::env::temp_dir().join("agentflow-materialize-test-plain");
        let answer = materialize_answer("no files here".to_string(), &dir).unwrap();
        assert_eq!(answer, "no files here");
    }

    #[test]
    fn materialize_answer_rewrites_and_moves_tmp_file() {
        let dir = std::env::temp_dir().join("agentflow-materialize-test-static");
        let _ = std::fs::remove_dir_all(&dir);
        let tmp_file = std::env::temp_dir().join("agentflow-materialize-source.png");
        std::fs::write(&tmp_file, b"fake image bytes").unwrap();

        let answer = format!(r#"<img src="{}">"#, tmp_file.display());
        let rewritten = materialize_answer(answer, &dir).unwrap();

        assert!(!rewritten.contains("/tmp/"));
        assert!(dir.join("agentflow-materialize-source.png").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}

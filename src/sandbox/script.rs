//! In-process step sandbox using the embedded `rhai` scripting engine.
//!
//! This is the "recommended" execution environment referenced by
//! [`crate::config::ExecutionEnv::Sandbox`]: a zero-subprocess, fuel-limited
//! virtual machine rather than a full WASM runtime. Each call gets a fresh
//! `Engine`/`Scope` pair seeded with the ambient bindings a validated step
//! is allowed to reference (`logger`, `session_id`, `socketio`, `error`)
//! plus, for steps after the first, the predecessor's carry dictionary
//! bound as `previous_output`.

use async_trait::async_trait;
use rhai::{Dynamic, Engine, Map, Scope};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::Result;
use crate::sandbox::executor::{CodeExecutor, ExecutionRequest, ExecutionResult, Language};

/// Maximum rhai operations per step invocation, used in place of wasmtime's
/// fuel counter as the resource-exhaustion guard for the scripting engine.
const MAX_OPERATIONS: u64 = 10_000_000;

pub struct ScriptExecutor {
    engine: Engine,
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new().expect("script engine initializes with a static operation limit")
    }
}

impl ScriptExecutor {
    pub fn new() -> Result<Self> {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);
        engine.register_fn("copy", |m: &mut Map| -> Map { m.clone() });
        Ok(ScriptExecutor { engine })
    }

    fn json_to_dynamic(value: &serde_json::Value) -> Dynamic {
        rhai::serde::to_dynamic(value).unwrap_or(Dynamic::UNIT)
    }

    fn dynamic_to_json(value: Dynamic) -> serde_json::Value {
        rhai::serde::from_dynamic(&value).unwrap_or(serde_json::Value::Null)
    }
}

#[async_trait]
impl CodeExecutor for ScriptExecutor {
    fn name(&self) -> &str {
        "sandbox"
    }

    fn supports_language(&self, language: Language) -> bool {
        matches!(language, Language::Script)
    }

    fn supported_languages(&self) -> Vec<Language> {
        vec![Language::Script]
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        if request.language != Language::Script {
            return Ok(ExecutionResult::failure(
                format!("language {} is not supported in the script sandbox", request.language),
                1,
                Duration::from_millis(0),
            ));
        }

        let start = Instant::now();
        let mut scope = Scope::new();
        scope.push("session_id", request.session_id.clone().unwrap_or_default());
        // `logger`, `socketio`, and `error` are ambient per the validator's
        // name-resolution rule; the sandbox binds minimal stand-ins so a
        // validated step's references to them resolve at eval time.
        scope.push("logger", Map::new());
        scope.push("socketio", Map::new());
        scope.push("error", Dynamic::UNIT);

        let carry_arg = request
            .carry_input
            .as_ref()
            .map(Self::json_to_dynamic)
            .unwrap_or(Dynamic::UNIT);

        debug!(operations_limit = MAX_OPERATIONS, "evaluating step in script sandbox");

        let ast = match self.engine.compile(&request.code) {
            Ok(ast) => ast,
            Err(e) => return Ok(ExecutionResult::failure(format!("compile error: {e}"), 1, start.elapsed())),
        };

        // Find the single top-level callable (the validator already enforced
        // exactly one exists and, for step > 0, that it takes exactly one
        // parameter named `previous_output`).
        let Some(meta) = ast.iter_functions().next() else {
            return Ok(ExecutionResult::failure("no callable found in step source".into(), 1, start.elapsed()));
        };
        let fn_name = meta.name.to_string();
        let takes_carry = !meta.params.is_empty();

        let call_result = if takes_carry {
            self.engine.call_fn::<Dynamic>(&mut scope, &ast, &fn_name, (carry_arg,))
        } else {
            self.engine.call_fn::<Dynamic>(&mut scope, &ast, &fn_name, ())
        };

        let execution_time = start.elapsed();
        match call_result {
            Ok(value) => {
                let carry_output = Self::dynamic_to_json(value);
                Ok(ExecutionResult {
                    success: true,
                    exit_code: Some(0),
                    stdout: carry_output.to_string(),
                    stderr: String::new(),
                    execution_time,
                    timed_out: false,
                    memory_used: None,
                    carry_output: Some(carry_output),
                })
            }
            Err(e) => {
                if e.to_string().contains("operation") {
                    Ok(ExecutionResult::timeout(String::new(), e.to_string(), execution_time))
                } else {
                    Ok(ExecutionResult {
                        success: false,
                        exit_code: Some(1),
                        stdout: String::new(),
                        stderr: format!("[ERROR] {e}"),
                        execution_time,
                        timed_out: false,
                        memory_used: None,
                        carry_output: None,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn executes_zero_arg_step_and_captures_carry() {
        let executor = ScriptExecutor::new().unwrap();
        let req = ExecutionRequest::new(
            "fn compute_mean() {\n    #{ mean: 2.0 }\n}",
            Language::Script,
        );
        let result = executor.execute(req).await.unwrap();
        assert!(result.success);
        assert_eq!(result.carry_output.unwrap()["mean"], 2.0);
    }

    #[tokio::test]
    async fn executes_carry_step_with_previous_output() {
        let executor = ScriptExecutor::new().unwrap();
        let req = ExecutionRequest::new(
            "fn format_output(previous_output) {\n    let updated_dict = previous_output.copy();\n    updated_dict\n}",
            Language::Script,
        )
        .with_carry_input(serde_json::json!({"coordinates": [48.8, 2.3]}));
        let result = executor.execute(req).await.unwrap();
        assert!(result.success);
        assert_eq!(result.carry_output.unwrap()["coordinates"][0], 48.8);
    }

    #[tokio::test]
    async fn runtime_error_surfaces_as_error_marker() {
        let executor = ScriptExecutor::new().unwrap();
        let req = ExecutionRequest::new("fn step() {\n    throw \"boom\";\n}", Language::Script);
        let result = executor.execute(req).await.unwrap();
        assert!(!result.success);
        assert!(result.stderr.contains("[ERROR]"));
    }
}

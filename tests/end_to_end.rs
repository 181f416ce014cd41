//! End-to-end scenario tests driving the plan/execute/evaluate loop, the
//! deep-search DAG planner, and the RL meta-selector through their real
//! public APIs. The model gateway and session store are both traits, so
//! every scenario here runs fully offline against a [`support::ScriptedProvider`]
//! and a [`support::InMemoryStore`] instead of a network call or a database.

mod support;

use std::sync::Arc;

use agentflow::agent::prompts::{EvaluationOutcome, RepairedStep};
use agentflow::agent::{AgenticLoop, DeepSearchOutcome, DeepSearchPlanner, OrchestratorModelClient};
use agentflow::config::{DeepSearchConfig, OrchestratorConfig, RlConfig};
use agentflow::domain::{AgentOutputType, DagAgentNode, Plan, Step};
use agentflow::rl::RlSelector;
use agentflow::sandbox::ScriptExecutor;
use agentflow::tools::Tool;

use support::{FakeSearchTool, InMemoryStore, ScriptedProvider};

fn first_step(name: &str, code: &str) -> Step {
    Step {
        name: name.to_string(),
        chosen_tool: "none".to_string(),
        input_from: String::new(),
        description: "compute a value".to_string(),
        imports: Vec::new(),
        code: code.to_string(),
        thought: "no tool needed".to_string(),
    }
}

fn carry_step(name: &str, input_from: &str, code: &str) -> Step {
    Step {
        name: name.to_string(),
        chosen_tool: "none".to_string(),
        input_from: input_from.to_string(),
        description: "use the predecessor's output".to_string(),
        imports: Vec::new(),
        code: code.to_string(),
        thought: "carries the predecessor's dict forward".to_string(),
    }
}

fn model_client(provider: Arc<ScriptedProvider>) -> OrchestratorModelClient {
    OrchestratorModelClient::new(provider, "http://127.0.0.1:11434")
}

#[tokio::test]
async fn happy_path_single_step_executes_and_returns_final_answer() {
    let plan = Plan {
        main_task: "report the mean".to_string(),
        main_task_thought: "one computation step suffices".to_string(),
        steps: vec![first_step("compute_mean", "fn compute_mean() {\n    #{ mean: 2.0 }\n}")],
    };
    let eval = EvaluationOutcome {
        satisfactory: true,
        thoughts: "the mean was computed correctly".to_string(),
        final_answer: Some("The mean is 2.0".to_string()),
        new_json_plan: None,
        max_iterations_reached: false,
    };

    let provider = Arc::new(ScriptedProvider::new(vec![
        &serde_json::to_string(&plan).unwrap(),
        &serde_json::to_string(&eval).unwrap(),
    ]));
    let client = model_client(provider.clone());
    let executor = ScriptExecutor::new().unwrap();
    let config = OrchestratorConfig::default();

    let loop_runner = AgenticLoop::new(&client, "test-model", &executor, &config);
    let output = loop_runner.run("what is the mean?", "", &[], "session-happy-path").await.unwrap();

    assert_eq!(output.final_answer, "The mean is 2.0");
    assert_eq!(output.iterations_used, 1);
    assert!(!output.max_iterations_reached);
    assert_eq!(provider.remaining(), 0, "plan + evaluate should be the only two model calls");
}

#[tokio::test]
async fn two_step_plan_threads_carry_dict_between_steps() {
    let plan = Plan {
        main_task: "summarize the mean".to_string(),
        main_task_thought: "compute then format".to_string(),
        steps: vec![
            first_step("compute_mean", "fn compute_mean() {\n    #{ mean: 2.0 }\n}"),
            carry_step(
                "format_output",
                "compute_mean",
                "fn format_output(previous_output) {\n    \
                 let updated_dict = previous_output.copy();\n    \
                 let m = updated_dict.get(\"mean\");\n    \
                 updated_dict[\"summary\"] = m;\n    \
                 updated_dict\n}",
            ),
        ],
    };
    let eval = EvaluationOutcome {
        satisfactory: true,
        thoughts: "summary carries the mean forward".to_string(),
        final_answer: Some("mean 2.0, summary 2.0".to_string()),
        new_json_plan: None,
        max_iterations_reached: false,
    };

    let provider = Arc::new(ScriptedProvider::new(vec![
        &serde_json::to_string(&plan).unwrap(),
        &serde_json::to_string(&eval).unwrap(),
    ]));
    let client = model_client(provider.clone());
    let executor = ScriptExecutor::new().unwrap();
    let config = OrchestratorConfig::default();

    let loop_runner = AgenticLoop::new(&client, "test-model", &executor, &config);
    let output = loop_runner.run("summarize the mean", "", &[], "session-two-step").await.unwrap();

    assert_eq!(output.final_answer, "mean 2.0, summary 2.0");
    assert_eq!(output.plan.steps.len(), 2);
    assert_eq!(provider.remaining(), 0);
}

#[tokio::test]
async fn validator_rejection_triggers_repair_then_succeeds() {
    // `bogus_var` is never bound, so rule 5 (name resolution) rejects this
    // on the first validation pass and the step goes through the repair path.
    let broken_plan = Plan {
        main_task: "report the mean".to_string(),
        main_task_thought: "one computation step suffices".to_string(),
        steps: vec![first_step("compute_mean", "fn compute_mean() {\n    #{ mean: bogus_var }\n}")],
    };
    let repair = RepairedStep {
        reasoning: "bogus_var was never defined; use the literal directly".to_string(),
        corrected_subtask: first_step("compute_mean", "fn compute_mean() {\n    #{ mean: 2.0 }\n}"),
    };
    let eval = EvaluationOutcome {
        satisfactory: true,
        thoughts: "the repaired step computed the mean correctly".to_string(),
        final_answer: Some("The mean is 2.0".to_string()),
        new_json_plan: None,
        max_iterations_reached: false,
    };

    let provider = Arc::new(ScriptedProvider::new(vec![
        &serde_json::to_string(&broken_plan).unwrap(),
        &serde_json::to_string(&repair).unwrap(),
        &serde_json::to_string(&eval).unwrap(),
    ]));
    let client = model_client(provider.clone());
    let executor = ScriptExecutor::new().unwrap();
    let config = OrchestratorConfig::default();

    let loop_runner = AgenticLoop::new(&client, "test-model", &executor, &config);
    let output = loop_runner.run("what is the mean?", "", &[], "session-repair").await.unwrap();

    assert_eq!(output.final_answer, "The mean is 2.0");
    assert_eq!(output.plan.steps[0].code, "fn compute_mean() {\n    #{ mean: 2.0 }\n}");
    assert_eq!(provider.remaining(), 0, "plan + one repair + evaluate should be the only three model calls");
}

#[tokio::test]
async fn interactive_deep_search_suspends_then_resumes_to_completion() {
    let dag = vec![DagAgentNode {
        nickname: "researcher".to_string(),
        llm_prompt: "research the capital of France".to_string(),
        input_from_agents: Vec::new(),
        user_questions: vec!["Which city should the report focus on?".to_string()],
        user_answers: Vec::new(),
        external_search_query: None,
        output_type: AgentOutputType::Final,
        observation: None,
    }];

    let provider = Arc::new(ScriptedProvider::new(vec![
        &serde_json::to_string(&dag).unwrap(),
        "Paris is the capital of France.",
        "[]",
    ]));
    let client = model_client(provider.clone());
    let store = InMemoryStore::new();
    let config = DeepSearchConfig::default();

    let planner = DeepSearchPlanner::new(&client, "test-model", &store, None, None, &config);

    let started = planner.start("session-deep-search", None, "Tell me about the capital of France", 1).await.unwrap();
    let DeepSearchOutcome::Suspended { agent_nickname, questions } = started else {
        panic!("expected the DAG to suspend on its unanswered question");
    };
    assert_eq!(agent_nickname, "researcher");
    assert_eq!(questions, vec!["Which city should the report focus on?".to_string()]);

    let resumed = planner.answer_question("session-deep-search", "Paris").await.unwrap();
    let DeepSearchOutcome::Completed { final_answer } = resumed else {
        panic!("expected the DAG to complete once the question was answered");
    };
    assert_eq!(final_answer, "<html><body>Paris is the capital of France.</body></html>");
    assert_eq!(provider.remaining(), 0);
}

#[tokio::test]
async fn rl_selector_consults_model_while_cold_then_exploits_once_warm() {
    const FEATURES: &str =
        r#"{"question_type":"factual","domain":"general","has_entities":false,"complexity":0.5,"ambiguity":0.2,"specificity":0.5,"formality":0.5,"urgency":0.1}"#;

    let provider = Arc::new(ScriptedProvider::new(vec![
        // Episode 1: cold ring buffer, the model both extracts features and
        // suggests a strategy.
        FEATURES,
        "1",
        "warm-up answer 1",
        // Episode 2: still cold (ring buffer below the minimum).
        FEATURES,
        "1",
        "warm-up answer 2",
        // Episode 3: ring buffer warm and low-reward, so the estimator
        // picks the action instead of asking the model.
        FEATURES,
        "exploit answer",
    ]));
    let client = Arc::new(model_client(provider.clone()));
    let store: Arc<dyn agentflow::StorageBackend> = Arc::new(InMemoryStore::new());
    let search_tool: Arc<dyn Tool> = Arc::new(FakeSearchTool::new("a web result"));
    let state_dir = tempfile::tempdir().unwrap();

    let config = RlConfig {
        ring_buffer_min: 2,
        warmup_threshold: 0.5,
        epsilon: 0.0,
        human_rating_enabled: true,
        state_path: state_dir.path().join("rl_state.json"),
        ..RlConfig::default()
    };

    let selector = RlSelector::load(client, "test-model", store, None, Some(search_tool), config).await.unwrap();

    selector.retrieve("session-rl", "what is the capital of France?").await.unwrap();
    selector.submit_rating("session-rl", 1).await.unwrap();

    selector.retrieve("session-rl", "what is the capital of Germany?").await.unwrap();
    selector.submit_rating("session-rl", 1).await.unwrap();

    let exploit_answer = selector.retrieve("session-rl", "what is the capital of Spain?").await.unwrap();

    assert_eq!(exploit_answer, "exploit answer");
    assert_eq!(provider.remaining(), 0, "the warm episode should skip the strategy-suggestion call");
}

#[tokio::test]
async fn evaluator_max_iterations_reached_stops_the_loop() {
    let plan = Plan {
        main_task: "answer an ambiguous question".to_string(),
        main_task_thought: "may need more than one pass".to_string(),
        steps: vec![first_step("compute_mean", "fn compute_mean() {\n    #{ mean: 2.0 }\n}")],
    };
    let rejected = EvaluationOutcome {
        satisfactory: false,
        thoughts: "needs another pass".to_string(),
        final_answer: None,
        new_json_plan: None,
        max_iterations_reached: false,
    };
    let ceiling = EvaluationOutcome {
        satisfactory: false,
        thoughts: "still not satisfactory, returning best effort".to_string(),
        final_answer: Some("best effort: the mean is around 2.0".to_string()),
        new_json_plan: None,
        max_iterations_reached: true,
    };

    let provider = Arc::new(ScriptedProvider::new(vec![
        &serde_json::to_string(&plan).unwrap(),
        &serde_json::to_string(&rejected).unwrap(),
        &serde_json::to_string(&ceiling).unwrap(),
    ]));
    let client = model_client(provider.clone());
    let executor = ScriptExecutor::new().unwrap();
    let config = OrchestratorConfig { max_iterations: 1, ..OrchestratorConfig::default() };

    let loop_runner = AgenticLoop::new(&client, "test-model", &executor, &config);
    let output = loop_runner.run("an ambiguous question", "", &[], "session-ceiling").await.unwrap();

    assert!(output.max_iterations_reached);
    assert_eq!(output.iterations_used, 2);
    assert_eq!(output.final_answer, "best effort: the mean is around 2.0");
    assert_eq!(provider.remaining(), 0, "plan + two evaluate calls should be the only three model calls");
}

//! 工作流集成测试：脚本化模型 + 内存数据库驱动完整的阶段循环

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{builder, ScriptedLlm, StubDatabase};
use sqlagent::agent::SqlAgent;
use sqlagent::core::AgentError;
use sqlagent::llm::MockLlmClient;
use sqlagent::prompt::{field, PromptTask};
use sqlagent::tools::ProviderError;
use sqlagent::workflow::{
    RetryLoop, Stage, StageContext, StageHandler, StageOutcome, StateDelta, WorkflowBuilder,
    WorkflowEvent, WorkflowState,
};

fn no_such_table() -> Result<String, ProviderError> {
    Err(ProviderError::QueryFailed(
        "Error: no such table: emp".to_string(),
    ))
}

#[tokio::test]
async fn test_how_many_employees_end_to_end() {
    let llm = Arc::new(ScriptedLlm::new());
    let db = Arc::new(StubDatabase::new(&["departments", "employees"]));
    let engine = builder(llm.clone(), db.clone()).build().unwrap();
    let agent = SqlAgent::new(engine, None);

    let response = agent.ask("How many employees are there?").await;
    assert!(response.success, "{response:?}");
    assert!(response.answer.as_deref().unwrap().contains("100"));
    assert_eq!(response.sql.as_deref(), Some("SELECT COUNT(*) FROM employees"));
    assert!(response.error.is_none());
    assert_eq!(db.executed(), vec!["SELECT COUNT(*) FROM employees"]);
    // 选表、选列、生成、校验、总结各一次
    assert_eq!(llm.calls(), 5);
}

#[tokio::test]
async fn test_execution_error_reaches_next_generation_prompt() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .then(PromptTask::SqlGeneration, "SELECT COUNT(*) FROM emp")
            .then(PromptTask::SqlGeneration, "SELECT COUNT(*) FROM employees"),
    );
    let db = Arc::new(StubDatabase::new(&["employees"]).then(no_such_table()));
    let engine = builder(llm.clone(), db.clone()).build().unwrap();

    let report = engine.run("How many employees are there?").await.unwrap();
    assert!(report.final_answer.contains("100"));
    assert_eq!(report.retry_count, 1);
    assert_eq!(report.state.execution_retries, 1);
    assert_eq!(report.state.validation_retries, 0);
    assert!(report.state.query_error.is_none());

    let generations = llm.prompts_for(PromptTask::SqlGeneration);
    assert_eq!(generations.len(), 2);
    assert!(generations[0].get(field::FEEDBACK).is_none());
    assert_eq!(
        generations[1].get(field::FEEDBACK),
        Some("Error: no such table: emp")
    );
    assert_eq!(
        generations[1].get(field::PREVIOUS_SQL),
        Some("SELECT COUNT(*) FROM emp")
    );
    assert_eq!(
        db.executed(),
        vec!["SELECT COUNT(*) FROM emp", "SELECT COUNT(*) FROM employees"]
    );
}

#[tokio::test]
async fn test_same_question_same_result() {
    let llm = Arc::new(ScriptedLlm::new());
    let db = Arc::new(StubDatabase::new(&["employees"]));
    let engine = builder(llm, db).build().unwrap();

    let first = engine.run("How many employees are there?").await.unwrap();
    let second = engine.run("How many employees are there?").await.unwrap();
    assert_eq!(first.generated_sql, second.generated_sql);
    assert_eq!(first.final_answer, second.final_answer);
    assert_eq!(first.steps, second.steps);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_invalid_verdict_regenerates_and_overwrites_sql() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .then(PromptTask::SqlGeneration, "SELECT salary FROM employees")
            .then(PromptTask::SqlValidation, "invalid: column salary does not exist"),
    );
    let db = Arc::new(StubDatabase::new(&["employees"]));
    let engine = builder(llm.clone(), db.clone()).build().unwrap();

    let report = engine.run("How many employees are there?").await.unwrap();
    assert_eq!(
        report.generated_sql.as_deref(),
        Some("SELECT COUNT(*) FROM employees")
    );
    assert_eq!(report.state.validation_retries, 1);
    assert_eq!(report.state.execution_retries, 0);
    // 被否决的 SQL 从未执行
    assert_eq!(db.executed(), vec!["SELECT COUNT(*) FROM employees"]);

    let generations = llm.prompts_for(PromptTask::SqlGeneration);
    assert_eq!(
        generations[1].get(field::FEEDBACK),
        Some("column salary does not exist")
    );
}

#[tokio::test]
async fn test_step_budget_stops_endless_validation_loop() {
    let llm = Arc::new(ScriptedLlm::new().always(PromptTask::SqlValidation, "invalid: always wrong"));
    let db = Arc::new(StubDatabase::new(&["employees"]));
    let engine = builder(llm.clone(), db.clone())
        .max_steps(20)
        .max_validation_retries(None)
        .build()
        .unwrap();

    let err = engine.run("How many employees are there?").await.unwrap_err();
    match &err {
        AgentError::StepBudgetExceeded { steps, last_error } => {
            assert_eq!(*steps, 20);
            assert_eq!(last_error.as_deref(), Some("always wrong"));
        }
        other => panic!("Expected StepBudgetExceeded, got {other:?}"),
    }
    assert!(err.user_message().starts_with("could not produce a valid answer"));
    // 每步至多一次模型调用，首步（列表）不调用模型
    assert!(llm.calls() <= 19);
    assert!(db.executed().is_empty());
}

#[tokio::test]
async fn test_validation_retry_limit_is_attributed() {
    let llm = Arc::new(ScriptedLlm::new().always(PromptTask::SqlValidation, "invalid: always wrong"));
    let db = Arc::new(StubDatabase::new(&["employees"]));
    let engine = builder(llm.clone(), db)
        .max_validation_retries(Some(2))
        .build()
        .unwrap();

    let err = engine.run("How many employees are there?").await.unwrap_err();
    match err {
        AgentError::RetryLimitExceeded {
            retry_loop,
            attempts,
            last_error,
        } => {
            assert_eq!(retry_loop, RetryLoop::Validation);
            assert_eq!(attempts, 2);
            assert_eq!(last_error.as_deref(), Some("always wrong"));
        }
        other => panic!("Expected RetryLimitExceeded, got {other:?}"),
    }
    // 首次生成 + 两次重新生成
    assert_eq!(llm.prompts_for(PromptTask::SqlGeneration).len(), 3);
}

#[tokio::test]
async fn test_execution_retry_limit_is_attributed() {
    let llm = Arc::new(ScriptedLlm::new());
    let db = Arc::new(StubDatabase::new(&["employees"]).always(no_such_table()));
    let engine = builder(llm, db.clone())
        .max_execution_retries(Some(1))
        .build()
        .unwrap();

    let err = engine.run("How many employees are there?").await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::RetryLimitExceeded {
            retry_loop: RetryLoop::Execution,
            attempts: 1,
            ..
        }
    ));
    assert!(err.to_string().contains("no such table: emp"));
    assert_eq!(db.executed().len(), 2);
}

#[tokio::test]
async fn test_schemas_follow_selected_table_order() {
    let llm = Arc::new(ScriptedLlm::new().then(
        PromptTask::TableSelection,
        r#"{"table_target": ["Employees", "departments"]}"#,
    ));
    let db = Arc::new(StubDatabase::new(&["departments", "employees"]));
    let engine = builder(llm.clone(), db).build().unwrap();

    let report = engine.run("How many employees are there?").await.unwrap();
    let state = &report.state;
    assert_eq!(state.selected_tables, vec!["employees", "departments"]);
    assert_eq!(state.schemas.len(), 2);
    assert!(state.schemas[0].starts_with("CREATE TABLE employees"));
    assert!(state.schemas[1].starts_with("CREATE TABLE departments"));
    assert!(state.schemas.iter().all(|s| !s.contains("rows from")));

    let columns = llm.prompts_for(PromptTask::ColumnSelection);
    assert_eq!(
        columns[0].get(field::SELECTED_TABLES),
        Some("employees, departments")
    );
}

#[tokio::test]
async fn test_malformed_table_selection_is_repaired() {
    let llm = Arc::new(ScriptedLlm::new().then(
        PromptTask::TableSelection,
        "The relevant table is employees.",
    ));
    let db = Arc::new(StubDatabase::new(&["employees"]));
    let engine = builder(llm.clone(), db).build().unwrap();

    let report = engine.run("How many employees are there?").await.unwrap();
    assert_eq!(report.state.selected_tables, vec!["employees"]);
    assert_eq!(llm.prompts_for(PromptTask::TableSelection).len(), 2);
}

#[tokio::test]
async fn test_malformed_output_without_repair_is_fatal() {
    let llm = Arc::new(ScriptedLlm::new().then(
        PromptTask::TableSelection,
        r#"{"table_target": ["payroll"]}"#,
    ));
    let db = Arc::new(StubDatabase::new(&["employees"]));
    let engine = builder(llm, db)
        .parse_repair_attempts(0)
        .build()
        .unwrap();

    let err = engine.run("How many employees are there?").await.unwrap_err();
    match err {
        AgentError::SchemaViolation { stage, detail } => {
            assert_eq!(stage, Stage::TableSelection);
            assert!(detail.contains("payroll"));
        }
        other => panic!("Expected SchemaViolation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_relevant_table_fails_cleanly() {
    let llm = Arc::new(ScriptedLlm::new().then(PromptTask::TableSelection, "NULL"));
    let db = Arc::new(StubDatabase::new(&["employees"]));
    let agent = SqlAgent::new(builder(llm, db).build().unwrap(), None);

    let response = agent.ask("What is the weather today?").await;
    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("Model found no table relevant to the question")
    );
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let db = Arc::new(StubDatabase::new(&["departments", "employees"]));
    let engine = WorkflowBuilder::new()
        .llm(Arc::new(MockLlmClient::new()))
        .database(db)
        .build()
        .unwrap();

    let (a, b) = tokio::join!(
        engine.run("How many employees are there?"),
        engine.run("List all departments"),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.generated_sql.as_deref(), Some("SELECT COUNT(*) FROM employees"));
    assert_eq!(
        b.generated_sql.as_deref(),
        Some("SELECT id, name FROM departments LIMIT 10")
    );
    assert_eq!(a.state.selected_tables, vec!["employees"]);
    assert_eq!(b.state.selected_tables, vec!["departments"]);
}

#[tokio::test]
async fn test_events_follow_each_step() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let llm = Arc::new(ScriptedLlm::new());
    let db = Arc::new(StubDatabase::new(&["employees"]));
    let engine = builder(llm, db).event_tx(tx).build().unwrap();

    let report = engine.run("How many employees are there?").await.unwrap();
    drop(engine);

    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    let started = events
        .iter()
        .filter(|e| matches!(e, WorkflowEvent::StageStarted { .. }))
        .count();
    assert_eq!(started, report.steps);
    assert!(matches!(
        events.first(),
        Some(WorkflowEvent::StageStarted {
            stage: Stage::TableDiscovery,
            ..
        })
    ));
    assert!(matches!(events.last(), Some(WorkflowEvent::Finished { .. })));

    let json = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(json["type"], "stage_started");
    assert_eq!(json["stage"], "table_discovery");
}

/// 试图跳过中间阶段的 TableDiscovery
struct SkippingDiscovery;

#[async_trait]
impl StageHandler for SkippingDiscovery {
    fn stage(&self) -> Stage {
        Stage::TableDiscovery
    }

    async fn run(
        &self,
        _state: &WorkflowState,
        _ctx: &StageContext,
    ) -> Result<StageOutcome, AgentError> {
        Ok(StageOutcome::new(
            StateDelta::new().generated_sql("SELECT 1"),
            Stage::SqlExecution,
        ))
    }
}

/// 直接结束却不给出回答的总结阶段
struct SilentSummary;

#[async_trait]
impl StageHandler for SilentSummary {
    fn stage(&self) -> Stage {
        Stage::ResultSummarization
    }

    async fn run(
        &self,
        _state: &WorkflowState,
        _ctx: &StageContext,
    ) -> Result<StageOutcome, AgentError> {
        Ok(StageOutcome::new(StateDelta::new(), Stage::Terminal))
    }
}

#[tokio::test]
async fn test_illegal_transition_is_rejected() {
    let llm = Arc::new(ScriptedLlm::new());
    let db = Arc::new(StubDatabase::new(&["employees"]));
    let engine = builder(llm, db.clone())
        .handler(SkippingDiscovery)
        .build()
        .unwrap();

    let err = engine.run("How many employees are there?").await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::IllegalTransition {
            from: Stage::TableDiscovery,
            to: Stage::SqlExecution
        }
    ));
    assert!(db.executed().is_empty());
}

#[tokio::test]
async fn test_terminal_requires_final_answer() {
    let llm = Arc::new(ScriptedLlm::new());
    let db = Arc::new(StubDatabase::new(&["employees"]));
    let engine = builder(llm, db).handler(SilentSummary).build().unwrap();

    let err = engine.run("How many employees are there?").await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::MissingField {
            field: "final_answer",
            ..
        }
    ));
}

#[tokio::test]
async fn test_validation_can_be_disabled() {
    let llm = Arc::new(ScriptedLlm::new().always(PromptTask::SqlValidation, "invalid: never asked"));
    let db = Arc::new(StubDatabase::new(&["employees"]));
    let engine = builder(llm.clone(), db)
        .validate_sql(false)
        .build()
        .unwrap();

    let report = engine.run("How many employees are there?").await.unwrap();
    assert_eq!(report.retry_count, 0);
    assert!(llm.prompts_for(PromptTask::SqlValidation).is_empty());
}

//! 集成测试共用的脚本化模型与内存数据库

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlagent::llm::{LlmClient, LlmError, Message};
use sqlagent::prompt::{Prompt, PromptTask};
use sqlagent::tools::{ProviderError, SqlDatabase};
use sqlagent::workflow::WorkflowBuilder;

/// 按任务回答的模型：先消费该任务的脚本队列，队列空后返回该任务的默认回答
pub struct ScriptedLlm {
    queues: Mutex<HashMap<PromptTask, VecDeque<String>>>,
    defaults: Mutex<HashMap<PromptTask, String>>,
    prompts: Mutex<Vec<Prompt>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    /// 默认回答对应「How many employees are there?」的正常流程
    pub fn new() -> Self {
        let defaults = HashMap::from([
            (
                PromptTask::TableSelection,
                r#"{"table_target": ["employees"]}"#.to_string(),
            ),
            (
                PromptTask::ColumnSelection,
                r#"{"column_target": {"employees": ["id"]}}"#.to_string(),
            ),
            (
                PromptTask::SqlGeneration,
                "SELECT COUNT(*) FROM employees".to_string(),
            ),
            (PromptTask::SqlValidation, "valid".to_string()),
            (
                PromptTask::Summarization,
                "There are 100 employees.".to_string(),
            ),
        ]);
        Self {
            queues: Mutex::new(HashMap::new()),
            defaults: Mutex::new(defaults),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// 追加一条一次性回答
    pub fn then(self, task: PromptTask, reply: &str) -> Self {
        self.queues
            .lock()
            .unwrap()
            .entry(task)
            .or_default()
            .push_back(reply.to_string());
        self
    }

    /// 替换默认回答
    pub fn always(self, task: PromptTask, reply: &str) -> Self {
        self.defaults.lock().unwrap().insert(task, reply.to_string());
        self
    }

    pub fn prompts_for(&self, task: PromptTask) -> Vec<Prompt> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.task == task)
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = Prompt::from_messages(messages)
            .ok_or_else(|| LlmError::ApiError("unrecognized prompt".to_string()))?;
        let task = prompt.task;
        self.prompts.lock().unwrap().push(prompt);

        if let Some(reply) = self
            .queues
            .lock()
            .unwrap()
            .get_mut(&task)
            .and_then(VecDeque::pop_front)
        {
            return Ok(reply);
        }
        self.defaults
            .lock()
            .unwrap()
            .get(&task)
            .cloned()
            .ok_or_else(|| LlmError::ApiError(format!("no reply scripted for {task}")))
    }
}

/// 内存数据库：固定的表，查询结果先消费脚本队列，之后返回默认结果
pub struct StubDatabase {
    tables: Vec<String>,
    results: Mutex<VecDeque<Result<String, ProviderError>>>,
    default_result: Result<String, ProviderError>,
    executed: Mutex<Vec<String>>,
}

impl StubDatabase {
    pub fn new(tables: &[&str]) -> Self {
        Self {
            tables: tables.iter().map(|s| s.to_string()).collect(),
            results: Mutex::new(VecDeque::new()),
            default_result: Ok("[(100,)]".to_string()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, result: Result<String, ProviderError>) -> Self {
        self.results.lock().unwrap().push_back(result);
        self
    }

    pub fn always(mut self, result: Result<String, ProviderError>) -> Self {
        self.default_result = result;
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlDatabase for StubDatabase {
    fn dialect(&self) -> &str {
        "SQLite"
    }

    async fn list_tables(&self) -> Result<String, ProviderError> {
        Ok(self.tables.join(", "))
    }

    async fn get_schema(&self, table: &str) -> Result<String, ProviderError> {
        let name = self
            .tables
            .iter()
            .find(|t| t.eq_ignore_ascii_case(table))
            .ok_or_else(|| ProviderError::UnknownTable(table.to_string()))?;
        Ok(format!(
            "\nCREATE TABLE {name} (\n\tid INTEGER PRIMARY KEY,\n\tname TEXT\n)\n\n/*\n2 rows from {name} table:\nid\tname\n1\tAlice\n2\tBob\n*/"
        ))
    }

    async fn run_query(&self, sql: &str) -> Result<String, ProviderError> {
        self.executed.lock().unwrap().push(sql.to_string());
        let next = self.results.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.default_result.clone())
    }
}

/// 以脚本模型与内存数据库组装构建器
pub fn builder(llm: Arc<ScriptedLlm>, db: Arc<StubDatabase>) -> WorkflowBuilder {
    WorkflowBuilder::new().llm(llm).database(db)
}

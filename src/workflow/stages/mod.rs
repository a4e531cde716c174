//! 工作流阶段
//!
//! 每个阶段实现 StageHandler：只读当前状态，至多调用一次能力（数据库或模型），
//! 返回 StageOutcome（状态增量 + 下一阶段）。StageRegistry 按 Stage 注册与查找，
//! 引擎据此调度；选表 / 选列的结构化输出在 `StageContext::decide` 中按 RecoveryEngine 的建议修复重问。

mod columns;
mod discovery;
mod execution;
mod generation;
mod schema;
mod selection;
mod summary;
mod validation;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::llm::{LlmClient, Message};
use crate::prompt::{FewShotSet, Prompt, PromptTemplates};
use crate::tools::{ProviderError, ProviderExecutor};
use crate::workflow::output::ParseError;
use crate::workflow::{Stage, StageOutcome, WorkflowState};

pub use columns::ColumnSelection;
pub use discovery::TableDiscovery;
pub use execution::SqlExecution;
pub use generation::SqlGeneration;
pub use schema::SchemaExtraction;
pub use selection::TableSelection;
pub use summary::ResultSummarization;
pub use validation::SqlValidation;

/// 阶段 trait：阶段标识 + 异步执行
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> Stage;

    async fn run(&self, state: &WorkflowState, ctx: &StageContext)
        -> Result<StageOutcome, AgentError>;
}

/// 阶段行为开关
#[derive(Debug, Clone)]
pub struct StageOptions {
    /// 选表 / 选列输出违例时的重问次数
    pub parse_repair_attempts: u32,
    /// false 时 SQL 校验直接通过
    pub validate_sql: bool,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            parse_repair_attempts: 1,
            validate_sql: true,
        }
    }
}

/// 阶段共享的只读依赖（每次 run 之间不变）
pub struct StageContext {
    pub llm: Arc<dyn LlmClient>,
    pub db: ProviderExecutor,
    pub templates: PromptTemplates,
    pub few_shots: FewShotSet,
    pub recovery: RecoveryEngine,
    pub options: StageOptions,
}

impl StageContext {
    async fn complete(&self, stage: Stage, messages: &[Message]) -> Result<String, AgentError> {
        self.llm
            .complete(messages)
            .await
            .map_err(|source| AgentError::Llm { stage, source })
    }

    /// 单次模型调用，返回原始文本
    pub async fn ask(&self, stage: Stage, prompt: &Prompt) -> Result<String, AgentError> {
        let messages = self.templates.render(prompt);
        self.complete(stage, &messages).await
    }

    /// 结构化决策：解析失败且恢复引擎建议重试时，把原回答与纠错提示追加到对话后重问
    pub async fn decide<T, F>(&self, stage: Stage, prompt: &Prompt, parse: F) -> Result<T, AgentError>
    where
        T: Send,
        F: Fn(&str) -> Result<T, ParseError> + Send + Sync,
    {
        let mut messages = self.templates.render(prompt);
        let mut attempts = 0u32;
        loop {
            let raw = self.complete(stage, &messages).await?;
            let err = match parse(&raw) {
                Ok(value) => return Ok(value),
                Err(e) => e.into_agent_error(stage),
            };
            match self.recovery.handle(&err) {
                RecoveryAction::RetryWithPrompt(hint)
                    if attempts < self.options.parse_repair_attempts =>
                {
                    attempts += 1;
                    tracing::warn!(stage = %stage, attempt = attempts, error = %err, "Re-prompting after malformed output");
                    messages.push(Message::assistant(raw));
                    messages.push(Message::user(hint));
                }
                _ => return Err(err),
            }
        }
    }
}

/// 把能力层错误包装为阶段错误
pub(crate) fn provider_error(stage: Stage) -> impl FnOnce(ProviderError) -> AgentError {
    move |source| AgentError::Provider { stage, source }
}

/// 阶段注册表：Stage -> Handler
#[derive(Default, Clone)]
pub struct StageRegistry {
    handlers: HashMap<Stage, Arc<dyn StageHandler>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置阶段
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(TableDiscovery);
        registry.register(TableSelection);
        registry.register(SchemaExtraction);
        registry.register(ColumnSelection);
        registry.register(SqlGeneration);
        registry.register(SqlValidation);
        registry.register(SqlExecution);
        registry.register(ResultSummarization);
        registry
    }

    /// 注册（同一阶段后注册者覆盖先注册者）
    pub fn register(&mut self, handler: impl StageHandler + 'static) {
        self.register_arc(Arc::new(handler));
    }

    pub fn register_arc(&mut self, handler: Arc<dyn StageHandler>) {
        self.handlers.insert(handler.stage(), handler);
    }

    pub fn get(&self, stage: Stage) -> Option<Arc<dyn StageHandler>> {
        self.handlers.get(&stage).cloned()
    }

    pub fn stages(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = self.handlers.keys().copied().collect();
        stages.sort();
        stages
    }
}

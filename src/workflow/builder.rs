//! 工作流构建器
//!
//! 提供流畅的 API 组装 WorkflowEngine：模型、数据库、few-shot、模板、各类上限与事件通道；
//! 也可从 `[workflow]` 配置段一次性设置上限与开关。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::WorkflowSection;
use crate::core::{AgentError, RecoveryEngine};
use crate::llm::LlmClient;
use crate::prompt::{FewShotSet, PromptTemplates};
use crate::tools::{ProviderExecutor, SqlDatabase};
use crate::workflow::engine::RunLimits;
use crate::workflow::stages::{StageContext, StageHandler, StageOptions, StageRegistry};
use crate::workflow::{WorkflowEngine, WorkflowEvent, WorkflowGraph};

/// 工作流构建器
pub struct WorkflowBuilder {
    llm: Option<Arc<dyn LlmClient>>,
    database: Option<Arc<dyn SqlDatabase>>,
    few_shots: FewShotSet,
    templates: Option<PromptTemplates>,
    limits: RunLimits,
    options: StageOptions,
    provider_timeout: Duration,
    registry: StageRegistry,
    event_tx: Option<UnboundedSender<WorkflowEvent>>,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self {
            llm: None,
            database: None,
            few_shots: FewShotSet::default(),
            templates: None,
            limits: RunLimits::default(),
            options: StageOptions::default(),
            provider_timeout: Duration::from_secs(30),
            registry: StageRegistry::standard(),
            event_tx: None,
        }
    }

    /// 从 `[workflow]` 配置段设置上限、开关、few-shot 与模板（0 表示不限制单回路重试）
    pub fn from_config(section: &WorkflowSection) -> Self {
        let nonzero = |n: u32| (n > 0).then_some(n);
        Self::new()
            .max_steps(section.max_steps)
            .max_validation_retries(nonzero(section.max_validation_retries))
            .max_execution_retries(nonzero(section.max_execution_retries))
            .parse_repair_attempts(section.parse_repair_attempts)
            .validate_sql(section.validate_sql)
            .few_shots(FewShotSet::load(section.few_shot_path.as_deref()))
            .templates(PromptTemplates::load(section.prompts_dir.as_deref()))
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn database(mut self, database: Arc<dyn SqlDatabase>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn few_shots(mut self, few_shots: FewShotSet) -> Self {
        self.few_shots = few_shots;
        self
    }

    pub fn templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.limits.max_steps = max_steps;
        self
    }

    pub fn max_validation_retries(mut self, limit: Option<u32>) -> Self {
        self.limits.max_validation_retries = limit;
        self
    }

    pub fn max_execution_retries(mut self, limit: Option<u32>) -> Self {
        self.limits.max_execution_retries = limit;
        self
    }

    pub fn parse_repair_attempts(mut self, attempts: u32) -> Self {
        self.options.parse_repair_attempts = attempts;
        self
    }

    pub fn validate_sql(mut self, enabled: bool) -> Self {
        self.options.validate_sql = enabled;
        self
    }

    /// 数据库单次调用超时
    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn event_tx(mut self, tx: UnboundedSender<WorkflowEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 替换某个阶段的实现
    pub fn handler(mut self, handler: impl StageHandler + 'static) -> Self {
        self.registry.register(handler);
        self
    }

    pub fn build(self) -> Result<WorkflowEngine, AgentError> {
        let llm = self
            .llm
            .ok_or_else(|| AgentError::ConfigError("workflow requires an LLM client".to_string()))?;
        let database = self
            .database
            .ok_or_else(|| AgentError::ConfigError("workflow requires a database".to_string()))?;
        if self.limits.max_steps == 0 {
            return Err(AgentError::ConfigError("max_steps must be at least 1".to_string()));
        }

        let graph = WorkflowGraph::standard();
        if !graph.can_terminate() {
            return Err(AgentError::ConfigError(
                "workflow graph has stages that cannot reach Terminal".to_string(),
            ));
        }

        let templates = self
            .templates
            .unwrap_or_default()
            .with_dialect(database.dialect());
        let ctx = StageContext {
            llm,
            db: ProviderExecutor::new(database, self.provider_timeout),
            templates,
            few_shots: self.few_shots,
            recovery: RecoveryEngine::new(),
            options: self.options,
        };

        Ok(WorkflowEngine::new(
            ctx,
            self.registry,
            graph,
            self.limits,
            self.event_tx,
        ))
    }
}

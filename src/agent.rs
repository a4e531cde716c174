//! 无头 SQL Agent：供 CLI / 宿主程序调用
//!
//! 从配置创建 LLM 与数据库，组装工作流引擎；`ask` 在整体超时内跑完一次工作流，
//! 并把结果映射为对外的 `QueryResponse`（成功给出答案与 SQL，失败给出错误文本）。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, LlmSection};
use crate::core::AgentError;
use crate::llm::{
    create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient, RetryConfig, RetryingLlmClient,
};
use crate::tools::SqliteDatabase;
use crate::workflow::{RunReport, WorkflowBuilder, WorkflowEngine};

/// 对外响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn ok(answer: impl Into<String>, sql: Option<String>) -> Self {
        Self {
            success: true,
            answer: Some(answer.into()),
            sql,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            answer: None,
            sql: None,
            error: Some(error.into()),
        }
    }
}

impl From<Result<RunReport, AgentError>> for QueryResponse {
    fn from(result: Result<RunReport, AgentError>) -> Self {
        match result {
            Ok(report) => QueryResponse::ok(report.final_answer, report.generated_sql),
            Err(e) => QueryResponse::failed(e.user_message()),
        }
    }
}

/// 按配置与环境变量选择后端：DeepSeek Key → DeepSeek，OpenAI Key → OpenAI 兼容端点，否则 Mock
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    let provider = cfg.provider.to_lowercase();
    let timeout = Duration::from_secs(cfg.timeouts.request.max(1));
    let use_deepseek = provider != "mock"
        && (std::env::var("DEEPSEEK_API_KEY").is_ok()
            || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok()));
    let use_openai =
        provider != "mock" && provider != "deepseek" && std::env::var("OPENAI_API_KEY").is_ok();

    let client: Arc<dyn LlmClient> = if use_deepseek {
        let client = create_deepseek_client(cfg);
        tracing::info!("Using DeepSeek LLM ({})", client.model());
        Arc::new(client)
    } else if use_openai {
        let model = cfg
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(
            OpenAiClient::new(
                cfg.base_url.as_deref(),
                &model,
                std::env::var("OPENAI_API_KEY").ok().as_deref(),
            )
            .with_request_timeout(timeout),
        )
    } else {
        tracing::warn!("No API key set or provider is mock, using Mock LLM");
        return Arc::new(MockLlmClient::new());
    };

    Arc::new(RetryingLlmClient::new(
        client,
        RetryConfig {
            max_retries: cfg.max_retries,
            ..RetryConfig::default()
        },
    ))
}

/// SQL Agent：工作流引擎 + 调用方超时
pub struct SqlAgent {
    engine: WorkflowEngine,
    request_timeout: Option<Duration>,
}

impl SqlAgent {
    pub fn new(engine: WorkflowEngine, request_timeout: Option<Duration>) -> Self {
        Self {
            engine,
            request_timeout,
        }
    }

    /// 从配置创建：连接 SQLite、选择 LLM 后端、加载 few-shot 与模板
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let url = cfg.database.resolved_url().context(
            "No database configured: set [database].url or the CONNECTION_STRING environment variable",
        )?;
        let database = SqliteDatabase::connect(&url, &cfg.database)
            .await
            .with_context(|| format!("Failed to connect to database {url}"))?;

        let engine = WorkflowBuilder::from_config(&cfg.workflow)
            .llm(create_llm_from_config(&cfg.llm))
            .database(Arc::new(database))
            .provider_timeout(Duration::from_secs(cfg.database.provider_timeout_secs.max(1)))
            .build()?;

        let request_timeout =
            (cfg.app.request_timeout_secs > 0).then(|| Duration::from_secs(cfg.app.request_timeout_secs));
        Ok(Self::new(engine, request_timeout))
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// 跑完整条工作流，返回完整报告
    pub async fn run(&self, question: &str) -> Result<RunReport, AgentError> {
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.engine.run(question))
                .await
                .map_err(|_| AgentError::Timeout(limit.as_secs()))?,
            None => self.engine.run(question).await,
        }
    }

    /// 回答问题（对外边界：错误统一折叠进 QueryResponse）
    pub async fn ask(&self, question: &str) -> QueryResponse {
        self.run(question).await.into()
    }
}

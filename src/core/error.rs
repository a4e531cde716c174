//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryWithPrompt（选表/选列 JSON 修复）或 Abort。
//! 预期内的失败（SQL 判定 invalid、执行报错）不走这里，而是作为状态字段驱动回路。

use thiserror::Error;

use crate::llm::LlmError;
use crate::tools::ProviderError;
use crate::workflow::{RetryLoop, Stage};

/// 一次 run 中可能终止工作流的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Database reported no tables")]
    NoTablesAvailable,

    #[error("Model found no table relevant to the question")]
    NoRelevantTables,

    #[error("Provider call failed in {stage}: {source}")]
    Provider {
        stage: Stage,
        #[source]
        source: ProviderError,
    },

    #[error("LLM call failed in {stage}: {source}")]
    Llm {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    /// 结构化输出不符合约定（JSON 解析失败、表名不在候选中等）
    #[error("Schema violation in {stage}: {detail}")]
    SchemaViolation { stage: Stage, detail: String },

    #[error("Invalid model output in {stage}: {detail}")]
    InvalidModelOutput { stage: Stage, detail: String },

    /// 某阶段读取了尚未由上游阶段写入的字段
    #[error("{stage} read `{field}` before it was produced")]
    MissingField { stage: Stage, field: &'static str },

    #[error("Illegal transition {from} -> {to}")]
    IllegalTransition { from: Stage, to: Stage },

    #[error("Step budget of {steps} exhausted{}", fmt_last_error(.last_error))]
    StepBudgetExceeded {
        steps: usize,
        last_error: Option<String>,
    },

    #[error("{retry_loop} retry limit reached after {attempts} attempts{}", fmt_last_error(.last_error))]
    RetryLimitExceeded {
        retry_loop: RetryLoop,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("Run timed out after {0}s")]
    Timeout(u64),

    #[error("Config error: {0}")]
    ConfigError(String),
}

fn fmt_last_error(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {e})"),
        None => String::new(),
    }
}

impl AgentError {
    /// 回路耗尽（步数预算或单回路重试上限）：对用户统一表述为「无法得到有效答案」
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            AgentError::StepBudgetExceeded { .. } | AgentError::RetryLimitExceeded { .. }
        )
    }

    /// 面向用户的错误文本
    pub fn user_message(&self) -> String {
        if self.is_exhausted() {
            format!("could not produce a valid answer: {self}")
        } else {
            self.to_string()
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone)]
pub enum RecoveryAction {
    /// 将提示注入下一轮，让 LLM 重试（如 JSON 格式错误）
    RetryWithPrompt(String),
    /// 终止当前 run
    Abort,
}

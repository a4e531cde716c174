//! 工作流类型定义
//!
//! 阶段、校验结论、回路类别、重新生成的反馈原因，以及阶段的输出（delta + 下一阶段）。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workflow::StateDelta;

/// 工作流阶段（图中的节点）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// 列出数据库中的表
    TableDiscovery,
    /// LLM 挑选相关表
    TableSelection,
    /// 逐表获取结构
    SchemaExtraction,
    /// LLM 挑选相关列
    ColumnSelection,
    /// LLM 生成 SQL（两条失败回路的唯一重入点）
    SqlGeneration,
    /// LLM 校验 SQL
    SqlValidation,
    /// 执行 SQL
    SqlExecution,
    /// LLM 总结结果
    ResultSummarization,
    /// 终点
    Terminal,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::TableDiscovery,
        Stage::TableSelection,
        Stage::SchemaExtraction,
        Stage::ColumnSelection,
        Stage::SqlGeneration,
        Stage::SqlValidation,
        Stage::SqlExecution,
        Stage::ResultSummarization,
        Stage::Terminal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::TableDiscovery => "TableDiscovery",
            Stage::TableSelection => "TableSelection",
            Stage::SchemaExtraction => "SchemaExtraction",
            Stage::ColumnSelection => "ColumnSelection",
            Stage::SqlGeneration => "SQLGeneration",
            Stage::SqlValidation => "SQLValidation",
            Stage::SqlExecution => "SQLExecution",
            Stage::ResultSummarization => "ResultSummarization",
            Stage::Terminal => "Terminal",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// SQL 校验结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    Invalid,
}

/// 回到 SQL 生成的两条回路
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryLoop {
    /// 校验判定 invalid
    Validation,
    /// 执行报错
    Execution,
}

impl fmt::Display for RetryLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryLoop::Validation => f.write_str("validation"),
            RetryLoop::Execution => f.write_str("execution"),
        }
    }
}

/// 重新进入 SQL 生成的原因，作为单一的判别参数传给生成阶段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Feedback {
    /// 校验阶段否决，reason 为校验模型给出的理由
    InvalidatedBy { reason: String },
    /// 执行失败，error 为原始错误文本
    ExecutionFailed { error: String },
}

impl Feedback {
    pub fn retry_loop(&self) -> RetryLoop {
        match self {
            Feedback::InvalidatedBy { .. } => RetryLoop::Validation,
            Feedback::ExecutionFailed { .. } => RetryLoop::Execution,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Feedback::InvalidatedBy { reason } => reason,
            Feedback::ExecutionFailed { error } => error,
        }
    }
}

/// 单个阶段的产出：状态增量与路由决定
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub delta: StateDelta,
    pub next: Stage,
}

impl StageOutcome {
    pub fn new(delta: StateDelta, next: Stage) -> Self {
        Self { delta, next }
    }
}

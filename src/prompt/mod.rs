//! Prompt 组装
//!
//! 每个决策阶段把输入整理成 `Prompt { task, fields }`，由 PromptTemplates 渲染为消息：
//! - system：`### task: <task>` 加上该任务的模板（`{format}` / `{dialect}` 已替换）
//! - user：逐字段的 `### <field>` 小节
//!
//! `Prompt::from_messages` 做反向解析，Mock 客户端据此按任务给出确定性回答。

pub mod few_shot;
pub mod templates;

use std::fmt;
use std::str::FromStr;

use crate::llm::{Message, Role};

pub use few_shot::{FewShotExample, FewShotSet};
pub use templates::PromptTemplates;

const TASK_MARKER: &str = "### task: ";
const FIELD_MARKER: &str = "### ";

/// 字段名（阶段与 Mock 共用）
pub mod field {
    pub const QUESTION: &str = "question";
    pub const AVAILABLE_TABLES: &str = "available_tables";
    pub const SELECTED_TABLES: &str = "selected_tables";
    pub const SCHEMAS: &str = "schemas";
    pub const SELECTED_COLUMNS: &str = "selected_columns";
    pub const EXAMPLES: &str = "examples";
    pub const PREVIOUS_SQL: &str = "previous_sql";
    pub const FEEDBACK_KIND: &str = "feedback_kind";
    pub const FEEDBACK: &str = "feedback";
    pub const SQL: &str = "sql";
    pub const QUERY_RESULT: &str = "query_result";
}

/// 需要模型参与的任务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptTask {
    TableSelection,
    ColumnSelection,
    SqlGeneration,
    SqlValidation,
    Summarization,
}

impl PromptTask {
    pub const ALL: [PromptTask; 5] = [
        PromptTask::TableSelection,
        PromptTask::ColumnSelection,
        PromptTask::SqlGeneration,
        PromptTask::SqlValidation,
        PromptTask::Summarization,
    ];

    /// 任务名，同时也是覆盖模板的文件名（`<prompts_dir>/<name>.txt`）
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptTask::TableSelection => "table_selection",
            PromptTask::ColumnSelection => "column_selection",
            PromptTask::SqlGeneration => "sql_generation",
            PromptTask::SqlValidation => "sql_validation",
            PromptTask::Summarization => "summarization",
        }
    }
}

impl fmt::Display for PromptTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptTask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PromptTask::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("unknown prompt task: {s}"))
    }
}

/// 一次模型调用的结构化输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub task: PromptTask,
    pub fields: Vec<(String, String)>,
}

impl Prompt {
    pub fn new(task: PromptTask) -> Self {
        Self {
            task,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.push((name.to_string(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 字段小节（user 消息正文）
    pub(crate) fn render_fields(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.fields {
            out.push_str(FIELD_MARKER);
            out.push_str(name);
            out.push('\n');
            out.push_str(value);
            out.push_str("\n\n");
        }
        out.trim_end().to_string()
    }

    pub(crate) fn task_header(&self) -> String {
        format!("{TASK_MARKER}{}", self.task.as_str())
    }

    /// 从渲染后的消息恢复 Prompt：task 取自 system 消息首行，fields 取自其后第一条 user 消息
    pub fn from_messages(messages: &[Message]) -> Option<Self> {
        let system_idx = messages
            .iter()
            .position(|m| m.role == Role::System && m.content.starts_with(TASK_MARKER))?;
        let header = messages[system_idx].content.lines().next()?;
        let task: PromptTask = header.strip_prefix(TASK_MARKER)?.parse().ok()?;

        let user = messages[system_idx + 1..]
            .iter()
            .find(|m| m.role == Role::User)?;

        let mut fields: Vec<(String, String)> = Vec::new();
        for line in user.content.lines() {
            if let Some(name) = line.strip_prefix(FIELD_MARKER) {
                fields.push((name.trim().to_string(), String::new()));
            } else if let Some((_, value)) = fields.last_mut() {
                if !value.is_empty() {
                    value.push('\n');
                }
                value.push_str(line);
            }
        }
        for (_, value) in fields.iter_mut() {
            let trimmed = value.trim_end().to_string();
            *value = trimmed;
        }
        Some(Self { task, fields })
    }
}

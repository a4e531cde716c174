//! 工作流状态与增量
//!
//! WorkflowState 由引擎独占；阶段只读 `&WorkflowState` 并返回 StateDelta，由引擎 apply 合并。
//! 读取尚未产生的字段返回 AgentError::MissingField。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::AgentError;
use crate::workflow::{Feedback, Stage, Verdict};

/// 单字段更新：保持 / 覆盖 / 清空
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    Unchanged,
    Set(T),
    Cleared,
}

impl<T> Default for FieldUpdate<T> {
    fn default() -> Self {
        FieldUpdate::Unchanged
    }
}

impl<T> FieldUpdate<T> {
    fn apply_to(self, slot: &mut Option<T>) {
        match self {
            FieldUpdate::Unchanged => {}
            FieldUpdate::Set(v) => *slot = Some(v),
            FieldUpdate::Cleared => *slot = None,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, FieldUpdate::Unchanged)
    }
}

/// 一次提问的共享状态
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowState {
    pub question: String,
    pub available_tables: Option<String>,
    pub selected_tables: Vec<String>,
    pub schemas: Vec<String>,
    pub selected_columns: BTreeMap<String, Vec<String>>,
    pub generated_sql: Option<String>,
    pub validation_result: Option<Verdict>,
    pub query_result: Option<String>,
    pub query_error: Option<String>,
    pub feedback: Option<Feedback>,
    pub final_answer: Option<String>,
    /// 重新生成总次数
    pub retry_count: u32,
    pub validation_retries: u32,
    pub execution_retries: u32,
}

/// 阶段提出的状态增量
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub available_tables: FieldUpdate<String>,
    pub selected_tables: FieldUpdate<Vec<String>>,
    pub schemas: FieldUpdate<Vec<String>>,
    pub selected_columns: FieldUpdate<BTreeMap<String, Vec<String>>>,
    pub generated_sql: FieldUpdate<String>,
    pub validation_result: FieldUpdate<Verdict>,
    pub query_result: FieldUpdate<String>,
    pub query_error: FieldUpdate<String>,
    pub feedback: FieldUpdate<Feedback>,
    pub final_answer: FieldUpdate<String>,
    pub retry_count: Option<u32>,
    pub validation_retries: Option<u32>,
    pub execution_retries: Option<u32>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn available_tables(mut self, tables: impl Into<String>) -> Self {
        self.available_tables = FieldUpdate::Set(tables.into());
        self
    }

    pub fn selected_tables(mut self, tables: Vec<String>) -> Self {
        self.selected_tables = FieldUpdate::Set(tables);
        self
    }

    pub fn schemas(mut self, schemas: Vec<String>) -> Self {
        self.schemas = FieldUpdate::Set(schemas);
        self
    }

    pub fn selected_columns(mut self, columns: BTreeMap<String, Vec<String>>) -> Self {
        self.selected_columns = FieldUpdate::Set(columns);
        self
    }

    pub fn generated_sql(mut self, sql: impl Into<String>) -> Self {
        self.generated_sql = FieldUpdate::Set(sql.into());
        self
    }

    pub fn validation_result(mut self, verdict: Verdict) -> Self {
        self.validation_result = FieldUpdate::Set(verdict);
        self
    }

    pub fn clear_validation_result(mut self) -> Self {
        self.validation_result = FieldUpdate::Cleared;
        self
    }

    pub fn query_result(mut self, result: impl Into<String>) -> Self {
        self.query_result = FieldUpdate::Set(result.into());
        self
    }

    pub fn query_error(mut self, error: impl Into<String>) -> Self {
        self.query_error = FieldUpdate::Set(error.into());
        self
    }

    pub fn clear_query_error(mut self) -> Self {
        self.query_error = FieldUpdate::Cleared;
        self
    }

    pub fn feedback(mut self, feedback: Feedback) -> Self {
        self.feedback = FieldUpdate::Set(feedback);
        self
    }

    pub fn clear_feedback(mut self) -> Self {
        self.feedback = FieldUpdate::Cleared;
        self
    }

    pub fn final_answer(mut self, answer: impl Into<String>) -> Self {
        self.final_answer = FieldUpdate::Set(answer.into());
        self
    }

    /// 本次增量触及的字段名（事件与日志用）
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let updates: [(&'static str, bool); 10] = [
            ("available_tables", self.available_tables.is_unchanged()),
            ("selected_tables", self.selected_tables.is_unchanged()),
            ("schemas", self.schemas.is_unchanged()),
            ("selected_columns", self.selected_columns.is_unchanged()),
            ("generated_sql", self.generated_sql.is_unchanged()),
            ("validation_result", self.validation_result.is_unchanged()),
            ("query_result", self.query_result.is_unchanged()),
            ("query_error", self.query_error.is_unchanged()),
            ("feedback", self.feedback.is_unchanged()),
            ("final_answer", self.final_answer.is_unchanged()),
        ];
        for (name, unchanged) in updates {
            if !unchanged {
                fields.push(name);
            }
        }
        let counters = [
            ("retry_count", self.retry_count.is_some()),
            ("validation_retries", self.validation_retries.is_some()),
            ("execution_retries", self.execution_retries.is_some()),
        ];
        for (name, set) in counters {
            if set {
                fields.push(name);
            }
        }
        fields
    }

    /// 记一次重新生成：总次数与对应回路计数各加一
    pub fn count_retry(mut self, state: &WorkflowState, feedback: &Feedback) -> Self {
        self.retry_count = Some(state.retry_count + 1);
        match feedback.retry_loop() {
            crate::workflow::RetryLoop::Validation => {
                self.validation_retries = Some(state.validation_retries + 1)
            }
            crate::workflow::RetryLoop::Execution => {
                self.execution_retries = Some(state.execution_retries + 1)
            }
        }
        self
    }
}

fn apply_vec<T>(update: FieldUpdate<T>, slot: &mut T)
where
    T: Default,
{
    match update {
        FieldUpdate::Unchanged => {}
        FieldUpdate::Set(v) => *slot = v,
        FieldUpdate::Cleared => *slot = T::default(),
    }
}

impl WorkflowState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    /// 逐字段覆盖合并
    pub fn apply(&mut self, delta: StateDelta) {
        delta.available_tables.apply_to(&mut self.available_tables);
        apply_vec(delta.selected_tables, &mut self.selected_tables);
        apply_vec(delta.schemas, &mut self.schemas);
        apply_vec(delta.selected_columns, &mut self.selected_columns);
        delta.generated_sql.apply_to(&mut self.generated_sql);
        delta.validation_result.apply_to(&mut self.validation_result);
        delta.query_result.apply_to(&mut self.query_result);
        delta.query_error.apply_to(&mut self.query_error);
        delta.feedback.apply_to(&mut self.feedback);
        delta.final_answer.apply_to(&mut self.final_answer);
        if let Some(n) = delta.retry_count {
            self.retry_count = n;
        }
        if let Some(n) = delta.validation_retries {
            self.validation_retries = n;
        }
        if let Some(n) = delta.execution_retries {
            self.execution_retries = n;
        }
    }

    /// 最近一次失败原因：执行错误优先，其次校验反馈
    pub fn last_error(&self) -> Option<String> {
        self.query_error
            .clone()
            .or_else(|| self.feedback.as_ref().map(|f| f.detail().to_string()))
    }

    pub fn require_available_tables(&self, stage: Stage) -> Result<&str, AgentError> {
        self.available_tables
            .as_deref()
            .ok_or(AgentError::MissingField {
                stage,
                field: "available_tables",
            })
    }

    pub fn require_selected_tables(&self, stage: Stage) -> Result<&[String], AgentError> {
        if self.selected_tables.is_empty() {
            return Err(AgentError::MissingField {
                stage,
                field: "selected_tables",
            });
        }
        Ok(&self.selected_tables)
    }

    pub fn require_schemas(&self, stage: Stage) -> Result<&[String], AgentError> {
        if self.schemas.is_empty() {
            return Err(AgentError::MissingField {
                stage,
                field: "schemas",
            });
        }
        Ok(&self.schemas)
    }

    pub fn require_selected_columns(
        &self,
        stage: Stage,
    ) -> Result<&BTreeMap<String, Vec<String>>, AgentError> {
        if self.selected_columns.is_empty() {
            return Err(AgentError::MissingField {
                stage,
                field: "selected_columns",
            });
        }
        Ok(&self.selected_columns)
    }

    pub fn require_generated_sql(&self, stage: Stage) -> Result<&str, AgentError> {
        self.generated_sql.as_deref().ok_or(AgentError::MissingField {
            stage,
            field: "generated_sql",
        })
    }

    pub fn require_query_result(&self, stage: Stage) -> Result<&str, AgentError> {
        self.query_result.as_deref().ok_or(AgentError::MissingField {
            stage,
            field: "query_result",
        })
    }
}

use async_trait::async_trait;

use super::{StageContext, StageHandler};
use crate::core::AgentError;
use crate::prompt::{field, Prompt, PromptTask};
use crate::workflow::output::normalize_sql;
use crate::workflow::{Feedback, Stage, StageOutcome, StateDelta, WorkflowState};

/// 生成 SQL；从校验或执行失败回到这里时，把上一条 SQL 与失败原因一并交给模型
pub struct SqlGeneration;

fn feedback_kind(feedback: &Feedback) -> &'static str {
    match feedback {
        Feedback::InvalidatedBy { .. } => "rejected by validation",
        Feedback::ExecutionFailed { .. } => "failed during execution",
    }
}

impl SqlGeneration {
    fn prompt(state: &WorkflowState, ctx: &StageContext) -> Result<Prompt, AgentError> {
        let stage = Stage::SqlGeneration;
        let tables = state.require_selected_tables(stage)?;
        let columns = state.require_selected_columns(stage)?;
        let columns_json = serde_json::to_string_pretty(columns).map_err(|e| {
            AgentError::InvalidModelOutput {
                stage,
                detail: e.to_string(),
            }
        })?;

        let mut prompt = Prompt::new(PromptTask::SqlGeneration)
            .field(field::QUESTION, state.question.as_str())
            .field(field::SELECTED_TABLES, tables.join(", "))
            .field(field::SELECTED_COLUMNS, columns_json);
        if !ctx.few_shots.is_empty() {
            prompt = prompt.field(field::EXAMPLES, ctx.few_shots.render());
        }
        if let Some(feedback) = &state.feedback {
            prompt = prompt
                .field(
                    field::PREVIOUS_SQL,
                    state.generated_sql.as_deref().unwrap_or("(none)"),
                )
                .field(field::FEEDBACK_KIND, feedback_kind(feedback))
                .field(field::FEEDBACK, feedback.detail());
        }
        Ok(prompt)
    }
}

#[async_trait]
impl StageHandler for SqlGeneration {
    fn stage(&self) -> Stage {
        Stage::SqlGeneration
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> Result<StageOutcome, AgentError> {
        let stage = self.stage();
        let prompt = Self::prompt(state, ctx)?;
        let raw = ctx.ask(stage, &prompt).await?;
        let sql = normalize_sql(&raw).map_err(|e| e.into_agent_error(stage))?;
        tracing::info!(sql = %sql, regenerated = state.feedback.is_some(), "Generated SQL");

        Ok(StageOutcome::new(
            StateDelta::new()
                .generated_sql(sql)
                .clear_query_error()
                .clear_feedback()
                .clear_validation_result(),
            Stage::SqlValidation,
        ))
    }
}

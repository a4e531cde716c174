use async_trait::async_trait;

use super::{StageContext, StageHandler};
use crate::core::AgentError;
use crate::prompt::{field, Prompt, PromptTask};
use crate::workflow::output::parse_column_target;
use crate::workflow::{Stage, StageOutcome, StateDelta, WorkflowState};

/// 由模型根据表结构挑选需要的列
pub struct ColumnSelection;

#[async_trait]
impl StageHandler for ColumnSelection {
    fn stage(&self) -> Stage {
        Stage::ColumnSelection
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> Result<StageOutcome, AgentError> {
        let stage = self.stage();
        let tables = state.require_selected_tables(stage)?;
        let schemas = state.require_schemas(stage)?;

        let prompt = Prompt::new(PromptTask::ColumnSelection)
            .field(field::QUESTION, state.question.as_str())
            .field(field::SELECTED_TABLES, tables.join(", "))
            .field(field::SCHEMAS, schemas.join("\n\n"));
        let columns = ctx
            .decide(stage, &prompt, |raw| parse_column_target(raw, tables))
            .await?;
        tracing::info!(columns = ?columns, "Selected columns");

        Ok(StageOutcome::new(
            StateDelta::new().selected_columns(columns),
            Stage::SqlGeneration,
        ))
    }
}

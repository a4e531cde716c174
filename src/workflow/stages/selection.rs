use async_trait::async_trait;

use super::{StageContext, StageHandler};
use crate::core::AgentError;
use crate::prompt::{field, Prompt, PromptTask};
use crate::workflow::output::{parse_table_list, parse_table_target};
use crate::workflow::{Stage, StageOutcome, StateDelta, WorkflowState};

/// 由模型从候选表中挑选与问题相关的表
pub struct TableSelection;

#[async_trait]
impl StageHandler for TableSelection {
    fn stage(&self) -> Stage {
        Stage::TableSelection
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> Result<StageOutcome, AgentError> {
        let stage = self.stage();
        let available = parse_table_list(state.require_available_tables(stage)?);

        let prompt = Prompt::new(PromptTask::TableSelection)
            .field(field::QUESTION, state.question.as_str())
            .field(field::AVAILABLE_TABLES, available.join(", "));
        let tables = ctx
            .decide(stage, &prompt, |raw| parse_table_target(raw, &available))
            .await?;
        tracing::info!(tables = ?tables, "Selected tables");

        Ok(StageOutcome::new(
            StateDelta::new().selected_tables(tables),
            Stage::SchemaExtraction,
        ))
    }
}

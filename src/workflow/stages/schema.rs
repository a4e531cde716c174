use async_trait::async_trait;

use super::{provider_error, StageContext, StageHandler};
use crate::core::AgentError;
use crate::workflow::output::trim_schema;
use crate::workflow::{Stage, StageOutcome, StateDelta, WorkflowState};

/// 按已选表的顺序逐个获取表结构（去掉样例数据注释）
pub struct SchemaExtraction;

#[async_trait]
impl StageHandler for SchemaExtraction {
    fn stage(&self) -> Stage {
        Stage::SchemaExtraction
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> Result<StageOutcome, AgentError> {
        let stage = self.stage();
        let tables = state.require_selected_tables(stage)?;

        let mut schemas = Vec::with_capacity(tables.len());
        for table in tables {
            let raw = ctx
                .db
                .get_schema(table)
                .await
                .map_err(provider_error(stage))?;
            schemas.push(trim_schema(&raw));
        }

        Ok(StageOutcome::new(
            StateDelta::new().schemas(schemas),
            Stage::ColumnSelection,
        ))
    }
}

use async_trait::async_trait;

use super::{provider_error, StageContext, StageHandler};
use crate::core::AgentError;
use crate::workflow::output::parse_table_list;
use crate::workflow::{Stage, StageOutcome, StateDelta, WorkflowState};

/// 列出数据库中的全部表
pub struct TableDiscovery;

#[async_trait]
impl StageHandler for TableDiscovery {
    fn stage(&self) -> Stage {
        Stage::TableDiscovery
    }

    async fn run(
        &self,
        _state: &WorkflowState,
        ctx: &StageContext,
    ) -> Result<StageOutcome, AgentError> {
        let tables = ctx
            .db
            .list_tables()
            .await
            .map_err(provider_error(self.stage()))?;

        let count = parse_table_list(&tables).len();
        if count == 0 {
            return Err(AgentError::NoTablesAvailable);
        }
        tracing::debug!(count, "Discovered tables");

        Ok(StageOutcome::new(
            StateDelta::new().available_tables(tables),
            Stage::TableSelection,
        ))
    }
}

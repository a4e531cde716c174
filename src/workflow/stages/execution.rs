use async_trait::async_trait;

use super::{provider_error, StageContext, StageHandler};
use crate::core::AgentError;
use crate::workflow::{Feedback, Stage, StageOutcome, StateDelta, WorkflowState};

/// 执行 SQL：查询失败（含空结果）回到 SQL 生成，其余能力错误终止
pub struct SqlExecution;

#[async_trait]
impl StageHandler for SqlExecution {
    fn stage(&self) -> Stage {
        Stage::SqlExecution
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> Result<StageOutcome, AgentError> {
        let stage = self.stage();
        let sql = state.require_generated_sql(stage)?;

        match ctx.db.run_query(sql).await {
            Ok(rows) => Ok(StageOutcome::new(
                StateDelta::new()
                    .query_result(rows)
                    .clear_query_error()
                    .clear_feedback(),
                Stage::ResultSummarization,
            )),
            Err(err) if err.is_recoverable() => {
                let error = err.to_string();
                tracing::warn!(sql = %sql, error = %error, "Query failed");
                let feedback = Feedback::ExecutionFailed {
                    error: error.clone(),
                };
                Ok(StageOutcome::new(
                    StateDelta::new()
                        .query_error(error)
                        .count_retry(state, &feedback)
                        .feedback(feedback),
                    Stage::SqlGeneration,
                ))
            }
            Err(other) => Err(provider_error(stage)(other)),
        }
    }
}

use async_trait::async_trait;

use super::{StageContext, StageHandler};
use crate::core::AgentError;
use crate::prompt::{field, Prompt, PromptTask};
use crate::workflow::output::parse_verdict;
use crate::workflow::{Feedback, Stage, StageOutcome, StateDelta, Verdict, WorkflowState};

/// 由模型检查 SQL 的常见错误；判定 invalid 时带着理由回到 SQL 生成
pub struct SqlValidation;

#[async_trait]
impl StageHandler for SqlValidation {
    fn stage(&self) -> Stage {
        Stage::SqlValidation
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> Result<StageOutcome, AgentError> {
        let stage = self.stage();
        let sql = state.require_generated_sql(stage)?;

        if !ctx.options.validate_sql {
            return Ok(StageOutcome::new(
                StateDelta::new().validation_result(Verdict::Valid),
                Stage::SqlExecution,
            ));
        }

        let prompt = Prompt::new(PromptTask::SqlValidation).field(field::SQL, sql);
        let raw = ctx.ask(stage, &prompt).await?;

        match parse_verdict(&raw) {
            (Verdict::Valid, _) => Ok(StageOutcome::new(
                StateDelta::new().validation_result(Verdict::Valid),
                Stage::SqlExecution,
            )),
            (Verdict::Invalid, reason) => {
                tracing::warn!(sql = %sql, reason = %reason, "SQL rejected by validation");
                let feedback = Feedback::InvalidatedBy { reason };
                Ok(StageOutcome::new(
                    StateDelta::new()
                        .validation_result(Verdict::Invalid)
                        .count_retry(state, &feedback)
                        .feedback(feedback),
                    Stage::SqlGeneration,
                ))
            }
        }
    }
}

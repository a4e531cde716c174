use async_trait::async_trait;

use super::{StageContext, StageHandler};
use crate::core::AgentError;
use crate::prompt::{field, Prompt, PromptTask};
use crate::workflow::output::ParseError;
use crate::workflow::{Stage, StageOutcome, StateDelta, WorkflowState};

/// 用自然语言总结查询结果，产出最终回答
pub struct ResultSummarization;

#[async_trait]
impl StageHandler for ResultSummarization {
    fn stage(&self) -> Stage {
        Stage::ResultSummarization
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &StageContext,
    ) -> Result<StageOutcome, AgentError> {
        let stage = self.stage();
        let data = state.require_query_result(stage)?;

        let prompt = Prompt::new(PromptTask::Summarization)
            .field(field::QUESTION, state.question.as_str())
            .field(field::QUERY_RESULT, data);
        let raw = ctx.ask(stage, &prompt).await?;
        let answer = raw.trim();
        if answer.is_empty() {
            return Err(ParseError::Empty("answer").into_agent_error(stage));
        }

        Ok(StageOutcome::new(
            StateDelta::new().final_answer(answer),
            Stage::Terminal,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::workflow::stages::testing::*;

    #[tokio::test]
    async fn test_blank_answer_is_rejected() {
        let ctx = context(Arc::new(ScriptLlm::new(&["  \n"])), db("employees"));
        let mut state = WorkflowState::new("q");
        state.apply(StateDelta::new().query_result("[(100,)]"));
        let err = ResultSummarization.run(&state, &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidModelOutput { .. }));
    }
}

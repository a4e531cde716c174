//! 工作流引擎
//!
//! 从入口阶段开始循环：检查步数预算 → 调用阶段 → 校验转移是否为图中的边 → 合并增量 →
//! 检查两条重试回路各自的上限 → 前进到下一阶段；到达 Terminal 且有 final_answer 即成功。
//! 引擎本身不做 I/O，所有外部调用都发生在阶段内部。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::workflow::stages::{StageContext, StageRegistry};
use crate::workflow::{
    RetryLoop, Stage, StageOutcome, WorkflowEvent, WorkflowGraph, WorkflowState,
};

/// 单次 run 的上限
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// 阶段调用次数上限
    pub max_steps: usize,
    /// None 表示该回路只受 max_steps 约束
    pub max_validation_retries: Option<u32>,
    pub max_execution_retries: Option<u32>,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_steps: 50,
            max_validation_retries: Some(8),
            max_execution_retries: Some(8),
        }
    }
}

impl RunLimits {
    fn retry_limit(&self, retry_loop: RetryLoop) -> Option<u32> {
        match retry_loop {
            RetryLoop::Validation => self.max_validation_retries,
            RetryLoop::Execution => self.max_execution_retries,
        }
    }
}

/// 成功 run 的结果
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub final_answer: String,
    pub generated_sql: Option<String>,
    /// 实际调用的阶段数
    pub steps: usize,
    pub retry_count: u32,
    pub state: WorkflowState,
    /// 毫秒时间戳
    pub started_at: i64,
    pub completed_at: i64,
}

/// 工作流引擎：持有阶段依赖、注册表与状态图；可被多个并发 run 共享
pub struct WorkflowEngine {
    ctx: StageContext,
    registry: StageRegistry,
    graph: WorkflowGraph,
    limits: RunLimits,
    event_tx: Option<UnboundedSender<WorkflowEvent>>,
}

impl WorkflowEngine {
    pub(crate) fn new(
        ctx: StageContext,
        registry: StageRegistry,
        graph: WorkflowGraph,
        limits: RunLimits,
        event_tx: Option<UnboundedSender<WorkflowEvent>>,
    ) -> Self {
        Self {
            ctx,
            registry,
            graph,
            limits,
            event_tx,
        }
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn limits(&self) -> &RunLimits {
        &self.limits
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.ctx.llm
    }

    fn send_event(&self, ev: WorkflowEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    /// 回答一个问题；每次调用拥有独立的状态
    pub async fn run(&self, question: &str) -> Result<RunReport, AgentError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("workflow", run_id = %run_id, question = %question.trim());
        self.run_inner(run_id, question).instrument(span).await
    }

    async fn run_inner(&self, run_id: String, question: &str) -> Result<RunReport, AgentError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::EmptyQuestion);
        }
        tracing::info!(question = %question, "Workflow started");

        let started_at = chrono::Utc::now().timestamp_millis();
        let mut state = WorkflowState::new(question);
        let mut current = self.graph.entry();
        let mut steps = 0usize;
        let mut last_error: Option<String> = None;

        let result = loop {
            if steps >= self.limits.max_steps {
                break Err(AgentError::StepBudgetExceeded {
                    steps,
                    last_error: last_error.clone(),
                });
            }
            steps += 1;

            match self.step(&run_id, steps, current, &mut state).await {
                Ok(next) => {
                    if let Some(e) = state.last_error() {
                        last_error = Some(e);
                    }
                    if let Err(e) = self.check_retry_limits(&run_id, next, &state, &last_error) {
                        break Err(e);
                    }
                    if next == Stage::Terminal {
                        break state
                            .final_answer
                            .clone()
                            .ok_or(AgentError::MissingField {
                                stage: current,
                                field: "final_answer",
                            });
                    }
                    current = next;
                }
                Err(e) => break Err(e),
            }
        };

        match result {
            Ok(final_answer) => {
                let (prompt_tokens, completion_tokens, total_tokens) = self.ctx.llm.token_usage();
                tracing::info!(
                    steps,
                    retries = state.retry_count,
                    prompt_tokens,
                    completion_tokens,
                    total_tokens,
                    "Workflow finished"
                );
                self.send_event(WorkflowEvent::Finished {
                    run_id: run_id.clone(),
                    steps,
                    answer: final_answer.clone(),
                });
                Ok(RunReport {
                    run_id,
                    final_answer,
                    generated_sql: state.generated_sql.clone(),
                    steps,
                    retry_count: state.retry_count,
                    state,
                    started_at,
                    completed_at: chrono::Utc::now().timestamp_millis(),
                })
            }
            Err(e) => {
                tracing::error!(steps, error = %e, "Workflow failed");
                self.send_event(WorkflowEvent::Failed {
                    run_id,
                    steps,
                    error: e.user_message(),
                });
                Err(e)
            }
        }
    }

    /// 执行一个阶段并合并其增量，返回下一阶段
    async fn step(
        &self,
        run_id: &str,
        step: usize,
        current: Stage,
        state: &mut WorkflowState,
    ) -> Result<Stage, AgentError> {
        let handler = self.registry.get(current).ok_or_else(|| {
            AgentError::ConfigError(format!("no handler registered for stage {current}"))
        })?;

        tracing::debug!(step, stage = %current, "Stage started");
        self.send_event(WorkflowEvent::StageStarted {
            run_id: run_id.to_string(),
            step,
            max_steps: self.limits.max_steps,
            stage: current,
        });

        let StageOutcome { delta, next } = handler.run(state, &self.ctx).await?;
        if !self.graph.allows(current, next) {
            return Err(AgentError::IllegalTransition {
                from: current,
                to: next,
            });
        }

        let changed = delta.changed_fields();
        state.apply(delta);
        tracing::debug!(step, stage = %current, next = %next, changed = ?changed, "Stage finished");
        self.send_event(WorkflowEvent::StageFinished {
            run_id: run_id.to_string(),
            step,
            stage: current,
            next,
            changed,
        });
        Ok(next)
    }

    /// 回到 SQL 生成时按反馈归属的回路检查重试上限
    fn check_retry_limits(
        &self,
        run_id: &str,
        next: Stage,
        state: &WorkflowState,
        last_error: &Option<String>,
    ) -> Result<(), AgentError> {
        let Some(feedback) = state.feedback.as_ref().filter(|_| next == Stage::SqlGeneration) else {
            return Ok(());
        };
        let retry_loop = feedback.retry_loop();
        let attempts = match retry_loop {
            RetryLoop::Validation => state.validation_retries,
            RetryLoop::Execution => state.execution_retries,
        };

        tracing::warn!(
            retry_loop = %retry_loop,
            attempt = attempts,
            reason = %feedback.detail(),
            "Regenerating SQL"
        );
        self.send_event(WorkflowEvent::Regenerating {
            run_id: run_id.to_string(),
            retry_loop,
            attempt: attempts,
            reason: feedback.detail().to_string(),
        });

        match self.limits.retry_limit(retry_loop) {
            Some(max) if attempts > max => Err(AgentError::RetryLimitExceeded {
                retry_loop,
                attempts: max,
                last_error: last_error.clone(),
            }),
            _ => Ok(()),
        }
    }
}

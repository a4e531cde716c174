//! 工作流过程事件：用于流式展示每个阶段的进度、回路重试与最终结果

use serde::Serialize;

use crate::workflow::{RetryLoop, Stage};

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// 阶段开始（当前第几步）
    StageStarted {
        run_id: String,
        step: usize,
        max_steps: usize,
        stage: Stage,
    },
    /// 阶段结束：写入了哪些字段、路由到哪里
    StageFinished {
        run_id: String,
        step: usize,
        stage: Stage,
        next: Stage,
        changed: Vec<&'static str>,
    },
    /// 回到 SQL 生成
    Regenerating {
        run_id: String,
        retry_loop: RetryLoop,
        attempt: u32,
        reason: String,
    },
    /// 成功结束
    Finished {
        run_id: String,
        steps: usize,
        answer: String,
    },
    /// 失败结束
    Failed {
        run_id: String,
        steps: usize,
        error: String,
    },
}

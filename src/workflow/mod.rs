//! 工作流模块：NL → SQL 的多阶段状态机
//!
//! - `types`：阶段、校验结论、回路与反馈
//! - `state`：共享状态与阶段增量（StateDelta + apply）
//! - `graph`：合法转移的邻接表，可导出 Mermaid
//! - `output`：模型输出的严格解析与 SQL 归一化
//! - `stages`：八个阶段的实现与注册表
//! - `engine` / `builder`：驱动循环与组装

pub mod builder;
pub mod engine;
pub mod events;
pub mod graph;
pub mod output;
pub mod stages;
pub mod state;
pub mod types;

pub use builder::WorkflowBuilder;
pub use engine::{RunLimits, RunReport, WorkflowEngine};
pub use events::WorkflowEvent;
pub use graph::WorkflowGraph;
pub use output::ParseError;
pub use stages::{StageContext, StageHandler, StageRegistry};
pub use state::{FieldUpdate, StateDelta, WorkflowState};
pub use types::{Feedback, RetryLoop, Stage, StageOutcome, Verdict};

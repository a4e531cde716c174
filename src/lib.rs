//! sqlagent - Rust 自然语言转 SQL 智能体
//!
//! 模块划分：
//! - **agent**: 无头 SqlAgent（配置 → 引擎，对外 QueryResponse）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与恢复引擎
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / 重试）
//! - **prompt**: 各任务的模板、字段渲染与 few-shot 示例
//! - **tools**: 数据库能力提供方（SQLite）与带超时审计的执行器
//! - **workflow**: 多阶段状态机（阶段、状态增量、状态图、引擎）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod prompt;
pub mod tools;
pub mod workflow;

pub use agent::{QueryResponse, SqlAgent};
pub use workflow::{WorkflowBuilder, WorkflowEngine};

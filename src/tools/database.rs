//! 数据库能力提供方抽象
//!
//! 工作流只依赖 SqlDatabase：列表、取表结构、执行查询。结果是带标签的 Result，
//! 执行失败（QueryFailed）属于可恢复的回路错误，其余变体对本次 run 是致命的。

use async_trait::async_trait;
use thiserror::Error;

/// 能力调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// 查询本身失败（语法错误、表不存在、空结果等），文本会作为反馈交给 SQL 生成阶段
    #[error("{0}")]
    QueryFailed(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider call timed out: {0}")]
    Timeout(String),
}

impl ProviderError {
    /// 只有 QueryFailed 能通过重新生成 SQL 恢复
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProviderError::QueryFailed(_))
    }
}

/// SQL 数据库能力：list_tables / get_schema / run_query
#[async_trait]
pub trait SqlDatabase: Send + Sync {
    /// SQL 方言名称，写入 SQL 生成与校验的 prompt
    fn dialect(&self) -> &str {
        "SQL"
    }

    /// 逗号分隔的表名
    async fn list_tables(&self) -> Result<String, ProviderError>;

    /// 表结构描述；`/` 之后可能跟随示例行等元数据
    async fn get_schema(&self, table: &str) -> Result<String, ProviderError>;

    /// 执行 SQL，返回文本化的结果行
    async fn run_query(&self, sql: &str) -> Result<String, ProviderError>;
}

//! 能力执行器
//!
//! 持有 SqlDatabase 与统一超时，list_tables / get_schema / run_query 都在超时内调用，
//! 超时转为 ProviderError::Timeout；每次调用输出结构化审计日志（JSON）。

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::tools::{ProviderError, SqlDatabase};

/// 能力执行器：对每次调用施加超时并记录审计日志
#[derive(Clone)]
pub struct ProviderExecutor {
    database: Arc<dyn SqlDatabase>,
    timeout: Duration,
}

impl ProviderExecutor {
    pub fn new(database: Arc<dyn SqlDatabase>, timeout: Duration) -> Self {
        Self { database, timeout }
    }

    pub fn dialect(&self) -> &str {
        self.database.dialect()
    }

    pub async fn list_tables(&self) -> Result<String, ProviderError> {
        self.audited("list_tables", "", self.database.list_tables())
            .await
    }

    pub async fn get_schema(&self, table: &str) -> Result<String, ProviderError> {
        self.audited("get_schema", table, self.database.get_schema(table))
            .await
    }

    pub async fn run_query(&self, sql: &str) -> Result<String, ProviderError> {
        self.audited("run_query", sql, self.database.run_query(sql))
            .await
    }

    async fn audited<F>(&self, op: &str, arg: &str, fut: F) -> Result<String, ProviderError>
    where
        F: Future<Output = Result<String, ProviderError>>,
    {
        let start = Instant::now();
        let result = match timeout(self.timeout, fut).await {
            Ok(r) => r,
            Err(_) => Err(ProviderError::Timeout(op.to_string())),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ProviderError::QueryFailed(_)) => "query_failed",
            Err(ProviderError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "provider_audit",
            "op": op,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "arg_preview": preview(arg),
        });
        tracing::info!(audit = %audit.to_string(), "provider");

        result
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct SlowDatabase;

    #[async_trait]
    impl SqlDatabase for SlowDatabase {
        async fn list_tables(&self) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("never".to_string())
        }

        async fn get_schema(&self, table: &str) -> Result<String, ProviderError> {
            Err(ProviderError::UnknownTable(table.to_string()))
        }

        async fn run_query(&self, _sql: &str) -> Result<String, ProviderError> {
            Err(ProviderError::QueryFailed("Error: near \"SELEC\": syntax error".to_string()))
        }
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let exec = ProviderExecutor::new(Arc::new(SlowDatabase), Duration::from_millis(20));
        let err = exec.list_tables().await.unwrap_err();
        assert_eq!(err, ProviderError::Timeout("list_tables".to_string()));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let exec = ProviderExecutor::new(Arc::new(SlowDatabase), Duration::from_secs(1));
        let err = exec.run_query("SELEC 1").await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().starts_with("Error:"));
        assert!(matches!(
            exec.get_schema("ghost").await,
            Err(ProviderError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_preview_truncates() {
        let long = "a".repeat(300);
        assert_eq!(preview(&long).chars().count(), 203);
    }
}

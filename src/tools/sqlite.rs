//! SQLite 能力提供方
//!
//! 基于 sqlx 连接池：有界连接数、取用前健康检查、按 max_lifetime 定期回收。
//! get_schema 返回 `CREATE TABLE` 语句并附带 `/* N rows from T table: ... */` 示例行，
//! run_query 把结果行格式化为 `[(1, 'Alice'), (2, 'Bob')]`。

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::config::DatabaseSection;
use crate::tools::{ProviderError, SqlDatabase};

/// 结果为空时的反馈文本，促使模型改写查询
pub const EMPTY_RESULT_ERROR: &str = "Error: Query failed. Please rewrite your query and try again.";

/// get_schema 附带的示例行数
const SAMPLE_ROWS: usize = 3;
/// 单个文本值的最大字符数，避免超长结果灌进 prompt
const MAX_VALUE_CHARS: usize = 100;

pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// 按配置建立连接池并做一次 `SELECT 1` 连通性检查
    pub async fn connect(url: &str, options: &DatabaseSection) -> Result<Self, ProviderError> {
        let connect_options = SqliteConnectOptions::from_str(url)
            .map_err(|e| ProviderError::Unavailable(format!("invalid database url: {e}")))?
            .read_only(options.read_only);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .test_before_acquire(true)
            .max_lifetime(Duration::from_secs(options.recycle_secs.max(1)))
            .connect_with(connect_options)
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        tracing::info!("Connected to SQLite database ({})", url);
        Ok(Self { pool })
    }

    /// 复用已有连接池（测试或宿主程序自行管理池时）
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn map_query_error(err: sqlx::Error) -> ProviderError {
    match err {
        sqlx::Error::Database(db) => ProviderError::QueryFailed(format!("Error: {}", db.message())),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            ProviderError::Unavailable(err.to_string())
        }
        other => ProviderError::QueryFailed(format!("Error: {other}")),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn truncate(s: &str) -> String {
    if s.chars().count() > MAX_VALUE_CHARS {
        format!("{}...", s.chars().take(MAX_VALUE_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

/// 按值的实际存储类型格式化单元格；NULL 输出为 None
fn format_value(row: &SqliteRow, idx: usize) -> String {
    let raw = match row.try_get_raw(idx) {
        Ok(raw) => raw,
        Err(_) => return "?".to_string(),
    };
    if raw.is_null() {
        return "None".to_string();
    }
    let type_name = raw.type_info().name().to_string();
    let formatted = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get_unchecked::<i64, _>(idx).map(|v| v.to_string()),
        "REAL" => row.try_get_unchecked::<f64, _>(idx).map(|v| v.to_string()),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(idx)
            .map(|v| format!("<{} bytes>", v.len())),
        _ => row
            .try_get_unchecked::<String, _>(idx)
            .map(|v| format!("'{}'", truncate(&v))),
    };
    formatted.unwrap_or_else(|_| "?".to_string())
}

fn format_tuple(row: &SqliteRow) -> String {
    let values: Vec<String> = (0..row.len()).map(|i| format_value(row, i)).collect();
    if values.len() == 1 {
        format!("({},)", values[0])
    } else {
        format!("({})", values.join(", "))
    }
}

#[async_trait]
impl SqlDatabase for SqliteDatabase {
    fn dialect(&self) -> &str {
        "SQLite"
    }

    async fn list_tables(&self) -> Result<String, ProviderError> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let names: Vec<String> = rows
            .iter()
            .filter_map(|r| r.try_get::<String, _>("name").ok())
            .collect();
        Ok(names.join(", "))
    }

    async fn get_schema(&self, table: &str) -> Result<String, ProviderError> {
        let row = sqlx::query(
            "SELECT name, sql FROM sqlite_master \
             WHERE type = 'table' AND name = ? COLLATE NOCASE",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ProviderError::Unavailable(e.to_string()))?
        .ok_or_else(|| ProviderError::UnknownTable(table.to_string()))?;

        let name: String = row
            .try_get("name")
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        let ddl: String = row.try_get("sql").unwrap_or_default();

        let samples = sqlx::query(&format!(
            "SELECT * FROM {} LIMIT {}",
            quote_ident(&name),
            SAMPLE_ROWS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_error)?;

        let mut out = format!("\n{}\n\n/*\n{} rows from {} table:\n", ddl.trim(), samples.len(), name);
        if let Some(first) = samples.first() {
            let header: Vec<&str> = first.columns().iter().map(|c| c.name()).collect();
            out.push_str(&header.join("\t"));
            out.push('\n');
        }
        for row in &samples {
            let cells: Vec<String> = (0..row.len())
                .map(|i| format_value(row, i).trim_matches('\'').to_string())
                .collect();
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
        out.push_str("*/");
        Ok(out)
    }

    async fn run_query(&self, sql: &str) -> Result<String, ProviderError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_error)?;

        if rows.is_empty() {
            return Err(ProviderError::QueryFailed(EMPTY_RESULT_ERROR.to_string()));
        }

        let tuples: Vec<String> = rows.iter().map(format_tuple).collect();
        Ok(format!("[{}]", tuples.join(", ")))
    }
}

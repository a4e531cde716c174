//! 能力提供方：数据库抽象、SQLite 实现与带超时/审计的执行器

pub mod database;
pub mod executor;
pub mod sqlite;

pub use database::{ProviderError, SqlDatabase};
pub use executor::ProviderExecutor;
pub use sqlite::{SqliteDatabase, EMPTY_RESULT_ERROR};

//! The SQL execution seam.
//!
//! The migrator never talks to a driver directly. Bookkeeping queries and
//! migration bodies both go through [`SqlExecutor`]; each migration runs
//! inside one [`SqlTransaction`] obtained from [`SqlExecutor::begin`].
//! [`crate::engine::AnyExecutor`] implements these traits over `sqlx`.

use async_trait::async_trait;

use crate::error::BoxError;

/// Dynamic value type for query bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

/// A shared database handle.
///
/// One executor is used concurrently by the installed-version reader and,
/// sequentially, by every migration transaction.
#[async_trait]
pub trait SqlExecutor: Send + Sync + 'static {
    /// Run a query returning a single boolean-ish cell (`true`/`false` or `1`/`0`).
    async fn fetch_flag(&self, sql: &str) -> Result<bool, BoxError>;

    /// Run a query returning zero or one row with one integer cell.
    async fn fetch_optional_int(&self, sql: &str) -> Result<Option<i64>, BoxError>;

    /// Execute a statement outside of any transaction.
    async fn execute(&self, sql: &str) -> Result<u64, BoxError>;

    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, BoxError>;
}

/// A transaction scoped to a single migration.
#[async_trait]
pub trait SqlTransaction: Send {
    /// Execute opaque SQL text, possibly several statements, without parameters.
    async fn execute_script(&mut self, sql: &str) -> Result<(), BoxError>;

    /// Execute one statement with bound parameters.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, BoxError>;

    async fn commit(self: Box<Self>) -> Result<(), BoxError>;

    async fn rollback(self: Box<Self>) -> Result<(), BoxError>;
}

//! In-memory executor for unit tests.
//!
//! Records every statement it sees, keeps bookkeeping rows in a vector and
//! only makes transactional writes visible on commit.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::BoxError;
use crate::executor::{SqlExecutor, SqlTransaction, SqlValue};

#[derive(Default)]
struct Inner {
    table_exists: bool,
    versions: Vec<i64>,
    log: Vec<String>,
    fail_on: Vec<String>,
    commits: usize,
    rollbacks: usize,
}

impl Inner {
    fn run(&mut self, sql: &str) -> Result<(), BoxError> {
        self.log.push(sql.to_string());
        if let Some(pattern) = self.fail_on.iter().find(|p| sql.contains(p.as_str())) {
            return Err(format!("mock failure on '{}'", pattern).into());
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockDb {
    inner: Arc<Mutex<Inner>>,
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// A database whose bookkeeping table already holds `versions`.
    pub fn with_versions(versions: &[i64]) -> Self {
        let db = Self::new();
        {
            let mut inner = db.inner.lock().unwrap();
            inner.table_exists = true;
            inner.versions = versions.to_vec();
        }
        db
    }

    /// Fail any statement containing `pattern`.
    pub fn fail_on(self, pattern: &str) -> Self {
        self.inner.lock().unwrap().fail_on.push(pattern.to_string());
        self
    }

    pub fn table_exists(&self) -> bool {
        self.inner.lock().unwrap().table_exists
    }

    pub fn versions(&self) -> Vec<i64> {
        self.inner.lock().unwrap().versions.clone()
    }

    pub fn log(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn commits(&self) -> usize {
        self.inner.lock().unwrap().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.lock().unwrap().rollbacks
    }

    /// Statements issued inside transactions, in order.
    pub fn scripts(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter(|s| {
                !s.starts_with("SELECT")
                    && !s.starts_with("CREATE TABLE migrations")
                    && !s.starts_with("INSERT INTO migrations")
                    && !s.starts_with("DELETE FROM migrations")
                    && s != "BEGIN"
                    && s != "COMMIT"
                    && s != "ROLLBACK"
            })
            .collect()
    }
}

#[async_trait]
impl SqlExecutor for MockDb {
    async fn fetch_flag(&self, sql: &str) -> Result<bool, BoxError> {
        let mut inner = self.inner.lock().unwrap();
        inner.run(sql)?;
        Ok(inner.table_exists)
    }

    async fn fetch_optional_int(&self, sql: &str) -> Result<Option<i64>, BoxError> {
        let mut inner = self.inner.lock().unwrap();
        inner.run(sql)?;
        Ok(inner.versions.iter().copied().max())
    }

    async fn execute(&self, sql: &str) -> Result<u64, BoxError> {
        let mut inner = self.inner.lock().unwrap();
        inner.run(sql)?;
        if sql.starts_with("CREATE TABLE") {
            inner.table_exists = true;
        }
        Ok(0)
    }

    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, BoxError> {
        self.inner.lock().unwrap().run("BEGIN")?;
        Ok(Box::new(MockTx {
            inner: self.inner.clone(),
            inserted: Vec::new(),
            deleted: Vec::new(),
        }))
    }
}

struct MockTx {
    inner: Arc<Mutex<Inner>>,
    inserted: Vec<i64>,
    deleted: Vec<i64>,
}

#[async_trait]
impl SqlTransaction for MockTx {
    async fn execute_script(&mut self, sql: &str) -> Result<(), BoxError> {
        self.inner.lock().unwrap().run(sql)
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, BoxError> {
        self.inner.lock().unwrap().run(sql)?;
        let version = match params.first() {
            Some(SqlValue::Int(v)) => *v,
            _ => return Err("expected a version parameter".into()),
        };
        if sql.starts_with("INSERT") {
            self.inserted.push(version);
        } else if sql.starts_with("DELETE") {
            self.deleted.push(version);
        }
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<(), BoxError> {
        let mut inner = self.inner.lock().unwrap();
        inner.run("COMMIT")?;
        inner.commits += 1;
        inner.versions.extend(&self.inserted);
        inner.versions.retain(|v| !self.deleted.contains(v));
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BoxError> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push("ROLLBACK".to_string());
        inner.rollbacks += 1;
        Ok(())
    }
}

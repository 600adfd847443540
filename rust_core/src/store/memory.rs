//! In-process table store.

use super::{Result, StoreError, TableStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Tables held in memory, with call counters and injectable insert
/// failures for exercising the publisher.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    /// Insert call indexes (0-based, per store) that fail
    failing_inserts: Mutex<HashSet<usize>>,
    fail_deletes: Mutex<bool>,
    delete_calls: AtomicUsize,
    insert_calls: AtomicUsize,
    select_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables.lock().insert(table.to_string(), rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    /// Make the `call`-th insert (0-based) fail with a permanent error.
    pub fn fail_insert_call(&self, call: usize) {
        self.failing_inserts.lock().insert(call);
    }

    pub fn fail_deletes(&self, fail: bool) {
        *self.fail_deletes.lock() = fail;
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    /// Any mutation was attempted.
    pub fn was_written(&self) -> bool {
        self.delete_calls() + self.insert_calls() > 0
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn select_all(&self, table: &str) -> Result<Vec<Value>> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows(table))
    }

    async fn delete_all(&self, table: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_deletes.lock() {
            return Err(StoreError::Api {
                status: 401,
                message: "delete rejected".to_string(),
            });
        }
        self.tables.lock().remove(table);
        Ok(())
    }

    async fn insert_batch(&self, table: &str, rows: &[Value]) -> Result<usize> {
        let call = self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_inserts.lock().contains(&call) {
            return Err(StoreError::Api {
                status: 400,
                message: format!("insert call {call} rejected"),
            });
        }
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows.len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

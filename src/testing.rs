//! Test doubles shared across modules.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::data::memory::MemoryTables;
use crate::data::{DataError, DataResult, Filter, Query, Row, TableService};

/// In-memory tables that count remote calls and can be switched offline.
pub(crate) struct RecordingTables {
    inner: MemoryTables,
    calls: AtomicUsize,
    offline: AtomicBool,
    /// Calls left before going offline; `usize::MAX` means unlimited.
    allowance: AtomicUsize,
}

impl RecordingTables {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryTables::marketplace(),
            calls: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            allowance: AtomicUsize::new(usize::MAX),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Let the next `calls` calls through, then fail every call after them.
    pub(crate) fn fail_after(&self, calls: usize) {
        self.allowance.store(calls, Ordering::SeqCst);
    }

    fn enter(&self) -> DataResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let allowed = self
            .allowance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if !allowed || self.offline.load(Ordering::SeqCst) {
            return Err(DataError::Remote { message: "network request failed".into(), code: None });
        }
        Ok(())
    }
}

#[async_trait]
impl TableService for RecordingTables {
    async fn select(&self, table: &str, query: &Query) -> DataResult<Vec<Row>> {
        self.enter()?;
        self.inner.select(table, query).await
    }

    async fn insert(&self, table: &str, row: Row) -> DataResult<Row> {
        self.enter()?;
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> DataResult<Vec<Row>> {
        self.enter()?;
        self.inner.update(table, patch, filters).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> DataResult<u64> {
        self.enter()?;
        self.inner.delete(table, filters).await
    }

    async fn insert_exclusive(&self, table: &str, scope: &Filter, flag: &str, row: Row) -> DataResult<Row> {
        self.enter()?;
        self.inner.insert_exclusive(table, scope, flag, row).await
    }

    async fn set_exclusive(&self, table: &str, scope: &Filter, flag: &str, id: &Value) -> DataResult<()> {
        self.enter()?;
        self.inner.set_exclusive(table, scope, flag, id).await
    }

    async fn record_visit(
        &self,
        table: &str,
        key: &[Filter],
        counter: &str,
        touched: &str,
        row: Row,
    ) -> DataResult<Row> {
        self.enter()?;
        self.inner.record_visit(table, key, counter, touched, row).await
    }
}

/// In-memory tables exposing only the four basic calls, so the conditional
/// writes run through the trait's default sequences as they do over REST.
pub(crate) struct BasicTables(MemoryTables);

impl BasicTables {
    pub(crate) fn new() -> Self {
        Self(MemoryTables::marketplace())
    }
}

#[async_trait]
impl TableService for BasicTables {
    async fn select(&self, table: &str, query: &Query) -> DataResult<Vec<Row>> {
        self.0.select(table, query).await
    }

    async fn insert(&self, table: &str, row: Row) -> DataResult<Row> {
        self.0.insert(table, row).await
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> DataResult<Vec<Row>> {
        self.0.update(table, patch, filters).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> DataResult<u64> {
        self.0.delete(table, filters).await
    }
}

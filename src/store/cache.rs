//! Cached listing plus the loading/error flags callers render from.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;

use super::Scope;
use crate::Result;

/// Point-in-time view of a store.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
}

struct State<T> {
    items: Vec<T>,
    error: Option<String>,
    scope: Option<Scope>,
}

pub(crate) struct Cache<T> {
    state: RwLock<State<T>>,
    in_flight: AtomicUsize,
}

/// Keeps the loading flag raised until dropped.
pub(crate) struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T: Clone> Cache<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(State { items: Vec::new(), error: None, scope: None }),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn begin(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlight(&self.in_flight)
    }

    /// Run a remote step with the loading flag raised, recording its outcome.
    pub(crate) async fn track<R>(&self, table: &'static str, step: impl Future<Output = Result<R>>) -> Result<R> {
        let _loading = self.begin();
        match step.await {
            Ok(value) => {
                self.clear_error().await;
                Ok(value)
            }
            Err(e) => {
                warn!(table, error = %e, "remote call failed");
                self.record_error(e.to_string()).await;
                Err(e)
            }
        }
    }

    pub(crate) fn loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }

    pub(crate) async fn items(&self) -> Vec<T> {
        self.state.read().await.items.clone()
    }

    pub(crate) async fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.state.read().await.items.iter().find(|item| predicate(item)).cloned()
    }

    pub(crate) async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub(crate) async fn scope(&self) -> Option<Scope> {
        self.state.read().await.scope
    }

    pub(crate) async fn snapshot(&self) -> Snapshot<T> {
        let state = self.state.read().await;
        Snapshot { items: state.items.clone(), loading: self.loading(), error: state.error.clone() }
    }

    /// Install a fresh listing; clears the error.
    pub(crate) async fn replace(&self, scope: Scope, items: Vec<T>) {
        let mut state = self.state.write().await;
        state.items = items;
        state.scope = Some(scope);
        state.error = None;
    }

    pub(crate) async fn retain(&self, keep: impl Fn(&T) -> bool) {
        self.state.write().await.items.retain(|item| keep(item));
    }

    pub(crate) async fn record_error(&self, message: String) {
        self.state.write().await.error = Some(message);
    }

    pub(crate) async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    pub(crate) async fn reset(&self) {
        let mut state = self.state.write().await;
        state.items.clear();
        state.error = None;
        state.scope = None;
    }
}

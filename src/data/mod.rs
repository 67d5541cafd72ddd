//! External tabular data service.
//!
//! Every store talks to its backing table through [`TableService`]: filtered and
//! ordered selects, inserts, updates and deletes, exchanged as JSON rows. Three
//! backends ship with the crate:
//!
//! - [`memory::MemoryTables`] keeps tables in process (tests, local development)
//! - [`postgres::PgTables`] runs the operations against a Postgres pool
//! - [`rest::RestTables`] speaks to a PostgREST-style HTTP API
//!
//! The conditional-write primitives (`insert_exclusive`, `set_exclusive`,
//! `record_visit`) have sequential default implementations. Backends that can
//! execute them atomically override them.

pub mod auth;
pub mod memory;
pub mod postgres;
pub mod rest;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use auth::{AuthAdmin, AuthUser, AuthUserUpdate, NewAuthUser, Role};

/// A table row as exchanged with the data service.
pub type Row = Map<String, Value>;

/// Column predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::Eq(column.to_string(), value.into())
    }

    pub fn is_in<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Eq(column, _) | Self::In(column, _) => column,
        }
    }

    /// Whether `row` satisfies the predicate. Values compare by their text form,
    /// so a UUID filter matches the UUID string stored in the row.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(self.column()) else {
            return false;
        };
        match self {
            Self::Eq(_, expected) => text_of(actual) == text_of(expected),
            Self::In(_, candidates) => candidates.iter().any(|c| text_of(actual) == text_of(c)),
        }
    }
}

/// Text form of a scalar as used in filters (`"abc"` → `abc`, `true` → `true`).
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// Select parameters: filters, ordering and an optional limit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self { Self::default() }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order = Some(Order { column: column.to_string(), descending: true });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Error, Debug)]
pub enum DataError {
    /// Error reported by the remote service, passed through verbatim.
    #[error("{message}")]
    Remote { message: String, code: Option<String> },

    #[error("row not found")]
    NotFound,

    #[error("{0}")]
    Constraint(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("refusing to {0} without a filter")]
    MissingFilter(&'static str),

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl DataError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound => true,
            Self::Remote { code, .. } => code.as_deref() == Some(rest::NOT_FOUND_CODE),
            Self::Database(sqlx::Error::RowNotFound) => true,
            _ => false,
        }
    }

    pub fn is_constraint(&self) -> bool {
        match self {
            Self::Constraint(_) => true,
            Self::Database(sqlx::Error::Database(db)) => {
                db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation()
            }
            Self::Remote { code, .. } => code.as_deref().is_some_and(|c| c.starts_with("23")),
            _ => false,
        }
    }
}

pub type DataResult<T> = std::result::Result<T, DataError>;

#[async_trait]
pub trait TableService: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> DataResult<Vec<Row>>;

    /// Insert one row, returning it with server-generated fields filled in.
    async fn insert(&self, table: &str, row: Row) -> DataResult<Row>;

    /// Apply `patch` to every row matching `filters`, returning the updated rows.
    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> DataResult<Vec<Row>>;

    /// Delete every row matching `filters`, returning the number removed.
    async fn delete(&self, table: &str, filters: &[Filter]) -> DataResult<u64>;

    /// Clear `flag` on every row in `scope`, then insert `row`.
    async fn insert_exclusive(&self, table: &str, scope: &Filter, flag: &str, row: Row) -> DataResult<Row> {
        self.update(table, flag_patch(flag, false), std::slice::from_ref(scope)).await?;
        self.insert(table, row).await
    }

    /// Set `flag` on the row `id` and clear it on every other row in `scope`.
    async fn set_exclusive(&self, table: &str, scope: &Filter, flag: &str, id: &Value) -> DataResult<()> {
        self.update(table, flag_patch(flag, false), std::slice::from_ref(scope)).await?;
        let target = [scope.clone(), Filter::Eq("id".to_string(), id.clone())];
        let updated = self.update(table, flag_patch(flag, true), &target).await?;
        if updated.is_empty() {
            return Err(DataError::NotFound);
        }
        Ok(())
    }

    /// Bump `counter` and stamp `touched` on the row matching `key`, or insert `row`
    /// when none exists.
    async fn record_visit(
        &self,
        table: &str,
        key: &[Filter],
        counter: &str,
        touched: &str,
        row: Row,
    ) -> DataResult<Row> {
        let existing = self.select(table, &Query { filters: key.to_vec(), order: None, limit: Some(1) }).await?;
        match existing.into_iter().next() {
            Some(current) => {
                let count = current.get(counter).and_then(Value::as_i64).unwrap_or(0);
                let mut patch = Row::new();
                patch.insert(counter.to_string(), Value::from(count + 1));
                patch.insert(touched.to_string(), row.get(touched).cloned().unwrap_or(Value::Null));
                let id = current.get("id").cloned().unwrap_or(Value::Null);
                let updated = self.update(table, patch, &[Filter::Eq("id".to_string(), id)]).await?;
                updated.into_iter().next().ok_or(DataError::NotFound)
            }
            None => self.insert(table, row).await,
        }
    }
}

fn flag_patch(flag: &str, value: bool) -> Row {
    let mut patch = Row::new();
    patch.insert(flag.to_string(), Value::Bool(value));
    patch
}

/// Column and table names are interpolated into SQL and URLs; only plain
/// snake_case identifiers are allowed.
pub fn check_identifier(name: &str) -> DataResult<&str> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63;
    if valid { Ok(name) } else { Err(DataError::InvalidIdentifier(name.to_string())) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_matches_by_text_form() {
        let r = row(json!({"user_id": "7d3c", "is_default": true, "view_count": 2}));
        assert!(Filter::eq("user_id", "7d3c").matches(&r));
        assert!(Filter::eq("is_default", true).matches(&r));
        assert!(Filter::is_in("view_count", [1, 2]).matches(&r));
        assert!(!Filter::eq("missing", "x").matches(&r));
    }

    #[test]
    fn test_identifiers() {
        assert!(check_identifier("browsing_history").is_ok());
        assert!(check_identifier("users; drop table").is_err());
        assert!(check_identifier("Name").is_err());
        assert!(check_identifier("").is_err());
    }

    mod default_sequences {
        use std::sync::Arc;

        use uuid::Uuid;

        use super::*;
        use crate::domain::entities::{BrowsingHistoryItem, Entity, NewWallet, Wallet};
        use crate::store::{EntityStore, Scope};
        use crate::testing::BasicTables;

        fn wallet(user_id: Uuid, label: &str, is_default: bool) -> NewWallet {
            NewWallet {
                user_id,
                label: label.into(),
                currency: "USDT".into(),
                network: "TRC20".into(),
                wallet_address: "TQn9Y2khEsLJW1ChVWFMSMeRDow5KcbLSE".into(),
                is_default,
            }
        }

        fn tables() -> Arc<dyn TableService> {
            Arc::new(BasicTables::new())
        }

        #[tokio::test]
        async fn test_insert_exclusive_keeps_one_default() {
            let store = EntityStore::<Wallet>::new(tables());
            let user = Uuid::new_v4();
            let a = store.create(wallet(user, "Main", true)).await.unwrap();
            let b = store.create(wallet(user, "Savings", true)).await.unwrap();

            let items = store.items().await;
            assert_eq!(items.iter().filter(|w| w.is_default).count(), 1);
            assert!(!store.get(a.id).await.unwrap().is_default);
            assert!(store.get(b.id).await.unwrap().is_default);
        }

        #[tokio::test]
        async fn test_set_exclusive_moves_default() {
            let store = EntityStore::<Wallet>::new(tables());
            let user = Uuid::new_v4();
            let a = store.create(wallet(user, "Main", false)).await.unwrap();
            let b = store.create(wallet(user, "Savings", true)).await.unwrap();

            store.set_default(a.id).await.unwrap();
            assert!(store.get(a.id).await.unwrap().is_default);
            assert!(!store.get(b.id).await.unwrap().is_default);
        }

        #[tokio::test]
        async fn test_set_exclusive_outside_scope_is_not_found() {
            let tables = tables();
            let store = EntityStore::<Wallet>::new(tables.clone());
            let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
            let mine = store.create(wallet(me, "Main", false)).await.unwrap();

            let scope = Filter::eq("user_id", other.to_string());
            let err = tables
                .set_exclusive(Wallet::TABLE, &scope, "is_default", &Value::String(mine.id.to_string()))
                .await
                .unwrap_err();
            assert!(err.is_not_found());
            assert!(!store.fetch(Scope::Owner(me)).await.unwrap()[0].is_default);
        }

        #[tokio::test]
        async fn test_record_visit_bumps_existing_row() {
            let store = EntityStore::<BrowsingHistoryItem>::new(tables());
            let (user, product) = (Uuid::new_v4(), Uuid::new_v4());
            store.add_to_history(user, product).await.unwrap();
            let again = store.add_to_history(user, product).await.unwrap();

            assert_eq!(again.view_count, 2);
            let items = store.items().await;
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].view_count, 2);
        }
    }

    #[test]
    fn test_query_builder() {
        let q = Query::new().eq("user_id", "u1").order_desc("created_at").limit(5);
        assert_eq!(q.filters.len(), 1);
        assert_eq!(q.order, Some(Order { column: "created_at".into(), descending: true }));
        assert_eq!(q.limit, Some(5));
    }
}

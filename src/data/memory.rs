//! In-process data service.
//!
//! Tables are vectors of JSON rows behind one `RwLock`, so the conditional-write
//! primitives run atomically. Unique keys can be declared per table to mimic the
//! constraints of the Postgres schema.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::auth::{AuthAdmin, AuthUser, AuthUserUpdate, NewAuthUser};
use super::{text_of, DataError, DataResult, Filter, Query, Row, TableService};

#[derive(Default)]
pub struct MemoryTables {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    unique: HashMap<String, Vec<Vec<String>>>,
}

impl MemoryTables {
    pub fn new() -> Self { Self::default() }

    /// Tables pre-configured with the unique keys of the marketplace schema.
    pub fn marketplace() -> Self {
        Self::new()
            .with_unique("browsing_history", &["user_id", "product_id"])
            .with_unique("store_follows", &["user_id", "store_id"])
            .with_unique("stores", &["slug"])
    }

    pub fn with_unique(mut self, table: &str, columns: &[&str]) -> Self {
        self.unique
            .entry(table.to_string())
            .or_default()
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    fn check_unique(&self, table: &str, rows: &[Row], candidate: &Row, skip: Option<usize>) -> DataResult<()> {
        let id_key = vec!["id".to_string()];
        let keys = self.unique.get(table).into_iter().flatten().chain(std::iter::once(&id_key));
        for key in keys {
            let clash = rows.iter().enumerate().any(|(i, existing)| {
                Some(i) != skip
                    && key.iter().all(|col| match (existing.get(col), candidate.get(col)) {
                        (Some(a), Some(b)) => !a.is_null() && text_of(a) == text_of(b),
                        _ => false,
                    })
            });
            if clash {
                return Err(DataError::Constraint(format!(
                    "duplicate key value violates unique constraint \"{}_{}_key\"",
                    table,
                    key.join("_")
                )));
            }
        }
        Ok(())
    }

    fn insert_locked(&self, table: &str, rows: &mut Vec<Row>, mut row: Row) -> DataResult<Row> {
        let now = Value::String(timestamp());
        if row.get("id").map_or(true, Value::is_null) {
            row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        for column in ["created_at", "updated_at"] {
            if row.get(column).map_or(true, Value::is_null) {
                row.insert(column.to_string(), now.clone());
            }
        }
        self.check_unique(table, rows, &row, None)?;
        rows.push(row.clone());
        Ok(row)
    }

    fn update_locked(&self, table: &str, rows: &mut [Row], patch: &Row, filters: &[Filter]) -> DataResult<Vec<Row>> {
        if filters.is_empty() {
            return Err(DataError::MissingFilter("update"));
        }
        let mut updated = Vec::new();
        for i in 0..rows.len() {
            if !filters.iter().all(|f| f.matches(&rows[i])) {
                continue;
            }
            let mut candidate = rows[i].clone();
            for (column, value) in patch {
                candidate.insert(column.clone(), value.clone());
            }
            self.check_unique(table, rows, &candidate, Some(i))?;
            rows[i] = candidate.clone();
            updated.push(candidate);
        }
        Ok(updated)
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(v), None) if !v.is_null() => Ordering::Greater,
        (None, Some(v)) if !v.is_null() => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl TableService for MemoryTables {
    async fn select(&self, table: &str, query: &Query) -> DataResult<Vec<Row>> {
        let tables = self.tables.read().await;
        let rows = tables.get(table).map(Vec::as_slice).unwrap_or_default();
        let mut selected: Vec<Row> = rows
            .iter()
            .filter(|row| query.filters.iter().all(|f| f.matches(row)))
            .cloned()
            .collect();
        if let Some(order) = &query.order {
            if order.descending {
                // newest insert first among equal keys
                selected.reverse();
                selected.sort_by(|a, b| compare_values(b.get(&order.column), a.get(&order.column)));
            } else {
                selected.sort_by(|a, b| compare_values(a.get(&order.column), b.get(&order.column)));
            }
        }
        if let Some(limit) = query.limit {
            selected.truncate(limit);
        }
        Ok(selected)
    }

    async fn insert(&self, table: &str, row: Row) -> DataResult<Row> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        self.insert_locked(table, rows, row)
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> DataResult<Vec<Row>> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        self.update_locked(table, rows, &patch, filters)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> DataResult<u64> {
        if filters.is_empty() {
            return Err(DataError::MissingFilter("delete"));
        }
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !filters.iter().all(|f| f.matches(row)));
        Ok((before - rows.len()) as u64)
    }

    async fn insert_exclusive(&self, table: &str, scope: &Filter, flag: &str, mut row: Row) -> DataResult<Row> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        let mut staged = rows.clone();
        for existing in staged.iter_mut().filter(|r| scope.matches(r)) {
            existing.insert(flag.to_string(), Value::Bool(false));
        }
        row.insert(flag.to_string(), Value::Bool(true));
        let inserted = self.insert_locked(table, &mut staged, row)?;
        *rows = staged;
        Ok(inserted)
    }

    async fn set_exclusive(&self, table: &str, scope: &Filter, flag: &str, id: &Value) -> DataResult<()> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        let target = Filter::Eq("id".to_string(), id.clone());
        if !rows.iter().any(|r| scope.matches(r) && target.matches(r)) {
            return Err(DataError::NotFound);
        }
        let now = Value::String(timestamp());
        for row in rows.iter_mut().filter(|r| scope.matches(r)) {
            let flagged = target.matches(row);
            if row.get(flag) != Some(&Value::Bool(flagged)) {
                row.insert(flag.to_string(), Value::Bool(flagged));
                row.insert("updated_at".to_string(), now.clone());
            }
        }
        Ok(())
    }

    async fn record_visit(
        &self,
        table: &str,
        key: &[Filter],
        counter: &str,
        touched: &str,
        row: Row,
    ) -> DataResult<Row> {
        if key.is_empty() {
            return Err(DataError::MissingFilter("record a visit"));
        }
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        if let Some(existing) = rows.iter_mut().find(|r| key.iter().all(|f| f.matches(r))) {
            let count = existing.get(counter).and_then(Value::as_i64).unwrap_or(0);
            existing.insert(counter.to_string(), Value::from(count + 1));
            let stamp = row.get(touched).cloned().unwrap_or_else(|| Value::String(timestamp()));
            existing.insert(touched.to_string(), stamp);
            return Ok(existing.clone());
        }
        self.insert_locked(table, rows, row)
    }
}

/// In-process auth accounts.
#[derive(Default)]
pub struct MemoryAuth {
    users: RwLock<HashMap<Uuid, (AuthUser, String)>>,
}

impl MemoryAuth {
    pub fn new() -> Self { Self::default() }

    pub async fn get(&self, id: Uuid) -> Option<AuthUser> {
        self.users.read().await.get(&id).map(|(user, _)| user.clone())
    }

    pub async fn len(&self) -> usize { self.users.read().await.len() }

    pub async fn is_empty(&self) -> bool { self.users.read().await.is_empty() }
}

#[async_trait]
impl AuthAdmin for MemoryAuth {
    async fn create_user(&self, user: NewAuthUser) -> DataResult<AuthUser> {
        let mut users = self.users.write().await;
        let email = user.email.to_lowercase();
        if users.values().any(|(u, _)| u.email == email) {
            return Err(DataError::Constraint("a user with this email address has already been registered".into()));
        }
        let created = AuthUser {
            id: Uuid::new_v4(),
            email,
            role: user.role,
            metadata: user.metadata,
            created_at: Utc::now(),
        };
        users.insert(created.id, (created.clone(), user.password));
        Ok(created)
    }

    async fn update_user(&self, id: Uuid, update: AuthUserUpdate) -> DataResult<AuthUser> {
        let mut users = self.users.write().await;
        let (user, password) = users.get_mut(&id).ok_or(DataError::NotFound)?;
        if let Some(email) = update.email { user.email = email.to_lowercase(); }
        if let Some(new_password) = update.password { *password = new_password; }
        if let Some(role) = update.role { user.role = role; }
        if let Some(metadata) = update.metadata { user.metadata = metadata; }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> DataResult<()> {
        self.users.write().await.remove(&id).map(|_| ()).ok_or(DataError::NotFound)
    }
}

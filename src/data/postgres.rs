//! Postgres-backed data service.
//!
//! Rows travel as `jsonb`: selects return `to_jsonb(t)`, writes feed the row
//! through `jsonb_populate_record` so Postgres performs the column casts. Only
//! the columns present in a payload are written, leaving table defaults (ids,
//! timestamps) to the database.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row as SqlRow};

use super::{check_identifier, text_of, DataError, DataResult, Filter, Query, Row, TableService};

#[derive(Clone)]
pub struct PgTables {
    pool: PgPool,
}

impl PgTables {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn quoted(name: &str) -> DataResult<String> {
    Ok(format!("\"{}\"", check_identifier(name)?))
}

fn column_list(row: &Row) -> DataResult<String> {
    let columns = row.keys().map(|k| quoted(k)).collect::<DataResult<Vec<_>>>()?;
    Ok(columns.join(", "))
}

fn push_filters(qb: &mut QueryBuilder<'static, Postgres>, filters: &[Filter]) -> DataResult<()> {
    for (i, filter) in filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        match filter {
            Filter::Eq(column, value) => {
                qb.push(quoted(column)?).push("::text = ").push_bind(text_of(value));
            }
            Filter::In(column, values) => {
                let values: Vec<String> = values.iter().map(text_of).collect();
                qb.push(quoted(column)?).push("::text = ANY(").push_bind(values).push(")");
            }
        }
    }
    Ok(())
}

fn select_sql(table: &str, query: &Query) -> DataResult<QueryBuilder<'static, Postgres>> {
    let mut qb = QueryBuilder::new("SELECT to_jsonb(t) AS row FROM ");
    qb.push(quoted(table)?).push(" AS t");
    push_filters(&mut qb, &query.filters)?;
    if let Some(order) = &query.order {
        qb.push(" ORDER BY ").push(quoted(&order.column)?);
        qb.push(if order.descending { " DESC" } else { " ASC" });
    }
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    Ok(qb)
}

/// `INSERT … SELECT` from the JSON payload. `on_conflict` is appended verbatim
/// before `RETURNING`.
fn insert_sql(table: &str, row: &Row, on_conflict: Option<&str>) -> DataResult<QueryBuilder<'static, Postgres>> {
    let table = quoted(table)?;
    let mut qb = QueryBuilder::new("INSERT INTO ");
    qb.push(&table).push(" AS t");
    if row.is_empty() {
        qb.push(" DEFAULT VALUES");
    } else {
        let columns = column_list(row)?;
        qb.push(format!(" ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, "));
        qb.push_bind(Json(Value::Object(row.clone()))).push(")");
    }
    if let Some(clause) = on_conflict {
        qb.push(" ").push(clause);
    }
    qb.push(" RETURNING to_jsonb(t) AS row");
    Ok(qb)
}

fn update_sql(table: &str, patch: &Row, filters: &[Filter]) -> DataResult<QueryBuilder<'static, Postgres>> {
    if filters.is_empty() {
        return Err(DataError::MissingFilter("update"));
    }
    let table = quoted(table)?;
    let columns = column_list(patch)?;
    let mut qb = QueryBuilder::new("UPDATE ");
    qb.push(&table).push(" AS t SET (").push(&columns).push(") = (SELECT ").push(&columns);
    qb.push(format!(" FROM jsonb_populate_record(NULL::{table}, "));
    qb.push_bind(Json(Value::Object(patch.clone()))).push("))");
    push_filters(&mut qb, filters)?;
    qb.push(" RETURNING to_jsonb(t) AS row");
    Ok(qb)
}

fn delete_sql(table: &str, filters: &[Filter]) -> DataResult<QueryBuilder<'static, Postgres>> {
    if filters.is_empty() {
        return Err(DataError::MissingFilter("delete"));
    }
    let mut qb = QueryBuilder::new("DELETE FROM ");
    qb.push(quoted(table)?);
    push_filters(&mut qb, filters)?;
    Ok(qb)
}

fn decode(row: &sqlx::postgres::PgRow) -> DataResult<Row> {
    let Json(decoded): Json<Row> = row.try_get("row")?;
    Ok(decoded)
}

#[async_trait]
impl TableService for PgTables {
    #[tracing::instrument(skip(self, query), err)]
    async fn select(&self, table: &str, query: &Query) -> DataResult<Vec<Row>> {
        let rows = select_sql(table, query)?.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode).collect()
    }

    #[tracing::instrument(skip(self, row), err)]
    async fn insert(&self, table: &str, row: Row) -> DataResult<Row> {
        let inserted = insert_sql(table, &row, None)?.build().fetch_one(&self.pool).await?;
        decode(&inserted)
    }

    #[tracing::instrument(skip(self, patch, filters), err)]
    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> DataResult<Vec<Row>> {
        if patch.is_empty() {
            let query = Query { filters: filters.to_vec(), ..Query::default() };
            return self.select(table, &query).await;
        }
        let rows = update_sql(table, &patch, filters)?.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode).collect()
    }

    #[tracing::instrument(skip(self, filters), err)]
    async fn delete(&self, table: &str, filters: &[Filter]) -> DataResult<u64> {
        let done = delete_sql(table, filters)?.build().execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    #[tracing::instrument(skip(self, scope, row), err)]
    async fn insert_exclusive(&self, table: &str, scope: &Filter, flag: &str, mut row: Row) -> DataResult<Row> {
        let mut tx = self.pool.begin().await?;

        let mut clear = QueryBuilder::new("UPDATE ");
        clear.push(quoted(table)?).push(" SET ").push(quoted(flag)?).push(" = false");
        push_filters(&mut clear, std::slice::from_ref(scope))?;
        clear.build().execute(&mut *tx).await?;

        row.insert(flag.to_string(), Value::Bool(true));
        let inserted = insert_sql(table, &row, None)?.build().fetch_one(&mut *tx).await?;
        let inserted = decode(&inserted)?;

        tx.commit().await?;
        Ok(inserted)
    }

    #[tracing::instrument(skip(self, scope, id), err)]
    async fn set_exclusive(&self, table: &str, scope: &Filter, flag: &str, id: &Value) -> DataResult<()> {
        let flag = quoted(flag)?;
        let mut tx = self.pool.begin().await?;

        let mut qb = QueryBuilder::new("UPDATE ");
        qb.push(quoted(table)?).push(" SET ").push(&flag).push(" = (\"id\"::text = ");
        qb.push_bind(text_of(id)).push(")");
        push_filters(&mut qb, std::slice::from_ref(scope))?;
        qb.push(" RETURNING ").push(&flag);
        let flags = qb.build_query_scalar::<bool>().fetch_all(&mut *tx).await?;

        // dropping the transaction rolls the clear back
        if !flags.into_iter().any(|set| set) {
            return Err(DataError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, key, row), err)]
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
        let conflict = key.iter().map(|f| quoted(f.column())).collect::<DataResult<Vec<_>>>()?;
        let (counter, touched) = (quoted(counter)?, quoted(touched)?);
        let clause = format!(
            "ON CONFLICT ({}) DO UPDATE SET {counter} = t.{counter} + 1, {touched} = EXCLUDED.{touched}",
            conflict.join(", ")
        );
        let upserted = insert_sql(table, &row, Some(&clause))?.build().fetch_one(&self.pool).await?;
        decode(&upserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_select_sql() {
        let query = Query::new()
            .eq("user_id", "u1")
            .filter(Filter::is_in("status", ["active", "frozen"]))
            .order_desc("created_at")
            .limit(20);
        let qb = select_sql("wallets", &query).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT to_jsonb(t) AS row FROM \"wallets\" AS t WHERE \"user_id\"::text = $1 \
             AND \"status\"::text = ANY($2) ORDER BY \"created_at\" DESC LIMIT $3"
        );
    }

    #[test]
    fn test_insert_sql_lists_only_given_columns() {
        let qb = insert_sql("addresses", &row(json!({"city": "Abuja", "user_id": "u1"})), None).unwrap();
        assert_eq!(
            qb.sql(),
            "INSERT INTO \"addresses\" AS t (\"city\", \"user_id\") SELECT \"city\", \"user_id\" \
             FROM jsonb_populate_record(NULL::\"addresses\", $1) RETURNING to_jsonb(t) AS row"
        );
    }

    #[test]
    fn test_update_sql() {
        let qb = update_sql("notifications", &row(json!({"is_read": true})), &[Filter::eq("id", "n1")]).unwrap();
        assert_eq!(
            qb.sql(),
            "UPDATE \"notifications\" AS t SET (\"is_read\") = (SELECT \"is_read\" \
             FROM jsonb_populate_record(NULL::\"notifications\", $1)) WHERE \"id\"::text = $2 \
             RETURNING to_jsonb(t) AS row"
        );
    }

    #[test]
    fn test_rejects_unsafe_identifiers_and_unfiltered_writes() {
        assert!(matches!(select_sql("wallets; drop", &Query::new()), Err(DataError::InvalidIdentifier(_))));
        assert!(matches!(delete_sql("wallets", &[]), Err(DataError::MissingFilter(_))));
        assert!(matches!(update_sql("wallets", &Row::new(), &[]), Err(DataError::MissingFilter(_))));
    }
}

//! HTTP data service speaking PostgREST table syntax and the GoTrue admin API.
//!
//! Requests authenticate with the service key (`apikey` + bearer token). The
//! conditional-write primitives use the sequential defaults of
//! [`TableService`]; they are not atomic over HTTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::auth::{AuthAdmin, AuthUser, AuthUserUpdate, NewAuthUser, Role};
use super::{check_identifier, text_of, DataError, DataResult, Filter, Query, Row, TableService};

/// PostgREST code for "no rows" on a single-object request.
pub const NOT_FOUND_CODE: &str = "PGRST116";

#[derive(Clone)]
pub struct RestTables {
    client: reqwest::Client,
    base_url: String,
}

impl RestTables {
    pub fn new(base_url: &str, service_key: &str) -> DataResult<Self> {
        let key = HeaderValue::from_str(service_key)
            .map_err(|e| DataError::Config(format!("service key is not a valid header value: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .map_err(|e| DataError::Config(format!("service key is not a valid header value: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn table_url(&self, table: &str) -> DataResult<String> {
        Ok(format!("{}/rest/v1/{}", self.base_url, check_identifier(table)?))
    }

    fn users_url(&self) -> String {
        format!("{}/auth/v1/admin/users", self.base_url)
    }
}

/// PostgREST list literal: `("a","b")`.
fn list_literal(values: &[Value]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", text_of(v).replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("({})", quoted.join(","))
}

fn filter_params(filters: &[Filter]) -> DataResult<Vec<(String, String)>> {
    filters
        .iter()
        .map(|filter| {
            let column = check_identifier(filter.column())?.to_string();
            let predicate = match filter {
                Filter::Eq(_, value) => format!("eq.{}", text_of(value)),
                Filter::In(_, values) => format!("in.{}", list_literal(values)),
            };
            Ok((column, predicate))
        })
        .collect()
}

fn query_params(query: &Query) -> DataResult<Vec<(String, String)>> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filters)?);
    if let Some(order) = &query.order {
        let direction = if order.descending { "desc" } else { "asc" };
        params.push(("order".to_string(), format!("{}.{direction}", check_identifier(&order.column)?)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    Ok(params)
}

/// Turn a non-success response into a [`DataError`], keeping the service's message.
/// PostgREST reports `{message, code}`; GoTrue reports `{msg, error_code}`.
async fn error_from(response: Response) -> DataError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let message = ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| parsed.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("request failed ({status}): {body}"));
    let code = ["error_code", "code"]
        .iter()
        .find_map(|key| parsed.get(*key).filter(|v| !v.is_null()))
        .map(text_of);

    match (status, code.as_deref()) {
        (StatusCode::NOT_FOUND, _) | (_, Some(NOT_FOUND_CODE)) => DataError::Remote {
            message,
            code: Some(NOT_FOUND_CODE.to_string()),
        },
        (_, Some("email_exists")) | (StatusCode::CONFLICT, None) => DataError::Constraint(message),
        _ => DataError::Remote { message, code },
    }
}

async fn rows_from(response: Response) -> DataResult<Vec<Row>> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }
    Ok(response.json().await?)
}

#[async_trait]
impl TableService for RestTables {
    #[tracing::instrument(skip(self, query), err)]
    async fn select(&self, table: &str, query: &Query) -> DataResult<Vec<Row>> {
        let response = self.client.get(self.table_url(table)?).query(&query_params(query)?).send().await?;
        rows_from(response).await
    }

    #[tracing::instrument(skip(self, row), err)]
    async fn insert(&self, table: &str, row: Row) -> DataResult<Row> {
        let response = self
            .client
            .post(self.table_url(table)?)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        rows_from(response).await?.into_iter().next().ok_or(DataError::NotFound)
    }

    #[tracing::instrument(skip(self, patch, filters), err)]
    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> DataResult<Vec<Row>> {
        if filters.is_empty() {
            return Err(DataError::MissingFilter("update"));
        }
        let response = self
            .client
            .patch(self.table_url(table)?)
            .query(&filter_params(filters)?)
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        rows_from(response).await
    }

    #[tracing::instrument(skip(self, filters), err)]
    async fn delete(&self, table: &str, filters: &[Filter]) -> DataResult<u64> {
        if filters.is_empty() {
            return Err(DataError::MissingFilter("delete"));
        }
        let response = self
            .client
            .delete(self.table_url(table)?)
            .query(&filter_params(filters)?)
            .header("Prefer", "return=representation")
            .send()
            .await?;
        Ok(rows_from(response).await?.len() as u64)
    }
}

#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: Uuid,
    email: Option<String>,
    #[serde(default)]
    app_metadata: Value,
    #[serde(default)]
    user_metadata: Value,
    created_at: DateTime<Utc>,
}

impl From<RemoteUser> for AuthUser {
    fn from(user: RemoteUser) -> Self {
        let role = user
            .app_metadata
            .get("role")
            .cloned()
            .and_then(|r| serde_json::from_value::<Role>(r).ok())
            .unwrap_or_default();
        Self {
            id: user.id,
            email: user.email.unwrap_or_default(),
            role,
            metadata: user.user_metadata,
            created_at: user.created_at,
        }
    }
}

async fn user_from(response: Response) -> DataResult<AuthUser> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }
    let user: RemoteUser = response.json().await?;
    Ok(user.into())
}

fn update_body(update: &AuthUserUpdate) -> Value {
    let mut body = serde_json::Map::new();
    if let Some(email) = &update.email {
        body.insert("email".into(), json!(email));
    }
    if let Some(password) = &update.password {
        body.insert("password".into(), json!(password));
    }
    if let Some(role) = update.role {
        body.insert("app_metadata".into(), json!({ "role": role }));
    }
    if let Some(metadata) = &update.metadata {
        body.insert("user_metadata".into(), metadata.clone());
    }
    Value::Object(body)
}

#[async_trait]
impl AuthAdmin for RestTables {
    #[tracing::instrument(skip(self, user), fields(email = %user.email), err)]
    async fn create_user(&self, user: NewAuthUser) -> DataResult<AuthUser> {
        let body = json!({
            "email": user.email,
            "password": user.password,
            "email_confirm": true,
            "user_metadata": user.metadata,
            "app_metadata": { "role": user.role },
        });
        let response = self.client.post(self.users_url()).json(&body).send().await?;
        user_from(response).await
    }

    #[tracing::instrument(skip(self, update), err)]
    async fn update_user(&self, id: Uuid, update: AuthUserUpdate) -> DataResult<AuthUser> {
        let url = format!("{}/{id}", self.users_url());
        let response = self.client.put(url).json(&update_body(&update)).send().await?;
        user_from(response).await
    }

    #[tracing::instrument(skip(self), err)]
    async fn delete_user(&self, id: Uuid) -> DataResult<()> {
        let url = format!("{}/{id}", self.users_url());
        let response = self.client.delete(url).send().await?;
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_use_postgrest_syntax() {
        let query = Query::new()
            .eq("user_id", "6b1f")
            .filter(Filter::is_in("id", ["a", "b\"c"]))
            .order_desc("created_at")
            .limit(10);
        let params = query_params(&query).unwrap();
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("user_id".to_string(), "eq.6b1f".to_string()),
                ("id".to_string(), "in.(\"a\",\"b\\\"c\")".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_rejects_unsafe_columns() {
        let query = Query::new().eq("user_id&select=password", "x");
        assert!(matches!(query_params(&query), Err(DataError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_remote_user_role_from_app_metadata() {
        let remote: RemoteUser = serde_json::from_value(json!({
            "id": "5f0c7f0e-9d0b-4a57-9f35-0d1f6f8d2b11",
            "email": "shop@bizury.test",
            "app_metadata": { "provider": "email", "role": "merchant" },
            "user_metadata": { "full_name": "Tunde" },
            "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        let user = AuthUser::from(remote);
        assert_eq!(user.role, Role::Merchant);
        assert_eq!(user.metadata["full_name"], "Tunde");
    }

    #[test]
    fn test_update_body_only_carries_given_fields() {
        let body = update_body(&AuthUserUpdate { role: Some(Role::Admin), ..Default::default() });
        assert_eq!(body, json!({ "app_metadata": { "role": "admin" } }));
    }

    #[test]
    fn test_new_client_rejects_bad_key() {
        assert!(matches!(RestTables::new("http://localhost", "bad\nkey"), Err(DataError::Config(_))));
    }
}

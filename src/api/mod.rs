//! HTTP surface over the stores.
//!
//! Per-user routes run against that user's [`Session`]; admin routes use a
//! shared unfiltered store listing. Successful mutations are announced on NATS
//! when a client is configured.

pub mod error;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use crate::data::{AuthAdmin, AuthUser, AuthUserUpdate, NewAuthUser, TableService};
use crate::domain::entities::{
    Address, BrowsingHistoryItem, Entity, NewTransaction, Notification, Store, StoreFollow, StoreStatus, Transaction,
    TransactionPatch, Wallet,
};
use crate::domain::events::{ChangeAction, ChangeEvent};
use crate::domain::value_objects::Money;
use crate::onboarding::{MerchantApplication, OnboardedMerchant, Onboarding};
use crate::store::{EntityStore, Scope, Snapshot};
use crate::{Session, SessionRegistry};

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub admin_stores: Arc<EntityStore<Store>>,
    pub auth: Arc<dyn AuthAdmin>,
    pub onboarding: Arc<Onboarding>,
    pub nats: Option<async_nats::Client>,
}

impl AppState {
    pub fn new(tables: Arc<dyn TableService>, auth: Arc<dyn AuthAdmin>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::new(tables.clone(), data_dir)),
            admin_stores: Arc::new(EntityStore::new(tables.clone())),
            onboarding: Arc::new(Onboarding::new(auth.clone(), tables)),
            auth,
            nats: None,
        }
    }

    pub fn with_nats(mut self, client: async_nats::Client) -> Self {
        self.nats = Some(client);
        self
    }

    /// Best effort; a failed publish never fails the request.
    pub async fn publish(&self, event: ChangeEvent) {
        let Some(nats) = &self.nats else { return };
        match serde_json::to_vec(&event) {
            Ok(payload) => {
                if let Err(e) = nats.publish(event.subject(), payload.into()).await {
                    warn!(subject = %event.subject(), error = %e, "failed to publish change event");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode change event"),
        }
    }

    async fn announce(&self, table: &str, action: ChangeAction, ids: Vec<Uuid>, user_id: Option<Uuid>) {
        self.publish(ChangeEvent::new(table, action, ids, user_id)).await;
    }
}

/// Records served through the generic per-user CRUD routes.
pub trait SessionEntity: Entity {
    fn store(session: &Session) -> &EntityStore<Self>;
}

impl SessionEntity for Address {
    fn store(session: &Session) -> &EntityStore<Self> { &session.addresses }
}

impl SessionEntity for Wallet {
    fn store(session: &Session) -> &EntityStore<Self> { &session.wallets }
}

impl SessionEntity for Store {
    fn store(session: &Session) -> &EntityStore<Self> { &session.stores }
}

impl SessionEntity for Notification {
    fn store(session: &Session) -> &EntityStore<Self> { &session.notifications }
}

pub fn router(state: AppState) -> Router {
    let users = "/api/v1/users/:user_id";
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "bizury-marketplace"})) }))
        .route(&format!("{users}/addresses"), get(list::<Address>).post(create::<Address>))
        .route(&format!("{users}/addresses/:id"), patch(update::<Address>).delete(remove::<Address>))
        .route(&format!("{users}/addresses/:id/default"), post(set_default::<Address>))
        .route(&format!("{users}/wallets"), get(list::<Wallet>).post(create::<Wallet>))
        .route(&format!("{users}/wallets/bulk-delete"), post(bulk_delete_wallets))
        .route(&format!("{users}/wallets/:id"), patch(update::<Wallet>).delete(remove::<Wallet>))
        .route(&format!("{users}/wallets/:id/default"), post(set_default::<Wallet>))
        .route(&format!("{users}/stores"), get(list::<Store>).post(create::<Store>))
        .route(&format!("{users}/stores/:id"), patch(update::<Store>).delete(remove::<Store>))
        .route(&format!("{users}/notifications"), get(list::<Notification>).post(create::<Notification>))
        .route(&format!("{users}/notifications/read-all"), post(mark_all_read))
        .route(&format!("{users}/notifications/:id"), patch(update::<Notification>).delete(remove::<Notification>))
        .route(&format!("{users}/history"), get(list_history).post(view_product).delete(clear_history))
        .route(&format!("{users}/follows"), get(list_follows).post(follow_store))
        .route(&format!("{users}/follows/:store_id"), delete(unfollow_store))
        .route(&format!("{users}/transactions"), get(list_transactions).post(add_transaction))
        .route(&format!("{users}/transactions/balance"), get(transaction_balance))
        .route(&format!("{users}/transactions/:id"), patch(update_transaction).delete(remove_transaction))
        .route(&format!("{users}/sign-out"), post(sign_out))
        .route("/api/v1/admin/stores", get(admin_list_stores))
        .route("/api/v1/admin/stores/bulk-delete", post(admin_bulk_delete_stores))
        .route("/api/v1/admin/stores/:id/status", patch(admin_set_store_status))
        .route("/api/v1/admin/users", post(admin_create_user))
        .route("/api/v1/admin/users/:id", patch(admin_update_user).delete(admin_delete_user))
        .route("/api/v1/onboarding/merchants", post(onboard_merchant))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Fetch the listing unless the cache already covers `scope`.
async fn ensure_loaded<T: Entity>(store: &EntityStore<T>, scope: Scope) -> ApiResult<()> {
    if store.scope().await != Some(scope) {
        store.fetch(scope).await?;
    }
    Ok(())
}

// =============================================================================
// Per-user CRUD
// =============================================================================

async fn list<T: SessionEntity>(State(s): State<AppState>, Path(user_id): Path<Uuid>) -> ApiResult<Json<Snapshot<T>>> {
    let session = s.sessions.open(user_id).await?;
    let store = T::store(&session);
    store.fetch(Scope::Owner(user_id)).await?;
    Ok(Json(store.snapshot().await))
}

async fn create<T: SessionEntity>(
    State(s): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<T::New>,
) -> ApiResult<(StatusCode, Json<T>)> {
    if T::scope_of(&input) != user_id {
        return Err(ApiError::BadRequest(format!("{} must belong to user {user_id}", T::NAME)));
    }
    let session = s.sessions.open(user_id).await?;
    let created = T::store(&session).create(input).await?;
    s.announce(T::TABLE, ChangeAction::Created, vec![created.id()], Some(user_id)).await;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update<T: SessionEntity>(
    State(s): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<T::Patch>,
) -> ApiResult<Json<T>> {
    let session = s.sessions.open(user_id).await?;
    let store = T::store(&session);
    ensure_loaded(store, Scope::Owner(user_id)).await?;
    let updated = store.update(id, patch).await?;
    s.announce(T::TABLE, ChangeAction::Updated, vec![id], Some(user_id)).await;
    Ok(Json(updated))
}

async fn remove<T: SessionEntity>(State(s): State<AppState>, Path((user_id, id)): Path<(Uuid, Uuid)>) -> ApiResult<StatusCode> {
    let session = s.sessions.open(user_id).await?;
    let store = T::store(&session);
    ensure_loaded(store, Scope::Owner(user_id)).await?;
    store.delete(id).await?;
    s.announce(T::TABLE, ChangeAction::Deleted, vec![id], Some(user_id)).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_default<T: SessionEntity>(
    State(s): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Snapshot<T>>> {
    let session = s.sessions.open(user_id).await?;
    let store = T::store(&session);
    ensure_loaded(store, Scope::Owner(user_id)).await?;
    store.set_default(id).await?;
    s.announce(T::TABLE, ChangeAction::DefaultChanged, vec![id], Some(user_id)).await;
    Ok(Json(store.snapshot().await))
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
}

async fn bulk_delete_wallets(
    State(s): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(r): Json<BulkDeleteRequest>,
) -> ApiResult<Json<Snapshot<Wallet>>> {
    let session = s.sessions.open(user_id).await?;
    ensure_loaded(&session.wallets, Scope::Owner(user_id)).await?;
    session.wallets.delete_many(&r.ids).await?;
    s.announce(Wallet::TABLE, ChangeAction::Deleted, r.ids, Some(user_id)).await;
    Ok(Json(session.wallets.snapshot().await))
}

async fn mark_all_read(State(s): State<AppState>, Path(user_id): Path<Uuid>) -> ApiResult<Json<serde_json::Value>> {
    let session = s.sessions.open(user_id).await?;
    let updated = session.notifications.mark_all_read(user_id).await?;
    if updated > 0 {
        s.announce(Notification::TABLE, ChangeAction::Updated, Vec::new(), Some(user_id)).await;
    }
    Ok(Json(json!({"updated": updated, "unread": session.notifications.unread_count().await})))
}

// =============================================================================
// History and follows
// =============================================================================

async fn list_history(
    State(s): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Snapshot<BrowsingHistoryItem>>> {
    let session = s.sessions.open(user_id).await?;
    session.history.fetch(Scope::Owner(user_id)).await?;
    Ok(Json(session.history.snapshot().await))
}

#[derive(Debug, Deserialize)]
pub struct ViewRequest {
    pub product_id: Uuid,
}

async fn view_product(
    State(s): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(r): Json<ViewRequest>,
) -> ApiResult<Json<BrowsingHistoryItem>> {
    let session = s.sessions.open(user_id).await?;
    let item = session.history.add_to_history(user_id, r.product_id).await?;
    s.announce(BrowsingHistoryItem::TABLE, ChangeAction::Viewed, vec![item.id], Some(user_id)).await;
    Ok(Json(item))
}

async fn clear_history(State(s): State<AppState>, Path(user_id): Path<Uuid>) -> ApiResult<StatusCode> {
    let session = s.sessions.open(user_id).await?;
    session.history.clear_history(user_id).await?;
    s.announce(BrowsingHistoryItem::TABLE, ChangeAction::Deleted, Vec::new(), Some(user_id)).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_follows(State(s): State<AppState>, Path(user_id): Path<Uuid>) -> ApiResult<Json<Snapshot<Store>>> {
    let session = s.sessions.open(user_id).await?;
    session.follows.fetch(user_id).await?;
    Ok(Json(session.follows.snapshot().await))
}

#[derive(Debug, Deserialize)]
pub struct FollowRequest {
    pub store_id: Uuid,
}

async fn follow_store(
    State(s): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(r): Json<FollowRequest>,
) -> ApiResult<(StatusCode, Json<StoreFollow>)> {
    let session = s.sessions.open(user_id).await?;
    let follow = session.follows.follow(user_id, r.store_id).await?;
    s.announce(StoreFollow::TABLE, ChangeAction::Followed, vec![r.store_id], Some(user_id)).await;
    Ok((StatusCode::CREATED, Json(follow)))
}

async fn unfollow_store(State(s): State<AppState>, Path((user_id, store_id)): Path<(Uuid, Uuid)>) -> ApiResult<StatusCode> {
    let session = s.sessions.open(user_id).await?;
    if !session.follows.is_following(store_id).await {
        session.follows.fetch(user_id).await?;
    }
    session.follows.unfollow(user_id, store_id).await?;
    s.announce(StoreFollow::TABLE, ChangeAction::Unfollowed, vec![store_id], Some(user_id)).await;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Transactions
// =============================================================================

async fn list_transactions(State(s): State<AppState>, Path(user_id): Path<Uuid>) -> ApiResult<Json<Vec<Transaction>>> {
    let session = s.sessions.open(user_id).await?;
    Ok(Json(session.transactions.transactions().await))
}

async fn add_transaction(
    State(s): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<NewTransaction>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    if input.user_id != user_id {
        return Err(ApiError::BadRequest(format!("transaction must belong to user {user_id}")));
    }
    let session = s.sessions.open(user_id).await?;
    Ok((StatusCode::CREATED, Json(session.transactions.add_transaction(input).await?)))
}

async fn update_transaction(
    State(s): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<TransactionPatch>,
) -> ApiResult<Json<Transaction>> {
    let session = s.sessions.open(user_id).await?;
    Ok(Json(session.transactions.update_transaction(id, patch).await?))
}

async fn remove_transaction(State(s): State<AppState>, Path((user_id, id)): Path<(Uuid, Uuid)>) -> ApiResult<StatusCode> {
    let session = s.sessions.open(user_id).await?;
    session.transactions.remove_transaction(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct BalanceParams {
    pub currency: String,
}

async fn transaction_balance(
    State(s): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(p): Query<BalanceParams>,
) -> ApiResult<Json<Money>> {
    let session = s.sessions.open(user_id).await?;
    Ok(Json(session.transactions.balance(&p.currency).await?))
}

async fn sign_out(State(s): State<AppState>, Path(user_id): Path<Uuid>) -> StatusCode {
    s.sessions.sign_out(user_id).await;
    StatusCode::NO_CONTENT
}

// =============================================================================
// Admin
// =============================================================================

async fn admin_list_stores(State(s): State<AppState>) -> ApiResult<Json<Snapshot<Store>>> {
    s.admin_stores.fetch(Scope::All).await?;
    Ok(Json(s.admin_stores.snapshot().await))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: StoreStatus,
}

async fn admin_set_store_status(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<StatusRequest>,
) -> ApiResult<Json<Store>> {
    ensure_loaded(&s.admin_stores, Scope::All).await?;
    let store = s.admin_stores.set_status(id, r.status).await?;
    s.announce(Store::TABLE, ChangeAction::Updated, vec![id], None).await;
    Ok(Json(store))
}

async fn admin_bulk_delete_stores(
    State(s): State<AppState>,
    Json(r): Json<BulkDeleteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    s.admin_stores.fetch(Scope::All).await?;
    let removed = s.admin_stores.delete_many(&r.ids).await?;
    s.announce(Store::TABLE, ChangeAction::Deleted, r.ids, None).await;
    Ok(Json(json!({"removed": removed})))
}

async fn admin_create_user(
    State(s): State<AppState>,
    Json(r): Json<NewAuthUser>,
) -> ApiResult<(StatusCode, Json<AuthUser>)> {
    r.validate()?;
    Ok((StatusCode::CREATED, Json(s.auth.create_user(r).await?)))
}

async fn admin_update_user(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<AuthUserUpdate>,
) -> ApiResult<Json<AuthUser>> {
    r.validate()?;
    Ok(Json(s.auth.update_user(id, r).await?))
}

async fn admin_delete_user(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.auth.delete_user(id).await?;
    s.sessions.sign_out(id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn onboard_merchant(
    State(s): State<AppState>,
    Json(r): Json<MerchantApplication>,
) -> ApiResult<(StatusCode, Json<OnboardedMerchant>)> {
    let done = s.onboarding.onboard_merchant(r).await?;
    s.announce(Store::TABLE, ChangeAction::Created, vec![done.store.id], Some(done.user.id)).await;
    Ok((StatusCode::CREATED, Json(done)))
}

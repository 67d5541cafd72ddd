//! Bizury Marketplace - storefront and merchant dashboard data service

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bizury_marketplace::api::{self, AppState};
use bizury_marketplace::config::{Backend, Settings};
use bizury_marketplace::data::memory::{MemoryAuth, MemoryTables};
use bizury_marketplace::data::postgres::PgTables;
use bizury_marketplace::data::rest::RestTables;
use bizury_marketplace::data::{AuthAdmin, TableService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    tracing::debug!(?settings, "configuration loaded");

    let rest = match &settings.rest {
        Some(r) => Some(Arc::new(RestTables::new(&r.base_url, &r.service_key)?)),
        None => None,
    };

    let tables: Arc<dyn TableService> = match settings.backend {
        Backend::Memory => Arc::new(MemoryTables::marketplace()),
        Backend::Postgres => {
            let url = settings.database_url.as_deref().context("DATABASE_URL not set")?;
            let db = PgTables::connect(url).await?;
            db.migrate().await?;
            Arc::new(db)
        }
        Backend::Rest => rest.clone().context("REST backend not configured")?,
    };

    // account provisioning needs the hosted auth service; fall back to local accounts
    let auth: Arc<dyn AuthAdmin> = match rest {
        Some(rest) => rest,
        None => {
            tracing::warn!("no auth service configured, accounts are kept in memory");
            Arc::new(MemoryAuth::new())
        }
    };

    let mut state = AppState::new(tables, auth, &settings.data_dir);
    if let Some(url) = &settings.nats_url {
        match async_nats::connect(url.as_str()).await {
            Ok(client) => state = state.with_nats(client),
            Err(e) => tracing::warn!(error = %e, "NATS unavailable, change events disabled"),
        }
    }

    let sessions = state.sessions.clone();
    let idle = settings.session_idle;
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(idle.max(Duration::from_secs(60)) / 2);
        loop {
            tick.tick().await;
            sessions.evict_idle(idle).await;
        }
    });

    let app = api::router(state);
    let addr = settings.socket_addr();
    tracing::info!(backend = ?settings.backend, "Bizury Marketplace listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

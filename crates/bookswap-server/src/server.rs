// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Startup wiring: storage backend selection and the HTTP listener.

use std::sync::Arc;

use bookswap_core::{
    AuthError, CoreError, Identity, IdentityProvider, ImageStore, JwtIdentityProvider,
    Persistence, PostgresPersistence, SqlitePersistence, TracingNotifier,
};
use chrono::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::router::create_router;
use crate::state::AppState;

/// An in-memory SQLite database lives and dies with its connection, so a
/// pool over one must hold exactly one connection.
pub fn effective_max_connections(database_url: &str, requested: u32) -> u32 {
    let in_memory = database_url.starts_with("sqlite:")
        && (database_url.contains(":memory:") || database_url.contains("mode=memory"));
    if in_memory && requested != 1 {
        warn!(requested, "In-memory SQLite database, using a single connection");
        return 1;
    }
    requested
}

/// Open the backend named by the URL scheme and run its migrations.
pub async fn connect_persistence(
    database_url: &str,
    max_connections: u32,
) -> Result<Arc<dyn Persistence>, CoreError> {
    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        info!("Using PostgreSQL backend");
        Ok(Arc::new(
            PostgresPersistence::connect(database_url, max_connections).await?,
        ))
    } else if database_url.starts_with("sqlite:") {
        info!("Using SQLite backend");
        let max_connections = effective_max_connections(database_url, max_connections);
        Ok(Arc::new(
            SqlitePersistence::connect(database_url, max_connections).await?,
        ))
    } else {
        Err(CoreError::Configuration(format!(
            "unsupported database URL scheme: {}",
            database_url.split(':').next().unwrap_or_default()
        )))
    }
}

fn identity_provider(config: &Config) -> JwtIdentityProvider {
    JwtIdentityProvider::new(
        config.jwt_secret.as_bytes(),
        Duration::hours(config.token_ttl_hours),
    )
}

/// Mint an access token the server configured by `config` will accept.
pub fn issue_token(config: &Config, identity: Identity) -> Result<String, AuthError> {
    identity_provider(config).issue(identity)
}

/// Build the application state from configuration.
pub async fn build_state(config: &Config) -> Result<AppState, CoreError> {
    let persistence = connect_persistence(&config.database_url, config.db_max_connections).await?;
    let identity = Arc::new(identity_provider(config));

    Ok(AppState::new(
        persistence,
        identity,
        Arc::new(TracingNotifier),
        ImageStore::new(&config.images_dir),
    ))
}

/// Serve until ctrl-c.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    info!(addr = %config.http_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    info!("Bookswap server stopped");
    Ok(())
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared handler state.

use std::sync::Arc;

use bookswap_core::{
    IdentityProvider, ImageStore, LifecycleEngine, ModerationService, NotificationSender,
    Persistence,
};
use chrono::{DateTime, Utc};

/// State cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Persistence backend for reads.
    pub persistence: Arc<dyn Persistence>,
    /// Instance lifecycle engine.
    pub engine: Arc<LifecycleEngine>,
    /// Moderation workflow.
    pub moderation: Arc<ModerationService>,
    /// Access token decoder.
    pub identity: Arc<dyn IdentityProvider>,
    /// When the server started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire the services over the given collaborators.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn NotificationSender>,
        images: ImageStore,
    ) -> Self {
        let engine = Arc::new(LifecycleEngine::new(persistence.clone(), notifier, images));
        let moderation = Arc::new(ModerationService::new(persistence.clone()));

        Self {
            persistence,
            engine,
            moderation,
            identity,
            started_at: Utc::now(),
        }
    }
}

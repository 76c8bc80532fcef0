// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! API Router configuration

use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_cookies::CookieManagerLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let profile_routes = Router::new()
        .route(
            "/",
            get(handlers::profile_summary).patch(handlers::edit_profile),
        )
        .route("/add-book", post(handlers::add_book))
        .route("/records/{section}", get(handlers::list_records))
        .route("/return/{instance_id}", patch(handlers::return_instance))
        .route(
            "/{booking_id}",
            patch(handlers::confirm_pickup).delete(handlers::cancel_booking),
        );

    let admin_routes = Router::new()
        .route("/requests", get(handlers::list_requests))
        .route(
            "/requests/{request_id}",
            get(handlers::get_request).delete(handlers::reject_request),
        )
        .route(
            "/requests/{request_id}/approve",
            post(handlers::approve_request),
        )
        .route("/stats", get(handlers::stats))
        .route("/meta", get(handlers::meta));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/shelves", get(handlers::list_shelves))
        .route("/book/{book_id}", get(handlers::get_book))
        .route(
            "/book/{book_id}/booking/{instance_id}",
            post(handlers::reserve_instance),
        )
        .nest("/profile", profile_routes)
        .nest("/admin", admin_routes)
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Book page, reservations and the shelf listing.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use bookswap_core::catalog::{self, BookDetails};
use bookswap_core::pagination::Page;
use bookswap_core::persistence::{BookingRecord, ShelfRecord};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::auth::{CurrentUser, MaybeUser};
use crate::error::ApiResult;
use crate::state::AppState;

/// Book page, including the caller's booking when signed in.
pub async fn get_book(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(book_id): Path<i64>,
) -> ApiResult<Json<BookDetails>> {
    let details = catalog::book_details(
        state.persistence.as_ref(),
        book_id,
        viewer.map(|v| v.user_id),
    )
    .await?;
    Ok(Json(details))
}

/// Reservation response
#[derive(Debug, Serialize)]
pub struct ReserveResponse {
    pub status: &'static str,
    pub booking: BookingRecord,
}

/// Reserve a FREE copy of the book.
#[instrument(skip_all, fields(user_id = user.user_id))]
pub async fn reserve_instance(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((book_id, instance_id)): Path<(i64, i64)>,
) -> ApiResult<Json<ReserveResponse>> {
    let booking = state
        .engine
        .reserve(book_id, instance_id, user.user_id)
        .await?;
    Ok(Json(ReserveResponse {
        status: "ok",
        booking,
    }))
}

/// `GET /shelves` query
#[derive(Debug, Deserialize)]
pub struct ShelvesQuery {
    #[serde(default = "first_page")]
    pub page: i64,
    #[serde(default)]
    pub q: Option<String>,
}

fn first_page() -> i64 {
    1
}

/// Exchange points run by organisations, searchable by name or address.
pub async fn list_shelves(
    State(state): State<AppState>,
    Query(query): Query<ShelvesQuery>,
) -> ApiResult<Json<Page<ShelfRecord>>> {
    let page = catalog::shelves(state.persistence.as_ref(), query.q.as_deref(), query.page).await?;
    Ok(Json(page))
}

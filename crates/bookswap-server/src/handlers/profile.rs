// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Profile: overview, edits, submissions, records, pickups, cancellations and
//! returns.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use bookswap_core::catalog::{self, ProfileEntry, ProfileSection};
use bookswap_core::pagination::Page;
use bookswap_core::persistence::{
    InstanceRecord, ModerationRequestRecord, UserRecord, UserUpdate,
};
use bookswap_core::profile::{self, ProfileSummary};
use bookswap_core::{CoreError, Entity, Submission};
use serde::Deserialize;
use tracing::instrument;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Profile overview with the latest entries of each section.
pub async fn profile_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<ProfileSummary>> {
    match profile::summary(state.persistence.as_ref(), user.user_id).await {
        Ok(summary) => Ok(Json(summary)),
        // A valid token for a deleted account.
        Err(CoreError::NotFound {
            entity: Entity::User,
            ..
        }) => Err(ApiError::Unauthorized("unknown user".to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Body of `PATCH /profile`
#[derive(Debug, Deserialize)]
pub struct EditProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Change the caller's name, last name or email.
#[instrument(skip_all, fields(user_id = user.user_id))]
pub async fn edit_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<EditProfileRequest>,
) -> ApiResult<Json<UserRecord>> {
    let updated = profile::update(
        state.persistence.as_ref(),
        user.user_id,
        UserUpdate {
            name: body.name,
            lastname: body.lastname,
            email: body.email,
        },
    )
    .await?;
    Ok(Json(updated))
}

/// Body of `POST /profile/add-book`
#[derive(Debug, Deserialize)]
pub struct AddBookRequest {
    pub title: String,
    pub author_fullname: String,
    pub exchange_point_id: i64,
}

/// Submit a copy for moderation.
#[instrument(skip_all, fields(user_id = user.user_id))]
pub async fn add_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<AddBookRequest>,
) -> ApiResult<(StatusCode, Json<ModerationRequestRecord>)> {
    let record = state
        .moderation
        .submit(Submission {
            user_id: user.user_id,
            title: body.title,
            author_fullname: body.author_fullname,
            exchange_point_id: body.exchange_point_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `?page=` query
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "first_page")]
    pub page: i64,
}

fn first_page() -> i64 {
    1
}

/// One page of a profile section (`own`, `rent` or `booking`).
pub async fn list_records(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(section): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<ProfileEntry>>> {
    let section: ProfileSection = section.parse().map_err(ApiError::NotFound)?;
    let page =
        catalog::profile_records(state.persistence.as_ref(), user.user_id, section, query.page)
            .await?;
    Ok(Json(page))
}

/// Confirm pickup of a booked copy.
#[instrument(skip_all, fields(user_id = user.user_id))]
pub async fn confirm_pickup(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(booking_id): Path<i64>,
) -> ApiResult<Json<InstanceRecord>> {
    let instance = state
        .engine
        .confirm_pickup(booking_id, user.user_id)
        .await?;
    Ok(Json(instance))
}

/// Cancel a booking.
#[instrument(skip_all, fields(user_id = user.user_id))]
pub async fn cancel_booking(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(booking_id): Path<i64>,
) -> ApiResult<Json<InstanceRecord>> {
    let instance = state
        .engine
        .cancel_booking(booking_id, user.user_id)
        .await?;
    Ok(Json(instance))
}

/// Body of `PATCH /profile/return/{instance_id}`
#[derive(Debug, Deserialize)]
pub struct ReturnRequest {
    pub exchange_point_id: i64,
}

/// Drop a held copy off at an exchange point.
#[instrument(skip_all, fields(user_id = user.user_id))]
pub async fn return_instance(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(instance_id): Path<i64>,
    Json(body): Json<ReturnRequest>,
) -> ApiResult<Json<InstanceRecord>> {
    let instance = state
        .engine
        .return_instance(instance_id, user.user_id, body.exchange_point_id)
        .await?;
    Ok(Json(instance))
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Admin surface: moderation queue, statistics and schema metadata.
//!
//! Every handler takes [`AdminUser`] first so that callers without the admin
//! role get a 404 before the body is read.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use bookswap_core::pagination::Page;
use bookswap_core::persistence::{MaterializedInstance, ModerationRequestRecord};
use bookswap_core::schema::{ENTITIES, EntitySchema};
use bookswap_core::{ApprovalOverrides, ImageUpload};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::auth::AdminUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

/// `GET /admin/requests` query
#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
    #[serde(default)]
    pub q: Option<String>,
}

/// Moderation queue, newest first.
pub async fn list_requests(
    AdminUser(_): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<RequestListQuery>,
) -> ApiResult<Json<Page<ModerationRequestRecord>>> {
    let page = state
        .moderation
        .list(query.q.as_deref(), query.page, query.per_page)
        .await?;
    Ok(Json(page))
}

/// One moderation request.
pub async fn get_request(
    AdminUser(_): AdminUser,
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
) -> ApiResult<Json<ModerationRequestRecord>> {
    Ok(Json(state.moderation.get(request_id).await?))
}

/// Fields read from the approval form.
#[derive(Debug, Default)]
struct ApprovalForm {
    exchange_point_id: Option<i64>,
    overrides: ApprovalOverrides,
    image: Option<ImageUpload>,
}

fn parse_optional_int<T: std::str::FromStr>(field: &str, value: &str) -> ApiResult<Option<T>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| ApiError::Validation(format!("'{}' must be an integer", field)))
}

async fn read_approval_form(mut multipart: Multipart) -> ApiResult<ApprovalForm> {
    let mut form = ApprovalForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "image" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            if !filename.is_empty() && !bytes.is_empty() {
                form.image = Some(ImageUpload {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let o = &mut form.overrides;
        match name.as_str() {
            "exchange_point_id" => {
                form.exchange_point_id = parse_optional_int("exchange_point_id", &value)?
            }
            "title" => o.title = Some(value),
            "author_fullname" => o.author_fullname = Some(value),
            "author_country" => o.author_country = Some(value),
            "genre" => o.genre = Some(value),
            "year" => o.year = parse_optional_int("year", &value)?,
            "isbn" => o.isbn = Some(value),
            "description" => o.description = Some(value),
            _ => {}
        }
    }

    Ok(form)
}

/// Approve a request: multipart form with `exchange_point_id` and optional
/// overrides plus an optional `image` file.
#[instrument(skip_all, fields(request_id = request_id))]
pub async fn approve_request(
    AdminUser(_): AdminUser,
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
    multipart: Multipart,
) -> ApiResult<Json<MaterializedInstance>> {
    let form = read_approval_form(multipart).await?;
    let exchange_point_id = form
        .exchange_point_id
        .ok_or_else(|| ApiError::Validation("'exchange_point_id' is required".to_string()))?;

    let materialized = state
        .engine
        .materialize(request_id, exchange_point_id, form.overrides, form.image)
        .await?;
    Ok(Json(materialized))
}

/// Generic acknowledgement
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Reject (delete) a request.
#[instrument(skip_all, fields(request_id = request_id))]
pub async fn reject_request(
    AdminUser(_): AdminUser,
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
) -> ApiResult<Json<StatusResponse>> {
    state.moderation.reject(request_id).await?;
    Ok(Json(StatusResponse { status: "ok" }))
}

/// Dashboard totals
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub users: i64,
    pub instances: i64,
    pub organisations: i64,
    pub organisation_names: Vec<String>,
}

/// Totals shown on the admin dashboard.
pub async fn stats(
    AdminUser(_): AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<StatsResponse>> {
    let p = &state.persistence;
    Ok(Json(StatsResponse {
        users: p.count_users().await?,
        instances: p.count_instances().await?,
        organisations: p.count_organisations().await?,
        organisation_names: p.list_organisation_names().await?,
    }))
}

/// Entity schema registry.
pub async fn meta(AdminUser(_): AdminUser) -> Json<&'static [EntitySchema]> {
    Json(ENTITIES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_optional_int() {
        assert_eq!(parse_optional_int::<i32>("year", " 1965 ").unwrap(), Some(1965));
        assert_eq!(parse_optional_int::<i32>("year", "  ").unwrap(), None);
        assert!(parse_optional_int::<i32>("year", "sixties").is_err());
    }
}

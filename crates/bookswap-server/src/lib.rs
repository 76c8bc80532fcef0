// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bookswap Server - HTTP API
//!
//! Exposes the lifecycle engine and moderation workflow of `bookswap-core`
//! over HTTP.
//!
//! # Routes
//!
//! | Method | Path | Auth | Operation |
//! |--------|------|------|-----------|
//! | GET | `/health` | - | liveness |
//! | GET | `/book/{book_id}` | optional | book page |
//! | POST | `/book/{book_id}/booking/{instance_id}` | user | reserve |
//! | GET | `/shelves` | - | exchange points (`?q=`, `?page=`) |
//! | GET | `/profile` | user | overview |
//! | PATCH | `/profile` | user | edit name, last name, email |
//! | POST | `/profile/add-book` | user | submit for moderation |
//! | GET | `/profile/records/{section}` | user | `own` / `rent` / `booking` |
//! | PATCH | `/profile/{booking_id}` | user | confirm pickup |
//! | DELETE | `/profile/{booking_id}` | user | cancel booking |
//! | PATCH | `/profile/return/{instance_id}` | user | return |
//! | GET | `/admin/requests` | admin | moderation queue |
//! | GET | `/admin/requests/{id}` | admin | one request |
//! | POST | `/admin/requests/{id}/approve` | admin | approve (multipart) |
//! | DELETE | `/admin/requests/{id}` | admin | reject |
//! | GET | `/admin/stats` | admin | totals |
//! | GET | `/admin/meta` | admin | entity schema registry |
//!
//! Admin routes answer 404 to anyone who is not an admin.
//!
//! # Configuration
//!
//! | Variable | Default |
//! |----------|---------|
//! | `BOOKSWAP_DATABASE_URL` | required |
//! | `BOOKSWAP_JWT_SECRET` | required |
//! | `BOOKSWAP_HTTP_PORT` | `8000` |
//! | `BOOKSWAP_TOKEN_TTL_HOURS` | `24` |
//! | `BOOKSWAP_IMAGES_DIR` | `.data/imgs` |
//! | `BOOKSWAP_DB_MAX_CONNECTIONS` | `10` |

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::{ApiError, ApiResult};
pub use router::create_router;
pub use state::AppState;

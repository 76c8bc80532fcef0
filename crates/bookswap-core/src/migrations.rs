// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded schema for both backends.
//!
//! One migration set per backend, kept table-for-table identical:
//! `users`, `authors`, `books`, `organisations`, `exchange_points`,
//! `instances`, `bookings` and `moderation_requests`. The instance invariants
//! live in the schema as well: `status` is checked against FREE / BOOKED /
//! OWNED, `user_id` must be set exactly when the status is not FREE, and
//! `bookings.instance_id` is unique so a copy never has two bookings.
//!
//! [`crate::schema::ENTITIES`] mirrors these tables and is tested against the
//! SQLite set.

use sqlx::migrate::MigrateError;

/// Bookswap schema for PostgreSQL.
pub static POSTGRES: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgresql");

/// Bookswap schema for SQLite.
pub static SQLITE: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Bring a PostgreSQL database up to date. Applied versions are skipped.
pub async fn run_postgres(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    POSTGRES.run(pool).await
}

/// Bring a SQLite database up to date. Applied versions are skipped.
pub async fn run_sqlite(pool: &sqlx::SqlitePool) -> Result<(), MigrateError> {
    SQLITE.run(pool).await
}

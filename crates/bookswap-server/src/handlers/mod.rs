// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP handlers, one module per route group.

pub mod admin;
pub mod book;
pub mod health;
pub mod profile;

pub use admin::*;
pub use book::*;
pub use health::*;
pub use profile::*;

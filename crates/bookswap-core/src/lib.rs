// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bookswap Core - Instance Lifecycle Engine
//!
//! This crate holds the domain of the book-exchange marketplace: physical copies
//! ("instances") of books move between users through organisation-run exchange
//! points. It owns the instance state machine, the persistence layer it runs on,
//! and the moderation workflow that turns user submissions into new instances.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          bookswap-server                                 │
//! │               (axum router, auth extractors, config)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                         │                          │
//!           ▼                         ▼                          ▼
//! ┌───────────────────┐   ┌───────────────────────┐   ┌───────────────────┐
//! │  LifecycleEngine  │   │  ModerationService    │   │  catalog (reads)  │
//! │  reserve/pickup/  │   │  submit/reject/list   │   │  book page,       │
//! │  cancel/return/   │   │                       │   │  profile records  │
//! │  materialize      │   │                       │   │  shelves, profile │
//! └───────────────────┘   └───────────────────────┘   └───────────────────┘
//!           │       │                 │                          │
//!           │       └── NotificationSender, ImageStore           │
//!           ▼                                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │             Persistence (SQLite / PostgreSQL via sqlx)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Instance Lifecycle
//!
//! | Operation | Transition | Booking row |
//! |-----------|------------|-------------|
//! | `reserve` | FREE → BOOKED | created |
//! | `confirm_pickup` | BOOKED → OWNED | deleted |
//! | `cancel_booking` | BOOKED → FREE | deleted |
//! | `return_instance` | OWNED → FREE | - |
//! | `materialize` | (new) → FREE | - |
//!
//! `instances.user_id` is set exactly while the instance is BOOKED or OWNED. Each
//! transition is a conditional update (`... WHERE status = <source>`) in one
//! transaction, so two concurrent reservations of the same copy produce exactly
//! one booking; the loser gets [`CoreError::Conflict`].
//!
//! # Errors
//!
//! | Error | Code | Raised when |
//! |-------|------|-------------|
//! | `NotFound` | `NOT_FOUND` | instance, booking, book, exchange point or request missing |
//! | `Validation` | `VALIDATION_ERROR` | required text blank after trimming |
//! | `Conflict` | `CONFLICT` | instance not in the required state |
//! | `Forbidden` | `FORBIDDEN` | caller does not hold the booking |
//! | `Configuration` | `CONFIGURATION_ERROR` | collaborator misconfigured |
//! | `Storage` | `STORAGE_ERROR` | image write failed |
//! | `Database` | `DATABASE_ERROR` | query or migration failed |

#![warn(missing_docs)]

pub mod catalog;
pub mod error;
pub mod identity;
pub mod images;
pub mod lifecycle;
pub mod migrations;
pub mod moderation;
pub mod notify;
pub mod pagination;
pub mod persistence;
pub mod profile;
pub mod schema;
pub mod status;

pub use error::{CoreError, Entity, Result};
pub use identity::{AuthError, Identity, IdentityProvider, JwtIdentityProvider, Role};
pub use images::ImageStore;
pub use lifecycle::{ApprovalOverrides, ImageUpload, LifecycleEngine};
pub use moderation::{ModerationService, Submission};
pub use notify::{DisabledNotifier, Notification, NotificationSender, TracingNotifier};
pub use pagination::Page;
pub use persistence::{Persistence, PostgresPersistence, SqlitePersistence};
pub use status::{InstanceStatus, Transition};

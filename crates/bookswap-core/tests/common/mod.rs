// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for bookswap-core integration tests.
//!
//! Provides TestContext: an in-memory SQLite store with migrations applied, a
//! seeded catalog, and an engine wired to a recording notifier.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

use bookswap_core::persistence::{NewBook, NewUser};
use bookswap_core::{
    CoreError, ImageStore, LifecycleEngine, ModerationService, Notification, NotificationSender,
    Persistence, SqlitePersistence, migrations,
};

/// Captures every notification for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), CoreError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Ids created by [`TestContext::new`].
pub struct Seed {
    /// Supplies the seeded instance.
    pub owner: i64,
    pub reader: i64,
    pub other_reader: i64,
    /// Seventh user, used as a moderation submitter.
    pub submitter: i64,
    pub organisation: i64,
    pub point: i64,
    pub other_point: i64,
    pub author: i64,
    pub book: i64,
}

pub struct TestContext {
    pub persistence: Arc<SqlitePersistence>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: LifecycleEngine,
    pub moderation: ModerationService,
    pub seed: Seed,
    pub images_dir: TempDir,
}

impl TestContext {
    /// In-memory store, single connection.
    pub async fn new() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run migrations");
        Self::with_persistence(SqlitePersistence::new(pool)).await
    }

    /// File-backed store with several connections, for concurrency tests.
    pub async fn with_file(dir: &TempDir) -> Self {
        let persistence = SqlitePersistence::from_path(dir.path().join("bookswap.db"))
            .await
            .expect("Failed to open SQLite file");
        Self::with_persistence(persistence).await
    }

    async fn with_persistence(persistence: SqlitePersistence) -> Self {
        let persistence = Arc::new(persistence);
        let seed = seed(persistence.as_ref()).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let images_dir = tempfile::tempdir().expect("Failed to create image dir");

        let engine = LifecycleEngine::new(
            persistence.clone(),
            notifier.clone(),
            ImageStore::new(images_dir.path()),
        );
        let moderation = ModerationService::new(persistence.clone());

        Self {
            persistence,
            notifier,
            engine,
            moderation,
            seed,
            images_dir,
        }
    }

    /// A fresh FREE copy of the seeded book at the seeded point.
    pub async fn free_instance(&self) -> i64 {
        self.persistence
            .create_instance(self.seed.book, self.seed.owner, self.seed.point)
            .await
            .expect("Failed to create instance")
            .id
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.persistence.pool())
            .await
            .expect("Failed to count rows")
    }

    pub async fn bookings_for(&self, instance_id: i64) -> usize {
        self.persistence
            .list_bookings_by_instance(instance_id)
            .await
            .expect("Failed to list bookings")
            .len()
    }
}

async fn seed(p: &dyn Persistence) -> Seed {
    let mut users = Vec::new();
    for i in 1..=7 {
        let id = p
            .create_user(&NewUser {
                name: format!("User{}", i),
                lastname: "Test".to_string(),
                email: format!("user{}@example.com", i),
                hashed_password: "x".to_string(),
                role: "USER".to_string(),
            })
            .await
            .expect("Failed to create user");
        users.push(id);
    }

    let organisation = p
        .create_organisation("City Library", "Main st. 1", None)
        .await
        .expect("Failed to create organisation");
    let point = p
        .create_exchange_point(Some(organisation), "Main st. 1, hall", None)
        .await
        .expect("Failed to create exchange point");
    let other_point = p
        .create_exchange_point(None, "Park ave. 5", Some("Kiosk"))
        .await
        .expect("Failed to create exchange point");
    let author = p
        .create_author("Isaac Asimov", Some("USA"))
        .await
        .expect("Failed to create author");
    let book = p
        .create_book(&NewBook {
            author_id: author,
            title: "Foundation".to_string(),
            ..Default::default()
        })
        .await
        .expect("Failed to create book");

    Seed {
        owner: users[0],
        reader: users[1],
        other_reader: users[2],
        submitter: users[6],
        organisation,
        point,
        other_point,
        author,
        book,
    }
}

/// Helper macro to skip tests if TEST_DATABASE_URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for bookswap-server API tests.
//!
//! Builds the full router over an in-memory SQLite store and drives it
//! in-process with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::Duration;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use bookswap_core::persistence::{NewBook, NewUser};
use bookswap_core::{
    Identity, IdentityProvider, ImageStore, JwtIdentityProvider, Persistence, Role,
    SqlitePersistence, TracingNotifier,
};
use bookswap_server::{AppState, create_router};

pub const BOUNDARY: &str = "bookswap-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub persistence: Arc<dyn Persistence>,
    pub identity: Arc<JwtIdentityProvider>,
    pub images_dir: TempDir,
    pub owner: i64,
    pub reader: i64,
    pub other_reader: i64,
    pub admin: i64,
    pub point: i64,
    pub book: i64,
}

impl TestApp {
    pub async fn new() -> Self {
        let persistence: Arc<dyn Persistence> = Arc::new(
            SqlitePersistence::connect("sqlite::memory:", 1)
                .await
                .expect("Failed to open in-memory SQLite"),
        );
        let identity = Arc::new(JwtIdentityProvider::new(b"test-secret", Duration::hours(1)));
        let images_dir = tempfile::tempdir().expect("Failed to create image dir");

        let mut users = Vec::new();
        for (i, role) in ["USER", "USER", "USER", "ADMIN"].iter().enumerate() {
            users.push(
                persistence
                    .create_user(&NewUser {
                        name: format!("User{}", i),
                        lastname: "Test".to_string(),
                        email: format!("user{}@example.com", i),
                        hashed_password: "x".to_string(),
                        role: role.to_string(),
                    })
                    .await
                    .expect("Failed to create user"),
            );
        }
        let org = persistence
            .create_organisation("City Library", "Main st. 1", None)
            .await
            .expect("Failed to create organisation");
        let point = persistence
            .create_exchange_point(Some(org), "Main st. 1, hall", None)
            .await
            .expect("Failed to create exchange point");
        let author = persistence
            .create_author("Frank Herbert", None)
            .await
            .expect("Failed to create author");
        let book = persistence
            .create_book(&NewBook {
                author_id: author,
                title: "Dune".to_string(),
                ..Default::default()
            })
            .await
            .expect("Failed to create book");

        let state = AppState::new(
            persistence.clone(),
            identity.clone(),
            Arc::new(TracingNotifier),
            ImageStore::new(images_dir.path()),
        );

        Self {
            router: create_router(state),
            persistence,
            identity,
            images_dir,
            owner: users[0],
            reader: users[1],
            other_reader: users[2],
            admin: users[3],
            point,
            book,
        }
    }

    pub fn token(&self, user_id: i64, role: Role) -> String {
        self.identity
            .issue(Identity { user_id, role })
            .expect("Failed to issue token")
    }

    pub fn user_token(&self, user_id: i64) -> String {
        self.token(user_id, Role::User)
    }

    pub fn admin_token(&self) -> String {
        self.token(self.admin, Role::Admin)
    }

    pub async fn free_instance(&self) -> i64 {
        self.persistence
            .create_instance(self.book, self.owner, self.point)
            .await
            .expect("Failed to create instance")
            .id
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    /// Request with the token in a Bearer header and an optional JSON body.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");
        self.send(request).await
    }
}

/// Encode text fields and an optional file as multipart/form-data.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str, token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .expect("Failed to build request")
}

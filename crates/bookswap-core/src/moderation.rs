// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Moderation workflow: user submissions awaiting admin review.
//!
//! Approval lives on [`crate::lifecycle::LifecycleEngine::materialize`] because it
//! creates an instance; this module covers everything around it.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::{CoreError, Entity, Result};
use crate::pagination::Page;
use crate::persistence::{ModerationRequestRecord, NewModerationRequest, Persistence};

/// A listing submitted by a user.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Submitting user (becomes the instance owner on approval).
    pub user_id: i64,
    /// Free-text title.
    pub title: String,
    /// Free-text author name.
    pub author_fullname: String,
    /// Where the user will drop the copy off.
    pub exchange_point_id: i64,
}

/// Submit / reject / browse moderation requests.
pub struct ModerationService {
    persistence: Arc<dyn Persistence>,
}

impl ModerationService {
    /// Create a service over `persistence`.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    /// Record a new request.
    ///
    /// The organisation address of the chosen exchange point is copied onto the
    /// request and not refreshed later; an exchange point without an
    /// organisation yields an empty address.
    #[instrument(skip(self, submission), fields(user_id = submission.user_id))]
    pub async fn submit(&self, submission: Submission) -> Result<ModerationRequestRecord> {
        let title = submission.title.trim();
        if title.is_empty() {
            return Err(CoreError::validation("title", "must not be empty"));
        }
        let author = submission.author_fullname.trim();
        if author.is_empty() {
            return Err(CoreError::validation("author_fullname", "must not be empty"));
        }

        let point = self
            .persistence
            .get_exchange_point(submission.exchange_point_id)
            .await?
            .ok_or_else(|| {
                CoreError::not_found(Entity::ExchangePoint, submission.exchange_point_id)
            })?;

        let address = match point.organisation_id {
            Some(org_id) => self
                .persistence
                .get_organisation(org_id)
                .await?
                .map(|org| org.address)
                .unwrap_or_default(),
            None => String::new(),
        };

        let record = self
            .persistence
            .insert_moderation_request(&NewModerationRequest {
                owner_id: submission.user_id,
                title: title.to_string(),
                author: author.to_string(),
                address,
            })
            .await?;

        info!(request_id = record.id, "Moderation request submitted");
        Ok(record)
    }

    /// Delete a request without creating anything.
    #[instrument(skip(self))]
    pub async fn reject(&self, request_id: i64) -> Result<()> {
        if !self.persistence.delete_moderation_request(request_id).await? {
            return Err(CoreError::not_found(Entity::ModerationRequest, request_id));
        }
        info!("Moderation request rejected");
        Ok(())
    }

    /// Fetch one request.
    pub async fn get(&self, request_id: i64) -> Result<ModerationRequestRecord> {
        self.persistence
            .get_moderation_request(request_id)
            .await?
            .ok_or_else(|| CoreError::not_found(Entity::ModerationRequest, request_id))
    }

    /// Requests newest first, filtered by a case-insensitive substring of
    /// title, author or address.
    pub async fn list(
        &self,
        query: Option<&str>,
        page: i64,
        per_page: i64,
    ) -> Result<Page<ModerationRequestRecord>> {
        let mut requests = self.persistence.list_moderation_requests(None).await?;

        if let Some(needle) = query.map(str::trim).filter(|q| !q.is_empty()) {
            let needle = needle.to_lowercase();
            requests.retain(|r| {
                r.title.to_lowercase().contains(&needle)
                    || r.author.to_lowercase().contains(&needle)
                    || r.address.to_lowercase().contains(&needle)
            });
        }

        Ok(Page::paginate(requests, page, per_page))
    }
}

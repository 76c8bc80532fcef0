// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle engine.
//!
//! Every operation here is one state transition of a single instance (or, for
//! approvals, the creation of one). The guarded update runs inside the
//! persistence backend's transaction; this layer validates input, writes
//! uploaded images, logs the outcome and sends notifications.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::error::{CoreError, Entity, Result};
use crate::images::ImageStore;
use crate::notify::{Notification, NotificationSender};
use crate::persistence::{
    BookingRecord, InstanceRecord, Materialization, MaterializedInstance, Persistence,
};

/// An uploaded cover image.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Name of the file as sent by the client.
    pub filename: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Admin-supplied values applied when approving a moderation request.
///
/// Text values are trimmed; blank values count as absent.
#[derive(Debug, Clone, Default)]
pub struct ApprovalOverrides {
    /// Replaces the submitted title.
    pub title: Option<String>,
    /// Replaces the submitted author name.
    pub author_fullname: Option<String>,
    /// Country recorded for a newly created author.
    pub author_country: Option<String>,
    /// Genre merged into the book.
    pub genre: Option<String>,
    /// Publication year merged into the book.
    pub year: Option<i32>,
    /// ISBN merged into the book.
    pub isbn: Option<String>,
    /// Description merged into the book.
    pub description: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Drives instances through `FREE → BOOKED → OWNED → FREE`.
pub struct LifecycleEngine {
    /// Persistence implementation.
    pub persistence: Arc<dyn Persistence>,
    notifier: Arc<dyn NotificationSender>,
    images: ImageStore,
}

impl LifecycleEngine {
    /// Create an engine over the given collaborators.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        notifier: Arc<dyn NotificationSender>,
        images: ImageStore,
    ) -> Self {
        Self {
            persistence,
            notifier,
            images,
        }
    }

    /// Image store approvals write to.
    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.send(&notification).await {
            warn!(
                user_id = notification.user_id,
                error = %e,
                "Failed to send notification"
            );
        }
    }

    // ========================================================================
    // Reservations
    // ========================================================================

    /// Reserve a FREE instance of `book_id` for `user_id`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the instance does not exist or is a copy of another book
    /// - `Conflict` if the instance is not FREE
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        book_id: i64,
        instance_id: i64,
        user_id: i64,
    ) -> Result<BookingRecord> {
        let booking = match self
            .persistence
            .reserve_instance(instance_id, book_id, user_id)
            .await
        {
            Ok(booking) => booking,
            Err(e) => {
                debug!(error = %e, "Reservation rejected");
                return Err(e);
            }
        };

        info!(booking_id = booking.id, "Instance booked");

        match self.persistence.get_instance(instance_id).await {
            Ok(Some(instance)) => {
                self.notify(Notification {
                    user_id: instance.owner_id,
                    subject: "Your book was booked".to_string(),
                    body: format!(
                        "Instance #{} of book #{} was booked by user #{} (booking #{}).",
                        instance_id, book_id, user_id, booking.id
                    ),
                })
                .await;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to load instance for notification"),
        }

        Ok(booking)
    }

    /// The booking holder collected the copy: BOOKED → OWNED.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the booking does not exist
    /// - `Forbidden` if the booking belongs to another user
    /// - `Conflict` if the instance is no longer BOOKED
    #[instrument(skip(self))]
    pub async fn confirm_pickup(&self, booking_id: i64, user_id: i64) -> Result<InstanceRecord> {
        let instance = self.persistence.confirm_pickup(booking_id, user_id).await?;
        info!(instance_id = instance.id, "Instance picked up");
        Ok(instance)
    }

    /// The booking holder withdrew: BOOKED → FREE.
    ///
    /// A second call for the same booking fails with `NotFound`.
    #[instrument(skip(self))]
    pub async fn cancel_booking(&self, booking_id: i64, user_id: i64) -> Result<InstanceRecord> {
        let instance = self.persistence.cancel_booking(booking_id, user_id).await?;
        info!(instance_id = instance.id, "Booking cancelled");
        Ok(instance)
    }

    /// The holder dropped the copy off at `exchange_point_id`: OWNED → FREE.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the exchange point does not exist, or no instance with
    ///   this id is held by `user_id`
    /// - `Conflict` if the caller holds the instance but has not picked it up
    #[instrument(skip(self))]
    pub async fn return_instance(
        &self,
        instance_id: i64,
        user_id: i64,
        exchange_point_id: i64,
    ) -> Result<InstanceRecord> {
        let instance = self
            .persistence
            .return_instance(instance_id, user_id, exchange_point_id)
            .await?;
        info!("Instance returned");
        Ok(instance)
    }

    // ========================================================================
    // Moderation approval
    // ========================================================================

    /// Approve a moderation request, creating a FREE instance owned by the
    /// submitter at `exchange_point_id`.
    ///
    /// The author and book are found by exact name / title or created. When the
    /// book exists, non-blank overrides replace its fields; blank ones keep
    /// the stored value. The image, if any, is written before the database
    /// transaction and stays on disk if the transaction fails.
    #[instrument(skip(self, overrides, image))]
    pub async fn materialize(
        &self,
        request_id: i64,
        exchange_point_id: i64,
        overrides: ApprovalOverrides,
        image: Option<ImageUpload>,
    ) -> Result<MaterializedInstance> {
        // 1. Load the request to resolve effective title and author
        let request = self
            .persistence
            .get_moderation_request(request_id)
            .await?
            .ok_or_else(|| CoreError::not_found(Entity::ModerationRequest, request_id))?;

        let title = non_blank(overrides.title.as_deref())
            .unwrap_or_else(|| request.title.trim().to_string());
        if title.is_empty() {
            return Err(CoreError::validation("title", "must not be empty"));
        }

        let author_fullname = non_blank(overrides.author_fullname.as_deref())
            .unwrap_or_else(|| request.author.trim().to_string());
        if author_fullname.is_empty() {
            return Err(CoreError::validation("author_fullname", "must not be empty"));
        }

        // 2. Fail before touching the disk if the drop-off point is unknown
        if self
            .persistence
            .get_exchange_point(exchange_point_id)
            .await?
            .is_none()
        {
            return Err(CoreError::not_found(Entity::ExchangePoint, exchange_point_id));
        }

        // 3. Store the cover image (not transactional)
        let image_name = match image.filter(|img| !img.filename.is_empty()) {
            Some(upload) => Some(self.images.save(&upload.filename, &upload.bytes).await?),
            None => None,
        };

        // 4. Find-or-create author and book, insert the instance, drop the request
        let materialization = Materialization {
            exchange_point_id,
            title,
            author_fullname,
            author_country: non_blank(overrides.author_country.as_deref()),
            genre: non_blank(overrides.genre.as_deref()),
            year: overrides.year,
            isbn: non_blank(overrides.isbn.as_deref()),
            description: non_blank(overrides.description.as_deref()),
            image: image_name.clone(),
        };

        let materialized = match self
            .persistence
            .materialize_moderation_request(request_id, &materialization)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                if let Some(name) = &image_name {
                    warn!(image = %name, error = %e, "Approval failed; uploaded image left on disk");
                }
                return Err(e);
            }
        };

        info!(
            instance_id = materialized.instance.id,
            book_id = materialized.book_id,
            book_created = materialized.book_created,
            author_created = materialized.author_created,
            "Moderation request approved"
        );

        self.notify(Notification {
            user_id: request.owner_id,
            subject: "Your book was approved".to_string(),
            body: format!(
                "'{}' is now listed as instance #{}.",
                materialization.title, materialized.instance.id
            ),
        })
        .await;

        Ok(materialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  Dune ")), Some("Dune".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}

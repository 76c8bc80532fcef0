// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for bookswap-core.
//!
//! This module defines the persistence abstraction and backend implementations.
//! Every lifecycle method runs as a single transaction: the precondition check
//! and the state change commit or roll back together.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::{CoreError, Entity};
use crate::status::{InstanceStatus, Transition};

/// Registered user (without credentials).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRecord {
    /// Database primary key.
    pub id: i64,
    /// First name.
    pub name: String,
    /// Last name.
    pub lastname: String,
    /// Unique login email.
    pub email: String,
    /// `USER` or `ADMIN`.
    pub role: String,
    /// Whether the email address has been confirmed.
    pub email_verified: bool,
}

/// Profile fields a user may change. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    /// New first name.
    pub name: Option<String>,
    /// New last name.
    pub lastname: Option<String>,
    /// New login email.
    pub email: Option<String>,
}

/// Author record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuthorRecord {
    /// Database primary key.
    pub id: i64,
    /// Full name, used as the natural key when approving requests.
    pub fullname: String,
    /// Date of birth if known.
    pub birthday: Option<NaiveDate>,
    /// Country of origin if known.
    pub country: Option<String>,
}

/// Bibliographic record. Many instances may reference one book.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BookRecord {
    /// Database primary key.
    pub id: i64,
    /// Author of the book.
    pub author_id: i64,
    /// Title, used as the natural key when approving requests.
    pub title: String,
    /// Genre.
    pub genre: Option<String>,
    /// Publication year.
    pub year: Option<i32>,
    /// ISBN.
    pub isbn: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Cover image file name inside the image store.
    pub image: Option<String>,
}

/// Organisation running one or more exchange points.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrganisationRecord {
    /// Database primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Postal address.
    pub address: String,
    /// Free-form description.
    pub description: Option<String>,
}

/// Physical drop-off / pickup location.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExchangePointRecord {
    /// Database primary key.
    pub id: i64,
    /// Owning organisation.
    pub organisation_id: Option<i64>,
    /// Location address.
    pub address: String,
    /// Free-form description.
    pub description: Option<String>,
}

/// An exchange point listed together with its organisation.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ShelfRecord {
    /// Exchange point id.
    pub id: i64,
    /// Organisation name.
    pub name: String,
    /// Exchange point address.
    pub address: String,
    /// Point description, else the organisation's.
    pub description: Option<String>,
}

/// One physical copy of a book.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InstanceRecord {
    /// Database primary key.
    pub id: i64,
    /// The book this copy belongs to.
    pub book_id: i64,
    /// Current holder: the claimant while BOOKED, the borrower while OWNED.
    pub user_id: Option<i64>,
    /// User who supplied the copy. Never changes.
    pub owner_id: i64,
    /// Where the copy currently is.
    pub exchange_point_id: i64,
    /// Current status (FREE, BOOKED, OWNED).
    pub status: String,
    /// When the copy was listed.
    pub created_at: DateTime<Utc>,
}

impl InstanceRecord {
    /// Parsed status of this instance.
    pub fn status(&self) -> Result<InstanceStatus, CoreError> {
        self.status.parse().map_err(|e| CoreError::Database {
            operation: "decode_status".to_string(),
            details: format!("instance {}: {}", self.id, e),
        })
    }

    /// The claimant or borrower. `None` while FREE, whatever `user_id` says.
    pub fn holder(&self) -> Option<i64> {
        match self.status() {
            Ok(status) if status.has_holder() => self.user_id,
            _ => None,
        }
    }
}

/// A pending reservation of an instance.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BookingRecord {
    /// Database primary key.
    pub id: i64,
    /// The claimant.
    pub user_id: i64,
    /// The reserved copy.
    pub instance_id: i64,
    /// The book of the reserved copy.
    pub book_id: i64,
    /// When the reservation was made.
    pub created_at: DateTime<Utc>,
}

/// A user-submitted listing awaiting approval.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ModerationRequestRecord {
    /// Database primary key.
    pub id: i64,
    /// Submitter; becomes the owner of the materialized instance.
    pub owner_id: i64,
    /// Free-text title as submitted.
    pub title: String,
    /// Free-text author name as submitted.
    pub author: String,
    /// Organisation address captured at submission time.
    pub address: String,
    /// When the request was submitted.
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// First name.
    pub name: String,
    /// Last name.
    pub lastname: String,
    /// Unique login email.
    pub email: String,
    /// Password hash produced by the identity layer.
    pub hashed_password: String,
    /// `USER` or `ADMIN`.
    pub role: String,
}

/// Fields for inserting a book.
#[derive(Debug, Clone, Default)]
pub struct NewBook {
    /// Author of the book.
    pub author_id: i64,
    /// Title.
    pub title: String,
    /// Genre.
    pub genre: Option<String>,
    /// Publication year.
    pub year: Option<i32>,
    /// ISBN.
    pub isbn: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Cover image file name.
    pub image: Option<String>,
}

/// Fields for inserting a moderation request.
#[derive(Debug, Clone)]
pub struct NewModerationRequest {
    /// Submitter.
    pub owner_id: i64,
    /// Trimmed title.
    pub title: String,
    /// Trimmed author full name.
    pub author: String,
    /// Organisation address snapshot.
    pub address: String,
}

/// Resolved values used to turn a moderation request into a live instance.
///
/// `title` and `author_fullname` are already trimmed and non-empty. Every
/// optional field is `None` when the override was absent or blank; `None`
/// never clears an existing value.
#[derive(Debug, Clone, Default)]
pub struct Materialization {
    /// Where the new instance is placed.
    pub exchange_point_id: i64,
    /// Effective book title (find-or-create key).
    pub title: String,
    /// Effective author name (find-or-create key).
    pub author_fullname: String,
    /// Country for a newly created author.
    pub author_country: Option<String>,
    /// Genre override.
    pub genre: Option<String>,
    /// Year override.
    pub year: Option<i32>,
    /// ISBN override.
    pub isbn: Option<String>,
    /// Description override.
    pub description: Option<String>,
    /// Stored cover image name.
    pub image: Option<String>,
}

/// Outcome of a successful materialization.
#[derive(Debug, Clone, Serialize)]
pub struct MaterializedInstance {
    /// Author the book is attributed to.
    pub author_id: i64,
    /// Whether the author row was created by this approval.
    pub author_created: bool,
    /// Book the instance belongs to.
    pub book_id: i64,
    /// Whether the book row was created by this approval.
    pub book_created: bool,
    /// The new FREE instance.
    pub instance: InstanceRecord,
}

/// Persistence interface used by the lifecycle engine and moderation workflow.
#[allow(missing_docs)]
#[async_trait]
pub trait Persistence: Send + Sync {
    // ------------------------------------------------------------------
    // Seeding / administrative inserts
    // ------------------------------------------------------------------

    async fn create_user(&self, user: &NewUser) -> Result<i64, CoreError>;

    async fn create_organisation(
        &self,
        name: &str,
        address: &str,
        description: Option<&str>,
    ) -> Result<i64, CoreError>;

    async fn create_exchange_point(
        &self,
        organisation_id: Option<i64>,
        address: &str,
        description: Option<&str>,
    ) -> Result<i64, CoreError>;

    async fn create_author(&self, fullname: &str, country: Option<&str>) -> Result<i64, CoreError>;

    async fn create_book(&self, book: &NewBook) -> Result<i64, CoreError>;

    /// Insert a FREE instance.
    async fn create_instance(
        &self,
        book_id: i64,
        owner_id: i64,
        exchange_point_id: i64,
    ) -> Result<InstanceRecord, CoreError>;

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, CoreError>;

    /// Overwrite the fields set in `update`. `None` if the user does not
    /// exist; `Validation` on `email` if the address is taken.
    async fn update_user(
        &self,
        user_id: i64,
        update: &UserUpdate,
    ) -> Result<Option<UserRecord>, CoreError>;

    async fn get_author(&self, author_id: i64) -> Result<Option<AuthorRecord>, CoreError>;

    async fn find_author_by_fullname(
        &self,
        fullname: &str,
    ) -> Result<Option<AuthorRecord>, CoreError>;

    async fn get_book(&self, book_id: i64) -> Result<Option<BookRecord>, CoreError>;

    async fn get_organisation(
        &self,
        organisation_id: i64,
    ) -> Result<Option<OrganisationRecord>, CoreError>;

    async fn get_exchange_point(
        &self,
        exchange_point_id: i64,
    ) -> Result<Option<ExchangePointRecord>, CoreError>;

    async fn list_exchange_points(&self) -> Result<Vec<ExchangePointRecord>, CoreError>;

    /// Exchange points run by an organisation, by organisation name then
    /// address.
    async fn list_shelves(&self) -> Result<Vec<ShelfRecord>, CoreError>;

    async fn get_instance(&self, instance_id: i64) -> Result<Option<InstanceRecord>, CoreError>;

    /// FREE instances of a book, newest first.
    async fn list_free_instances(&self, book_id: i64) -> Result<Vec<InstanceRecord>, CoreError>;

    /// Instances supplied by a user, newest first.
    async fn list_instances_by_owner(
        &self,
        owner_id: i64,
    ) -> Result<Vec<InstanceRecord>, CoreError>;

    /// Instances a user has picked up and not yet returned (OWNED), newest
    /// first. Copies the user has only booked are not included.
    async fn list_rented_instances(
        &self,
        user_id: i64,
    ) -> Result<Vec<InstanceRecord>, CoreError>;

    async fn get_booking(&self, booking_id: i64) -> Result<Option<BookingRecord>, CoreError>;

    async fn find_booking(
        &self,
        user_id: i64,
        book_id: i64,
    ) -> Result<Option<BookingRecord>, CoreError>;

    async fn list_bookings_by_instance(
        &self,
        instance_id: i64,
    ) -> Result<Vec<BookingRecord>, CoreError>;

    /// Bookings of a user, newest first.
    async fn list_bookings_by_user(&self, user_id: i64) -> Result<Vec<BookingRecord>, CoreError>;

    async fn get_moderation_request(
        &self,
        request_id: i64,
    ) -> Result<Option<ModerationRequestRecord>, CoreError>;

    /// Moderation requests, newest first, optionally limited to one submitter.
    async fn list_moderation_requests(
        &self,
        owner_id: Option<i64>,
    ) -> Result<Vec<ModerationRequestRecord>, CoreError>;

    async fn count_users(&self) -> Result<i64, CoreError>;

    async fn count_instances(&self) -> Result<i64, CoreError>;

    async fn count_organisations(&self) -> Result<i64, CoreError>;

    /// Non-empty organisation names in ascending order.
    async fn list_organisation_names(&self) -> Result<Vec<String>, CoreError>;

    // ------------------------------------------------------------------
    // Lifecycle transitions (each one transaction)
    // ------------------------------------------------------------------

    /// FREE → BOOKED: claim the instance for `user_id` and insert the booking.
    ///
    /// `NotFound` if the instance does not exist or belongs to another book,
    /// `Conflict` if it is not FREE.
    async fn reserve_instance(
        &self,
        instance_id: i64,
        book_id: i64,
        user_id: i64,
    ) -> Result<BookingRecord, CoreError>;

    /// BOOKED → OWNED: hand the instance to the claimant and delete the booking.
    async fn confirm_pickup(
        &self,
        booking_id: i64,
        user_id: i64,
    ) -> Result<InstanceRecord, CoreError>;

    /// BOOKED → FREE: release the instance and delete the booking.
    async fn cancel_booking(
        &self,
        booking_id: i64,
        user_id: i64,
    ) -> Result<InstanceRecord, CoreError>;

    /// OWNED → FREE: drop the instance off at `exchange_point_id`.
    async fn return_instance(
        &self,
        instance_id: i64,
        user_id: i64,
        exchange_point_id: i64,
    ) -> Result<InstanceRecord, CoreError>;

    // ------------------------------------------------------------------
    // Moderation
    // ------------------------------------------------------------------

    async fn insert_moderation_request(
        &self,
        request: &NewModerationRequest,
    ) -> Result<ModerationRequestRecord, CoreError>;

    /// Returns false when the request did not exist.
    async fn delete_moderation_request(&self, request_id: i64) -> Result<bool, CoreError>;

    /// Consume a moderation request: find-or-create author and book, merge
    /// overrides into an existing book, insert a FREE instance owned by the
    /// submitter.
    async fn materialize_moderation_request(
        &self,
        request_id: i64,
        materialization: &Materialization,
    ) -> Result<MaterializedInstance, CoreError>;
}

/// Decide why a conditional transition update touched no rows.
///
/// `visible` is the instance as re-read inside the same transaction, or `None`
/// if it is missing or not the caller's to see (another book, another holder).
/// The re-read status is run through the state machine: a status that rejects
/// the transition is a conflict.
pub(crate) fn rejected_transition(
    instance_id: i64,
    transition: Transition,
    visible: Option<InstanceRecord>,
) -> CoreError {
    let Some(instance) = visible else {
        return CoreError::not_found(Entity::Instance, instance_id);
    };
    let status = match instance.status() {
        Ok(status) => status,
        Err(e) => return e,
    };
    match status.apply(transition) {
        None => CoreError::Conflict {
            instance_id,
            expected: transition.source().to_string(),
            actual: status.to_string(),
        },
        Some(_) => CoreError::Database {
            operation: "transition".to_string(),
            details: format!(
                "instance {} accepts {:?} from {} but was not updated",
                instance_id, transition, status
            ),
        },
    }
}

/// Booking ownership check shared by confirm and cancel.
pub(crate) fn ensure_booking_holder(
    booking: &BookingRecord,
    user_id: i64,
) -> Result<(), CoreError> {
    if booking.user_id != user_id {
        return Err(CoreError::Forbidden {
            reason: format!("booking '{}' belongs to another user", booking.id),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(status: &str, user_id: Option<i64>) -> InstanceRecord {
        InstanceRecord {
            id: 4,
            book_id: 1,
            user_id,
            owner_id: 1,
            exchange_point_id: 1,
            status: status.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_rejected_transition_classification() {
        let err = rejected_transition(4, Transition::Reserve, None);
        assert!(matches!(
            err,
            CoreError::NotFound {
                entity: Entity::Instance,
                id: 4
            }
        ));

        let err = rejected_transition(4, Transition::Reserve, Some(instance("BOOKED", Some(2))));
        match err {
            CoreError::Conflict {
                instance_id,
                expected,
                actual,
            } => {
                assert_eq!(instance_id, 4);
                assert_eq!(expected, "FREE");
                assert_eq!(actual, "BOOKED");
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        let err = rejected_transition(4, Transition::Return, Some(instance("BOOKED", Some(2))));
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[test]
    fn test_rejected_transition_unknown_status() {
        let err = rejected_transition(4, Transition::Reserve, Some(instance("LOST", None)));
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }

    #[test]
    fn test_rejected_transition_allowed_status_is_not_a_conflict() {
        let err = rejected_transition(4, Transition::Reserve, Some(instance("FREE", None)));
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }

    #[test]
    fn test_holder_only_while_claimed() {
        assert_eq!(instance("BOOKED", Some(2)).holder(), Some(2));
        assert_eq!(instance("OWNED", Some(2)).holder(), Some(2));
        assert_eq!(instance("FREE", Some(2)).holder(), None);
        assert_eq!(instance("LOST", Some(2)).holder(), None);
    }

    #[test]
    fn test_booking_holder_check() {
        let booking = BookingRecord {
            id: 9,
            user_id: 3,
            instance_id: 1,
            book_id: 1,
            created_at: Utc::now(),
        };
        assert!(ensure_booking_holder(&booking, 3).is_ok());
        let err = ensure_booking_holder(&booking, 4).unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");
    }
}

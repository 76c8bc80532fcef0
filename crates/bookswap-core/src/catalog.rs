// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Read models for the book page and the user profile.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CoreError, Entity, Result};
use crate::pagination::Page;
use crate::persistence::{
    AuthorRecord, BookRecord, BookingRecord, ExchangePointRecord, InstanceRecord,
    ModerationRequestRecord, Persistence, ShelfRecord,
};

/// Profile pages are a fixed size.
pub const PROFILE_PAGE_SIZE: i64 = 10;

/// Shelf listing page size.
pub const SHELVES_PAGE_SIZE: i64 = 10;

/// A FREE copy together with where to collect it.
#[derive(Debug, Clone, Serialize)]
pub struct AvailableInstance {
    /// The copy.
    pub instance: InstanceRecord,
    /// Its current location, if still present.
    pub exchange_point: Option<ExchangePointRecord>,
}

/// Everything the book page shows.
#[derive(Debug, Clone, Serialize)]
pub struct BookDetails {
    /// Bibliographic record.
    pub book: BookRecord,
    /// Author of the book.
    pub author: Option<AuthorRecord>,
    /// FREE copies, newest first.
    pub instances: Vec<AvailableInstance>,
    /// The viewer's pending booking for this book.
    pub booking: Option<BookingRecord>,
}

/// Load the book page for `book_id`, as seen by `viewer`.
pub async fn book_details(
    persistence: &dyn Persistence,
    book_id: i64,
    viewer: Option<i64>,
) -> Result<BookDetails> {
    let book = persistence
        .get_book(book_id)
        .await?
        .ok_or_else(|| CoreError::not_found(Entity::Book, book_id))?;
    let author = persistence.get_author(book.author_id).await?;

    let points: HashMap<i64, ExchangePointRecord> = persistence
        .list_exchange_points()
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let instances = persistence
        .list_free_instances(book_id)
        .await?
        .into_iter()
        .map(|instance| AvailableInstance {
            exchange_point: points.get(&instance.exchange_point_id).cloned(),
            instance,
        })
        .collect();

    let booking = match viewer {
        Some(user_id) => persistence.find_booking(user_id, book_id).await?,
        None => None,
    };

    Ok(BookDetails {
        book,
        author,
        instances,
        booking,
    })
}

/// Exchange points run by an organisation, filtered by a case-insensitive
/// match on organisation name or address.
pub async fn shelves(
    persistence: &dyn Persistence,
    query: Option<&str>,
    page: i64,
) -> Result<Page<ShelfRecord>> {
    let needle = query
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());

    let shelves: Vec<ShelfRecord> = persistence
        .list_shelves()
        .await?
        .into_iter()
        .filter(|s| match &needle {
            Some(q) => s.name.to_lowercase().contains(q) || s.address.to_lowercase().contains(q),
            None => true,
        })
        .collect();

    Ok(Page::paginate(shelves, page, SHELVES_PAGE_SIZE))
}

/// Tabs of the profile records page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSection {
    /// Copies the user supplied, plus their pending submissions.
    Own,
    /// Copies the user has picked up and not returned yet.
    Rent,
    /// The user's pending bookings.
    Booking,
}

impl ProfileSection {
    /// URL segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Own => "own",
            Self::Rent => "rent",
            Self::Booking => "booking",
        }
    }
}

impl fmt::Display for ProfileSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileSection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "own" => Ok(Self::Own),
            "rent" => Ok(Self::Rent),
            "booking" => Ok(Self::Booking),
            other => Err(format!("unknown profile section '{}'", other)),
        }
    }
}

/// One row of a profile section.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileEntry {
    /// A listed copy.
    Instance(InstanceRecord),
    /// A submission still waiting for review.
    PendingRequest(ModerationRequestRecord),
    /// A pending reservation.
    Booking(BookingRecord),
}

impl ProfileEntry {
    fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Instance(i) => i.created_at,
            Self::PendingRequest(r) => r.created_at,
            Self::Booking(b) => b.created_at,
        }
    }
}

/// Load one page of a profile section for `user_id`, newest first.
pub async fn profile_records(
    persistence: &dyn Persistence,
    user_id: i64,
    section: ProfileSection,
    page: i64,
) -> Result<Page<ProfileEntry>> {
    let mut entries: Vec<ProfileEntry> = match section {
        ProfileSection::Own => {
            let mut entries: Vec<ProfileEntry> = persistence
                .list_instances_by_owner(user_id)
                .await?
                .into_iter()
                .map(ProfileEntry::Instance)
                .collect();
            entries.extend(
                persistence
                    .list_moderation_requests(Some(user_id))
                    .await?
                    .into_iter()
                    .map(ProfileEntry::PendingRequest),
            );
            entries
        }
        ProfileSection::Rent => persistence
            .list_rented_instances(user_id)
            .await?
            .into_iter()
            .map(ProfileEntry::Instance)
            .collect(),
        ProfileSection::Booking => persistence
            .list_bookings_by_user(user_id)
            .await?
            .into_iter()
            .map(ProfileEntry::Booking)
            .collect(),
    };

    entries.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    Ok(Page::paginate(entries, page, PROFILE_PAGE_SIZE))
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Profile overview and profile edits.

use serde::Serialize;
use tracing::{info, instrument};

use crate::catalog::{self, ProfileEntry, ProfileSection};
use crate::error::{CoreError, Entity, Result};
use crate::persistence::{ExchangePointRecord, Persistence, UserRecord, UserUpdate};

/// Entries shown per section on the overview.
pub const SUMMARY_SECTION_SIZE: usize = 3;

/// The profile overview: the user and the latest entries of each section.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    /// The signed-in user.
    pub user: UserRecord,
    /// Latest supplied copies and pending submissions.
    pub own: Vec<ProfileEntry>,
    /// Latest copies picked up and not returned.
    pub rent: Vec<ProfileEntry>,
    /// Latest pending bookings.
    pub booking: Vec<ProfileEntry>,
    /// Where copies can be dropped off.
    pub exchange_points: Vec<ExchangePointRecord>,
}

async fn latest(
    persistence: &dyn Persistence,
    user_id: i64,
    section: ProfileSection,
) -> Result<Vec<ProfileEntry>> {
    let mut items = catalog::profile_records(persistence, user_id, section, 1)
        .await?
        .items;
    items.truncate(SUMMARY_SECTION_SIZE);
    Ok(items)
}

/// Load the overview for `user_id`. `NotFound` if the user no longer exists.
pub async fn summary(persistence: &dyn Persistence, user_id: i64) -> Result<ProfileSummary> {
    let user = persistence
        .get_user(user_id)
        .await?
        .ok_or_else(|| CoreError::not_found(Entity::User, user_id))?;

    Ok(ProfileSummary {
        user,
        own: latest(persistence, user_id, ProfileSection::Own).await?,
        rent: latest(persistence, user_id, ProfileSection::Rent).await?,
        booking: latest(persistence, user_id, ProfileSection::Booking).await?,
        exchange_points: persistence.list_exchange_points().await?,
    })
}

fn trimmed(field: &str, value: Option<String>) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(v) => {
            let v = v.trim();
            if v.is_empty() {
                return Err(CoreError::validation(field, "must not be empty"));
            }
            Ok(Some(v.to_string()))
        }
    }
}

/// Change name, last name or email of `user_id`.
///
/// Fields left `None` keep their value. A field that is present but blank is
/// rejected, as is an email without `@` or one already in use.
#[instrument(skip(persistence, update))]
pub async fn update(
    persistence: &dyn Persistence,
    user_id: i64,
    update: UserUpdate,
) -> Result<UserRecord> {
    let update = UserUpdate {
        name: trimmed("name", update.name)?,
        lastname: trimmed("lastname", update.lastname)?,
        email: trimmed("email", update.email)?,
    };
    if let Some(email) = &update.email
        && !email.contains('@')
    {
        return Err(CoreError::validation("email", "must be an email address"));
    }

    let user = persistence
        .update_user(user_id, &update)
        .await?
        .ok_or_else(|| CoreError::not_found(Entity::User, user_id))?;

    info!(user_id, "Profile updated");
    Ok(user)
}

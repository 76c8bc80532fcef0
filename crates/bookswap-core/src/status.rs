// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance status state machine.
//!
//! ```text
//!            reserve             confirm pickup
//!   ┌──────┐ ──────► ┌────────┐ ──────────────► ┌───────┐
//!   │ FREE │         │ BOOKED │                 │ OWNED │
//!   └──────┘ ◄────── └────────┘                 └───┬───┘
//!      ▲      cancel                                │
//!      └────────────────────────────────────────────┘
//!                          return
//! ```
//!
//! There is no terminal state: a copy cycles through these states for as long
//! as it exists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a single book copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceStatus {
    /// Available for reservation. No holder.
    Free,
    /// Reserved by a user, waiting for pickup.
    Booked,
    /// Picked up and held by a borrower.
    Owned,
}

/// A lifecycle transition applied to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A user claims a free copy.
    Reserve,
    /// The claimant collects the copy.
    ConfirmPickup,
    /// The claimant withdraws the reservation.
    Cancel,
    /// The borrower drops the copy off at an exchange point.
    Return,
}

impl InstanceStatus {
    /// Database / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Booked => "BOOKED",
            Self::Owned => "OWNED",
        }
    }

    /// Status after applying `transition`, or `None` if the transition is not
    /// allowed from this status.
    pub fn apply(self, transition: Transition) -> Option<InstanceStatus> {
        match (self, transition) {
            (Self::Free, Transition::Reserve) => Some(Self::Booked),
            (Self::Booked, Transition::ConfirmPickup) => Some(Self::Owned),
            (Self::Booked, Transition::Cancel) => Some(Self::Free),
            (Self::Owned, Transition::Return) => Some(Self::Free),
            _ => None,
        }
    }

    /// Whether a copy in this status has a holder (`user_id` set).
    pub fn has_holder(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl Transition {
    /// The only status this transition may start from.
    pub fn source(&self) -> InstanceStatus {
        match self {
            Self::Reserve => InstanceStatus::Free,
            Self::ConfirmPickup | Self::Cancel => InstanceStatus::Booked,
            Self::Return => InstanceStatus::Owned,
        }
    }

    /// The status this transition leads to.
    pub fn target(&self) -> InstanceStatus {
        match self {
            Self::Reserve => InstanceStatus::Booked,
            Self::ConfirmPickup => InstanceStatus::Owned,
            Self::Cancel | Self::Return => InstanceStatus::Free,
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown instance status '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for InstanceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FREE" => Ok(Self::Free),
            "BOOKED" => Ok(Self::Booked),
            "OWNED" => Ok(Self::Owned),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types and reason codes for ticket processing.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Ticket processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketError {
    /// Ticket type is not present in the registry
    #[error("unknown ticket type")]
    UnknownTicketType,

    /// A ticket with this ID has already been issued
    #[error("duplicate ticket ID")]
    DuplicateTicket,

    /// No ticket record exists for the given ID
    #[error("ticket not found")]
    TicketNotFound,

    /// Ticket has been cancelled (terminal)
    #[error("ticket is cancelled")]
    TicketCancelled,

    /// Ticket has consumed all permitted admissions
    #[error("ticket is fully used")]
    TicketUsed,

    /// Cancellation policy forbids cancelling a partially-used ticket
    #[error("cancellation not allowed for partially-used ticket")]
    CancellationNotAllowed,

    /// QR payload does not match the expected textual format
    #[error("malformed QR payload")]
    MalformedPayload,

    /// Store transaction could not commit within the retry budget
    #[error("store contention not resolved after retries")]
    StoreContention,
}

/// Rejection reason codes returned to gate clients.
///
/// These are data, not exceptions: a rejected scan is an expected, frequent
/// outcome (duplicate taps) and travels in the [`ScanOutcome`] body. The
/// spellings are part of the wire contract with existing gate clients.
///
/// [`ScanOutcome`]: crate::ScanOutcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    TicketNotFound,
    TicketCancelled,
    AlreadyScanned,
    NotValidForDay,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ReasonCode::TicketNotFound => "TICKET_NOT_FOUND",
            ReasonCode::TicketCancelled => "TICKET_CANCELLED",
            ReasonCode::AlreadyScanned => "ALREADY_SCANNED",
            ReasonCode::NotValidForDay => "NOT_VALID_FOR_DAY",
        };
        write!(f, "{code}")
    }
}

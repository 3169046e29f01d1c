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

//! Scan validation engine.
//!
//! Pure decision logic: given a ticket snapshot and a proposed admission day,
//! decide accept/reject. No clock, no randomness, no I/O — identical inputs
//! always yield identical output, which is what makes the transactional
//! wrapper in [`crate::engine`] safe to retry against a fresh snapshot.

use crate::ReasonCode;
use crate::base::Day;
use crate::ticket::{Ticket, TicketStatus};

/// Why a scan was rejected.
///
/// `FullyUsed` and `DayAlreadyUsed` both surface to gate clients as
/// [`ReasonCode::AlreadyScanned`]; existing clients depend on the single
/// external code, so the distinction lives only in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Ticket status is `Cancelled`.
    Cancelled,
    /// Ticket status is `Used`; no day can be admitted anymore.
    FullyUsed,
    /// The presented day is not in the ticket's allowed days.
    DayNotAllowed,
    /// A scan for this day was already recorded while the ticket was active.
    DayAlreadyUsed,
}

impl Rejection {
    /// External reason code for gate clients.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Rejection::Cancelled => ReasonCode::TicketCancelled,
            Rejection::FullyUsed | Rejection::DayAlreadyUsed => ReasonCode::AlreadyScanned,
            Rejection::DayNotAllowed => ReasonCode::NotValidForDay,
        }
    }

    /// Sub-case message recorded in the scan log.
    pub fn log_message(&self) -> &'static str {
        match self {
            Rejection::Cancelled => "ticket is cancelled",
            Rejection::FullyUsed => "ticket already fully used",
            Rejection::DayNotAllowed => "ticket not valid for this day",
            Rejection::DayAlreadyUsed => "day already scanned on active ticket",
        }
    }
}

/// Accepted scan: the status the ticket must transition to when the
/// admission commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub new_status: TicketStatus,
}

/// Decides whether `ticket` may admit on `day`.
///
/// Checks run in a fixed short-circuit order:
///
/// 1. existence — a missing record is handled by the caller (store-level
///    concern) and is always terminal, never retried;
/// 2. cancelled;
/// 3. fully used — fast path independent of the day check: once `Used`, any
///    day is rejected;
/// 4. day not in `ticket.allowed_days`;
/// 5. day already consumed;
/// 6. accept, with `Used` when this scan reaches `max_scans`, else `Active`.
///
/// `max_scans` and `allowed_days` are read from the ticket's denormalized
/// fields, never from the live registry.
pub fn validate(ticket: &Ticket, day: Day) -> Result<Admission, Rejection> {
    match ticket.status {
        TicketStatus::Cancelled => return Err(Rejection::Cancelled),
        TicketStatus::Used => return Err(Rejection::FullyUsed),
        TicketStatus::Active => {}
    }
    if !ticket.allowed_days.contains(&day) {
        return Err(Rejection::DayNotAllowed);
    }
    if ticket.has_scan_for(day) {
        return Err(Rejection::DayAlreadyUsed);
    }

    let new_status = if ticket.scans.len() as u32 + 1 >= ticket.max_scans {
        TicketStatus::Used
    } else {
        TicketStatus::Active
    };
    Ok(Admission { new_status })
}

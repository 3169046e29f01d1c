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

//! Ticket records and lifecycle transitions.
//!
//! Implemented State Machine
//!
//  Active ──scan (scans < max_scans - 1)──► Active
//  Active ──scan (reaching max_scans)─────► Used
//  Active ──cancel────────────────────────► Cancelled (terminal)
//  Used ────cancel────────────────────────► rejected (admission history stays)
//  Active ──transfer──────────────────────► Active (holder replaced)

use crate::TicketError;
use crate::base::{Day, PurchaseId, TicketId};
use crate::registry::{TicketType, TicketTypeConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current holder identity. Mutable via transfer only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderInfo {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl HolderInfo {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
        }
    }
}

/// Ticket lifecycle status.
///
/// `Cancelled` is terminal. `Used` is terminal for scanning but not for
/// transfer history; transfer history itself is carried by
/// [`Ticket::previous_holder`], not by a status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Active,
    Used,
    Cancelled,
}

/// One successful admission. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Admission day this scan consumed.
    pub day: Day,
    /// Server time at which the scan was recorded. Never client-supplied.
    pub timestamp: DateTime<Utc>,
    /// Physical checkpoint identifier.
    pub gate: String,
    /// Operator identifier, or the `MANUAL_ADMIN` sentinel for staff entries.
    pub scanned_by: String,
    /// Device identifier, or the `ADMIN_PANEL` sentinel for staff entries.
    pub device_id: String,
}

/// Whether a partially-used multi-day ticket may still be cancelled.
///
/// Cancellation only blocks future scans either way; recorded admissions are
/// never erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancellationPolicy {
    /// Cancel is allowed while any admission remains unconsumed.
    #[default]
    AllowPartiallyUsed,
    /// Cancel is allowed only before the first admission.
    FreshOnly,
}

/// A single admission credential.
///
/// Owned by the ticket store and keyed by `ticket_id`. `allowed_days` and
/// `max_scans` are copied from the type config at issuance so later registry
/// changes never alter an issued ticket's rules; the validation engine reads
/// only these stamped values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: TicketId,
    pub purchase_id: PurchaseId,
    pub ticket_type: TicketType,
    pub holder: HolderInfo,
    /// Holder identity prior to the last transfer. Audit only.
    pub previous_holder: Option<HolderInfo>,
    pub status: TicketStatus,
    /// Append-only, insertion order = chronological order. At most one entry
    /// per `day` value.
    pub scans: Vec<ScanRecord>,
    pub allowed_days: Vec<Day>,
    pub max_scans: u32,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Creates a new ticket at purchase-verification time, stamping the
    /// denormalized admission rules from the type config.
    pub fn issue(
        ticket_id: TicketId,
        purchase_id: PurchaseId,
        config: &TicketTypeConfig,
        holder: HolderInfo,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id,
            purchase_id,
            ticket_type: config.id,
            holder,
            previous_holder: None,
            status: TicketStatus::Active,
            scans: Vec::new(),
            allowed_days: config.allowed_days.clone(),
            max_scans: config.max_scans,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True if a scan for `day` has already been recorded.
    pub fn has_scan_for(&self, day: Day) -> bool {
        self.scans.iter().any(|s| s.day == day)
    }

    /// Number of admissions still available before the ticket is fully used.
    pub fn remaining_scans(&self) -> u32 {
        self.max_scans.saturating_sub(self.scans.len() as u32)
    }

    fn assert_invariants(&self) {
        debug_assert!(
            {
                let mut days: Vec<Day> = self.scans.iter().map(|s| s.day).collect();
                days.sort_unstable();
                days.windows(2).all(|w| w[0] != w[1])
            },
            "Invariant violated: duplicate scan day on ticket {}",
            self.ticket_id
        );
    }

    /// Appends an accepted scan and recomputes status.
    ///
    /// Validation has already happened by the time this runs; the one
    /// invariant re-checked here is one-scan-per-day, which also holds for
    /// manual overrides that bypass day eligibility.
    pub(crate) fn record_scan(&mut self, record: ScanRecord) {
        debug_assert!(
            !self.has_scan_for(record.day),
            "Invariant violated: day {} already consumed on ticket {}",
            record.day,
            self.ticket_id
        );
        self.updated_at = record.timestamp;
        self.scans.push(record);
        if self.scans.len() as u32 >= self.max_scans {
            self.status = TicketStatus::Used;
        }
        self.assert_invariants();
    }

    /// Terminal transition to `Cancelled`.
    ///
    /// # Errors
    ///
    /// - [`TicketError::TicketCancelled`] if already cancelled.
    /// - [`TicketError::TicketUsed`] if fully used (admission history cannot
    ///   be erased by cancellation).
    /// - [`TicketError::CancellationNotAllowed`] if the policy is
    ///   [`CancellationPolicy::FreshOnly`] and an admission was recorded.
    pub fn cancel(
        &mut self,
        reason: &str,
        policy: CancellationPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), TicketError> {
        match self.status {
            TicketStatus::Cancelled => return Err(TicketError::TicketCancelled),
            TicketStatus::Used => return Err(TicketError::TicketUsed),
            TicketStatus::Active => {}
        }
        if policy == CancellationPolicy::FreshOnly && !self.scans.is_empty() {
            return Err(TicketError::CancellationNotAllowed);
        }
        self.status = TicketStatus::Cancelled;
        self.cancellation_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Checks transfer preconditions without mutating.
    ///
    /// A partially-used ticket transfers fine: a combo that consumed day 1
    /// can still admit the new holder on day 2.
    pub fn can_transfer(&self) -> Result<(), TicketError> {
        match self.status {
            TicketStatus::Cancelled => Err(TicketError::TicketCancelled),
            TicketStatus::Used => Err(TicketError::TicketUsed),
            TicketStatus::Active => Ok(()),
        }
    }

    /// Replaces holder identity, snapshotting the previous holder for audit.
    ///
    /// Never touches `scans` or `status`.
    ///
    /// # Errors
    ///
    /// Same preconditions as [`Ticket::can_transfer`].
    pub fn transfer(&mut self, new_holder: HolderInfo, now: DateTime<Utc>) -> Result<(), TicketError> {
        self.can_transfer()?;
        self.previous_holder = Some(std::mem::replace(&mut self.holder, new_holder));
        self.updated_at = now;
        self.assert_invariants();
        Ok(())
    }
}

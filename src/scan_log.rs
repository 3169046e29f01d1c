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

//! Append-only scan audit stream.
//!
//! Every scan attempt — accepted or rejected — produces exactly one
//! [`ScanLogEntry`]. The stream exists for forensic and operational review
//! only: the engine never reads it back, and a sink failure never blocks or
//! alters a scan decision.

use crate::ReasonCode;
use crate::base::{Day, TicketId};
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome marker on an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanResult {
    Success,
    Failed,
}

/// Audit record of one scan attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanLogEntry {
    pub ticket_id: TicketId,
    pub day: Day,
    pub scanned_by: String,
    pub gate: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub result: ScanResult,
    /// External reason code on failure.
    pub reason: Option<ReasonCode>,
    /// Human-readable detail; on failure this records which sub-case fired.
    pub message: String,
}

/// Audit record of a staff override, kept distinct from the scan stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminActionEntry {
    pub action: String,
    pub ticket_id: TicketId,
    pub performed_by: String,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
}

/// Audit sink write failure. Reported to the operational channel by the
/// caller, never propagated into a scan outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("audit sink write failed: {0}")]
pub struct SinkError(pub String);

/// Best-effort, non-transactional audit sink.
pub trait AuditSink: Send + Sync {
    /// Appends one scan attempt record.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the write fails; callers log and continue.
    fn append_scan(&self, entry: ScanLogEntry) -> Result<(), SinkError>;

    /// Appends one admin action record.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the write fails; callers log and continue.
    fn append_admin_action(&self, entry: AdminActionEntry) -> Result<(), SinkError>;
}

/// In-memory [`AuditSink`] on lock-free queues.
///
/// Appends are wait-free and preserve FIFO order. Entries are read out by
/// draining, which pops in insertion order — the operational flush path and
/// the test inspection path are the same.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    scans: SegQueue<ScanLogEntry>,
    admin_actions: SegQueue<AdminActionEntry>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan_count(&self) -> usize {
        self.scans.len()
    }

    pub fn admin_action_count(&self) -> usize {
        self.admin_actions.len()
    }

    /// Pops all scan entries in insertion order.
    pub fn drain_scans(&self) -> Vec<ScanLogEntry> {
        let mut entries = Vec::with_capacity(self.scans.len());
        while let Some(entry) = self.scans.pop() {
            entries.push(entry);
        }
        entries
    }

    /// Pops all admin action entries in insertion order.
    pub fn drain_admin_actions(&self) -> Vec<AdminActionEntry> {
        let mut entries = Vec::with_capacity(self.admin_actions.len());
        while let Some(entry) = self.admin_actions.pop() {
            entries.push(entry);
        }
        entries
    }
}

impl AuditSink for MemoryAuditLog {
    fn append_scan(&self, entry: ScanLogEntry) -> Result<(), SinkError> {
        self.scans.push(entry);
        Ok(())
    }

    fn append_admin_action(&self, entry: AdminActionEntry) -> Result<(), SinkError> {
        self.admin_actions.push(entry);
        Ok(())
    }
}

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

//! Scan transaction coordinator.
//!
//! The [`Engine`] is the central component that admits or rejects ticket
//! scans and applies lifecycle transitions (issue, cancel, transfer). Each
//! scan runs its read-validate-write sequence inside one per-ticket store
//! transaction, so concurrent submissions for the same ticket serialize and a
//! day is never admitted twice.
//!
//! # Scan Protocol
//!
//! 1. Normalize the incoming ticket reference (URI wrappers, QR payloads).
//! 2. Open a per-ticket transaction; read the snapshot.
//! 3. Run the pure validation engine against the snapshot.
//! 4. Rejected: commit nothing. Accepted: append the scan record and the new
//!    status in the same transaction.
//! 5. After the transaction, append one audit entry for the attempt — both
//!    outcomes, every time. Audit failures are logged and swallowed.
//!
//! # Thread Safety
//!
//! Concurrency arises purely from independent requests. The engine holds no
//! state of its own between calls; all shared state lives in the store, which
//! serializes per ticket ID only — different tickets never contend.

use crate::base::{Day, PurchaseId, TicketId};
use crate::qr;
use crate::registry::{TicketType, TicketTypeRegistry};
use crate::scan_log::{AdminActionEntry, AuditSink, MemoryAuditLog, ScanLogEntry, ScanResult};
use crate::store::{MemoryTicketStore, TicketStore, TxnDecision};
use crate::ticket::{CancellationPolicy, HolderInfo, ScanRecord, Ticket, TicketStatus};
use crate::validation::{self, Rejection};
use crate::{ReasonCode, TicketError};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Sentinel operator identifier for staff-entered scans.
pub const MANUAL_ADMIN: &str = "MANUAL_ADMIN";
/// Sentinel device identifier for staff-entered scans.
pub const ADMIN_PANEL: &str = "ADMIN_PANEL";

/// Result of a gate scan, returned to the gate client.
///
/// `accepted == false` is uniform "deny entry, show reason" — rejections are
/// expected outcomes (duplicate taps), not errors.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ScanOutcome {
    pub accepted: bool,
    pub reason: Option<ReasonCode>,
    pub message: String,
    pub ticket_type: Option<TicketType>,
    pub holder_name: Option<String>,
    pub remaining_scans: Option<u32>,
}

impl ScanOutcome {
    fn rejected(reason: ReasonCode, message: impl Into<String>, ticket: Option<&Ticket>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
            message: message.into(),
            ticket_type: ticket.map(|t| t.ticket_type),
            holder_name: ticket.map(|t| t.holder.name.clone()),
            remaining_scans: ticket.map(Ticket::remaining_scans),
        }
    }
}

/// Result of a staff override scan.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ManualScanOutcome {
    pub success: bool,
    pub message: String,
}

/// Inner decision carried out of the scan transaction.
#[derive(Debug)]
enum ScanDecision {
    NotFound,
    Rejected { rejection: Rejection, ticket: Ticket },
    Accepted { ticket: Ticket },
}

/// Ticket admission engine wiring the type registry, the transactional
/// ticket store, and the audit sink.
///
/// # Invariants
///
/// - At most one scan record exists per ticket per day, under any
///   interleaving of concurrent submissions.
/// - Status only moves `Active -> Used` (scan cap reached) or
///   `Active -> Cancelled`; never backwards.
/// - Every scan attempt produces exactly one audit entry, accepted or not.
/// - A rejected scan commits nothing.
pub struct Engine<S = MemoryTicketStore, A = MemoryAuditLog> {
    store: S,
    audit: A,
    registry: TicketTypeRegistry,
    cancellation_policy: CancellationPolicy,
}

impl Engine {
    /// Creates an engine on the in-memory store and audit log with the
    /// standard ticket catalog.
    pub fn new() -> Self {
        Self::with_parts(
            MemoryTicketStore::new(),
            MemoryAuditLog::new(),
            TicketTypeRegistry::standard(),
        )
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TicketStore, A: AuditSink> Engine<S, A> {
    /// Creates an engine from injected collaborators.
    pub fn with_parts(store: S, audit: A, registry: TicketTypeRegistry) -> Self {
        Self {
            store,
            audit,
            registry,
            cancellation_policy: CancellationPolicy::default(),
        }
    }

    /// Overrides the partial-use cancellation policy.
    pub fn with_cancellation_policy(mut self, policy: CancellationPolicy) -> Self {
        self.cancellation_policy = policy;
        self
    }

    pub fn audit_log(&self) -> &A {
        &self.audit
    }

    pub fn registry(&self) -> &TicketTypeRegistry {
        &self.registry
    }

    /// Issues a new ticket at purchase-verification time.
    ///
    /// Consults the registry once to stamp `allowed_days`/`max_scans` onto
    /// the record; the issued ticket starts `Active` with no scans.
    ///
    /// # Errors
    ///
    /// - [`TicketError::UnknownTicketType`] - Type missing from the registry.
    /// - [`TicketError::DuplicateTicket`] - A ticket with this ID exists.
    pub fn issue_ticket(
        &self,
        ticket_id: TicketId,
        purchase_id: PurchaseId,
        ticket_type: TicketType,
        holder: HolderInfo,
    ) -> Result<Ticket, TicketError> {
        let config = self.registry.config_for(ticket_type)?;
        let ticket = Ticket::issue(ticket_id, purchase_id, config, holder, Utc::now());
        self.store.insert(ticket.clone())?;
        Ok(ticket)
    }

    /// Submits a gate scan for admission.
    ///
    /// `ticket_ref` may be a bare ticket id, a URI-wrapped id, or a full QR
    /// payload; it is normalized before lookup. The scan timestamp is server
    /// time, never client-supplied.
    ///
    /// # Errors
    ///
    /// Rejections are NOT errors — they come back as `accepted == false`
    /// with a [`ReasonCode`]. `Err` is reserved for:
    ///
    /// - [`TicketError::MalformedPayload`] - Unparseable QR payload.
    /// - [`TicketError::StoreContention`] - Transaction retries exhausted.
    pub fn submit_scan(
        &self,
        ticket_ref: &str,
        day: Day,
        scanned_by: &str,
        gate: &str,
        device_id: &str,
    ) -> Result<ScanOutcome, TicketError> {
        let ticket_id = qr::extract_ticket_id(ticket_ref)?;
        let now = Utc::now();

        let decision = self.store.run_transaction(&ticket_id, |snapshot| {
            let Some(ticket) = snapshot else {
                return TxnDecision::ReadOnly {
                    value: ScanDecision::NotFound,
                };
            };
            match validation::validate(ticket, day) {
                Ok(admission) => {
                    let mut updated = ticket.clone();
                    updated.record_scan(ScanRecord {
                        day,
                        timestamp: now,
                        gate: gate.to_string(),
                        scanned_by: scanned_by.to_string(),
                        device_id: device_id.to_string(),
                    });
                    debug_assert_eq!(updated.status, admission.new_status);
                    TxnDecision::Commit {
                        value: ScanDecision::Accepted {
                            ticket: updated.clone(),
                        },
                        ticket: updated,
                    }
                }
                Err(rejection) => TxnDecision::ReadOnly {
                    value: ScanDecision::Rejected {
                        rejection,
                        ticket: ticket.clone(),
                    },
                },
            }
        });

        let decision = match decision {
            Ok(decision) => decision,
            Err(err) => {
                // The attempt still gets its audit entry; ambiguity resolves
                // to deny.
                self.append_scan_entry(ScanLogEntry {
                    ticket_id: ticket_id.clone(),
                    day,
                    scanned_by: scanned_by.to_string(),
                    gate: gate.to_string(),
                    device_id: device_id.to_string(),
                    timestamp: now,
                    result: ScanResult::Failed,
                    reason: None,
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        let outcome = match &decision {
            ScanDecision::NotFound => ScanOutcome::rejected(
                ReasonCode::TicketNotFound,
                "no ticket record for this ID",
                None,
            ),
            ScanDecision::Rejected { rejection, ticket } => {
                debug!(ticket = %ticket_id, %day, rejection = ?rejection, "scan rejected");
                ScanOutcome::rejected(rejection.reason_code(), rejection.log_message(), Some(ticket))
            }
            ScanDecision::Accepted { ticket } => ScanOutcome {
                accepted: true,
                reason: None,
                message: format!("admitted for {day}"),
                ticket_type: Some(ticket.ticket_type),
                holder_name: Some(ticket.holder.name.clone()),
                remaining_scans: Some(ticket.remaining_scans()),
            },
        };

        let result = if outcome.accepted {
            ScanResult::Success
        } else {
            ScanResult::Failed
        };
        self.append_scan_entry(ScanLogEntry {
            ticket_id,
            day,
            scanned_by: scanned_by.to_string(),
            gate: gate.to_string(),
            device_id: device_id.to_string(),
            timestamp: now,
            result,
            reason: outcome.reason,
            message: outcome.message.clone(),
        });

        Ok(outcome)
    }

    /// Records a staff override scan for a ticket whose QR could not be read
    /// automatically.
    ///
    /// Runs an abbreviated precondition set: cancelled tickets are rejected
    /// and a consumed day stays consumed, but day eligibility is NOT checked
    /// — staff may admit outside the ticket's day list. Status is recomputed
    /// under the same scan-cap rule as automatic scans. The override is
    /// recorded in both the scan log and the admin action stream.
    ///
    /// # Errors
    ///
    /// - [`TicketError::MalformedPayload`] - Unparseable QR payload.
    /// - [`TicketError::StoreContention`] - Transaction retries exhausted.
    pub fn record_manual_scan(
        &self,
        ticket_ref: &str,
        day: Day,
        location: &str,
        timestamp: DateTime<Utc>,
        performed_by: &str,
    ) -> Result<ManualScanOutcome, TicketError> {
        let ticket_id = qr::extract_ticket_id(ticket_ref)?;

        let decision = self.store.run_transaction(&ticket_id, |snapshot| {
            let Some(ticket) = snapshot else {
                return TxnDecision::ReadOnly {
                    value: ScanDecision::NotFound,
                };
            };
            if ticket.status == TicketStatus::Cancelled {
                return TxnDecision::ReadOnly {
                    value: ScanDecision::Rejected {
                        rejection: Rejection::Cancelled,
                        ticket: ticket.clone(),
                    },
                };
            }
            if ticket.has_scan_for(day) {
                return TxnDecision::ReadOnly {
                    value: ScanDecision::Rejected {
                        rejection: Rejection::DayAlreadyUsed,
                        ticket: ticket.clone(),
                    },
                };
            }
            let mut updated = ticket.clone();
            updated.record_scan(ScanRecord {
                day,
                timestamp,
                gate: location.to_string(),
                scanned_by: MANUAL_ADMIN.to_string(),
                device_id: ADMIN_PANEL.to_string(),
            });
            TxnDecision::Commit {
                value: ScanDecision::Accepted {
                    ticket: updated.clone(),
                },
                ticket: updated,
            }
        })?;

        let (result, reason, message) = match &decision {
            ScanDecision::NotFound => (
                ScanResult::Failed,
                Some(ReasonCode::TicketNotFound),
                "no ticket record for this ID".to_string(),
            ),
            ScanDecision::Rejected { rejection, .. } => (
                ScanResult::Failed,
                Some(rejection.reason_code()),
                rejection.log_message().to_string(),
            ),
            ScanDecision::Accepted { .. } => (
                ScanResult::Success,
                None,
                format!("manually admitted for {day}"),
            ),
        };

        self.append_scan_entry(ScanLogEntry {
            ticket_id: ticket_id.clone(),
            day,
            scanned_by: MANUAL_ADMIN.to_string(),
            gate: location.to_string(),
            device_id: ADMIN_PANEL.to_string(),
            timestamp,
            result,
            reason,
            message: message.clone(),
        });

        if result == ScanResult::Success {
            let action = AdminActionEntry {
                action: "manual_scan".to_string(),
                ticket_id: ticket_id.clone(),
                performed_by: performed_by.to_string(),
                timestamp,
                detail: format!("override admission for {day} at {location}"),
            };
            if let Err(err) = self.audit.append_admin_action(action) {
                warn!(ticket = %ticket_id, error = %err, "admin action log write failed");
            }
        }

        Ok(ManualScanOutcome {
            success: result == ScanResult::Success,
            message,
        })
    }

    /// Cancels a ticket, blocking all future scans.
    ///
    /// # Errors
    ///
    /// - [`TicketError::TicketNotFound`] - No record for the given reference.
    /// - [`TicketError::TicketCancelled`] - Already cancelled.
    /// - [`TicketError::TicketUsed`] - Fully used; history is not erasable.
    /// - [`TicketError::CancellationNotAllowed`] - Policy forbids cancelling
    ///   a partially-used ticket.
    /// - [`TicketError::StoreContention`] - Transaction retries exhausted.
    pub fn cancel_ticket(&self, ticket_ref: &str, reason: &str) -> Result<(), TicketError> {
        let ticket_id = qr::extract_ticket_id(ticket_ref)?;
        let now = Utc::now();
        let policy = self.cancellation_policy;

        self.store.run_transaction(&ticket_id, |snapshot| {
            let Some(ticket) = snapshot else {
                return TxnDecision::ReadOnly {
                    value: Err(TicketError::TicketNotFound),
                };
            };
            let mut updated = ticket.clone();
            match updated.cancel(reason, policy, now) {
                Ok(()) => TxnDecision::Commit {
                    ticket: updated,
                    value: Ok(()),
                },
                Err(err) => TxnDecision::ReadOnly { value: Err(err) },
            }
        })??;

        info!(ticket = %ticket_id, reason, "ticket cancelled");
        Ok(())
    }

    /// Transfers a ticket to a new holder.
    ///
    /// Allowed while admissions remain (a combo that consumed day 1 still
    /// transfers for day 2); never mutates scans or status.
    ///
    /// # Errors
    ///
    /// - [`TicketError::TicketNotFound`] - No record for the given reference.
    /// - [`TicketError::TicketCancelled`] - Cancelled tickets do not transfer.
    /// - [`TicketError::TicketUsed`] - No admissions remain.
    /// - [`TicketError::StoreContention`] - Transaction retries exhausted.
    pub fn transfer_ticket(
        &self,
        ticket_ref: &str,
        new_holder: HolderInfo,
    ) -> Result<(), TicketError> {
        let ticket_id = qr::extract_ticket_id(ticket_ref)?;
        let now = Utc::now();

        self.store.run_transaction(&ticket_id, |snapshot| {
            let Some(ticket) = snapshot else {
                return TxnDecision::ReadOnly {
                    value: Err(TicketError::TicketNotFound),
                };
            };
            let mut updated = ticket.clone();
            match updated.transfer(new_holder.clone(), now) {
                Ok(()) => TxnDecision::Commit {
                    ticket: updated,
                    value: Ok(()),
                },
                Err(err) => TxnDecision::ReadOnly { value: Err(err) },
            }
        })??;

        info!(ticket = %ticket_id, "ticket transferred");
        Ok(())
    }

    /// Snapshot of a ticket by ID.
    pub fn get_ticket(&self, id: &TicketId) -> Option<Ticket> {
        self.store.get(id)
    }

    /// Snapshot of all tickets. Report surface, not a hot path.
    pub fn tickets(&self) -> Vec<Ticket> {
        self.store.tickets()
    }

    // Best-effort: a sink failure is an operational problem, not a scan
    // outcome.
    fn append_scan_entry(&self, entry: ScanLogEntry) {
        let ticket_id = entry.ticket_id.clone();
        if let Err(err) = self.audit.append_scan(entry) {
            warn!(ticket = %ticket_id, error = %err, "scan log write failed");
        }
    }
}

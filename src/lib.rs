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

//! # Turnstile
//!
//! This library provides the scan-validation and state-transition core of an
//! event ticketing platform: gate devices submit ticket scans, the engine
//! decides admission exactly once per valid (ticket, day) pair, and every
//! attempt lands in an append-only audit stream.
//!
//! ## Core Components
//!
//! - [`Engine`]: Scan transaction coordinator managing ticket admission
//! - [`validate`]: Pure accept/reject decision for a ticket snapshot
//! - [`TicketTypeRegistry`]: Static ticket type catalog (price, days, cap)
//! - [`TicketStore`]: Per-ticket transactional storage contract
//! - [`AuditSink`]: Best-effort scan/admin audit trail
//! - [`TicketError`]: Error types for ticket processing failures
//!
//! ## Example
//!
//! ```
//! use turnstile_rs::{Day, Engine, HolderInfo, PurchaseId, TicketId, TicketType};
//!
//! let engine = Engine::new();
//!
//! // Issue a combo pass at purchase-verification time
//! engine
//!     .issue_ticket(
//!         TicketId::from("T-100"),
//!         PurchaseId::from("P-1"),
//!         TicketType::Combo,
//!         HolderInfo::new("Ada Lovelace", "ada@example.com"),
//!     )
//!     .unwrap();
//!
//! // Gate device submits a scan for day 1
//! let outcome = engine
//!     .submit_scan("T-100", Day(1), "op-7", "GATE_A", "dev-12")
//!     .unwrap();
//! assert!(outcome.accepted);
//!
//! // A duplicate tap for the same day is denied
//! let again = engine
//!     .submit_scan("T-100", Day(1), "op-7", "GATE_A", "dev-12")
//!     .unwrap();
//! assert!(!again.accepted);
//! ```
//!
//! ## Concurrency
//!
//! Scans for the same ticket serialize through per-document store
//! transactions; scans for different tickets proceed independently. The
//! validation decision itself is pure and deterministic, so a contended
//! transaction can safely rerun it against a fresh snapshot.

pub mod base;
mod engine;
pub mod error;
pub mod qr;
mod registry;
pub mod scan_log;
pub mod store;
mod ticket;
pub mod validation;

pub use base::{Day, PurchaseId, TicketId};
pub use engine::{ADMIN_PANEL, Engine, MANUAL_ADMIN, ManualScanOutcome, ScanOutcome};
pub use error::{ReasonCode, TicketError};
pub use registry::{TicketType, TicketTypeConfig, TicketTypeRegistry};
pub use scan_log::{AdminActionEntry, AuditSink, MemoryAuditLog, ScanLogEntry, ScanResult};
pub use store::{MemoryTicketStore, TicketStore, TxnDecision};
pub use ticket::{CancellationPolicy, HolderInfo, ScanRecord, Ticket, TicketStatus};
pub use validation::validate;

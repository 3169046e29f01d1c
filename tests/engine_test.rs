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

//! Engine public API integration tests.

use chrono::Utc;
use turnstile_rs::{
    Day, Engine, HolderInfo, PurchaseId, ReasonCode, ScanOutcome, ScanResult, TicketError,
    TicketId, TicketStatus, TicketType,
};

fn issue(engine: &Engine, id: &str, ticket_type: TicketType) {
    engine
        .issue_ticket(
            TicketId::from(id),
            PurchaseId::from("P-1"),
            ticket_type,
            HolderInfo::new("Ada Lovelace", "ada@example.com"),
        )
        .unwrap();
}

fn scan(engine: &Engine, id: &str, day: u8) -> ScanOutcome {
    engine
        .submit_scan(id, Day(day), "op-7", "GATE_A", "dev-12")
        .unwrap()
}

#[test]
fn issue_creates_active_ticket() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Combo);

    let ticket = engine.get_ticket(&TicketId::from("T-1")).unwrap();
    assert_eq!(ticket.status, TicketStatus::Active);
    assert!(ticket.scans.is_empty());
    assert_eq!(ticket.allowed_days, vec![Day(1), Day(2)]);
    assert_eq!(ticket.max_scans, 2);
}

#[test]
fn duplicate_issue_returns_error() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Day1);

    let result = engine.issue_ticket(
        TicketId::from("T-1"),
        PurchaseId::from("P-2"),
        TicketType::Day1,
        HolderInfo::new("Grace Hopper", "grace@example.com"),
    );
    assert_eq!(result.unwrap_err(), TicketError::DuplicateTicket);
}

/// Scenario: fresh COMBO pass consumes day 1, rejects a duplicate tap,
/// then consumes day 2 and becomes fully used.
#[test]
fn combo_ticket_full_lifecycle() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Combo);

    // Day 1: admitted, still active
    let outcome = scan(&engine, "T-1", 1);
    assert!(outcome.accepted);
    assert_eq!(outcome.remaining_scans, Some(1));
    assert_eq!(outcome.holder_name.as_deref(), Some("Ada Lovelace"));
    let ticket = engine.get_ticket(&TicketId::from("T-1")).unwrap();
    assert_eq!(ticket.status, TicketStatus::Active);
    assert_eq!(ticket.scans.len(), 1);

    // Day 1 again: denied
    let outcome = scan(&engine, "T-1", 1);
    assert!(!outcome.accepted);
    assert_eq!(outcome.reason, Some(ReasonCode::AlreadyScanned));

    // Day 2: admitted, now fully used
    let outcome = scan(&engine, "T-1", 2);
    assert!(outcome.accepted);
    assert_eq!(outcome.remaining_scans, Some(0));
    let ticket = engine.get_ticket(&TicketId::from("T-1")).unwrap();
    assert_eq!(ticket.status, TicketStatus::Used);
    assert_eq!(ticket.scans.len(), 2);
}

/// Scenario: a DAY_1-only ticket presented on day 2 is denied without
/// mutation.
#[test]
fn wrong_day_rejected_without_mutation() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Day1);

    let outcome = scan(&engine, "T-1", 2);
    assert!(!outcome.accepted);
    assert_eq!(outcome.reason, Some(ReasonCode::NotValidForDay));

    let ticket = engine.get_ticket(&TicketId::from("T-1")).unwrap();
    assert!(ticket.scans.is_empty());
    assert_eq!(ticket.status, TicketStatus::Active);
}

/// Scenario: a cancelled ticket is denied for any day.
#[test]
fn cancelled_ticket_rejects_all_days() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Combo);
    engine.cancel_ticket("T-1", "refund requested").unwrap();

    for day in [1u8, 2, 7] {
        let outcome = scan(&engine, "T-1", day);
        assert!(!outcome.accepted);
        assert_eq!(outcome.reason, Some(ReasonCode::TicketCancelled));
    }

    let ticket = engine.get_ticket(&TicketId::from("T-1")).unwrap();
    assert!(ticket.scans.is_empty());
}

#[test]
fn unknown_ticket_rejected_not_found() {
    let engine = Engine::new();
    let outcome = scan(&engine, "ghost", 1);
    assert!(!outcome.accepted);
    assert_eq!(outcome.reason, Some(ReasonCode::TicketNotFound));
    assert_eq!(outcome.holder_name, None);
}

#[test]
fn fully_used_rejects_before_day_check() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Day1);
    assert!(scan(&engine, "T-1", 1).accepted);

    // Day 2 is outside allowed days, but the used fast-path reports
    // ALREADY_SCANNED — the status check runs first.
    let outcome = scan(&engine, "T-1", 2);
    assert!(!outcome.accepted);
    assert_eq!(outcome.reason, Some(ReasonCode::AlreadyScanned));
}

#[test]
fn scan_accepts_wrapped_and_payload_refs() {
    let engine = Engine::new();
    issue(&engine, "BOOK-42", TicketType::Combo);

    let outcome = scan(&engine, "ticketapp://ticket/BOOK-42", 1);
    assert!(outcome.accepted);

    // Same ticket via full QR payload: day 1 is consumed, day 2 admits
    let outcome = scan(&engine, "EVTKT:BOOK-42:COMBO:2", 1);
    assert!(!outcome.accepted);
    assert_eq!(outcome.reason, Some(ReasonCode::AlreadyScanned));

    let outcome = scan(&engine, "ticketapp://ticket/EVTKT:BOOK-42:COMBO:2", 2);
    assert!(outcome.accepted);
}

#[test]
fn corrupt_payload_is_an_error_not_a_rejection() {
    let engine = Engine::new();
    let result = engine.submit_scan("EVTKT:T-1:VIP:1", Day(1), "op-7", "GATE_A", "dev-12");
    assert_eq!(result.unwrap_err(), TicketError::MalformedPayload);
}

// === Audit trail ===

#[test]
fn every_attempt_logs_exactly_one_entry() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Day1);

    scan(&engine, "T-1", 1); // accepted
    scan(&engine, "T-1", 1); // duplicate
    scan(&engine, "T-1", 2); // fully used
    scan(&engine, "ghost", 1); // not found

    let entries = engine.audit_log().drain_scans();
    assert_eq!(entries.len(), 4);

    assert_eq!(entries[0].result, ScanResult::Success);
    assert_eq!(entries[0].reason, None);
    assert_eq!(entries[1].result, ScanResult::Failed);
    assert_eq!(entries[1].reason, Some(ReasonCode::AlreadyScanned));
    assert_eq!(entries[2].result, ScanResult::Failed);
    assert_eq!(entries[2].reason, Some(ReasonCode::AlreadyScanned));
    assert_eq!(entries[3].result, ScanResult::Failed);
    assert_eq!(entries[3].reason, Some(ReasonCode::TicketNotFound));

    // The two ALREADY_SCANNED sub-cases stay distinguishable in messages
    assert_ne!(entries[1].message, entries[2].message);
}

#[test]
fn log_entries_carry_scan_context() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Day1);
    scan(&engine, "T-1", 1);

    let entries = engine.audit_log().drain_scans();
    let entry = &entries[0];
    assert_eq!(entry.ticket_id, TicketId::from("T-1"));
    assert_eq!(entry.day, Day(1));
    assert_eq!(entry.scanned_by, "op-7");
    assert_eq!(entry.gate, "GATE_A");
    assert_eq!(entry.device_id, "dev-12");
}

// === Manual override ===

#[test]
fn manual_scan_bypasses_day_eligibility() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Day1);

    // Day 2 is not in the ticket's allowed days; staff override admits anyway
    let outcome = engine
        .record_manual_scan("T-1", Day(2), "GATE_B", Utc::now(), "staff-9")
        .unwrap();
    assert!(outcome.success);

    let ticket = engine.get_ticket(&TicketId::from("T-1")).unwrap();
    assert_eq!(ticket.scans.len(), 1);
    assert_eq!(ticket.scans[0].scanned_by, turnstile_rs::MANUAL_ADMIN);
    assert_eq!(ticket.scans[0].device_id, turnstile_rs::ADMIN_PANEL);
    // Same scan-cap rule applies: one scan on a DAY_1 ticket means used
    assert_eq!(ticket.status, TicketStatus::Used);
}

#[test]
fn manual_scan_preserves_one_scan_per_day() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Combo);
    assert!(scan(&engine, "T-1", 1).accepted);

    let outcome = engine
        .record_manual_scan("T-1", Day(1), "GATE_B", Utc::now(), "staff-9")
        .unwrap();
    assert!(!outcome.success);

    let ticket = engine.get_ticket(&TicketId::from("T-1")).unwrap();
    assert_eq!(ticket.scans.len(), 1);
}

#[test]
fn manual_scan_rejects_cancelled_ticket() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Combo);
    engine.cancel_ticket("T-1", "refund").unwrap();

    let outcome = engine
        .record_manual_scan("T-1", Day(1), "GATE_B", Utc::now(), "staff-9")
        .unwrap();
    assert!(!outcome.success);
}

#[test]
fn manual_scan_records_admin_action() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Day1);

    engine
        .record_manual_scan("T-1", Day(1), "GATE_B", Utc::now(), "staff-9")
        .unwrap();

    let actions = engine.audit_log().drain_admin_actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action, "manual_scan");
    assert_eq!(actions[0].performed_by, "staff-9");

    // The scan stream got its entry as well
    assert_eq!(engine.audit_log().scan_count(), 1);
}

#[test]
fn rejected_manual_scan_logs_no_admin_action() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Day1);
    scan(&engine, "T-1", 1);

    engine
        .record_manual_scan("T-1", Day(1), "GATE_B", Utc::now(), "staff-9")
        .unwrap();

    assert_eq!(engine.audit_log().admin_action_count(), 0);
}

// === Lifecycle ===

#[test]
fn cancel_unknown_ticket_returns_not_found() {
    let engine = Engine::new();
    let result = engine.cancel_ticket("ghost", "refund");
    assert_eq!(result.unwrap_err(), TicketError::TicketNotFound);
}

#[test]
fn cancel_used_ticket_rejected() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Day1);
    scan(&engine, "T-1", 1);

    let result = engine.cancel_ticket("T-1", "refund");
    assert_eq!(result.unwrap_err(), TicketError::TicketUsed);
}

/// Scenario: a COMBO ticket that consumed day 1 transfers to a new holder
/// who can still redeem day 2.
#[test]
fn partially_used_combo_transfers_and_redeems() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Combo);
    assert!(scan(&engine, "T-1", 1).accepted);

    engine
        .transfer_ticket("T-1", HolderInfo::new("Grace Hopper", "grace@example.com"))
        .unwrap();

    let ticket = engine.get_ticket(&TicketId::from("T-1")).unwrap();
    assert_eq!(ticket.holder.name, "Grace Hopper");
    assert_eq!(
        ticket.previous_holder.as_ref().map(|h| h.name.as_str()),
        Some("Ada Lovelace")
    );
    assert_eq!(ticket.status, TicketStatus::Active);
    assert_eq!(ticket.scans.len(), 1);

    let outcome = scan(&engine, "T-1", 2);
    assert!(outcome.accepted);
    assert_eq!(outcome.holder_name.as_deref(), Some("Grace Hopper"));
}

#[test]
fn transfer_used_ticket_rejected() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Day1);
    scan(&engine, "T-1", 1);

    let result = engine.transfer_ticket("T-1", HolderInfo::new("X", "x@example.com"));
    assert_eq!(result.unwrap_err(), TicketError::TicketUsed);
}

#[test]
fn transfer_cancelled_ticket_rejected() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Combo);
    engine.cancel_ticket("T-1", "refund").unwrap();

    let result = engine.transfer_ticket("T-1", HolderInfo::new("X", "x@example.com"));
    assert_eq!(result.unwrap_err(), TicketError::TicketCancelled);
}

#[test]
fn cancelled_ticket_stays_cancelled() {
    let engine = Engine::new();
    issue(&engine, "T-1", TicketType::Combo);
    engine.cancel_ticket("T-1", "first").unwrap();

    let result = engine.cancel_ticket("T-1", "second");
    assert_eq!(result.unwrap_err(), TicketError::TicketCancelled);

    let ticket = engine.get_ticket(&TicketId::from("T-1")).unwrap();
    assert_eq!(ticket.cancellation_reason.as_deref(), Some("first"));
}

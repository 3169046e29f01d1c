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

//! Transactional ticket record store.
//!
//! The coordinator requires exactly one thing from the store: transactions
//! touching the same ticket ID serialize (no lost updates), while transactions
//! on different IDs proceed independently. Any keyed store with per-document
//! serializable transactions satisfies [`TicketStore`] — a relational row with
//! `SELECT ... FOR UPDATE`, a document database transaction, or the in-memory
//! optimistic-commit map provided here.

use crate::TicketError;
use crate::base::TicketId;
use crate::ticket::Ticket;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

/// Upper bound on read-validate-write attempts before a transaction is
/// reported as contended.
const MAX_TXN_ATTEMPTS: usize = 8;

/// What a transaction closure decided against its snapshot.
#[derive(Debug)]
pub enum TxnDecision<T> {
    /// Replace the document with `ticket` and return `value` to the caller.
    Commit { ticket: Ticket, value: T },
    /// Return `value` without writing anything.
    ReadOnly { value: T },
}

/// Keyed collection of ticket documents with per-document transactions.
pub trait TicketStore: Send + Sync {
    /// Runs `op` against a snapshot of the document for `id`, committing the
    /// replacement document it returns.
    ///
    /// `op` may be invoked multiple times: when a commit loses a race, the
    /// whole sequence reruns against a fresh snapshot, so the closure must be
    /// pure with respect to the snapshot it is given. A `ReadOnly` decision
    /// never contends and returns on the first attempt.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::StoreContention`] when the commit cannot win
    /// within the retry budget.
    fn run_transaction<T, F>(&self, id: &TicketId, op: F) -> Result<T, TicketError>
    where
        F: FnMut(Option<&Ticket>) -> TxnDecision<T>;

    /// Atomically inserts a newly-issued ticket.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::DuplicateTicket`] if a document already exists
    /// for the ticket's ID.
    fn insert(&self, ticket: Ticket) -> Result<(), TicketError>;

    /// Snapshot of a single document.
    fn get(&self, id: &TicketId) -> Option<Ticket>;

    /// Snapshot of all documents. Report/CLI surface, not a hot path.
    fn tickets(&self) -> Vec<Ticket>;
}

/// Versioned document cell; the version guards optimistic commits.
#[derive(Debug)]
struct Versioned {
    version: u64,
    ticket: Ticket,
}

/// In-memory [`TicketStore`] backed by a concurrent map of versioned
/// documents.
///
/// Reads take a brief per-document lock to clone a snapshot; the transaction
/// closure runs with no lock held; commits re-lock, compare the version seen
/// at read time, and retry the whole sequence on mismatch. Different ticket
/// IDs never serialize against each other.
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    docs: DashMap<TicketId, Mutex<Versioned>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn snapshot(&self, id: &TicketId) -> Option<(u64, Ticket)> {
        self.docs.get(id).map(|cell| {
            let doc = cell.lock();
            (doc.version, doc.ticket.clone())
        })
    }
}

impl TicketStore for MemoryTicketStore {
    fn run_transaction<T, F>(&self, id: &TicketId, mut op: F) -> Result<T, TicketError>
    where
        F: FnMut(Option<&Ticket>) -> TxnDecision<T>,
    {
        for _ in 0..MAX_TXN_ATTEMPTS {
            let snapshot = self.snapshot(id);

            // The closure sees the snapshot only; no lock is held while the
            // decision is computed.
            match op(snapshot.as_ref().map(|(_, ticket)| ticket)) {
                TxnDecision::ReadOnly { value } => return Ok(value),
                TxnDecision::Commit { ticket, value } => match snapshot {
                    Some((read_version, _)) => {
                        if let Some(cell) = self.docs.get(id) {
                            let mut doc = cell.lock();
                            if doc.version == read_version {
                                doc.version += 1;
                                doc.ticket = ticket;
                                return Ok(value);
                            }
                        }
                        // Lost the race; rerun against a fresh snapshot.
                    }
                    None => match self.docs.entry(id.clone()) {
                        Entry::Vacant(entry) => {
                            entry.insert(Mutex::new(Versioned { version: 1, ticket }));
                            return Ok(value);
                        }
                        // A concurrent insert beat us; rerun.
                        Entry::Occupied(_) => {}
                    },
                },
            }
        }
        Err(TicketError::StoreContention)
    }

    fn insert(&self, ticket: Ticket) -> Result<(), TicketError> {
        // Entry API for atomic check-and-insert
        match self.docs.entry(ticket.ticket_id.clone()) {
            Entry::Occupied(_) => Err(TicketError::DuplicateTicket),
            Entry::Vacant(entry) => {
                entry.insert(Mutex::new(Versioned { version: 1, ticket }));
                Ok(())
            }
        }
    }

    fn get(&self, id: &TicketId) -> Option<Ticket> {
        self.snapshot(id).map(|(_, ticket)| ticket)
    }

    fn tickets(&self) -> Vec<Ticket> {
        self.docs
            .iter()
            .map(|cell| cell.value().lock().ticket.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Day, PurchaseId};
    use crate::registry::{TicketType, TicketTypeRegistry};
    use crate::ticket::{HolderInfo, ScanRecord};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ticket(id: &str) -> Ticket {
        let registry = TicketTypeRegistry::standard();
        Ticket::issue(
            TicketId::from(id),
            PurchaseId::from("P-1"),
            registry.config_for(TicketType::Combo).unwrap(),
            HolderInfo::new("Ada Lovelace", "ada@example.com"),
            Utc::now(),
        )
    }

    fn with_scan(mut t: Ticket, day: u8) -> Ticket {
        t.record_scan(ScanRecord {
            day: Day(day),
            timestamp: Utc::now(),
            gate: "GATE_A".into(),
            scanned_by: "op-1".into(),
            device_id: "dev-1".into(),
        });
        t
    }

    #[test]
    fn insert_then_get_round_trips() {
        let store = MemoryTicketStore::new();
        let t = ticket("T-1");
        store.insert(t.clone()).unwrap();
        assert_eq!(store.get(&TicketId::from("T-1")), Some(t));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_insert_rejected() {
        let store = MemoryTicketStore::new();
        store.insert(ticket("T-1")).unwrap();
        let result = store.insert(ticket("T-1"));
        assert_eq!(result, Err(TicketError::DuplicateTicket));
    }

    #[test]
    fn missing_ticket_yields_none_snapshot() {
        let store = MemoryTicketStore::new();
        let seen = store
            .run_transaction(&TicketId::from("nope"), |snapshot| TxnDecision::ReadOnly {
                value: snapshot.is_none(),
            })
            .unwrap();
        assert!(seen);
    }

    #[test]
    fn commit_is_visible_to_subsequent_reads() {
        let store = MemoryTicketStore::new();
        let id = TicketId::from("T-1");
        store.insert(ticket("T-1")).unwrap();

        store
            .run_transaction(&id, |snapshot| {
                let updated = with_scan(snapshot.unwrap().clone(), 1);
                TxnDecision::Commit {
                    ticket: updated,
                    value: (),
                }
            })
            .unwrap();

        let stored = store.get(&id).unwrap();
        assert!(stored.has_scan_for(Day(1)));
    }

    #[test]
    fn read_only_decision_writes_nothing() {
        let store = MemoryTicketStore::new();
        let id = TicketId::from("T-1");
        store.insert(ticket("T-1")).unwrap();
        let before = store.get(&id).unwrap();

        store
            .run_transaction(&id, |_| TxnDecision::ReadOnly { value: () })
            .unwrap();

        assert_eq!(store.get(&id), Some(before));
    }

    #[test]
    fn stale_commit_reruns_on_fresh_snapshot() {
        let store = MemoryTicketStore::new();
        let id = TicketId::from("T-1");
        store.insert(ticket("T-1")).unwrap();

        let calls = AtomicUsize::new(0);
        let attempt = store
            .run_transaction(&id, |snapshot| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    // Interleave a competing commit between this read and its
                    // commit, forcing a version mismatch.
                    store
                        .run_transaction(&id, |inner| TxnDecision::Commit {
                            ticket: with_scan(inner.unwrap().clone(), 1),
                            value: (),
                        })
                        .unwrap();
                }
                TxnDecision::Commit {
                    ticket: with_scan(snapshot.unwrap().clone(), 2),
                    value: n,
                }
            })
            .unwrap();

        // First attempt lost; second attempt ran on the fresh snapshot.
        assert_eq!(attempt, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stored = store.get(&id).unwrap();
        assert!(stored.has_scan_for(Day(1)));
        assert!(stored.has_scan_for(Day(2)));
    }

    #[test]
    fn perpetual_contention_exhausts_retry_budget() {
        let store = MemoryTicketStore::new();
        let id = TicketId::from("T-1");
        store.insert(ticket("T-1")).unwrap();

        let result: Result<(), TicketError> = store.run_transaction(&id, |snapshot| {
            // Every attempt loses to a competing writer.
            store
                .run_transaction(&id, |inner| TxnDecision::Commit {
                    ticket: inner.unwrap().clone(),
                    value: (),
                })
                .unwrap();
            TxnDecision::Commit {
                ticket: snapshot.unwrap().clone(),
                value: (),
            }
        });

        assert_eq!(result, Err(TicketError::StoreContention));
    }
}

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

//! QR payload convention.
//!
//! Gate scanners interoperate on a fixed textual format:
//!
//! ```text
//! EVTKT:<ticket_id>:<type>:<count>
//! ```
//!
//! Depending on client version the payload (or the bare ticket id) may arrive
//! wrapped in a URI scheme, e.g. `ticketapp://ticket/EVTKT:T-1:COMBO:2`; the
//! wrapper is stripped before parsing or lookup.

use crate::TicketError;
use crate::base::TicketId;
use crate::registry::TicketType;

/// Namespace tag leading every QR payload.
pub const QR_NAMESPACE: &str = "EVTKT";

/// Decoded QR payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    pub ticket_id: TicketId,
    pub ticket_type: TicketType,
    /// Scan count the type permits; carried for offline display only, the
    /// ticket record stays authoritative.
    pub count: u32,
}

impl QrPayload {
    /// Encodes the payload in the wire format embedded in digital tickets.
    pub fn encode(&self) -> String {
        format!(
            "{QR_NAMESPACE}:{}:{}:{}",
            self.ticket_id, self.ticket_type, self.count
        )
    }
}

/// Strips an optional URI scheme wrapper from an incoming ticket reference.
///
/// `anything://ticket/<rest>` and `anything://<rest>` both reduce to
/// `<rest>`; an unwrapped reference passes through unchanged.
pub fn normalize_ticket_ref(raw: &str) -> &str {
    let rest = match raw.split_once("://") {
        Some((_, rest)) => rest,
        None => raw,
    };
    rest.strip_prefix("ticket/").unwrap_or(rest)
}

/// Parses a full QR payload, stripping any URI wrapper first.
///
/// # Errors
///
/// Returns [`TicketError::MalformedPayload`] if the namespace tag, field
/// count, type tag, or count field do not match the convention.
pub fn parse(raw: &str) -> Result<QrPayload, TicketError> {
    let payload = normalize_ticket_ref(raw);
    let mut fields = payload.split(':');

    let namespace = fields.next().ok_or(TicketError::MalformedPayload)?;
    if namespace != QR_NAMESPACE {
        return Err(TicketError::MalformedPayload);
    }
    let id = fields.next().filter(|s| !s.is_empty()).ok_or(TicketError::MalformedPayload)?;
    let type_tag = fields.next().ok_or(TicketError::MalformedPayload)?;
    let count = fields
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or(TicketError::MalformedPayload)?;
    if fields.next().is_some() {
        return Err(TicketError::MalformedPayload);
    }

    let ticket_type = type_tag.parse().map_err(|_| TicketError::MalformedPayload)?;
    Ok(QrPayload {
        ticket_id: TicketId::from(id),
        ticket_type,
        count,
    })
}

/// Extracts the lookup key from whatever a gate client submitted: a bare
/// ticket id, a URI-wrapped id, or a full (possibly wrapped) QR payload.
///
/// # Errors
///
/// Returns [`TicketError::MalformedPayload`] only for a reference that claims
/// the payload namespace but does not parse; bare ids pass through untouched.
pub fn extract_ticket_id(raw: &str) -> Result<TicketId, TicketError> {
    let normalized = normalize_ticket_ref(raw);
    if normalized.starts_with(QR_NAMESPACE) && normalized.contains(':') {
        return Ok(parse(normalized)?.ticket_id);
    }
    Ok(TicketId::from(normalized))
}

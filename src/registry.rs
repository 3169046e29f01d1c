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

//! Ticket type configuration registry.
//!
//! Pure lookup table mapping a [`TicketType`] to its price, allowed admission
//! days, and maximum permitted scan count. The registry is consulted once, at
//! issuance, to stamp `allowed_days`/`max_scans` onto the new ticket; the
//! validation engine reads only the stamped values afterwards, so a registry
//! change never retroactively alters an issued ticket's rules.

use crate::TicketError;
use crate::base::Day;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Closed set of ticket types sold for the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketType {
    Day1,
    Day2,
    Combo,
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TicketType::Day1 => "DAY_1",
            TicketType::Day2 => "DAY_2",
            TicketType::Combo => "COMBO",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for TicketType {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAY_1" => Ok(TicketType::Day1),
            "DAY_2" => Ok(TicketType::Day2),
            "COMBO" => Ok(TicketType::Combo),
            _ => Err(TicketError::UnknownTicketType),
        }
    }
}

/// Immutable per-type admission rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTypeConfig {
    pub id: TicketType,
    /// Price in minor currency units.
    pub price: u32,
    /// Admission days this type is valid for. Never empty.
    pub allowed_days: Vec<Day>,
    /// Maximum number of successful admissions. Authoritative cap; not
    /// derived from `allowed_days` even when the two coincide.
    pub max_scans: u32,
}

/// Injected, immutable ticket type lookup table.
///
/// Constructed once at startup (or per test fixture) and shared by value;
/// holds no interior mutability and performs no I/O.
#[derive(Debug, Clone)]
pub struct TicketTypeRegistry {
    configs: HashMap<TicketType, TicketTypeConfig>,
}

impl TicketTypeRegistry {
    /// Builds a registry from explicit configs.
    pub fn new(configs: impl IntoIterator<Item = TicketTypeConfig>) -> Self {
        Self {
            configs: configs.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    /// The standard two-day event catalog: two single-day types and a combo
    /// pass covering both days.
    pub fn standard() -> Self {
        Self::new([
            TicketTypeConfig {
                id: TicketType::Day1,
                price: 50_00,
                allowed_days: vec![Day(1)],
                max_scans: 1,
            },
            TicketTypeConfig {
                id: TicketType::Day2,
                price: 50_00,
                allowed_days: vec![Day(2)],
                max_scans: 1,
            },
            TicketTypeConfig {
                id: TicketType::Combo,
                price: 90_00,
                allowed_days: vec![Day(1), Day(2)],
                max_scans: 2,
            },
        ])
    }

    /// Looks up the config for a ticket type.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::UnknownTicketType`] if the type is not in the
    /// registry.
    pub fn config_for(&self, ticket_type: TicketType) -> Result<&TicketTypeConfig, TicketError> {
        self.configs
            .get(&ticket_type)
            .ok_or(TicketError::UnknownTicketType)
    }
}

impl Default for TicketTypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

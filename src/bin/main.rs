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

use chrono::Utc;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use turnstile_rs::{Day, Engine, HolderInfo, PurchaseId, TicketId, TicketType};

/// Turnstile - Replay gate action CSV files
///
/// Reads ticket issuance and gate actions from a CSV file (e.g. an offline
/// gate-device log) and outputs final ticket states to stdout.
/// Supports issue, scan, manual, cancel, and transfer actions.
#[derive(Parser, Debug)]
#[command(name = "turnstile-rs")]
#[command(about = "A gate admission engine that replays ticket action CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with gate actions
    ///
    /// Expected format: action,ticket,purchase,type,holder,email,day,gate,device,note
    /// Example: cargo run -- gate_log.csv > tickets.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // Open input file
    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    // Replay actions from CSV
    let engine = match process_actions(BufReader::new(file)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error processing gate actions: {}", e);
            process::exit(1);
        }
    };

    // Write results to stdout
    if let Err(e) = write_tickets(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `action, ticket, purchase, type, holder, email, day, gate, device, note`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    action: String,
    ticket: String,
    purchase: Option<String>,
    #[serde(rename = "type")]
    ticket_type: Option<String>,
    holder: Option<String>,
    email: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    day: Option<u8>,
    gate: Option<String>,
    device: Option<String>,
    note: Option<String>,
}

/// One replayable gate action.
#[derive(Debug)]
enum GateAction {
    Issue {
        ticket: TicketId,
        purchase: PurchaseId,
        ticket_type: TicketType,
        holder: HolderInfo,
    },
    Scan {
        ticket: String,
        day: Day,
        gate: String,
        device: String,
    },
    Manual {
        ticket: String,
        day: Day,
        location: String,
        performed_by: String,
    },
    Cancel {
        ticket: String,
        reason: String,
    },
    Transfer {
        ticket: String,
        new_holder: HolderInfo,
    },
}

impl CsvRecord {
    /// Converts the CSV record into a gate action.
    ///
    /// Returns `None` for unknown actions or missing required fields.
    fn into_action(self) -> Option<GateAction> {
        match self.action.to_lowercase().as_str() {
            "issue" => {
                let ticket_type = self.ticket_type?.parse().ok()?;
                Some(GateAction::Issue {
                    ticket: TicketId::new(self.ticket),
                    purchase: PurchaseId(self.purchase?),
                    ticket_type,
                    holder: HolderInfo::new(self.holder?, self.email?),
                })
            }
            "scan" => Some(GateAction::Scan {
                ticket: self.ticket,
                day: Day(self.day?),
                gate: self.gate?,
                device: self.device.unwrap_or_else(|| "unknown".to_string()),
            }),
            "manual" => Some(GateAction::Manual {
                ticket: self.ticket,
                day: Day(self.day?),
                location: self.gate?,
                performed_by: self.note.unwrap_or_else(|| "unknown".to_string()),
            }),
            "cancel" => Some(GateAction::Cancel {
                ticket: self.ticket,
                reason: self.note.unwrap_or_else(|| "unspecified".to_string()),
            }),
            "transfer" => Some(GateAction::Transfer {
                ticket: self.ticket,
                new_holder: HolderInfo::new(self.holder?, self.email?),
            }),
            _ => None,
        }
    }
}

/// Replays gate actions from a CSV reader.
///
/// Streaming parse: arbitrarily large logs never load fully into memory.
/// Malformed rows and per-ticket failures (duplicate taps, cancelled
/// tickets) are skipped — a replay reproduces final state, it does not
/// re-litigate rejections.
///
/// # CSV Format
///
/// Expected columns: `action, ticket, purchase, type, holder, email, day, gate, device, note`
/// - `action`: issue, scan, manual, cancel, or transfer
/// - `type`: DAY_1, DAY_2, or COMBO (issue only)
/// - `day`: admission day number (scan/manual only)
/// - `note`: cancellation reason or manual-scan operator
///
/// # Example
///
/// ```csv
/// action,ticket,purchase,type,holder,email,day,gate,device,note
/// issue,T-1,P-1,COMBO,Ada Lovelace,ada@example.com,,,,
/// scan,T-1,,,,,1,GATE_A,dev-1,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn process_actions<R: Read>(reader: R) -> Result<Engine, csv::Error> {
    let engine = Engine::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " scan "
        .flexible(true) // Allow trailing empty columns
        .has_headers(true) // Skip first row as header
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                // Skip malformed rows
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", e);
                continue;
            }
        };

        let Some(action) = record.into_action() else {
            #[cfg(debug_assertions)]
            eprintln!("Skipping invalid gate action record");
            continue;
        };

        let outcome = match action {
            GateAction::Issue {
                ticket,
                purchase,
                ticket_type,
                holder,
            } => engine
                .issue_ticket(ticket, purchase, ticket_type, holder)
                .map(|_| ()),
            GateAction::Scan {
                ticket,
                day,
                gate,
                device,
            } => engine
                .submit_scan(&ticket, day, "replay", &gate, &device)
                .map(|_| ()),
            GateAction::Manual {
                ticket,
                day,
                location,
                performed_by,
            } => engine
                .record_manual_scan(&ticket, day, &location, Utc::now(), &performed_by)
                .map(|_| ()),
            GateAction::Cancel { ticket, reason } => engine.cancel_ticket(&ticket, &reason),
            GateAction::Transfer { ticket, new_holder } => {
                engine.transfer_ticket(&ticket, new_holder)
            }
        };

        if let Err(e) = outcome {
            #[cfg(debug_assertions)]
            eprintln!("Skipping action: {}", e);
        }
    }

    Ok(engine)
}

/// Output row for a single ticket.
///
/// Columns: `ticket, type, status, holder, scans, remaining`
#[derive(Debug, Serialize)]
struct TicketRow {
    ticket: String,
    #[serde(rename = "type")]
    ticket_type: String,
    status: String,
    holder: String,
    scans: usize,
    remaining: u32,
}

/// Writes final ticket states to a CSV writer.
///
/// # Example
///
/// ```csv
/// ticket,type,status,holder,scans,remaining
/// T-1,COMBO,ACTIVE,Ada Lovelace,1,1
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_tickets<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    let mut tickets = engine.tickets();
    tickets.sort_by(|a, b| a.ticket_id.0.cmp(&b.ticket_id.0));

    for ticket in tickets {
        wtr.serialize(TicketRow {
            ticket: ticket.ticket_id.to_string(),
            ticket_type: ticket.ticket_type.to_string(),
            status: status_label(&ticket),
            holder: ticket.holder.name.clone(),
            scans: ticket.scans.len(),
            remaining: ticket.remaining_scans(),
        })?;
    }

    // Flush to ensure all data is written
    wtr.flush()?;
    Ok(())
}

fn status_label(ticket: &turnstile_rs::Ticket) -> String {
    match ticket.status {
        turnstile_rs::TicketStatus::Active => "ACTIVE",
        turnstile_rs::TicketStatus::Used => "USED",
        turnstile_rs::TicketStatus::Cancelled => "CANCELLED",
    }
    .to_string()
}

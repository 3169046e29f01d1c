//! Simple REST API server example for the admission engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /tickets` - Issue a ticket (purchase-verification boundary)
//! - `POST /scans` - Submit a gate scan
//! - `POST /scans/manual` - Record a staff override scan
//! - `POST /tickets/:id/cancel` - Cancel a ticket
//! - `POST /tickets/:id/transfer` - Transfer a ticket to a new holder
//! - `GET /tickets/:id` - Get a ticket by ID
//!
//! ## Example Usage
//!
//! ```bash
//! # Issue
//! curl -X POST http://localhost:3000/tickets \
//!   -H "Content-Type: application/json" \
//!   -d '{"ticket_id": "T-1", "purchase_id": "P-1", "type": "COMBO", "holder_name": "Ada Lovelace", "holder_email": "ada@example.com"}'
//!
//! # Scan at the gate
//! curl -X POST http://localhost:3000/scans \
//!   -H "Content-Type: application/json" \
//!   -d '{"ticket": "T-1", "day": 1, "scanned_by": "op-7", "gate": "GATE_A", "device_id": "dev-12"}'
//!
//! # Get ticket
//! curl http://localhost:3000/tickets/T-1
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use turnstile_rs::{
    Day, Engine, HolderInfo, ManualScanOutcome, PurchaseId, ScanOutcome, TicketError, TicketId,
    TicketStatus, TicketType,
};

// === Request/Response DTOs ===

/// Request body for issuing a ticket.
#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub ticket_id: String,
    pub purchase_id: String,
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    pub holder_name: String,
    pub holder_email: String,
    #[serde(default)]
    pub holder_phone: Option<String>,
}

/// Request body for a gate scan.
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// Bare ticket id, URI-wrapped id, or full QR payload.
    pub ticket: String,
    pub day: u8,
    pub scanned_by: String,
    pub gate: String,
    pub device_id: String,
}

/// Request body for a staff override scan.
#[derive(Debug, Deserialize)]
pub struct ManualScanRequest {
    pub ticket: String,
    pub day: u8,
    pub location: String,
    pub performed_by: String,
}

/// Request body for cancellation.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

/// Request body for transfer.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub new_holder_name: String,
    pub new_holder_email: String,
    #[serde(default)]
    pub new_holder_phone: Option<String>,
}

/// Response body for ticket information.
#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub ticket_id: String,
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    pub status: TicketStatus,
    pub holder_name: String,
    pub scans: usize,
    pub remaining_scans: u32,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the admission engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting `TicketError` into HTTP responses.
pub struct AppError(TicketError);

impl From<TicketError> for AppError {
    fn from(err: TicketError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            TicketError::UnknownTicketType => (StatusCode::BAD_REQUEST, "UNKNOWN_TICKET_TYPE"),
            TicketError::DuplicateTicket => (StatusCode::CONFLICT, "DUPLICATE_TICKET"),
            TicketError::TicketNotFound => (StatusCode::NOT_FOUND, "TICKET_NOT_FOUND"),
            TicketError::TicketCancelled => (StatusCode::CONFLICT, "TICKET_CANCELLED"),
            TicketError::TicketUsed => (StatusCode::CONFLICT, "TICKET_USED"),
            TicketError::CancellationNotAllowed => {
                (StatusCode::CONFLICT, "CANCELLATION_NOT_ALLOWED")
            }
            TicketError::MalformedPayload => (StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD"),
            TicketError::StoreContention => (StatusCode::SERVICE_UNAVAILABLE, "STORE_CONTENTION"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /tickets - Issue a new ticket.
async fn issue_ticket(
    State(state): State<AppState>,
    Json(request): Json<IssueRequest>,
) -> Result<StatusCode, AppError> {
    let mut holder = HolderInfo::new(request.holder_name, request.holder_email);
    holder.phone = request.holder_phone;
    state.engine.issue_ticket(
        TicketId::new(request.ticket_id),
        PurchaseId(request.purchase_id),
        request.ticket_type,
        holder,
    )?;
    Ok(StatusCode::CREATED)
}

/// POST /scans - Submit a gate scan.
async fn submit_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanOutcome>, AppError> {
    let outcome = state.engine.submit_scan(
        &request.ticket,
        Day(request.day),
        &request.scanned_by,
        &request.gate,
        &request.device_id,
    )?;
    Ok(Json(outcome))
}

/// POST /scans/manual - Record a staff override scan.
async fn manual_scan(
    State(state): State<AppState>,
    Json(request): Json<ManualScanRequest>,
) -> Result<Json<ManualScanOutcome>, AppError> {
    let outcome = state.engine.record_manual_scan(
        &request.ticket,
        Day(request.day),
        &request.location,
        Utc::now(),
        &request.performed_by,
    )?;
    Ok(Json(outcome))
}

/// POST /tickets/:id/cancel - Cancel a ticket.
async fn cancel_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CancelRequest>,
) -> Result<StatusCode, AppError> {
    state.engine.cancel_ticket(&id, &request.reason)?;
    Ok(StatusCode::OK)
}

/// POST /tickets/:id/transfer - Transfer a ticket to a new holder.
async fn transfer_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TransferRequest>,
) -> Result<StatusCode, AppError> {
    let mut holder = HolderInfo::new(request.new_holder_name, request.new_holder_email);
    holder.phone = request.new_holder_phone;
    state.engine.transfer_ticket(&id, holder)?;
    Ok(StatusCode::OK)
}

/// GET /tickets/:id - Get ticket by ID.
async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TicketResponse>, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .get_ticket(&TicketId::new(id))
        .map(|ticket| {
            Json(TicketResponse {
                ticket_id: ticket.ticket_id.to_string(),
                ticket_type: ticket.ticket_type,
                status: ticket.status,
                holder_name: ticket.holder.name.clone(),
                scans: ticket.scans.len(),
                remaining_scans: ticket.remaining_scans(),
            })
        })
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "Ticket not found".to_string(),
                    code: "TICKET_NOT_FOUND".to_string(),
                }),
            )
        })
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/tickets", post(issue_ticket))
        .route("/scans", post(submit_scan))
        .route("/scans/manual", post(manual_scan))
        .route("/tickets/{id}/cancel", post(cancel_ticket))
        .route("/tickets/{id}/transfer", post(transfer_ticket))
        .route("/tickets/{id}", get(get_ticket))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turnstile_rs=debug,server=info".into()),
        )
        .init();

    let state = AppState {
        engine: Arc::new(Engine::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Turnstile API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST /tickets               - Issue a ticket");
    println!("  POST /scans                 - Submit a gate scan");
    println!("  POST /scans/manual          - Record a staff override scan");
    println!("  POST /tickets/:id/cancel    - Cancel a ticket");
    println!("  POST /tickets/:id/transfer  - Transfer a ticket");
    println!("  GET  /tickets/:id           - Get ticket by ID");

    axum::serve(listener, app).await.unwrap();
}

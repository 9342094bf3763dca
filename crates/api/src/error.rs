//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use ledger::LedgerError;
use saga::{InventoryError, SagaError};

/// Failures while wiring the server together at startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("ledger setup failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("inventory client setup failed: {0}")]
    Inventory(#[from] InventoryError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// No credentials to forward to the inventory service.
    Unauthorized(String),
    /// Domain validation error.
    Domain(DomainError),
    /// Ledger read or write error outside a saga.
    Ledger(LedgerError),
    /// Saga execution error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Domain(err) => (domain_status(&err), err.to_string()),
            ApiError::Ledger(err) => ledger_error_to_response(err),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::LinkChanged(_) => StatusCode::CONFLICT,
        DomainError::UnpricedLot { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::InvalidQuantity { .. }
        | DomainError::MissingId
        | DomainError::InvalidMealType(_) => StatusCode::BAD_REQUEST,
    }
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        _ if err.is_not_found() => StatusCode::NOT_FOUND,
        LedgerError::DuplicateId(_) => StatusCode::CONFLICT,
        LedgerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ledger_error_to_response(err: LedgerError) -> (StatusCode, String) {
    let status = ledger_status(&err);
    if status.is_server_error() {
        tracing::error!(error = %err, "ledger error");
    }
    (status, err.to_string())
}

fn inventory_status(err: &InventoryError) -> StatusCode {
    match err {
        InventoryError::NotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::RemoteRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        InventoryError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InventoryError::Network(_) | InventoryError::Decode(_) => StatusCode::BAD_GATEWAY,
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    let status = match &err {
        SagaError::Domain(domain) => domain_status(domain),
        SagaError::Ledger { source, .. } => ledger_status(source),
        SagaError::Inventory { source, .. } => inventory_status(source),
        SagaError::Cancelled { .. } => StatusCode::GATEWAY_TIMEOUT,
        // Already logged by the saga with full context.
        SagaError::CompensationFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

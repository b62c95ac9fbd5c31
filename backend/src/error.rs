//! Error handling for the fuel-station stock server
//!
//! Provides consistent error responses in English and French

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{MovementKind, StockError};
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions: requires {0}")]
    InsufficientPermissions(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_fr: String,
    },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Stock errors
    #[error("Configuration error on tank {tank_id}: {message}")]
    Configuration { tank_id: Uuid, message: String },

    #[error("Insufficient stock in tank {tank_id}")]
    InsufficientStock {
        tank_id: Uuid,
        kind: MovementKind,
        quantity: Decimal,
        stock_before: Decimal,
        stock_after: Decimal,
    },

    #[error("Capacity exceeded in tank {tank_id}")]
    CapacityExceeded {
        tank_id: Uuid,
        kind: MovementKind,
        quantity: Decimal,
        stock_before: Decimal,
        stock_after: Decimal,
        capacity: Decimal,
    },

    #[error("Initial state of tank {tank_id} is immutable")]
    ImmutableState {
        tank_id: Uuid,
        movement_count: i64,
        bookkeeping_count: i64,
    },

    #[error("Tank {0} has no initial state")]
    NotConfigured(Uuid),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::Configuration { tank_id, message } => {
                AppError::Configuration { tank_id, message }
            }
            StockError::Validation { field, message } => AppError::Validation {
                message_fr: format!("Donnée invalide ({}): {}", field, message),
                field,
                message,
            },
            StockError::InsufficientStock {
                tank_id,
                kind,
                quantity,
                stock_before,
                stock_after,
            } => AppError::InsufficientStock {
                tank_id,
                kind,
                quantity,
                stock_before,
                stock_after,
            },
            StockError::CapacityExceeded {
                tank_id,
                kind,
                quantity,
                stock_before,
                stock_after,
                capacity,
            } => AppError::CapacityExceeded {
                tank_id,
                kind,
                quantity,
                stock_before,
                stock_after,
                capacity,
            },
            StockError::ImmutableState {
                tank_id,
                movement_count,
                bookkeeping_count,
            } => AppError::ImmutableState {
                tank_id,
                movement_count,
                bookkeeping_count,
            },
            StockError::NotConfigured { tank_id } => AppError::NotConfigured(tank_id),
            StockError::AlreadyInitialized { tank_id } => {
                AppError::DuplicateEntry(format!("initial state for tank {}", tank_id))
            }
            StockError::NotFound(resource) => AppError::NotFound(resource),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_default();
        AppError::Validation {
            message_fr: format!("Donnée invalide: {}", field),
            message: errors.to_string(),
            field,
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_fr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail {
                    code: "INVALID_TOKEN".to_string(),
                    message_en: "Invalid token".to_string(),
                    message_fr: "Jeton invalide".to_string(),
                    field: None,
                },
            ),
            AppError::InsufficientPermissions(permission) => (
                StatusCode::FORBIDDEN,
                ErrorDetail {
                    code: "INSUFFICIENT_PERMISSIONS".to_string(),
                    message_en: format!("Permission denied: requires {}", permission),
                    message_fr: format!("Accès refusé: permission {} requise", permission),
                    field: None,
                },
            ),
            AppError::Validation {
                field,
                message,
                message_fr,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message_en: message.clone(),
                    message_fr: message_fr.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::DuplicateEntry(what) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "DUPLICATE_ENTRY".to_string(),
                    message_en: format!("A record already exists: {}", what),
                    message_fr: format!("Un enregistrement existe déjà: {}", what),
                    field: None,
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message_en: format!("{} not found", resource),
                    message_fr: format!("{} introuvable", resource),
                    field: None,
                },
            ),
            AppError::Configuration { tank_id, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "CONFIGURATION_ERROR".to_string(),
                    message_en: format!("Tank {} is not usable: {}", tank_id, message),
                    message_fr: format!("La cuve {} est mal configurée (barremage): {}", tank_id, message),
                    field: Some("calibration".to_string()),
                },
            ),
            AppError::InsufficientStock {
                tank_id,
                kind,
                quantity,
                stock_before,
                stock_after,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "INSUFFICIENT_STOCK".to_string(),
                    message_en: format!(
                        "Not enough fuel in tank {}: {} of {} L from {} L would leave {} L",
                        tank_id, kind, quantity, stock_before, stock_after
                    ),
                    message_fr: format!(
                        "Stock insuffisant dans la cuve {}: {} de {} L sur {} L donnerait {} L",
                        tank_id, kind, quantity, stock_before, stock_after
                    ),
                    field: Some("quantity".to_string()),
                },
            ),
            AppError::CapacityExceeded {
                tank_id,
                kind,
                quantity,
                stock_before,
                stock_after,
                capacity,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "CAPACITY_EXCEEDED".to_string(),
                    message_en: format!(
                        "Tank {} capacity is {} L: {} of {} L from {} L would reach {} L",
                        tank_id, capacity, kind, quantity, stock_before, stock_after
                    ),
                    message_fr: format!(
                        "Capacité de la cuve {} ({} L) dépassée: {} de {} L sur {} L donnerait {} L",
                        tank_id, capacity, kind, quantity, stock_before, stock_after
                    ),
                    field: Some("quantity".to_string()),
                },
            ),
            AppError::ImmutableState {
                tank_id,
                movement_count,
                bookkeeping_count,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "IMMUTABLE_STATE".to_string(),
                    message_en: format!(
                        "Initial state of tank {} can no longer be changed: {} movement(s) recorded ({} bookkeeping)",
                        tank_id, movement_count, bookkeeping_count
                    ),
                    message_fr: format!(
                        "L'état initial de la cuve {} n'est plus modifiable: {} mouvement(s) enregistré(s) ({} d'écriture technique)",
                        tank_id, movement_count, bookkeeping_count
                    ),
                    field: None,
                },
            ),
            AppError::NotConfigured(tank_id) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "NOT_CONFIGURED".to_string(),
                    message_en: format!("Tank {} has no initial state", tank_id),
                    message_fr: format!("La cuve {} n'a pas d'état initial", tank_id),
                    field: None,
                },
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message_en: "A database error occurred".to_string(),
                    message_fr: "Une erreur de base de données est survenue".to_string(),
                    field: None,
                },
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message_en: "An internal server error occurred".to_string(),
                    message_fr: "Erreur interne du serveur".to_string(),
                    field: None,
                },
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.status_and_detail();

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!("Rejected request: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

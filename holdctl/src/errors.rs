use crate::db::errors::DbError;
use crate::db::models::reservations::ReservationState;
use crate::types::{EventId, ReservationId};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found (or not visible to the caller)
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Event exists but does not accept new holds
    #[error("Event {event_id} is not active")]
    EventInactive { event_id: EventId },

    /// Event has no available capacity left
    #[error("Event {event_id} has no available capacity")]
    NoCapacity { event_id: EventId },

    /// Reservation is not in a state that allows the requested transition
    #[error("Reservation {reservation_id} is in state {state}, expected HOLD")]
    InvalidState {
        reservation_id: ReservationId,
        state: ReservationState,
    },

    /// Hold deadline has passed, whether or not the sweeper has reclaimed it yet
    #[error("Reservation {reservation_id} expired at {expires_at}")]
    Expired {
        reservation_id: ReservationId,
        expires_at: DateTime<Utc>,
    },

    /// The capacity ledger disagrees with itself. Never clamped; the transaction is abandoned.
    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::BadRequest { .. }
            | Error::EventInactive { .. }
            | Error::NoCapacity { .. }
            | Error::InvalidState { .. }
            | Error::Expired { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvariantViolation { .. } | Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::EventInactive { .. } => "Event is not active".to_string(),
            Error::NoCapacity { .. } => "No capacity".to_string(),
            Error::InvalidState { .. } => "Reservation not in HOLD state".to_string(),
            Error::Expired { .. } => "Reservation has expired".to_string(),
            Error::InvariantViolation { .. } | Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }

    /// Whether this is an expected outcome of a well-formed request (as opposed to a fault)
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::EventInactive { .. } | Error::NoCapacity { .. } | Error::InvalidState { .. } | Error::Expired { .. }
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::InvariantViolation { .. } | Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            err if err.is_business_rule() => {
                tracing::debug!("Request rejected: {}", err);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rule_failures_are_client_errors() {
        let cases = [
            Error::EventInactive { event_id: 1 },
            Error::NoCapacity { event_id: 1 },
            Error::InvalidState {
                reservation_id: 7,
                state: ReservationState::Confirmed,
            },
            Error::Expired {
                reservation_id: 7,
                expires_at: Utc::now(),
            },
        ];

        for err in cases {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "{err}");
            assert!(err.is_business_rule());
        }
    }

    #[test]
    fn invariant_violation_hides_details() {
        let err = Error::InvariantViolation {
            message: "event 3: available_capacity 11 would exceed capacity 10".to_string(),
        };

        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "Internal server error");
        assert!(!err.is_business_rule());
    }

    #[test]
    fn responses_carry_status_and_user_message() {
        let business = Error::NoCapacity { event_id: 1 };
        assert!(business.is_business_rule());
        assert_eq!(business.into_response().status(), StatusCode::BAD_REQUEST);

        let malformed = Error::BadRequest {
            message: "Event title cannot be empty".to_string(),
        };
        assert!(!malformed.is_business_rule());
        assert_eq!(malformed.into_response().status(), StatusCode::BAD_REQUEST);

        let missing = Error::NotFound {
            resource: "Reservation".to_string(),
            id: "9".to_string(),
        };
        assert!(missing.is_business_rule());
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let unauthenticated = Error::Unauthenticated { message: None };
        assert!(!unauthenticated.is_business_rule());
        assert_eq!(unauthenticated.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn messages_match_api_contract() {
        assert_eq!(Error::NoCapacity { event_id: 1 }.user_message(), "No capacity");
        assert_eq!(Error::EventInactive { event_id: 1 }.user_message(), "Event is not active");
        assert_eq!(
            Error::NotFound {
                resource: "Event".to_string(),
                id: "42".to_string()
            }
            .user_message(),
            "Event with ID 42 not found"
        );
    }
}

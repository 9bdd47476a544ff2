//! Application error taxonomy.
//!
//! Every data-access failure is converted into one of these variants at the
//! component boundary; handlers never see a raw transport error. An empty
//! slot list is a legitimate result, not an error, and never appears here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::flow::FlowError;
use crate::models::ApiResponse;

#[derive(Error, Debug)]
pub enum AppError {
    /// Unknown studio slug, or a studio with no active services.
    #[error("studio not found")]
    ConfigurationNotFound,

    /// Malformed "HH:MM" text. For stored schedule data this is treated as
    /// a configuration defect and the day is rendered unavailable instead.
    #[error("invalid time format: {0:?}")]
    InvalidTimeFormat(String),

    /// The chosen time is not in the current slot list for that date.
    #[error("selected time is no longer available")]
    StaleSlotSelection,

    /// The storage-level slot guard rejected the insert: another booking
    /// for the same professional, date and time landed first.
    #[error("time slot was just taken")]
    SlotTaken,

    #[error("{0}")]
    Validation(String),

    /// The signal charge could not be created; the appointment is
    /// released and the client may retry.
    #[error("could not start the signal payment, try again")]
    Payment(String),

    #[error("failed to save client record")]
    ClientPersistence(#[source] sqlx::Error),

    #[error("failed to save appointment")]
    AppointmentPersistence(#[source] sqlx::Error),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl From<FlowError> for AppError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::StaleSlotSelection | FlowError::SlotsNotLoaded => {
                AppError::StaleSlotSelection
            }
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::ConfigurationNotFound => StatusCode::NOT_FOUND,
            AppError::InvalidTimeFormat(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::StaleSlotSelection | AppError::SlotTaken => StatusCode::CONFLICT,
            AppError::Payment(_)
            | AppError::ClientPersistence(_)
            | AppError::AppointmentPersistence(_)
            | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {:#}", anyhow::Error::from(self));
            let body = ApiResponse::<()>::error("Something went wrong. Try again.");
            return (status, Json(body)).into_response();
        }
        let body = ApiResponse::<()>::error(self.to_string());
        (status, Json(body)).into_response()
    }
}

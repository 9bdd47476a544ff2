//! Studio-side appointment management.
//!
//! The booking flow never advances an appointment's status after creation;
//! these endpoints (plus the payment webhook) are the only places that do.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::{auth, booking, models::*, AppState};

type HandlerError = (StatusCode, Json<ApiResponse<()>>);

const DETAIL_SELECT: &str = "SELECT a.id, a.date, a.time, a.status, a.payment_status,
            s.name AS service_name, s.duration_min, s.price_cents,
            p.name AS professional_name,
            c.name AS client_name, c.phone AS client_phone,
            a.created_at
     FROM appointments a
     JOIN services s ON s.id = a.service_id
     JOIN professionals p ON p.id = a.professional_id
     JOIN clients c ON c.id = a.client_id";

fn check_admin(headers: &axum::http::HeaderMap, state: &AppState) -> Result<(), HandlerError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    auth::require_admin(auth_header, state)
}

fn db_error(context: &str) -> impl Fn(sqlx::Error) -> HandlerError + '_ {
    move |e| {
        tracing::error!("{}: {}", context, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    }
}

/// GET /api/admin/appointments?date= | ?from=&to= — appointment listing.
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Json<ApiResponse<Vec<AppointmentDetail>>>, HandlerError> {
    check_admin(&headers, &state)?;

    let appointments = if let Some(date) = &query.date {
        sqlx::query_as::<_, AppointmentDetail>(&format!(
            "{} WHERE a.date = ? ORDER BY a.time ASC",
            DETAIL_SELECT
        ))
        .bind(date)
        .fetch_all(&state.db)
        .await
    } else if let (Some(from), Some(to)) = (&query.from, &query.to) {
        sqlx::query_as::<_, AppointmentDetail>(&format!(
            "{} WHERE a.date >= ? AND a.date <= ? ORDER BY a.date ASC, a.time ASC",
            DETAIL_SELECT
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&state.db)
        .await
    } else {
        sqlx::query_as::<_, AppointmentDetail>(&format!(
            "{} WHERE a.date >= date('now') ORDER BY a.date ASC, a.time ASC",
            DETAIL_SELECT
        ))
        .fetch_all(&state.db)
        .await
    }
    .map_err(db_error("list_appointments"))?;

    Ok(Json(ApiResponse::success(appointments)))
}

/// POST /api/admin/appointments/{id}/confirm — pending → confirmed.
pub async fn confirm_appointment(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, HandlerError> {
    check_admin(&headers, &state)?;
    advance_status(&state, id, AppointmentStatus::Pending, AppointmentStatus::Confirmed).await
}

/// POST /api/admin/appointments/{id}/complete — confirmed → completed.
pub async fn complete_appointment(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, HandlerError> {
    check_admin(&headers, &state)?;
    advance_status(
        &state,
        id,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
    )
    .await
}

/// POST /api/admin/appointments/{id}/cancel — releases the slot.
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, HandlerError> {
    check_admin(&headers, &state)?;

    let cancelled = booking::cancel(&state.db, id).await.map_err(|e| {
        tracing::error!("cancel_appointment {}: {}", id, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    if !cancelled {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Appointment not found or already cancelled")),
        ));
    }

    Ok(Json(ApiResponse::success(())))
}

async fn advance_status(
    state: &AppState,
    id: i64,
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<Json<ApiResponse<()>>, HandlerError> {
    let result = sqlx::query("UPDATE appointments SET status = ? WHERE id = ? AND status = ?")
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .execute(&state.db)
        .await
        .map_err(db_error("advance_status"))?;

    if result.rows_affected() == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!(
                "Appointment not found in status '{}'",
                from.as_str()
            ))),
        ));
    }

    Ok(Json(ApiResponse::success(())))
}

//! Public per-studio booking surface.
//!
//! Three endpoints: the studio snapshot, the slot list for a
//! (professional, service, date) triple, and booking creation. Booking
//! creation drives the same `BookingFlow` machine a client UI steps
//! through, so every guard (service/professional consistency, blocked
//! dates, slot membership against fresh occupancy, client info shape) is
//! re-validated server-side on submission.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::{
    booking,
    error::AppError,
    flow::BookingFlow,
    models::*,
    notify::{self, BookingSummary},
    schedule::{self, TimeInterval},
    studio::{self, SnapshotView, StudioSnapshot},
    AppState,
};

/// GET /api/public/{slug} — configuration snapshot for the booking page.
pub async fn studio_snapshot(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<SnapshotView>>, AppError> {
    let snapshot = studio::load_snapshot(&state.db, &slug).await?;
    Ok(Json(ApiResponse::success(snapshot.view())))
}

/// GET /api/public/{slug}/slots?professional_id=&service_id=&date= —
/// bookable start times. An empty list is a legitimate answer (closed or
/// blocked day, unknown service, or simply no openings).
pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<ApiResponse<SlotsResponse>>, AppError> {
    let snapshot = studio::load_snapshot(&state.db, &slug).await?;

    let empty = |date: &str| {
        Json(ApiResponse::success(SlotsResponse {
            date: date.to_string(),
            times: Vec::new(),
        }))
    };

    if snapshot.is_blocked(&query.date) {
        return Ok(empty(&query.date));
    }

    let day = snapshot.day_for(&query.date)?;
    let Some(service) = snapshot
        .services
        .iter()
        .find(|s| s.id == query.service_id && s.professional_id == query.professional_id)
    else {
        return Ok(empty(&query.date));
    };

    let occupancy = fetch_occupancy(&state, query.professional_id, &query.date).await?;
    let duration = u16::try_from(service.duration_min).unwrap_or(0);
    let buffer = u16::try_from(snapshot.studio.buffer_min).unwrap_or(schedule::DEFAULT_BUFFER_MIN);
    let slots = schedule::compute_slots(
        day,
        &occupancy.appointments,
        &occupancy.blocks,
        duration,
        buffer,
    );

    Ok(Json(ApiResponse::success(SlotsResponse {
        date: query.date,
        times: slots.into_iter().map(schedule::to_clock).collect(),
    })))
}

/// POST /api/public/{slug}/bookings — create an appointment.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<Json<ApiResponse<CreateBookingResponse>>, AppError> {
    let snapshot = studio::load_snapshot(&state.db, &slug).await?;
    let time_min = schedule::to_minutes(&body.time)?;

    // Walk the wizard forward; any guard failure surfaces as a 4xx.
    let flow = BookingFlow::new(snapshot.flow_context())
        .select_service(body.service_id)?
        .choose_professional(body.professional_id)?;
    let (flow, slot_query) = flow.select_date(&body.date)?;

    let day = snapshot.day_for(&slot_query.date)?;
    let occupancy = fetch_occupancy(&state, slot_query.professional_id, &slot_query.date).await?;
    let slots = schedule::compute_slots(
        day,
        &occupancy.appointments,
        &occupancy.blocks,
        slot_query.duration_min,
        slot_query.buffer_min,
    );

    let flow = flow
        .apply_slots(&slot_query, slots)
        .select_time(time_min)?
        .enter_client_info(&body.client_name, &body.client_phone, &body.client_email)?;
    let request = flow
        .request()
        .cloned()
        .ok_or_else(|| AppError::Validation("booking flow did not reach submission".into()))?;

    let appointment = booking::submit(&state.db, &request).await?;

    let payment_url = if request.requires_signal {
        match super::payment::create_signal_charge(
            &state,
            appointment.id,
            request.signal_amount_cents,
            &request.client.name,
        )
        .await
        {
            Ok((charge_id, url)) => {
                if let Err(e) = booking::set_charge(&state.db, appointment.id, &charge_id).await {
                    tracing::error!(
                        "failed to store charge id for appointment {}: {}",
                        appointment.id,
                        e
                    );
                }
                Some(url)
            }
            Err(e) => {
                tracing::error!(
                    "signal charge creation failed for appointment {}: {}",
                    appointment.id,
                    e
                );
                // Release the slot; the client can retry from the info step.
                booking::cancel(&state.db, appointment.id).await.ok();
                return Err(AppError::Payment(e.to_string()));
            }
        }
    } else {
        None
    };

    spawn_notification(&state, &snapshot, &appointment, &request.client);

    Ok(Json(ApiResponse::success(CreateBookingResponse {
        appointment,
        payment_url,
    })))
}

// ── Occupancy ──

struct Occupancy {
    appointments: Vec<TimeInterval>,
    blocks: Vec<TimeInterval>,
}

/// Occupied intervals for one professional and date: non-cancelled
/// appointments (buffer gets added by the calculator) plus manual schedule
/// blocks. Malformed stored times are skipped with a warning.
async fn fetch_occupancy(
    state: &AppState,
    professional_id: i64,
    date: &str,
) -> Result<Occupancy, AppError> {
    let appointment_rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT a.time, s.duration_min
         FROM appointments a
         JOIN services s ON s.id = a.service_id
         WHERE a.professional_id = ? AND a.date = ? AND a.status != 'cancelled'",
    )
    .bind(professional_id)
    .bind(date)
    .fetch_all(&state.db)
    .await?;

    let mut appointments = Vec::with_capacity(appointment_rows.len());
    for (time, duration_min) in appointment_rows {
        match schedule::to_minutes(&time) {
            Ok(start) => {
                let duration = u16::try_from(duration_min).unwrap_or(0);
                let end = start
                    .saturating_add(duration)
                    .min(schedule::MINUTES_PER_DAY);
                if let Some(interval) = TimeInterval::new(start, end) {
                    appointments.push(interval);
                }
            }
            Err(_) => {
                tracing::warn!("skipping appointment with malformed time {:?}", time);
            }
        }
    }

    let block_rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT start_time, end_time FROM schedule_blocks
         WHERE professional_id = ? AND date = ?",
    )
    .bind(professional_id)
    .bind(date)
    .fetch_all(&state.db)
    .await?;

    let mut blocks = Vec::with_capacity(block_rows.len());
    for (start_time, end_time) in block_rows {
        match (
            schedule::to_minutes(&start_time),
            schedule::to_minutes(&end_time),
        ) {
            (Ok(start), Ok(end)) => {
                if let Some(interval) = TimeInterval::new(start, end) {
                    blocks.push(interval);
                }
            }
            _ => {
                tracing::warn!(
                    "skipping schedule block with malformed times {:?}-{:?}",
                    start_time,
                    end_time
                );
            }
        }
    }

    Ok(Occupancy {
        appointments,
        blocks,
    })
}

// ── Notification ──

/// Fire-and-forget dispatch; never blocks or fails the response.
fn spawn_notification(
    state: &AppState,
    snapshot: &StudioSnapshot,
    appointment: &Appointment,
    client: &crate::flow::ClientInfo,
) {
    let service_name = snapshot
        .services
        .iter()
        .find(|s| s.id == appointment.service_id)
        .map(|s| s.name.clone())
        .unwrap_or_default();
    let professional_name = snapshot
        .professionals
        .iter()
        .find(|p| p.id == appointment.professional_id)
        .map(|p| p.name.clone())
        .unwrap_or_default();

    let summary = BookingSummary {
        appointment_id: appointment.id,
        studio: snapshot.studio.name.clone(),
        service: service_name,
        professional: professional_name,
        client_name: client.name.clone(),
        client_phone: client.phone.clone(),
        date: appointment.date.clone(),
        time: appointment.time.clone(),
        status: appointment.status.clone(),
    };
    let webhook_url = state.notify_webhook_url.clone();
    tokio::spawn(async move {
        notify::send_booking_notification(&webhook_url, &summary).await;
    });
}

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::{booking, models::*, notify, AppState};

/// Create a signal charge with the payment provider.
///
/// Returns `(charge_id, payment_url)`. The caller stores the charge id on
/// the appointment and hands the URL to the client for redirection.
pub async fn create_signal_charge(
    state: &AppState,
    appointment_id: i64,
    amount_cents: i64,
    payer_name: &str,
) -> anyhow::Result<(String, String)> {
    if state.payment_api_url.is_empty() {
        anyhow::bail!("payment provider not configured");
    }

    let client = reqwest::Client::new();

    let idempotence_key = format!(
        "appointment-{}-{}",
        appointment_id,
        chrono::Utc::now().timestamp_millis()
    );

    let body = serde_json::json!({
        "amount": {
            "value": format!("{}.{:02}", amount_cents / 100, amount_cents % 100),
            "currency": "BRL"
        },
        "capture": true,
        "confirmation": {
            "type": "redirect",
            "return_url": state.webapp_url
        },
        "description": format!("Booking signal for {}", payer_name),
        "metadata": {
            "appointment_id": appointment_id.to_string()
        }
    });

    let resp = client
        .post(format!("{}/charges", state.payment_api_url))
        .bearer_auth(&state.payment_api_key)
        .header("Idempotence-Key", &idempotence_key)
        .json(&body)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        tracing::error!("charge creation failed: {} - {}", status, text);
        anyhow::bail!("payment API error: {}", status);
    }

    let json: serde_json::Value = resp.json().await?;

    let charge_id = json["id"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing charge id"))?
        .to_string();

    let payment_url = json["confirmation"]["confirmation_url"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing confirmation URL"))?
        .to_string();

    tracing::info!(
        "signal charge {} created for appointment {}",
        charge_id,
        appointment_id
    );

    Ok((charge_id, payment_url))
}

/// POST /api/payments/webhook — payment provider notifications.
///
/// Always answers 200 for events we cannot act on, so the provider does
/// not keep retrying them.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    Json(event): Json<PaymentWebhookEvent>,
) -> StatusCode {
    tracing::info!(
        "payment webhook: event={}, charge_id={}, status={}",
        event.event,
        event.object.id,
        event.object.status
    );

    let appointment_id: i64 = match event
        .object
        .metadata
        .as_ref()
        .and_then(|m| m.get("appointment_id"))
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
    {
        Some(id) => id,
        None => {
            tracing::warn!("webhook missing appointment_id in metadata");
            return StatusCode::OK;
        }
    };

    match event.event.as_str() {
        "payment.succeeded" => {
            // A signal covering the full price settles the appointment;
            // anything less leaves the remainder due at the studio.
            let result = sqlx::query(
                "UPDATE appointments SET
                     status = ?,
                     payment_status = CASE
                         WHEN signal_amount_cents >= (SELECT price_cents FROM services WHERE id = service_id)
                             THEN ?
                         ELSE ?
                     END
                 WHERE id = ? AND status = ?",
            )
            .bind(AppointmentStatus::Confirmed.as_str())
            .bind(PaymentStatus::Paid.as_str())
            .bind(PaymentStatus::Partial.as_str())
            .bind(appointment_id)
            .bind(AppointmentStatus::Pending.as_str())
            .execute(&state.db)
            .await;

            match result {
                Err(e) => {
                    tracing::error!("failed to settle appointment {}: {}", appointment_id, e);
                    return StatusCode::INTERNAL_SERVER_ERROR;
                }
                Ok(r) if r.rows_affected() == 0 => {
                    tracing::warn!(
                        "webhook for appointment {} not in pending status, ignoring",
                        appointment_id
                    );
                }
                Ok(_) => spawn_settled_notification(&state, appointment_id),
            }
        }

        "payment.canceled" => {
            tracing::info!("payment canceled for appointment {}", appointment_id);
            if let Err(e) = booking::cancel(&state.db, appointment_id).await {
                tracing::error!("failed to cancel appointment {}: {}", appointment_id, e);
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
        }

        _ => {
            tracing::info!("ignoring webhook event: {}", event.event);
        }
    }

    StatusCode::OK
}

fn spawn_settled_notification(state: &AppState, appointment_id: i64) {
    let db = state.db.clone();
    let webhook_url = state.notify_webhook_url.clone();
    tokio::spawn(async move {
        let detail = sqlx::query_as::<_, SettledRow>(
            "SELECT a.id, st.name AS studio_name, s.name AS service_name,
                    p.name AS professional_name,
                    c.name AS client_name, c.phone AS client_phone,
                    a.date, a.time, a.status
             FROM appointments a
             JOIN studios st ON st.id = a.studio_id
             JOIN services s ON s.id = a.service_id
             JOIN professionals p ON p.id = a.professional_id
             JOIN clients c ON c.id = a.client_id
             WHERE a.id = ?",
        )
        .bind(appointment_id)
        .fetch_optional(&db)
        .await;

        let row = match detail {
            Ok(Some(row)) => row,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(
                    "could not load appointment {} for notification: {}",
                    appointment_id,
                    e
                );
                return;
            }
        };

        let summary = notify::BookingSummary {
            appointment_id: row.id,
            studio: row.studio_name,
            service: row.service_name,
            professional: row.professional_name,
            client_name: row.client_name,
            client_phone: row.client_phone,
            date: row.date,
            time: row.time,
            status: row.status,
        };
        notify::send_booking_notification(&webhook_url, &summary).await;
    });
}

#[derive(sqlx::FromRow)]
struct SettledRow {
    id: i64,
    studio_name: String,
    service_name: String,
    professional_name: String,
    client_name: String,
    client_phone: String,
    date: String,
    time: String,
    status: String,
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{BookingRequest, ClientInfo};
    use axum::extract::State;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::time::Instant;

    async fn test_state() -> Arc<AppState> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        crate::db::run_migrations(&pool).await.expect("migrations");

        sqlx::query(
            "INSERT INTO studios (id, slug, name) VALUES (1, 'test-studio', 'Test Studio')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO professionals (id, studio_id, name) VALUES (100, 1, 'Pro')")
            .execute(&pool)
            .await
            .unwrap();
        // One service where the signal is a deposit, one where it covers
        // the full price.
        sqlx::query(
            "INSERT INTO services (id, studio_id, professional_id, name, duration_min,
                                   price_cents, requires_signal, signal_amount_cents)
             VALUES (11, 1, 100, 'Color', 120, 30000, 1, 5000),
                    (12, 1, 100, 'Touch-up', 30, 5000, 1, 5000)",
        )
        .execute(&pool)
        .await
        .unwrap();

        Arc::new(AppState {
            db: pool,
            started_at: Instant::now(),
            admin_token: String::new(),
            payment_api_url: String::new(),
            payment_api_key: String::new(),
            notify_webhook_url: String::new(),
            webapp_url: String::new(),
        })
    }

    /// Persist a signal appointment; starts out pending/pending.
    async fn book(state: &AppState, service_id: i64, time_min: u16, phone: &str) -> i64 {
        let request = BookingRequest {
            studio_id: 1,
            service_id,
            professional_id: 100,
            date: "2026-09-01".to_string(),
            time_min,
            client: ClientInfo {
                name: "Ana".to_string(),
                phone: phone.to_string(),
                email: "ana@example.com".to_string(),
            },
            requires_signal: true,
            signal_amount_cents: 5000,
        };
        booking::submit(&state.db, &request).await.unwrap().id
    }

    fn event(kind: &str, appointment_id: Option<i64>) -> PaymentWebhookEvent {
        PaymentWebhookEvent {
            event: kind.to_string(),
            object: PaymentWebhookObject {
                id: "ch_1".to_string(),
                status: kind.trim_start_matches("payment.").to_string(),
                metadata: appointment_id
                    .map(|id| serde_json::json!({ "appointment_id": id.to_string() })),
            },
        }
    }

    async fn statuses(state: &AppState, id: i64) -> (String, String) {
        sqlx::query_as("SELECT status, payment_status FROM appointments WHERE id = ?")
            .bind(id)
            .fetch_one(&state.db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_succeeded_webhook_settles_partial() {
        // Signal 5000 against a 30000 price: confirmed, remainder due.
        let state = test_state().await;
        let id = book(&state, 11, 600, "(11) 98765-4321").await;

        let code =
            payment_webhook(State(state.clone()), Json(event("payment.succeeded", Some(id)))).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(
            statuses(&state, id).await,
            ("confirmed".to_string(), "partial".to_string())
        );
    }

    #[tokio::test]
    async fn test_succeeded_webhook_settles_paid_when_signal_covers_price() {
        let state = test_state().await;
        let id = book(&state, 12, 600, "(11) 98765-4321").await;

        payment_webhook(State(state.clone()), Json(event("payment.succeeded", Some(id)))).await;
        assert_eq!(
            statuses(&state, id).await,
            ("confirmed".to_string(), "paid".to_string())
        );
    }

    #[tokio::test]
    async fn test_replayed_succeeded_webhook_is_noop() {
        let state = test_state().await;
        let id = book(&state, 11, 600, "(11) 98765-4321").await;

        payment_webhook(State(state.clone()), Json(event("payment.succeeded", Some(id)))).await;
        let code =
            payment_webhook(State(state.clone()), Json(event("payment.succeeded", Some(id)))).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(
            statuses(&state, id).await,
            ("confirmed".to_string(), "partial".to_string())
        );
    }

    #[tokio::test]
    async fn test_succeeded_webhook_does_not_resurrect_cancelled() {
        let state = test_state().await;
        let id = book(&state, 11, 600, "(11) 98765-4321").await;
        booking::cancel(&state.db, id).await.unwrap();

        let code =
            payment_webhook(State(state.clone()), Json(event("payment.succeeded", Some(id)))).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(statuses(&state, id).await.0, "cancelled");
    }

    #[tokio::test]
    async fn test_canceled_webhook_releases_the_slot() {
        let state = test_state().await;
        let id = book(&state, 11, 600, "(11) 98765-4321").await;

        let code =
            payment_webhook(State(state.clone()), Json(event("payment.canceled", Some(id)))).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(statuses(&state, id).await.0, "cancelled");

        // The slot is bookable again.
        let again = book(&state, 11, 600, "(21) 91234-5678").await;
        assert_ne!(again, id);
    }

    #[tokio::test]
    async fn test_webhook_without_metadata_acknowledged() {
        // 200 even when unusable, so the provider stops retrying.
        let state = test_state().await;
        let code = payment_webhook(State(state), Json(event("payment.succeeded", None))).await;
        assert_eq!(code, StatusCode::OK);
    }
}

//! Notification collaborator: fire-and-forget dispatch of a booking
//! summary to a configured webhook. Failures are logged, never propagated;
//! the persisted appointment is the durable side effect of record.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct BookingSummary {
    pub appointment_id: i64,
    pub studio: String,
    pub service: String,
    pub professional: String,
    pub client_name: String,
    pub client_phone: String,
    pub date: String,
    pub time: String,
    pub status: String,
}

/// POST the summary to the notification webhook. No retries.
pub async fn send_booking_notification(webhook_url: &str, summary: &BookingSummary) {
    if webhook_url.is_empty() {
        return;
    }
    let client = reqwest::Client::new();
    match client.post(webhook_url).json(summary).send().await {
        Ok(resp) if !resp.status().is_success() => {
            tracing::error!(
                "booking notification for appointment {} rejected: {}",
                summary.appointment_id,
                resp.status()
            );
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(
                "booking notification for appointment {} failed: {}",
                summary.appointment_id,
                e
            );
        }
    }
}

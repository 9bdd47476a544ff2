use serde::{Deserialize, Serialize};

// ── Database models ──

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Studio {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub buffer_min: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Professional {
    pub id: i64,
    pub studio_id: i64,
    pub name: String,
    /// JSON array of specialty tags, stored as TEXT.
    pub specialties: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: i64,
    pub studio_id: i64,
    pub professional_id: i64,
    pub name: String,
    pub duration_min: i64,
    pub price_cents: i64,
    pub requires_signal: bool,
    pub signal_amount_cents: i64,
    pub is_active: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkingHoursRow {
    pub weekday: i64,
    pub enabled: bool,
    pub start_time: String,
    pub end_time: String,
    /// JSON array of `{ "start": "HH:MM", "end": "HH:MM" }` break entries.
    pub breaks: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Appointment {
    pub id: i64,
    pub studio_id: i64,
    pub client_id: i64,
    pub service_id: i64,
    pub professional_id: i64,
    pub date: String,
    pub time: String,
    pub status: String,
    pub payment_status: String,
    pub signal_amount_cents: i64,
    pub charge_id: Option<String>,
    pub created_at: String,
    pub cancelled_at: Option<String>,
}

// ── Status enums ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }
}

// ── API request/response types ──

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub professional_id: i64,
    pub service_id: i64,
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct SlotsResponse {
    pub date: String,
    pub times: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: i64,
    #[serde(default)]
    pub professional_id: Option<i64>,
    pub date: String,
    pub time: String,
    pub client_name: String,
    pub client_phone: String,
    pub client_email: String,
}

#[derive(Debug, Serialize)]
pub struct CreateBookingResponse {
    pub appointment: Appointment,
    /// Present when the service requires a signal payment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentsQuery {
    pub date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AppointmentDetail {
    pub id: i64,
    pub date: String,
    pub time: String,
    pub status: String,
    pub payment_status: String,
    pub service_name: String,
    pub duration_min: i64,
    pub price_cents: i64,
    pub professional_name: String,
    pub client_name: String,
    pub client_phone: String,
    pub created_at: String,
}

// ── Payment webhook (provider-shaped, unsigned) ──

#[derive(Debug, Deserialize)]
pub struct PaymentWebhookEvent {
    pub event: String,
    pub object: PaymentWebhookObject,
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhookObject {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

// ── Response envelope ──

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

//! Client identity resolution and appointment persistence.
//!
//! `submit` is the only write path the public booking flow owns. Both the
//! client upsert and the appointment insert run inside one transaction:
//! the client counter is a conditional increment (no read-then-write lost
//! updates between racing same-phone bookings), and an appointment insert
//! rejected by the `(professional_id, date, time)` slot guard rolls the
//! counter back with it.

use sqlx::SqlitePool;

use crate::error::AppError;
use crate::flow::BookingRequest;
use crate::models::{Appointment, AppointmentStatus, PaymentStatus};
use crate::schedule::to_clock;

const APPOINTMENT_SELECT: &str =
    "SELECT id, studio_id, client_id, service_id, professional_id, date, time,
            status, payment_status, signal_amount_cents, charge_id, created_at, cancelled_at
     FROM appointments";

/// Find-or-create the client by phone, bump their visit counter, and
/// persist the appointment. Returns the stored appointment row.
pub async fn submit(pool: &SqlitePool, request: &BookingRequest) -> Result<Appointment, AppError> {
    let mut tx = pool.begin().await.map_err(AppError::ClientPersistence)?;

    // Conditional increment first; covers the common repeat-client case
    // without ever reading the counter into application code.
    let updated = sqlx::query(
        "UPDATE clients
         SET total_appointments = total_appointments + 1,
             last_visit_date = ?,
             name = ?,
             email = ?
         WHERE studio_id = ? AND phone = ?",
    )
    .bind(&request.date)
    .bind(&request.client.name)
    .bind(&request.client.email)
    .bind(request.studio_id)
    .bind(&request.client.phone)
    .execute(&mut *tx)
    .await
    .map_err(AppError::ClientPersistence)?;

    if updated.rows_affected() == 0 {
        // First booking for this phone. ON CONFLICT keeps a racing insert
        // from producing a duplicate row or a lost increment.
        sqlx::query(
            "INSERT INTO clients (studio_id, phone, name, email, total_appointments, last_visit_date)
             VALUES (?, ?, ?, ?, 1, ?)
             ON CONFLICT(studio_id, phone) DO UPDATE SET
                 total_appointments = total_appointments + 1,
                 last_visit_date = excluded.last_visit_date",
        )
        .bind(request.studio_id)
        .bind(&request.client.phone)
        .bind(&request.client.name)
        .bind(&request.client.email)
        .bind(&request.date)
        .execute(&mut *tx)
        .await
        .map_err(AppError::ClientPersistence)?;
    }

    let client_id: i64 =
        sqlx::query_scalar("SELECT id FROM clients WHERE studio_id = ? AND phone = ?")
            .bind(request.studio_id)
            .bind(&request.client.phone)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::ClientPersistence)?;

    let (status, payment_status) = if request.requires_signal {
        (AppointmentStatus::Pending, PaymentStatus::Pending)
    } else {
        (AppointmentStatus::Confirmed, PaymentStatus::Paid)
    };
    let signal_amount = if request.requires_signal {
        request.signal_amount_cents
    } else {
        0
    };
    let created_at = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let inserted = sqlx::query(
        "INSERT INTO appointments (studio_id, client_id, service_id, professional_id,
                                   date, time, status, payment_status, signal_amount_cents, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(request.studio_id)
    .bind(client_id)
    .bind(request.service_id)
    .bind(request.professional_id)
    .bind(&request.date)
    .bind(to_clock(request.time_min))
    .bind(status.as_str())
    .bind(payment_status.as_str())
    .bind(signal_amount)
    .bind(&created_at)
    .execute(&mut *tx)
    .await;

    let appointment_id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        // Dropping the transaction rolls the client increment back too.
        Err(e) if is_unique_violation(&e) => return Err(AppError::SlotTaken),
        Err(e) => return Err(AppError::AppointmentPersistence(e)),
    };

    tx.commit().await.map_err(AppError::AppointmentPersistence)?;

    let appointment =
        sqlx::query_as::<_, Appointment>(&format!("{} WHERE id = ?", APPOINTMENT_SELECT))
            .bind(appointment_id)
            .fetch_one(pool)
            .await?;

    Ok(appointment)
}

/// Attach the payment provider's charge id to a freshly created appointment.
pub async fn set_charge(
    pool: &SqlitePool,
    appointment_id: i64,
    charge_id: &str,
) -> Result<(), AppError> {
    sqlx::query("UPDATE appointments SET charge_id = ? WHERE id = ?")
        .bind(charge_id)
        .bind(appointment_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Cancel an appointment, releasing its slot (the partial unique index
/// excludes cancelled rows).
pub async fn cancel(pool: &SqlitePool, appointment_id: i64) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE appointments
         SET status = 'cancelled', cancelled_at = datetime('now')
         WHERE id = ? AND status != 'cancelled'",
    )
    .bind(appointment_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::ClientInfo;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
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
        sqlx::query(
            "INSERT INTO services (id, studio_id, professional_id, name, duration_min,
                                   price_cents, requires_signal, signal_amount_cents)
             VALUES (10, 1, 100, 'Cut', 60, 10000, 0, 0),
                    (11, 1, 100, 'Color', 120, 30000, 1, 5000)",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    fn request(service_id: i64, date: &str, time_min: u16, phone: &str) -> BookingRequest {
        BookingRequest {
            studio_id: 1,
            service_id,
            professional_id: 100,
            date: date.to_string(),
            time_min,
            client: ClientInfo {
                name: "Ana".to_string(),
                phone: phone.to_string(),
                email: "ana@example.com".to_string(),
            },
            requires_signal: service_id == 11,
            signal_amount_cents: if service_id == 11 { 5000 } else { 0 },
        }
    }

    #[tokio::test]
    async fn test_first_booking_creates_client() {
        let pool = test_pool().await;
        let appt = submit(&pool, &request(10, "2026-09-01", 600, "(11) 98765-4321"))
            .await
            .unwrap();

        let (total, last): (i64, Option<String>) = sqlx::query_as(
            "SELECT total_appointments, last_visit_date FROM clients WHERE id = ?",
        )
        .bind(appt.client_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(last.as_deref(), Some("2026-09-01"));
        assert_eq!(appt.time, "10:00");
    }

    #[tokio::test]
    async fn test_repeat_phone_increments_counter() {
        // Scenario: two sequential bookings from the same phone on
        // different dates bump the counter twice and land on the second date.
        let pool = test_pool().await;
        let first = submit(&pool, &request(10, "2026-09-01", 600, "(11) 98765-4321"))
            .await
            .unwrap();
        let second = submit(&pool, &request(10, "2026-09-03", 600, "(11) 98765-4321"))
            .await
            .unwrap();
        assert_eq!(first.client_id, second.client_id);

        let (total, last): (i64, Option<String>) = sqlx::query_as(
            "SELECT total_appointments, last_visit_date FROM clients WHERE id = ?",
        )
        .bind(second.client_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(total, 2);
        assert_eq!(last.as_deref(), Some("2026-09-03"));

        let clients: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(clients, 1);
    }

    #[tokio::test]
    async fn test_statuses_branch_on_signal() {
        let pool = test_pool().await;

        let plain = submit(&pool, &request(10, "2026-09-01", 600, "(11) 98765-4321"))
            .await
            .unwrap();
        assert_eq!(plain.status, "confirmed");
        assert_eq!(plain.payment_status, "paid");
        assert_eq!(plain.signal_amount_cents, 0);

        let signal = submit(&pool, &request(11, "2026-09-01", 840, "(21) 91234-5678"))
            .await
            .unwrap();
        assert_eq!(signal.status, "pending");
        assert_eq!(signal.payment_status, "pending");
        assert_eq!(signal.signal_amount_cents, 5000);
    }

    #[tokio::test]
    async fn test_slot_guard_rejects_double_booking() {
        let pool = test_pool().await;
        submit(&pool, &request(10, "2026-09-01", 600, "(11) 98765-4321"))
            .await
            .unwrap();

        let err = submit(&pool, &request(10, "2026-09-01", 600, "(21) 91234-5678"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotTaken));

        // The rolled-back transaction must not have left the second
        // client's counter incremented.
        let clients: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(clients, 1);
    }

    #[tokio::test]
    async fn test_cancelled_appointment_frees_the_slot() {
        let pool = test_pool().await;
        let appt = submit(&pool, &request(10, "2026-09-01", 600, "(11) 98765-4321"))
            .await
            .unwrap();

        assert!(cancel(&pool, appt.id).await.unwrap());
        // Cancelling twice is a no-op.
        assert!(!cancel(&pool, appt.id).await.unwrap());

        // The slot is bookable again.
        let again = submit(&pool, &request(10, "2026-09-01", 600, "(21) 91234-5678"))
            .await
            .unwrap();
        assert_eq!(again.time, "10:00");
    }

    #[tokio::test]
    async fn test_set_charge() {
        let pool = test_pool().await;
        let appt = submit(&pool, &request(11, "2026-09-01", 600, "(11) 98765-4321"))
            .await
            .unwrap();
        set_charge(&pool, appt.id, "ch_123").await.unwrap();

        let charge: Option<String> =
            sqlx::query_scalar("SELECT charge_id FROM appointments WHERE id = ?")
                .bind(appt.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(charge.as_deref(), Some("ch_123"));
    }
}

//! Studio configuration loader.
//!
//! Resolves a public slug to an immutable snapshot of everything the
//! booking flow needs: display info, active services, professionals,
//! working hours and blocked dates. The snapshot is read-only and treated
//! as consistent for one booking session; the write-time slot guard in the
//! schema is the correctness backstop for any staleness.

use std::collections::HashSet;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::flow::{FlowContext, ServiceOffer};
use crate::models::{Professional, Service, Studio, WorkingHoursRow};
use crate::schedule::{to_clock, to_minutes, DaySchedule, TimeInterval, DEFAULT_BUFFER_MIN};

#[derive(Debug, Clone)]
pub struct StudioSnapshot {
    pub studio: Studio,
    pub services: Vec<Service>,
    pub professionals: Vec<Professional>,
    /// Indexed 0=Sunday..6=Saturday.
    pub hours: [DaySchedule; 7],
    pub blocked_dates: HashSet<String>,
}

/// Stored shape of one break entry in the working_hours.breaks JSON column.
#[derive(Debug, Serialize, Deserialize)]
struct BreakSpec {
    start: String,
    end: String,
}

/// Load the configuration snapshot for a public studio slug.
///
/// Fails with `ConfigurationNotFound` when no studio owns the slug or the
/// studio has no active services.
pub async fn load_snapshot(pool: &SqlitePool, slug: &str) -> Result<StudioSnapshot, AppError> {
    let studio = sqlx::query_as::<_, Studio>(
        "SELECT id, slug, name, description, buffer_min FROM studios WHERE slug = ?",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::ConfigurationNotFound)?;

    let services = sqlx::query_as::<_, Service>(
        "SELECT id, studio_id, professional_id, name, duration_min, price_cents,
                requires_signal, signal_amount_cents, is_active, sort_order
         FROM services WHERE studio_id = ? AND is_active = 1 ORDER BY sort_order ASC",
    )
    .bind(studio.id)
    .fetch_all(pool)
    .await?;

    if services.is_empty() {
        return Err(AppError::ConfigurationNotFound);
    }

    let professionals = sqlx::query_as::<_, Professional>(
        "SELECT id, studio_id, name, specialties FROM professionals WHERE studio_id = ?",
    )
    .bind(studio.id)
    .fetch_all(pool)
    .await?;

    let hour_rows = sqlx::query_as::<_, WorkingHoursRow>(
        "SELECT weekday, enabled, start_time, end_time, breaks
         FROM working_hours WHERE studio_id = ?",
    )
    .bind(studio.id)
    .fetch_all(pool)
    .await?;

    let mut hours: [DaySchedule; 7] = std::array::from_fn(|_| DaySchedule::closed());
    for row in hour_rows {
        let Ok(weekday) = usize::try_from(row.weekday) else {
            continue;
        };
        if weekday > 6 {
            continue;
        }
        hours[weekday] = parse_day(&row, &studio.slug, weekday);
    }

    let blocked_dates: HashSet<String> =
        sqlx::query_scalar("SELECT date FROM blocked_dates WHERE studio_id = ?")
            .bind(studio.id)
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();

    Ok(StudioSnapshot {
        studio,
        services,
        professionals,
        hours,
        blocked_dates,
    })
}

/// Parse one stored weekday into a `DaySchedule`. Malformed hours are a
/// configuration defect: the day is rendered unavailable, never a crash.
fn parse_day(row: &WorkingHoursRow, slug: &str, weekday: usize) -> DaySchedule {
    if !row.enabled {
        return DaySchedule::closed();
    }

    let (start_min, end_min) = match (to_minutes(&row.start_time), to_minutes(&row.end_time)) {
        (Ok(s), Ok(e)) if s < e => (s, e),
        _ => {
            tracing::warn!(
                "studio {}: malformed hours for weekday {} ({:?}-{:?}), day disabled",
                slug,
                weekday,
                row.start_time,
                row.end_time
            );
            return DaySchedule::closed();
        }
    };

    let specs: Vec<BreakSpec> = serde_json::from_str(&row.breaks).unwrap_or_default();
    let mut breaks = Vec::with_capacity(specs.len());
    for spec in &specs {
        match (to_minutes(&spec.start), to_minutes(&spec.end)) {
            (Ok(s), Ok(e)) if s < e => breaks.push(TimeInterval {
                start_min: s,
                end_min: e,
            }),
            _ => {
                tracing::warn!(
                    "studio {}: skipping malformed break {:?}-{:?} on weekday {}",
                    slug,
                    spec.start,
                    spec.end,
                    weekday
                );
            }
        }
    }

    DaySchedule {
        enabled: true,
        start_min,
        end_min,
        breaks,
    }
}

impl StudioSnapshot {
    /// The day schedule for a calendar date (weekday 0=Sunday..6=Saturday).
    pub fn day_for(&self, date: &str) -> Result<&DaySchedule, AppError> {
        let parsed = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| AppError::Validation(format!("invalid date: {date:?}")))?;
        let weekday = parsed.weekday().num_days_from_sunday() as usize;
        Ok(&self.hours[weekday])
    }

    pub fn is_blocked(&self, date: &str) -> bool {
        self.blocked_dates.contains(date)
    }

    /// The validation context handed to the booking flow machine.
    pub fn flow_context(&self) -> FlowContext {
        FlowContext {
            studio_id: self.studio.id,
            buffer_min: u16::try_from(self.studio.buffer_min).unwrap_or(DEFAULT_BUFFER_MIN),
            services: self
                .services
                .iter()
                .map(|s| ServiceOffer {
                    id: s.id,
                    professional_id: s.professional_id,
                    duration_min: u16::try_from(s.duration_min).unwrap_or(0),
                    requires_signal: s.requires_signal,
                    signal_amount_cents: s.signal_amount_cents,
                })
                .collect(),
            professional_ids: self.professionals.iter().map(|p| p.id).collect(),
            blocked_dates: self.blocked_dates.clone(),
        }
    }
}

// ── Public serialization view ──

#[derive(Debug, Serialize)]
pub struct SnapshotView {
    pub studio: StudioView,
    pub services: Vec<Service>,
    pub professionals: Vec<ProfessionalView>,
    pub working_hours: Vec<DayView>,
    pub blocked_dates: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StudioView {
    pub slug: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ProfessionalView {
    pub id: i64,
    pub name: String,
    pub specialties: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DayView {
    pub weekday: usize,
    pub enabled: bool,
    pub start: String,
    pub end: String,
    pub breaks: Vec<BreakView>,
}

#[derive(Debug, Serialize)]
pub struct BreakView {
    pub start: String,
    pub end: String,
}

impl StudioSnapshot {
    pub fn view(&self) -> SnapshotView {
        SnapshotView {
            studio: StudioView {
                slug: self.studio.slug.clone(),
                name: self.studio.name.clone(),
                description: self.studio.description.clone(),
            },
            services: self.services.clone(),
            professionals: self
                .professionals
                .iter()
                .map(|p| ProfessionalView {
                    id: p.id,
                    name: p.name.clone(),
                    specialties: serde_json::from_str(&p.specialties).unwrap_or_default(),
                })
                .collect(),
            working_hours: self
                .hours
                .iter()
                .enumerate()
                .map(|(weekday, day)| DayView {
                    weekday,
                    enabled: day.enabled,
                    start: to_clock(day.start_min),
                    end: to_clock(day.end_min),
                    breaks: day
                        .breaks
                        .iter()
                        .map(|b| BreakView {
                            start: to_clock(b.start_min),
                            end: to_clock(b.end_min),
                        })
                        .collect(),
                })
                .collect(),
            blocked_dates: {
                let mut dates: Vec<String> = self.blocked_dates.iter().cloned().collect();
                dates.sort();
                dates
            },
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn row(enabled: bool, start: &str, end: &str, breaks: &str) -> WorkingHoursRow {
        WorkingHoursRow {
            weekday: 1,
            enabled,
            start_time: start.to_string(),
            end_time: end.to_string(),
            breaks: breaks.to_string(),
        }
    }

    #[test]
    fn test_parse_day_disabled() {
        let day = parse_day(&row(false, "09:00", "18:00", "[]"), "demo", 1);
        assert!(!day.enabled);
    }

    #[test]
    fn test_parse_day_with_breaks() {
        let day = parse_day(
            &row(
                true,
                "09:00",
                "18:00",
                r#"[{"start":"12:00","end":"13:00"}]"#,
            ),
            "demo",
            1,
        );
        assert!(day.enabled);
        assert_eq!(day.start_min, 540);
        assert_eq!(day.end_min, 1080);
        assert_eq!(day.breaks.len(), 1);
        assert_eq!(day.breaks[0].start_min, 720);
    }

    #[test]
    fn test_parse_day_malformed_hours_disable_day() {
        let day = parse_day(&row(true, "9am", "18:00", "[]"), "demo", 1);
        assert!(!day.enabled);
        // Inverted hours are a defect too.
        let day = parse_day(&row(true, "18:00", "09:00", "[]"), "demo", 1);
        assert!(!day.enabled);
    }

    #[test]
    fn test_flow_context_buffer_fallback() {
        // An out-of-range stored buffer degrades to the same default the
        // slot listing uses, so both paths compute identical slots.
        let snapshot = StudioSnapshot {
            studio: Studio {
                id: 1,
                slug: "demo".to_string(),
                name: "Demo".to_string(),
                description: String::new(),
                buffer_min: -1,
            },
            services: Vec::new(),
            professionals: Vec::new(),
            hours: std::array::from_fn(|_| DaySchedule::closed()),
            blocked_dates: HashSet::new(),
        };
        assert_eq!(snapshot.flow_context().buffer_min, DEFAULT_BUFFER_MIN);
    }

    #[test]
    fn test_parse_day_malformed_break_skipped() {
        let day = parse_day(
            &row(
                true,
                "09:00",
                "18:00",
                r#"[{"start":"nope","end":"13:00"},{"start":"15:00","end":"15:30"}]"#,
            ),
            "demo",
            1,
        );
        assert!(day.enabled);
        assert_eq!(day.breaks.len(), 1);
        assert_eq!(day.breaks[0].start_min, 900);
    }
}

//! Time interval arithmetic and the availability calculator.
//!
//! Everything in this module is pure: given a day's working hours, the
//! occupied ranges on that day and a service duration, `compute_slots`
//! produces the list of bookable start times. All clock arithmetic is done
//! in minutes from midnight; "HH:MM" strings only exist at the edges.

use crate::error::AppError;

/// Minutes in a day; interval ends may touch this value but never exceed it.
pub const MINUTES_PER_DAY: u16 = 1440;

/// Idle minutes appended after a service before the next booking may start.
pub const DEFAULT_BUFFER_MIN: u16 = 15;

// ── Time interval ──

/// Half-open interval `[start_min, end_min)` of minutes from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    pub start_min: u16,
    pub end_min: u16,
}

impl TimeInterval {
    /// Build an interval; `None` unless `start < end <= 1440`.
    pub fn new(start_min: u16, end_min: u16) -> Option<Self> {
        if start_min < end_min && end_min <= MINUTES_PER_DAY {
            Some(Self { start_min, end_min })
        } else {
            None
        }
    }

    /// Half-open overlap test: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start_min < other.end_min && other.start_min < self.end_min
    }
}

/// Parse "HH:MM" into minutes from midnight.
///
/// Fails unless the text is exactly two colon-separated integers with
/// hours in 0..=23 and minutes in 0..=59.
pub fn to_minutes(text: &str) -> Result<u16, AppError> {
    let mut parts = text.split(':');
    let (hours, minutes) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), None) => {
            let hours: u16 = h
                .parse()
                .map_err(|_| AppError::InvalidTimeFormat(text.to_string()))?;
            let minutes: u16 = m
                .parse()
                .map_err(|_| AppError::InvalidTimeFormat(text.to_string()))?;
            (hours, minutes)
        }
        _ => return Err(AppError::InvalidTimeFormat(text.to_string())),
    };

    if hours > 23 || minutes > 59 {
        return Err(AppError::InvalidTimeFormat(text.to_string()));
    }

    Ok(hours * 60 + minutes)
}

/// Render minutes from midnight as "HH:MM".
pub fn to_clock(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

// ── Day schedule ──

/// One weekday's working hours. Seven of these per studio, indexed
/// 0=Sunday..6=Saturday.
#[derive(Debug, Clone)]
pub struct DaySchedule {
    pub enabled: bool,
    pub start_min: u16,
    pub end_min: u16,
    pub breaks: Vec<TimeInterval>,
}

impl DaySchedule {
    /// A disabled day; used both as the default and as the rendering of a
    /// day whose stored hours failed to parse.
    pub fn closed() -> Self {
        Self {
            enabled: false,
            start_min: 0,
            end_min: 0,
            breaks: Vec::new(),
        }
    }
}

// ── Availability calculator ──

/// Compute the ordered list of bookable start times (minutes from midnight).
///
/// `appointments` are existing bookings on the day; each one is padded with
/// `buffer_min` at its end before the sweep. `blocks` are manual schedule
/// blocks and carry no implicit buffer; the day's breaks are treated the
/// same way. The cursor jumps to the end of whichever occupied interval a
/// candidate collides with, so the sweep is linear in the number of
/// occupied intervals rather than in minutes of the business day.
pub fn compute_slots(
    day: &DaySchedule,
    appointments: &[TimeInterval],
    blocks: &[TimeInterval],
    duration_min: u16,
    buffer_min: u16,
) -> Vec<u16> {
    if !day.enabled || duration_min == 0 || day.start_min >= day.end_min {
        return Vec::new();
    }

    let mut occupied: Vec<TimeInterval> =
        Vec::with_capacity(appointments.len() + blocks.len() + day.breaks.len());
    for appt in appointments {
        occupied.push(TimeInterval {
            start_min: appt.start_min,
            end_min: appt.end_min.saturating_add(buffer_min).min(MINUTES_PER_DAY),
        });
    }
    occupied.extend_from_slice(blocks);
    occupied.extend_from_slice(&day.breaks);
    occupied.sort_by_key(|iv| (iv.start_min, iv.end_min));

    let mut slots = Vec::new();
    let mut cursor = day.start_min;

    'sweep: while cursor.saturating_add(duration_min) <= day.end_min {
        let candidate = TimeInterval {
            start_min: cursor,
            end_min: cursor + duration_min,
        };

        for iv in &occupied {
            if iv.start_min >= candidate.end_min {
                break;
            }
            if iv.overlaps(&candidate) {
                // Skip forward past the colliding interval and retry.
                cursor = iv.end_min;
                continue 'sweep;
            }
        }

        slots.push(cursor);
        cursor += duration_min + buffer_min;
    }

    slots
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: &str, end: &str) -> TimeInterval {
        TimeInterval {
            start_min: to_minutes(start).unwrap(),
            end_min: to_minutes(end).unwrap(),
        }
    }

    fn open_day(start: &str, end: &str) -> DaySchedule {
        DaySchedule {
            enabled: true,
            start_min: to_minutes(start).unwrap(),
            end_min: to_minutes(end).unwrap(),
            breaks: Vec::new(),
        }
    }

    fn clocks(slots: &[u16]) -> Vec<String> {
        slots.iter().map(|m| to_clock(*m)).collect()
    }

    // ── to_minutes / to_clock ──

    #[test]
    fn test_to_minutes_basic() {
        assert_eq!(to_minutes("08:00").unwrap(), 480);
        assert_eq!(to_minutes("00:00").unwrap(), 0);
        assert_eq!(to_minutes("23:59").unwrap(), 1439);
    }

    #[test]
    fn test_to_minutes_rejects_hour_out_of_range() {
        assert!(to_minutes("24:00").is_err());
    }

    #[test]
    fn test_to_minutes_rejects_minute_out_of_range() {
        assert!(to_minutes("10:60").is_err());
    }

    #[test]
    fn test_to_minutes_rejects_garbage() {
        assert!(to_minutes("garbage").is_err());
        assert!(to_minutes("10").is_err());
        assert!(to_minutes("10:15:30").is_err());
        assert!(to_minutes("ab:cd").is_err());
        assert!(to_minutes("").is_err());
    }

    #[test]
    fn test_to_clock_roundtrip() {
        assert_eq!(to_clock(480), "08:00");
        assert_eq!(to_clock(1439), "23:59");
        assert_eq!(to_clock(0), "00:00");
    }

    // ── TimeInterval ──

    #[test]
    fn test_interval_new_rejects_inverted() {
        assert!(TimeInterval::new(600, 600).is_none());
        assert!(TimeInterval::new(700, 600).is_none());
        assert!(TimeInterval::new(100, 1441).is_none());
        assert!(TimeInterval::new(100, 200).is_some());
    }

    #[test]
    fn test_overlap_touching_endpoints_do_not_overlap() {
        let a = iv("09:00", "10:00");
        let b = iv("10:00", "11:00");
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn test_overlap_partial() {
        let a = iv("09:00", "10:30");
        let b = iv("10:00", "11:00");
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn test_overlap_containment() {
        let a = iv("09:00", "12:00");
        let b = iv("10:00", "11:00");
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    // ── compute_slots ──

    #[test]
    fn test_disabled_day_yields_nothing() {
        let mut day = open_day("08:00", "18:00");
        day.enabled = false;
        assert!(compute_slots(&day, &[], &[], 60, 15).is_empty());
    }

    #[test]
    fn test_closed_day_yields_nothing() {
        assert!(compute_slots(&DaySchedule::closed(), &[], &[], 60, 15).is_empty());
    }

    #[test]
    fn test_zero_duration_yields_nothing() {
        let day = open_day("08:00", "18:00");
        assert!(compute_slots(&day, &[], &[], 0, 15).is_empty());
    }

    #[test]
    fn test_empty_day_evenly_spaced() {
        // Scenario A: 08:00-18:00, 60 min service, 15 min buffer.
        let day = open_day("08:00", "18:00");
        let slots = compute_slots(&day, &[], &[], 60, 15);
        let times = clocks(&slots);
        assert_eq!(times[0], "08:00");
        assert_eq!(times[1], "09:15");
        let last = *slots.last().unwrap();
        assert!(last <= to_minutes("17:00").unwrap());
        assert!(last + 60 <= to_minutes("18:00").unwrap());
    }

    #[test]
    fn test_existing_appointment_with_buffer_excluded() {
        // Scenario B: appointment 10:00 for 60 min occupies 10:00-11:15
        // once padded. 09:00 stays valid, next slot after the gap is 11:15.
        let day = open_day("08:00", "18:00");
        let appt = vec![iv("10:00", "11:00")];
        let slots = compute_slots(&day, &appt, &[], 60, 15);
        let occupied = iv("10:00", "11:15");
        for s in &slots {
            let window = TimeInterval {
                start_min: *s,
                end_min: *s + 60,
            };
            assert!(
                !window.overlaps(&occupied),
                "slot {} intersects the occupied range",
                to_clock(*s)
            );
        }
        assert!(slots.contains(&to_minutes("08:00").unwrap()));
        assert!(slots.contains(&to_minutes("11:15").unwrap()));
    }

    #[test]
    fn test_break_excluded() {
        // Scenario C: lunch break 12:00-13:00.
        let mut day = open_day("08:00", "18:00");
        day.breaks.push(iv("12:00", "13:00"));
        let slots = compute_slots(&day, &[], &[], 60, 15);
        let lunch = iv("12:00", "13:00");
        for s in &slots {
            let window = TimeInterval {
                start_min: *s,
                end_min: *s + 60,
            };
            assert!(!window.overlaps(&lunch));
        }
        // The sweep resumes right at the end of the break.
        assert!(slots.contains(&to_minutes("13:00").unwrap()));
    }

    #[test]
    fn test_break_abutting_open_time_keeps_adjacent_slot() {
        // A break ending exactly at a candidate start must not kill it.
        let mut day = open_day("08:00", "18:00");
        day.breaks.push(iv("08:00", "09:00"));
        let slots = compute_slots(&day, &[], &[], 60, 15);
        assert_eq!(slots[0], to_minutes("09:00").unwrap());
    }

    #[test]
    fn test_break_abutting_close_time_keeps_adjacent_slot() {
        let mut day = open_day("08:00", "18:00");
        day.breaks.push(iv("17:00", "18:00"));
        let slots = compute_slots(&day, &[], &[], 60, 0);
        assert_eq!(*slots.last().unwrap(), to_minutes("16:00").unwrap());
    }

    #[test]
    fn test_manual_block_has_no_buffer() {
        // A block ending at 11:00 leaves 11:00 bookable; an appointment
        // ending at 11:00 would push the next slot to 11:15.
        let day = open_day("08:00", "18:00");
        let block = vec![iv("10:00", "11:00")];
        let slots = compute_slots(&day, &[], &block, 60, 15);
        assert!(slots.contains(&to_minutes("11:00").unwrap()));
    }

    #[test]
    fn test_no_partial_slot_at_close() {
        // 90 min service in a 08:00-09:00 window: nothing fits.
        let day = open_day("08:00", "09:00");
        assert!(compute_slots(&day, &[], &[], 90, 15).is_empty());
    }

    #[test]
    fn test_slots_strictly_increasing() {
        let mut day = open_day("08:00", "20:00");
        day.breaks.push(iv("12:30", "13:10"));
        let appts = vec![iv("09:00", "09:45"), iv("15:00", "16:00")];
        let blocks = vec![iv("18:00", "18:30")];
        let slots = compute_slots(&day, &appts, &blocks, 45, 10);
        for pair in slots.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_every_slot_fits_inside_open_window() {
        let day = open_day("10:00", "16:00");
        let appts = vec![iv("11:00", "12:00")];
        let slots = compute_slots(&day, &appts, &[], 50, 15);
        for s in &slots {
            assert!(*s >= day.start_min);
            assert!(*s + 50 <= day.end_min);
        }
    }

    #[test]
    fn test_deterministic() {
        let mut day = open_day("08:00", "18:00");
        day.breaks.push(iv("12:00", "13:00"));
        let appts = vec![iv("14:00", "15:00")];
        let a = compute_slots(&day, &appts, &[], 60, 15);
        let b = compute_slots(&day, &appts, &[], 60, 15);
        assert_eq!(a, b);
    }

    #[test]
    fn test_unsorted_occupied_input() {
        // Occupied intervals arrive in arbitrary order; output must not care.
        let day = open_day("08:00", "18:00");
        let appts = vec![iv("14:00", "15:00"), iv("09:00", "10:00")];
        let slots = compute_slots(&day, &appts, &[], 60, 15);
        for s in &slots {
            let window = TimeInterval {
                start_min: *s,
                end_min: *s + 60,
            };
            assert!(!window.overlaps(&iv("09:00", "10:15")));
            assert!(!window.overlaps(&iv("14:00", "15:15")));
        }
        assert_eq!(slots[0], to_minutes("08:00").unwrap());
    }

    #[test]
    fn test_fully_occupied_day() {
        let day = open_day("09:00", "12:00");
        let block = vec![iv("09:00", "12:00")];
        assert!(compute_slots(&day, &[], &block, 30, 15).is_empty());
    }

    #[test]
    fn test_appointment_padding_clamped_to_midnight() {
        let day = open_day("22:00", "23:59");
        let appts = vec![iv("23:00", "23:59")];
        // Padding 23:59 + 15 must clamp rather than wrap.
        let slots = compute_slots(&day, &appts, &[], 30, 15);
        assert_eq!(slots, vec![to_minutes("22:00").unwrap()]);
    }
}

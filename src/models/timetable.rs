//! Weekly timetable

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A weekly lesson. Times are half-open: a slot ending at 10:00 does not
/// clash with one starting at 10:00.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimetableSlot {
    pub id: i64,
    pub class_id: i64,
    pub class_name: String,
    pub subject_id: i64,
    pub subject_code: String,
    pub teacher_id: i64,
    pub teacher_name: String,
    /// ISO weekday, Monday = 1
    pub day_of_week: i64,
    #[serde(with = "super::hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "super::hhmm")]
    pub end_time: NaiveTime,
    pub room: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Whether two half-open `[start, end)` ranges share any instant
pub fn ranges_overlap(a: (NaiveTime, NaiveTime), b: (NaiveTime, NaiveTime)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_touching_ranges_do_not_overlap() {
        assert!(!ranges_overlap((t(8, 0), t(9, 0)), (t(9, 0), t(10, 0))));
        assert!(ranges_overlap((t(8, 0), t(9, 30)), (t(9, 0), t(10, 0))));
        assert!(ranges_overlap((t(8, 0), t(12, 0)), (t(9, 0), t(10, 0))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn overlap_is_symmetric(a in 0u32..1380, la in 1u32..60, b in 0u32..1380, lb in 1u32..60) {
            let mk = |start: u32, len: u32| (t(start / 60, start % 60), t((start + len) / 60, (start + len) % 60));
            let (x, y) = (mk(a, la), mk(b, lb));
            prop_assert_eq!(ranges_overlap(x, y), ranges_overlap(y, x));
            prop_assert_eq!(ranges_overlap(x, y), a < b + lb && b < a + la);
        }
    }
}

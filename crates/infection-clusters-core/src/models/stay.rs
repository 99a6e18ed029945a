//! Stay models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A contiguous placement of one patient in one hospital location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StayRecord {
    /// Source transfer identifier (unique per stay)
    pub stay_id: String,
    /// Patient identifier (`P<digits>`)
    pub patient_id: String,
    /// Ward or unit name
    pub location: String,
    /// Ward-in time
    pub start_time: NaiveDateTime,
    /// Ward-out time (never before `start_time`)
    pub end_time: NaiveDateTime,
}

impl StayRecord {
    /// Create a stay, rejecting intervals that end before they start.
    pub fn new(
        stay_id: impl Into<String>,
        patient_id: impl Into<String>,
        location: impl Into<String>,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Option<Self> {
        if end_time < start_time {
            return None;
        }
        Some(Self {
            stay_id: stay_id.into(),
            patient_id: patient_id.into(),
            location: location.into(),
            start_time,
            end_time,
        })
    }

    /// Whether this stay shares a location with `other` and their intervals
    /// intersect. Touching endpoints count as overlap.
    pub fn overlaps(&self, other: &StayRecord) -> bool {
        self.location == other.location
            && intervals_overlap(
                (self.start_time, self.end_time),
                (other.start_time, other.end_time),
            )
    }
}

/// Inclusive interval intersection: `max(start) <= min(end)`.
pub fn intervals_overlap<T: Ord + Copy>(a: (T, T), b: (T, T)) -> bool {
    a.0.max(b.0) <= a.1.min(b.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_new_rejects_inverted_interval() {
        assert!(StayRecord::new("T1", "P1", "ICU", at(5), at(4)).is_none());
        assert!(StayRecord::new("T1", "P1", "ICU", at(5), at(5)).is_some());
    }

    #[test]
    fn test_touching_intervals_overlap() {
        assert!(intervals_overlap((10, 20), (20, 30)));
        assert!(intervals_overlap((20, 30), (10, 20)));
        assert!(!intervals_overlap((10, 19), (20, 30)));
    }

    #[test]
    fn test_overlap_requires_same_location() {
        let a = StayRecord::new("T1", "P1", "ICU", at(1), at(10)).unwrap();
        let b = StayRecord::new("T2", "P2", "ICU", at(10), at(12)).unwrap();
        let c = StayRecord::new("T3", "P2", "Ward 3", at(1), at(12)).unwrap();

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}

//! Canonical timestamp grid.

use chrono::{DateTime, TimeDelta, Utc};

use crate::TemporalError;

const SECONDS_PER_DAY: i64 = 86_400;

/// A fixed cadence that divides the day evenly.
///
/// Canonical timestamps are the multiples of the cadence since the Unix
/// epoch, which, because the cadence divides 24 hours, are also aligned to
/// UTC midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    seconds: i64,
}

impl Cadence {
    /// Creates a cadence of `hours`.
    ///
    /// # Errors
    ///
    /// Returns [`TemporalError::InvalidCadence`] if `hours` is zero or does
    /// not divide 24.
    pub fn from_hours(hours: u32) -> Result<Self, TemporalError> {
        if hours == 0 || 24 % hours != 0 {
            return Err(TemporalError::InvalidCadence { hours });
        }
        Ok(Self {
            seconds: i64::from(hours) * 3600,
        })
    }

    /// Snaps `t` to the nearest canonical timestamp.
    ///
    /// A timestamp at least half a block past a boundary rounds up.
    /// Sub-second precision is discarded.
    #[must_use]
    pub fn normalize(self, t: DateTime<Utc>) -> DateTime<Utc> {
        debug_assert!(SECONDS_PER_DAY % self.seconds == 0);

        let secs = t.timestamp();
        let into_block = secs.rem_euclid(self.seconds);
        let floor = secs - into_block;
        let snapped = if into_block >= self.seconds / 2 {
            floor + self.seconds
        } else {
            floor
        };
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(snapped)
    }

    /// Returns `true` if `t` already lies on the canonical grid.
    #[must_use]
    pub fn is_canonical(self, t: DateTime<Utc>) -> bool {
        self.normalize(t) == t
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            seconds: 3 * 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, m, s).unwrap()
    }

    #[test]
    fn rounds_half_up() {
        let c = Cadence::default();
        assert_eq!(c.normalize(at(10, 1, 30, 0)), at(10, 3, 0, 0));
        assert_eq!(c.normalize(at(10, 1, 29, 59)), at(10, 0, 0, 0));
        assert_eq!(c.normalize(at(10, 13, 40, 0)), at(10, 15, 0, 0));
        assert_eq!(c.normalize(at(10, 4, 10, 0)), at(10, 3, 0, 0));
    }

    #[test]
    fn crosses_day_boundary() {
        let c = Cadence::default();
        assert_eq!(c.normalize(at(10, 22, 30, 0)), at(11, 0, 0, 0));
        let new_year = Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(
            c.normalize(new_year),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn drops_sub_seconds() {
        let c = Cadence::default();
        let t = at(10, 1, 29, 59) + TimeDelta::milliseconds(999);
        assert_eq!(c.normalize(t), at(10, 0, 0, 0));
    }

    #[test]
    fn idempotent() {
        let c = Cadence::from_hours(6).unwrap();
        for t in [at(1, 0, 0, 0), at(3, 2, 59, 59), at(3, 3, 0, 0), at(30, 23, 59, 59)] {
            let once = c.normalize(t);
            assert_eq!(c.normalize(once), once);
            assert!(c.is_canonical(once));
        }
    }

    #[test]
    fn pre_epoch_times_round_correctly() {
        let c = Cadence::default();
        let t = Utc.with_ymd_and_hms(1969, 12, 31, 22, 40, 0).unwrap();
        assert_eq!(c.normalize(t), Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_cadence_not_dividing_day() {
        assert!(Cadence::from_hours(0).is_err());
        assert!(Cadence::from_hours(5).is_err());
        assert!(Cadence::from_hours(7).is_err());
        assert!(Cadence::from_hours(1).is_ok());
        assert!(Cadence::from_hours(24).is_ok());
    }
}

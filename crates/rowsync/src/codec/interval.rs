//! Binary `interval` codec.
//!
//! On the wire an interval is three big-endian fields: microseconds (i64),
//! days (i32), months (i32).

use bytes::{BufMut, BytesMut};
use chrono::TimeDelta;
use postgres_types::{FromSql, IsNull, ToSql, Type, to_sql_checked};
use std::error::Error;

use crate::Error as RowsyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PgInterval {
    pub micros: i64,
    pub days: i32,
    pub months: i32,
}

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;

impl PgInterval {
    /// Everything goes into the microseconds field.
    pub fn from_delta(delta: TimeDelta) -> Result<Self, RowsyncError> {
        let micros = delta
            .num_microseconds()
            .ok_or_else(|| RowsyncError::UnsupportedMapping {
                kind: "duration".to_owned(),
                detail: format!("{delta} does not fit in an interval"),
            })?;
        Ok(Self {
            micros,
            days: 0,
            months: 0,
        })
    }

    /// Sum days, hours, minutes, whole seconds and the fractional second.
    ///
    /// Months have no fixed length, so a non-zero month field is refused.
    pub fn to_delta(self) -> Result<TimeDelta, RowsyncError> {
        if self.months != 0 {
            return Err(RowsyncError::DecodeFailure {
                value: format!(
                    "{} months {} days {} microseconds",
                    self.months, self.days, self.micros
                ),
                target: "duration".to_owned(),
            });
        }

        let hours = self.micros / MICROS_PER_HOUR;
        let rest = self.micros % MICROS_PER_HOUR;
        let minutes = rest / MICROS_PER_MINUTE;
        let rest = rest % MICROS_PER_MINUTE;
        let seconds = rest / MICROS_PER_SECOND;
        let fraction = rest % MICROS_PER_SECOND;

        Ok(TimeDelta::days(i64::from(self.days))
            + TimeDelta::hours(hours)
            + TimeDelta::minutes(minutes)
            + TimeDelta::seconds(seconds)
            + TimeDelta::microseconds(fraction))
    }
}

impl ToSql for PgInterval {
    fn to_sql(&self, _ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        out.put_i64(self.micros);
        out.put_i32(self.days);
        out.put_i32(self.months);
        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let raw: &[u8; 16] = raw
            .try_into()
            .map_err(|_| format!("interval must be 16 bytes, got {}", raw.len()))?;
        let mut micros = [0u8; 8];
        micros.copy_from_slice(&raw[0..8]);
        let mut days = [0u8; 4];
        days.copy_from_slice(&raw[8..12]);
        let mut months = [0u8; 4];
        months.copy_from_slice(&raw[12..16]);
        Ok(Self {
            micros: i64::from_be_bytes(micros),
            days: i32::from_be_bytes(days),
            months: i32::from_be_bytes(months),
        })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifteen_minutes() {
        let interval = PgInterval::from_delta(TimeDelta::minutes(15)).unwrap();
        assert_eq!(interval.micros, 900_000_000);
        assert_eq!(interval.to_delta().unwrap(), TimeDelta::minutes(15));
    }

    #[test]
    fn test_days_and_fraction() {
        // 2 days 03:04:05.678901
        let interval = PgInterval {
            micros: 3 * MICROS_PER_HOUR + 4 * MICROS_PER_MINUTE + 5 * MICROS_PER_SECOND + 678_901,
            days: 2,
            months: 0,
        };
        let expected = TimeDelta::days(2)
            + TimeDelta::hours(3)
            + TimeDelta::minutes(4)
            + TimeDelta::seconds(5)
            + TimeDelta::microseconds(678_901);
        assert_eq!(interval.to_delta().unwrap(), expected);
    }

    #[test]
    fn test_negative_interval() {
        let interval = PgInterval {
            micros: -(90 * MICROS_PER_SECOND + 500_000),
            days: 0,
            months: 0,
        };
        assert_eq!(
            interval.to_delta().unwrap(),
            TimeDelta::microseconds(-90_500_000)
        );
    }

    #[test]
    fn test_months_refused() {
        let interval = PgInterval {
            micros: 0,
            days: 0,
            months: 1,
        };
        assert!(matches!(
            interval.to_delta(),
            Err(RowsyncError::DecodeFailure { .. })
        ));
    }

    #[test]
    fn test_wire_layout() {
        let interval = PgInterval {
            micros: 1,
            days: 2,
            months: 0,
        };
        let mut buf = BytesMut::new();
        interval.to_sql(&Type::INTERVAL, &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 0]
        );
        assert_eq!(PgInterval::from_sql(&Type::INTERVAL, &buf).unwrap(), interval);
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(PgInterval::from_sql(&Type::INTERVAL, &[0; 8]).is_err());
    }
}

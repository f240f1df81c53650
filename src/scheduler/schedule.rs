//! Recurring schedule descriptor
//!
//! A cadence plus a fixed UTC offset. Fire times are computed in the offset's
//! local time and handed back in UTC.
//!
//! Cadence syntax:
//! - `every:<duration>` (humantime, e.g. `every:15m`)
//! - `hourly` / `hourly:MM`
//! - `daily` / `daily@HH:MM`
//! - `weekly` / `weekly:<weekday>` / `weekly:<weekday>@HH:MM`

use crate::config::ConfigError;
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Timelike, Utc, Weekday,
};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed interval measured from the previous fire
    Every(std::time::Duration),
    /// Once an hour at `minute` past
    Hourly { minute: u32 },
    /// Once a day at `at`
    Daily { at: NaiveTime },
    /// Once a week on `weekday` at `at`
    Weekly { weekday: Weekday, at: NaiveTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    cadence: Cadence,
    offset: FixedOffset,
}

impl Default for Schedule {
    /// Weekly, Monday 00:00 UTC
    fn default() -> Self {
        Self {
            cadence: Cadence::Weekly {
                weekday: Weekday::Mon,
                at: NaiveTime::MIN,
            },
            offset: utc_offset(),
        }
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue(msg.into())
}

fn parse_time(s: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| invalid(format!("invalid time of day '{}' (expected HH:MM)", s)))
}

fn parse_offset(s: &str) -> Result<FixedOffset, ConfigError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s == "Z" {
        return Ok(utc_offset());
    }

    s.parse::<FixedOffset>()
        .map_err(|_| invalid(format!("invalid timezone offset '{}' (expected ±HH:MM)", s)))
}

impl Schedule {
    /// Parse a cadence descriptor and a `±HH:MM` offset
    pub fn parse(cadence: &str, offset: &str) -> Result<Self, ConfigError> {
        let offset = parse_offset(offset)?;
        let cadence = cadence.trim().to_ascii_lowercase();

        let (kind, at) = match cadence.split_once('@') {
            Some((kind, at)) => (kind, Some(parse_time(at)?)),
            None => (cadence.as_str(), None),
        };
        let (kind, arg) = match kind.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (kind, None),
        };

        let cadence = match (kind, arg, at) {
            ("every", Some(interval), None) => {
                let interval = humantime::parse_duration(interval)
                    .map_err(|e| invalid(format!("invalid interval '{}': {}", interval, e)))?;
                let reachable = Duration::from_std(interval)
                    .ok()
                    .and_then(|step| Utc::now().checked_add_signed(step))
                    .is_some();
                if interval.is_zero() || !reachable {
                    return Err(invalid(format!(
                        "interval '{}' is out of range",
                        humantime::format_duration(interval)
                    )));
                }
                Cadence::Every(interval)
            }
            ("hourly", minute, None) => {
                let minute = match minute {
                    Some(m) => m
                        .parse::<u32>()
                        .ok()
                        .filter(|m| *m < 60)
                        .ok_or_else(|| invalid(format!("invalid minute '{}'", m)))?,
                    None => 0,
                };
                Cadence::Hourly { minute }
            }
            ("daily", None, at) => Cadence::Daily {
                at: at.unwrap_or(NaiveTime::MIN),
            },
            ("weekly", weekday, at) => {
                let weekday = match weekday {
                    Some(day) => day
                        .parse::<Weekday>()
                        .map_err(|_| invalid(format!("invalid weekday '{}'", day)))?,
                    None => Weekday::Mon,
                };
                Cadence::Weekly {
                    weekday,
                    at: at.unwrap_or(NaiveTime::MIN),
                }
            }
            _ => return Err(invalid(format!("unrecognised cadence '{}'", cadence))),
        };

        Ok(Self { cadence, offset })
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// First fire time strictly after `now`, or `None` past the last
    /// representable instant
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = now.with_timezone(&self.offset).naive_local();

        let next_local = match self.cadence {
            Cadence::Every(interval) => {
                let step = Duration::from_std(interval).ok()?;
                return now.checked_add_signed(step);
            }
            Cadence::Hourly { minute } => {
                let candidate = local.date().and_hms_opt(local.hour(), minute, 0)?;
                if candidate > local {
                    candidate
                } else {
                    candidate.checked_add_signed(Duration::hours(1))?
                }
            }
            Cadence::Daily { at } => {
                let candidate = local.date().and_time(at);
                if candidate > local {
                    candidate
                } else {
                    candidate.checked_add_signed(Duration::days(1))?
                }
            }
            Cadence::Weekly { weekday, at } => {
                let days_ahead = (7 + weekday.num_days_from_monday()
                    - local.weekday().num_days_from_monday())
                    % 7;
                let candidate = local
                    .date()
                    .and_time(at)
                    .checked_add_signed(Duration::days(i64::from(days_ahead)))?;
                if candidate > local {
                    candidate
                } else {
                    candidate.checked_add_signed(Duration::weeks(1))?
                }
            }
        };

        self.to_utc(next_local)
    }

    fn to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        let utc = local
            .checked_sub_signed(Duration::seconds(i64::from(self.offset.local_minus_utc())))?;
        Some(Utc.from_utc_datetime(&utc))
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cadence {
            Cadence::Every(interval) => {
                write!(f, "every {}", humantime::format_duration(interval))
            }
            Cadence::Hourly { minute } => write!(f, "hourly at :{:02}", minute),
            Cadence::Daily { at } => write!(f, "daily at {}", at.format("%H:%M")),
            Cadence::Weekly { weekday, at } => {
                write!(f, "weekly on {} at {}", weekday, at.format("%H:%M"))
            }
        }?;
        write!(f, " ({})", self.offset)
    }
}

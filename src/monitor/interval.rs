use crate::error::AppError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const MANUAL: &str = "manual";

/// How often the meter samples on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleInterval {
    Every {
        hours: u8,
        minutes: u8,
        seconds: u8,
    },
    /// Automatic sampling is off; measurements happen on request only.
    Manual,
}

impl SampleInterval {
    pub fn is_manual(&self) -> bool {
        matches!(self, SampleInterval::Manual)
    }

    pub fn duration(&self) -> Option<Duration> {
        match *self {
            SampleInterval::Every {
                hours,
                minutes,
                seconds,
            } => Some(Duration::from_secs(
                u64::from(hours) * 3600 + u64::from(minutes) * 60 + u64::from(seconds),
            )),
            SampleInterval::Manual => None,
        }
    }
}

impl FromStr for SampleInterval {
    type Err = AppError;

    /// Accepts "manual" or "HH:MM:SS" where every field is digits and at most 59.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed == MANUAL {
            return Ok(SampleInterval::Manual);
        }

        let invalid = || AppError::InvalidInterval(raw.to_string());
        let fields: Vec<&str> = trimmed.split(':').collect();
        let [hours, minutes, seconds] = fields.as_slice() else {
            return Err(invalid());
        };

        let parse = |field: &str| -> Result<u8, AppError> {
            if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            match field.parse::<u32>() {
                Ok(value) if value <= 59 => Ok(value as u8),
                _ => Err(invalid()),
            }
        };

        Ok(SampleInterval::Every {
            hours: parse(*hours)?,
            minutes: parse(*minutes)?,
            seconds: parse(*seconds)?,
        })
    }
}

impl fmt::Display for SampleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleInterval::Every {
                hours,
                minutes,
                seconds,
            } => write!(f, "{hours:02}:{minutes:02}:{seconds:02}"),
            SampleInterval::Manual => f.write_str(MANUAL),
        }
    }
}

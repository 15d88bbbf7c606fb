pub mod exif;
pub mod json;

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDateTime};
use regex::Regex;

static BUCKET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})/(\d{2})$").unwrap());

/// Sidecar timestamps in ISO-8601 form, always UTC.
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Year assigned to media whose date could not be determined.
pub const SENTINEL_YEAR: u16 = 1;

/// Year that sentinel buckets are rewritten to before anything is uploaded.
pub const PLACEHOLDER_YEAR: u16 = 2000;

/// A `YYYY/MM` grouping. Its display form doubles as the remote folder path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bucket {
    year: u16,
    month: u8,
}

impl Bucket {
    /// Bucket for media without any usable date (`0001/01`).
    pub const SENTINEL: Bucket = Bucket {
        year: SENTINEL_YEAR,
        month: 1,
    };

    pub fn new(year: u16, month: u8) -> Option<Self> {
        if !(1..=9999).contains(&year) || !(1..=12).contains(&month) {
            return None;
        }
        Some(Self { year, month })
    }

    pub fn from_datetime(dt: &NaiveDateTime) -> Option<Self> {
        let year = u16::try_from(dt.year()).ok()?;
        Self::new(year, dt.month() as u8)
    }

    /// Parse the canonical `YYYY/MM` form.
    pub fn parse(s: &str) -> Option<Self> {
        let caps = BUCKET_RE.captures(s)?;
        Self::new(caps[1].parse().ok()?, caps[2].parse().ok()?)
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn is_sentinel(&self) -> bool {
        self.year == SENTINEL_YEAR
    }

    /// Same month, placeholder year. Non-sentinel buckets are returned unchanged.
    pub fn normalized(self) -> Self {
        if self.is_sentinel() {
            Self {
                year: PLACEHOLDER_YEAR,
                month: self.month,
            }
        } else {
            self
        }
    }

    /// Remote folder segments from the root down: `["2024", "2024/01"]`.
    pub fn segments(&self) -> Vec<String> {
        vec![format!("{:04}", self.year), self.to_string()]
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}", self.year, self.month)
    }
}

/// Parse a sidecar timestamp: ISO-8601 (`YYYY-MM-DDTHH:MM:SSZ`) first, then
/// decimal Unix epoch seconds. Both are interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, ISO_FORMAT) {
        return Some(dt);
    }
    let epoch = raw.parse::<i64>().ok()?;
    DateTime::from_timestamp(epoch, 0).map(|utc| utc.naive_utc())
}

/// Bucket for a sidecar timestamp, `None` if it parses under neither format.
pub fn bucket_for_timestamp(raw: &str) -> Option<Bucket> {
    parse_timestamp(raw).and_then(|dt| Bucket::from_datetime(&dt))
}

//! Bi-annual certificate periods.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{SeminarError, SeminarResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Half {
    /// January through June
    FirstHalf,
    /// July through December
    SecondHalf,
}

impl Half {
    pub fn as_str(&self) -> &'static str {
        match self {
            Half::FirstHalf => "first_half",
            Half::SecondHalf => "second_half",
        }
    }
}

impl std::str::FromStr for Half {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "first_half" => Ok(Half::FirstHalf),
            "second_half" => Ok(Half::SecondHalf),
            _ => Err(format!("Unknown certificate period: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CertificatePeriod {
    pub half: Half,
    pub year: i32,
}

impl CertificatePeriod {
    pub fn new(half: Half, year: i32) -> Self {
        Self { half, year }
    }

    /// Parse request parameters; a missing year means the year of `today`.
    pub fn from_request(period: &str, year: Option<i32>, today: NaiveDate) -> SeminarResult<Self> {
        let half: Half = period
            .parse()
            .map_err(|e: String| SeminarError::validation("period", e))?;
        let year = year.unwrap_or_else(|| today.year());
        if !(2000..=9999).contains(&year) {
            return Err(SeminarError::validation("year", format!("Invalid year: {}", year)));
        }
        Ok(Self { half, year })
    }

    /// The period a date falls in
    pub fn containing(date: NaiveDate) -> Self {
        let half = if date.month() <= 6 {
            Half::FirstHalf
        } else {
            Half::SecondHalf
        };
        Self {
            half,
            year: date.year(),
        }
    }

    /// First day of the window (inclusive)
    pub fn start(&self) -> NaiveDate {
        let month = match self.half {
            Half::FirstHalf => 1,
            Half::SecondHalf => 7,
        };
        NaiveDate::from_ymd_opt(self.year, month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last day of the window (inclusive)
    pub fn end(&self) -> NaiveDate {
        let (month, day) = match self.half {
            Half::FirstHalf => (6, 30),
            Half::SecondHalf => (12, 31),
        };
        NaiveDate::from_ymd_opt(self.year, month, day).unwrap_or(NaiveDate::MAX)
    }

    /// The period just before this one
    pub fn previous(&self) -> Self {
        match self.half {
            Half::FirstHalf => Self::new(Half::SecondHalf, self.year - 1),
            Half::SecondHalf => Self::new(Half::FirstHalf, self.year),
        }
    }

    /// Latest period that has fully ended before `today`
    pub fn last_completed(today: NaiveDate) -> Self {
        Self::containing(today).previous()
    }

    pub fn label(&self) -> String {
        match self.half {
            Half::FirstHalf => format!("January - June {}", self.year),
            Half::SecondHalf => format!("July - December {}", self.year),
        }
    }

    /// Stable slug used in certificate file names, e.g. `2025-first_half`
    pub fn slug(&self) -> String {
        format!("{}-{}", self.year, self.half.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let h1 = CertificatePeriod::new(Half::FirstHalf, 2025);
        assert_eq!(h1.start(), date("2025-01-01"));
        assert_eq!(h1.end(), date("2025-06-30"));

        let h2 = CertificatePeriod::new(Half::SecondHalf, 2025);
        assert_eq!(h2.start(), date("2025-07-01"));
        assert_eq!(h2.end(), date("2025-12-31"));
    }

    #[test]
    fn test_last_completed() {
        // Issuance on the first day of a half targets the half that just ended
        assert_eq!(
            CertificatePeriod::last_completed(date("2025-07-01")),
            CertificatePeriod::new(Half::FirstHalf, 2025)
        );
        assert_eq!(
            CertificatePeriod::last_completed(date("2026-01-02")),
            CertificatePeriod::new(Half::SecondHalf, 2025)
        );
        assert_eq!(
            CertificatePeriod::last_completed(date("2025-12-31")),
            CertificatePeriod::new(Half::FirstHalf, 2025)
        );
    }

    #[test]
    fn test_containing() {
        assert_eq!(
            CertificatePeriod::containing(date("2025-06-30")),
            CertificatePeriod::new(Half::FirstHalf, 2025)
        );
        assert_eq!(
            CertificatePeriod::containing(date("2025-07-01")),
            CertificatePeriod::new(Half::SecondHalf, 2025)
        );
    }

    #[test]
    fn test_from_request() {
        let today = date("2026-03-15");
        let p = CertificatePeriod::from_request("second_half", None, today).unwrap();
        assert_eq!(p, CertificatePeriod::new(Half::SecondHalf, 2026));

        let p = CertificatePeriod::from_request("first_half", Some(2024), today).unwrap();
        assert_eq!(p.slug(), "2024-first_half");
        assert_eq!(p.label(), "January - June 2024");

        assert!(matches!(
            CertificatePeriod::from_request("q3", None, today),
            Err(SeminarError::Validation { field: "period", .. })
        ));
        assert!(CertificatePeriod::from_request("first_half", Some(12), today).is_err());
    }
}

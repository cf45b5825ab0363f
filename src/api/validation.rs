//! Input validation for API requests.
//!
//! Validators return `Result<(), String>` so handlers can feed several of them
//! into a `ValidationErrorBuilder` and report every bad field at once.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::db::DATE_FORMAT;

lazy_static! {
    /// Calendar date as stored, e.g. 2025-03-14
    static ref DATE_REGEX: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();

    /// 24-hour clock time, e.g. 09:30
    static ref TIME_REGEX: Regex = Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").unwrap();

    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)+$"
    ).unwrap();
}

const MAX_TITLE_LEN: usize = 200;

/// Validate a required display text such as a seminar title or session topic
pub fn validate_title(value: &str, label: &str) -> Result<(), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{} is required", label));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(format!("{} is too long (max {} characters)", label, MAX_TITLE_LEN));
    }
    Ok(())
}

/// Validate a `YYYY-MM-DD` calendar date
pub fn validate_date(value: &str) -> Result<(), String> {
    if !DATE_REGEX.is_match(value) || NaiveDate::parse_from_str(value, DATE_FORMAT).is_err() {
        return Err(format!("Invalid date '{}'. Expected YYYY-MM-DD", value));
    }
    Ok(())
}

/// Validate an `HH:MM` time of day
pub fn validate_time(value: &str) -> Result<(), String> {
    if !TIME_REGEX.is_match(value) {
        return Err(format!("Invalid time '{}'. Expected HH:MM", value));
    }
    Ok(())
}

/// Both ends must be valid times and the session must end after it starts
pub fn validate_time_range(start: &str, end: &str) -> Result<(), String> {
    validate_time(start)?;
    validate_time(end)?;
    // Zero-padded HH:MM compares correctly as text
    if end <= start {
        return Err("Session must end after it starts".to_string());
    }
    Ok(())
}

pub fn validate_email(value: &str) -> Result<(), String> {
    if value.len() > 254 || !EMAIL_REGEX.is_match(value) {
        return Err(format!("Invalid email address '{}'", value));
    }
    Ok(())
}

pub fn validate_program_year(year: i64) -> Result<(), String> {
    if !(2000..=2100).contains(&year) {
        return Err(format!("Program year {} is out of range", year));
    }
    Ok(())
}

pub fn validate_total_sessions(total: i64) -> Result<(), String> {
    if !(1..=100).contains(&total) {
        return Err("Total sessions must be between 1 and 100".to_string());
    }
    Ok(())
}

pub fn validate_credits_per_session(credits: f64) -> Result<(), String> {
    if !credits.is_finite() || credits <= 0.0 || credits > 50.0 {
        return Err("Credits per session must be greater than 0 and at most 50".to_string());
    }
    Ok(())
}

pub fn validate_session_number(number: i64, total_sessions: i64) -> Result<(), String> {
    if number < 1 || number > total_sessions {
        return Err(format!(
            "Session number must be between 1 and {}",
            total_sessions
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title() {
        assert!(validate_title("Implant Prosthetics", "Title").is_ok());
        assert_eq!(validate_title("   ", "Topic").unwrap_err(), "Topic is required");
        assert!(validate_title(&"x".repeat(201), "Title").is_err());
    }

    #[test]
    fn test_validate_date() {
        assert!(validate_date("2025-02-28").is_ok());
        assert!(validate_date("2024-02-29").is_ok());
        assert!(validate_date("2025-02-29").is_err());
        assert!(validate_date("2025-2-1").is_err());
        assert!(validate_date("01/02/2025").is_err());
    }

    #[test]
    fn test_validate_time_range() {
        assert!(validate_time_range("09:00", "17:00").is_ok());
        assert!(validate_time_range("17:00", "09:00").is_err());
        assert!(validate_time_range("09:00", "09:00").is_err());
        assert!(validate_time("24:00").is_err());
        assert!(validate_time("9:00").is_err());
    }

    #[test]
    fn test_validate_credits_per_session() {
        assert!(validate_credits_per_session(2.0).is_ok());
        assert!(validate_credits_per_session(0.5).is_ok());
        assert!(validate_credits_per_session(0.0).is_err());
        assert!(validate_credits_per_session(-1.0).is_err());
        assert!(validate_credits_per_session(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("dr.lee@clinic.example.org").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
    }

    #[test]
    fn test_numeric_ranges() {
        assert!(validate_program_year(2025).is_ok());
        assert!(validate_program_year(1999).is_err());
        assert!(validate_total_sessions(10).is_ok());
        assert!(validate_total_sessions(0).is_err());
        assert!(validate_session_number(10, 10).is_ok());
        assert!(validate_session_number(11, 10).is_err());
        assert!(validate_session_number(0, 10).is_err());
    }
}

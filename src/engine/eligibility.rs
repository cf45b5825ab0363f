//! Makeup eligibility.
//!
//! Given a registration's sessions, the sessions it attended and its makeup
//! history, decides which sessions count as missed, which are still ahead,
//! and whether a new makeup request may be submitted.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

use crate::db::{CreateMakeupRequest, MakeupRequest, SeminarSession};

use super::{SeminarError, SeminarResult};

const MAX_REASON_LEN: usize = 1000;

/// What the participant can do about makeups right now.
///
/// Variants are mutually exclusive and checked in declaration order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MakeupState {
    /// The one makeup this registration gets has been granted
    AlreadyUsed,
    /// Every past session was attended
    PerfectAttendance,
    /// A pending or approved request exists
    RequestInFlight { request: MakeupRequest },
    Eligible,
}

#[derive(Debug, Clone, Serialize)]
pub struct MakeupEligibility {
    #[serde(flatten)]
    pub state: MakeupState,
    pub missed_sessions: Vec<SeminarSession>,
    pub future_sessions: Vec<SeminarSession>,
}

/// Sessions split relative to `today`. Attended past sessions land in neither list.
#[derive(Debug, Default)]
pub struct SessionPartition<'a> {
    pub missed: Vec<&'a SeminarSession>,
    pub future: Vec<&'a SeminarSession>,
}

pub fn partition_sessions<'a>(
    sessions: &'a [SeminarSession],
    attended: &HashSet<String>,
    today: NaiveDate,
) -> SessionPartition<'a> {
    let mut partition = SessionPartition::default();

    for session in sessions {
        let Some(date) = session.date() else {
            tracing::warn!(
                session_id = %session.id,
                session_date = %session.session_date,
                "Skipping session with malformed date"
            );
            continue;
        };

        if date >= today {
            partition.future.push(session);
        } else if !attended.contains(&session.id) {
            partition.missed.push(session);
        }
    }

    partition
}

pub fn evaluate(
    makeup_used: bool,
    missed: &[&SeminarSession],
    requests: &[MakeupRequest],
) -> MakeupState {
    if makeup_used {
        return MakeupState::AlreadyUsed;
    }
    if missed.is_empty() {
        return MakeupState::PerfectAttendance;
    }
    if let Some(request) = requests.iter().find(|r| r.is_open()) {
        return MakeupState::RequestInFlight {
            request: request.clone(),
        };
    }
    MakeupState::Eligible
}

pub fn assess(
    sessions: &[SeminarSession],
    attended: &HashSet<String>,
    makeup_used: bool,
    requests: &[MakeupRequest],
    today: NaiveDate,
) -> MakeupEligibility {
    let partition = partition_sessions(sessions, attended, today);
    let state = evaluate(makeup_used, &partition.missed, requests);

    MakeupEligibility {
        state,
        missed_sessions: partition.missed.into_iter().cloned().collect(),
        future_sessions: partition.future.into_iter().cloned().collect(),
    }
}

/// Required-field check that runs before anything touches storage
pub fn require_missed_session(req: &CreateMakeupRequest) -> SeminarResult<&str> {
    match req.missed_session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(SeminarError::validation(
            "missed_session_id",
            "Please select the session you missed",
        )),
    }
}

/// A submission that passed every rule, ready to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub missed_session_id: String,
    pub requested_session_id: Option<String>,
    pub reason: Option<String>,
}

pub fn validate_submission(
    eligibility: &MakeupEligibility,
    req: &CreateMakeupRequest,
) -> SeminarResult<ValidatedSubmission> {
    let missed_session_id = require_missed_session(req)?;

    match &eligibility.state {
        MakeupState::AlreadyUsed => {
            return Err(SeminarError::Conflict(
                "The makeup session for this registration has already been used".to_string(),
            ))
        }
        MakeupState::PerfectAttendance => {
            return Err(SeminarError::Conflict(
                "There are no missed sessions to make up".to_string(),
            ))
        }
        MakeupState::RequestInFlight { request } => {
            return Err(SeminarError::Conflict(format!(
                "A makeup request for this registration is already {}",
                request.status
            )))
        }
        MakeupState::Eligible => {}
    }

    if !eligibility
        .missed_sessions
        .iter()
        .any(|s| s.id == missed_session_id)
    {
        return Err(SeminarError::validation(
            "missed_session_id",
            "The selected session is not one you missed",
        ));
    }

    let requested_session_id = match req.requested_session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => {
            if !eligibility.future_sessions.iter().any(|s| s.id == id) {
                return Err(SeminarError::validation(
                    "requested_session_id",
                    "The requested makeup session must be an upcoming session",
                ));
            }
            Some(id.to_string())
        }
        _ => None,
    };

    let reason = req
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from);
    if reason.as_ref().is_some_and(|r| r.chars().count() > MAX_REASON_LEN) {
        return Err(SeminarError::validation(
            "reason",
            format!("Reason is too long (max {} characters)", MAX_REASON_LEN),
        ));
    }

    Ok(ValidatedSubmission {
        missed_session_id: missed_session_id.to_string(),
        requested_session_id,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, number: i64, date: &str) -> SeminarSession {
        SeminarSession {
            id: id.to_string(),
            seminar_id: "sem".to_string(),
            session_number: number,
            session_date: date.to_string(),
            time_start: "09:00".to_string(),
            time_end: "17:00".to_string(),
            topic: format!("Topic {}", number),
            description: None,
        }
    }

    fn request(status: &str) -> MakeupRequest {
        MakeupRequest {
            id: "req".to_string(),
            registration_id: "reg".to_string(),
            missed_session_id: "s1".to_string(),
            requested_session_id: None,
            reason: None,
            status: status.to_string(),
            denial_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: "2025-02-01T00:00:00Z".to_string(),
        }
    }

    fn submission(missed: Option<&str>, requested: Option<&str>) -> CreateMakeupRequest {
        CreateMakeupRequest {
            registration_id: "reg".to_string(),
            missed_session_id: missed.map(String::from),
            requested_session_id: requested.map(String::from),
            reason: Some("  Family emergency  ".to_string()),
            user_id: None,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_partition_past_and_future() {
        let sessions = vec![session("s1", 1, "2025-01-01"), session("s2", 2, "2025-06-01")];
        let p = partition_sessions(&sessions, &HashSet::new(), date("2025-03-01"));

        assert_eq!(p.missed.len(), 1);
        assert_eq!(p.missed[0].id, "s1");
        assert_eq!(p.future.len(), 1);
        assert_eq!(p.future[0].id, "s2");
    }

    #[test]
    fn test_session_today_is_future_not_missed() {
        let sessions = vec![session("s1", 1, "2025-03-01")];
        let p = partition_sessions(&sessions, &HashSet::new(), date("2025-03-01"));
        assert!(p.missed.is_empty());
        assert_eq!(p.future.len(), 1);
    }

    #[test]
    fn test_attended_past_session_is_not_missed() {
        let sessions = vec![session("s1", 1, "2025-01-01"), session("s2", 2, "2025-02-01")];
        let attended: HashSet<String> = ["s1".to_string()].into_iter().collect();
        let p = partition_sessions(&sessions, &attended, date("2025-03-01"));
        assert_eq!(p.missed.len(), 1);
        assert_eq!(p.missed[0].id, "s2");
        assert!(p.future.is_empty());
    }

    #[test]
    fn test_malformed_date_is_skipped() {
        let sessions = vec![session("s1", 1, "01/01/2025")];
        let p = partition_sessions(&sessions, &HashSet::new(), date("2025-03-01"));
        assert!(p.missed.is_empty());
        assert!(p.future.is_empty());
    }

    #[test]
    fn test_makeup_used_wins_over_everything() {
        let sessions = vec![session("s1", 1, "2025-01-01")];
        let missed: Vec<&SeminarSession> = sessions.iter().collect();
        assert!(matches!(
            evaluate(true, &missed, &[request("pending")]),
            MakeupState::AlreadyUsed
        ));
        assert!(matches!(evaluate(true, &[], &[]), MakeupState::AlreadyUsed));
    }

    #[test]
    fn test_perfect_attendance_before_request_check() {
        assert!(matches!(
            evaluate(false, &[], &[request("pending")]),
            MakeupState::PerfectAttendance
        ));
    }

    #[test]
    fn test_open_request_blocks_submission() {
        let sessions = vec![session("s1", 1, "2025-01-01"), session("s2", 2, "2025-02-01")];
        let missed: Vec<&SeminarSession> = sessions.iter().collect();

        for status in ["pending", "approved"] {
            match evaluate(false, &missed, &[request(status)]) {
                MakeupState::RequestInFlight { request } => assert_eq!(request.status, status),
                other => panic!("unexpected state {:?}", other),
            }
        }

        assert!(matches!(
            evaluate(false, &missed, &[request("denied")]),
            MakeupState::Eligible
        ));
    }

    #[test]
    fn test_submission_requires_missed_session() {
        let sessions = vec![session("s1", 1, "2025-01-01")];
        let e = assess(&sessions, &HashSet::new(), false, &[], date("2025-03-01"));

        for missing in [None, Some(""), Some("   ")] {
            let err = validate_submission(&e, &submission(missing, None)).unwrap_err();
            assert!(matches!(
                err,
                SeminarError::Validation { field: "missed_session_id", .. }
            ));
        }
    }

    #[test]
    fn test_submission_rejected_when_already_used() {
        let sessions = vec![session("s1", 1, "2025-01-01")];
        let e = assess(&sessions, &HashSet::new(), true, &[], date("2025-03-01"));
        let err = validate_submission(&e, &submission(Some("s1"), None)).unwrap_err();
        assert!(matches!(err, SeminarError::Conflict(_)));
    }

    #[test]
    fn test_submission_rejected_with_perfect_attendance() {
        let sessions = vec![session("s1", 1, "2025-01-01")];
        let attended: HashSet<String> = ["s1".to_string()].into_iter().collect();
        let e = assess(&sessions, &attended, false, &[], date("2025-03-01"));
        assert!(matches!(e.state, MakeupState::PerfectAttendance));
        assert!(validate_submission(&e, &submission(Some("s1"), None)).is_err());
    }

    #[test]
    fn test_requested_session_must_be_upcoming() {
        let sessions = vec![
            session("s1", 1, "2025-01-01"),
            session("s2", 2, "2025-02-01"),
            session("s3", 3, "2025-06-01"),
        ];
        let e = assess(&sessions, &HashSet::new(), false, &[], date("2025-03-01"));

        let err = validate_submission(&e, &submission(Some("s1"), Some("s2"))).unwrap_err();
        assert!(matches!(
            err,
            SeminarError::Validation { field: "requested_session_id", .. }
        ));

        let ok = validate_submission(&e, &submission(Some("s1"), Some("s3"))).unwrap();
        assert_eq!(ok.requested_session_id.as_deref(), Some("s3"));
        assert_eq!(ok.reason.as_deref(), Some("Family emergency"));
    }

    #[test]
    fn test_missed_session_must_be_missed() {
        let sessions = vec![session("s1", 1, "2025-01-01"), session("s3", 3, "2025-06-01")];
        let e = assess(&sessions, &HashSet::new(), false, &[], date("2025-03-01"));
        let err = validate_submission(&e, &submission(Some("s3"), None)).unwrap_err();
        assert!(matches!(
            err,
            SeminarError::Validation { field: "missed_session_id", .. }
        ));
    }

    #[test]
    fn test_eligibility_serializes_flat_state() {
        let sessions = vec![session("s1", 1, "2025-01-01")];
        let e = assess(&sessions, &HashSet::new(), false, &[request("pending")], date("2025-03-01"));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["state"], "request_in_flight");
        assert_eq!(json["request"]["status"], "pending");
        assert_eq!(json["missed_sessions"].as_array().unwrap().len(), 1);
    }
}

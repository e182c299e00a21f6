//! Job record and its state machine.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;

/// Persisted column order of the job table.
pub const JOB_COLUMNS: [&str; 7] = [
    "id",
    "prompt",
    "scheduled_time_iso",
    "status",
    "created_at_iso",
    "result",
    "error_message",
];

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for its scheduled time.
    Pending,
    /// Claimed by the scheduler and executing.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error message.
    Failed,
}

impl JobStatus {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Pending, Running) | (Pending, Failed) | (Running, Completed) | (Running, Failed)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The plain-text form stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A unit of deferred, prompt-driven work.
///
/// `scheduled_time_iso` is kept as the stored text so that a record with an
/// unparseable time can still be loaded and then failed by the claim pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub prompt: String,
    pub scheduled_time_iso: String,
    pub status: JobStatus,
    pub created_at_iso: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Job {
    /// Create a new pending job. The scheduled time is normalized to UTC.
    pub fn new(prompt: impl Into<String>, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            scheduled_time_iso: scheduled_time.to_rfc3339(),
            status: JobStatus::Pending,
            created_at_iso: Utc::now().to_rfc3339(),
            result: None,
            error_message: None,
        }
    }

    /// Parse the stored scheduled time.
    pub fn scheduled_time(&self) -> Result<DateTime<Utc>, JobError> {
        parse_instant(&self.scheduled_time_iso)
    }

    /// Parse the stored creation time.
    pub fn created_at(&self) -> Result<DateTime<Utc>, JobError> {
        parse_instant(&self.created_at_iso)
    }

    /// Whether the job is pending and its time has come.
    ///
    /// Returns `Err` when the schedule cannot be parsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> Result<bool, JobError> {
        if self.status != JobStatus::Pending {
            return Ok(false);
        }
        Ok(self.scheduled_time()? <= now)
    }

    /// Transition to a new status, enforcing the state machine.
    pub fn transition_to(&mut self, target: JobStatus) -> Result<(), JobError> {
        if !self.status.can_transition_to(target) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                state: self.status.to_string(),
                target: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// Mark the job completed with a result.
    pub fn complete(&mut self, result: impl Into<String>) -> Result<(), JobError> {
        self.transition_to(JobStatus::Completed)?;
        self.result = Some(result.into());
        self.error_message = None;
        Ok(())
    }

    /// Mark the job failed with a diagnostic.
    pub fn fail(&mut self, error_message: impl Into<String>) -> Result<(), JobError> {
        self.transition_to(JobStatus::Failed)?;
        self.result = None;
        self.error_message = Some(error_message.into());
        Ok(())
    }
}

/// Parse an ISO-8601 instant. Values without an offset are taken as UTC and
/// a bare date means midnight UTC.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, JobError> {
    let trimmed = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    // `%z` takes both `+02:00` and `+0200`, but not `Z`.
    let zulu = trimmed
        .strip_suffix(['Z', 'z'])
        .map(|base| format!("{base}+00:00"));
    let with_offset = zulu.as_deref().unwrap_or(trimmed);
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M%z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M%z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(with_offset, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(ndt.and_utc());
        }
    }

    if let Some(midnight) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }

    Err(JobError::MalformedSchedule {
        value: s.to_string(),
        reason: "expected an ISO-8601 date-time".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn allowed_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Pending));
        for terminal in [Completed, Failed] {
            assert!(terminal.is_terminal());
            for target in [Pending, Running, Completed, Failed] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn status_text_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert_eq!("completed".parse::<JobStatus>().unwrap(), JobStatus::Completed);
        assert!("CANCELLED".parse::<JobStatus>().is_err());
    }

    #[test]
    fn new_job_is_pending_and_utc() {
        let when = DateTime::parse_from_rfc3339("2030-01-01T12:00:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        let job = Job::new("hello", when);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.result.is_none());
        assert!(job.error_message.is_none());
        assert_eq!(job.scheduled_time_iso, "2030-01-01T10:00:00+00:00");
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let parsed = parse_instant("2030-01-01T10:00:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2030-01-01T10:00:00+00:00");
    }

    #[test]
    fn accepts_common_iso_forms() {
        let cases = [
            ("2030-01-01T10:00:00Z", "2030-01-01T10:00:00+00:00"),
            ("2030-01-01T10:00Z", "2030-01-01T10:00:00+00:00"),
            ("2030-01-01T10:00", "2030-01-01T10:00:00+00:00"),
            ("2030-01-01 10:00", "2030-01-01T10:00:00+00:00"),
            ("2030-01-01", "2030-01-01T00:00:00+00:00"),
            ("2030-01-01T10:00:00+0200", "2030-01-01T08:00:00+00:00"),
            ("2030-01-01T10:00+02:00", "2030-01-01T08:00:00+00:00"),
            ("2030-01-01T10:00:00.250-0130", "2030-01-01T11:30:00.250+00:00"),
        ];
        for (input, expected) in cases {
            let parsed = parse_instant(input).unwrap_or_else(|e| panic!("{input}: {e}"));
            assert_eq!(parsed.to_rfc3339(), expected, "{input}");
        }
    }

    #[test]
    fn rejects_partial_or_garbage_times() {
        for input in ["", "2030-01", "2030-13-01", "10:00", "2030-01-01T25:00", "soon"] {
            assert!(parse_instant(input).is_err(), "{input}");
        }
    }

    #[test]
    fn malformed_schedule_is_reported() {
        let mut job = Job::new("x", Utc::now());
        job.scheduled_time_iso = "not-a-date".to_string();
        let err = job.is_due(Utc::now()).unwrap_err();
        assert!(matches!(err, JobError::MalformedSchedule { .. }));
        assert!(err.to_string().contains("not-a-date"));
    }

    #[test]
    fn due_only_when_pending_and_past() {
        let now = Utc::now();
        let mut job = Job::new("x", now - Duration::seconds(1));
        assert!(job.is_due(now).unwrap());

        let future = Job::new("y", now + Duration::seconds(60));
        assert!(!future.is_due(now).unwrap());

        job.transition_to(JobStatus::Running).unwrap();
        assert!(!job.is_due(now).unwrap());
    }

    #[test]
    fn terminal_fields_are_exclusive() {
        let mut job = Job::new("x", Utc::now());
        job.transition_to(JobStatus::Running).unwrap();
        job.complete("42").unwrap();
        assert_eq!(job.result.as_deref(), Some("42"));
        assert!(job.error_message.is_none());
        assert!(job.fail("late").is_err());
    }
}

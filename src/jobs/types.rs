use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::params::TransformParams;

/// Unique job identifier, also the correlating key of a job's files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| JobError::NotFound { id: s.to_string() })
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and Failed never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry entry for one job
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    pub params: TransformParams,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Set only when Failed
    pub error: Option<String>,
    /// Set only when Completed
    pub frames_written: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(id: JobId, params: TransformParams, input_path: PathBuf, output_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            params,
            input_path,
            output_path,
            error: None,
            frames_written: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            status: self.status,
            progress: self.progress,
            action: self.params.action.name().to_string(),
            error: self.error.clone(),
            output_path: (self.status == JobStatus::Completed).then(|| self.output_path.clone()),
            frames_written: self.frames_written,
            created_at: self.created_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
        }
    }
}

/// Point-in-time copy of a job handed to pollers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_written: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::params::TransformRequest;

    #[test]
    fn test_job_id_parse_roundtrip() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!(matches!("not-a-uuid".parse::<JobId>(), Err(JobError::NotFound { .. })));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert_eq!(JobStatus::Processing.to_string(), "processing");
    }

    #[test]
    fn test_snapshot_hides_output_until_completed() {
        let params = TransformParams::from_request(&TransformRequest::default()).unwrap();
        let mut record = JobRecord::new(JobId::new(), params, "in.mp4".into(), "out.mp4".into());
        assert!(record.snapshot().output_path.is_none());
        assert_eq!(record.snapshot().action, "trim");

        record.status = JobStatus::Completed;
        assert_eq!(record.snapshot().output_path, Some(PathBuf::from("out.mp4")));
    }

    #[test]
    fn test_snapshot_serializes_lowercase_status() {
        let params = TransformParams::from_request(&TransformRequest::default()).unwrap();
        let record = JobRecord::new(JobId::new(), params, "in.mp4".into(), "out.mp4".into());
        let json = serde_json::to_value(record.snapshot()).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("error").is_none());
    }
}

//! Render jobs and their lifecycle.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use montage_common::{MontageError, MontageResult};

use crate::operation::EditOperation;
use crate::profile::ExportProfile;
use crate::request::SourceRef;

/// Job lifecycle state. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A produced output file and where it can be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub url: Option<String>,
}

/// One render of a source through an operation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: Uuid,
    pub content_id: Option<String>,
    pub source: SourceRef,
    pub operations: Vec<EditOperation>,
    pub profile: ExportProfile,
    pub status: JobStatus,
    pub output: Option<Artifact>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RenderJob {
    pub fn new(
        content_id: Option<String>,
        source: SourceRef,
        operations: Vec<EditOperation>,
        profile: ExportProfile,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_id,
            source,
            operations,
            profile,
            status: JobStatus::Pending,
            output: None,
            error: None,
            created_at,
            finished_at: None,
        }
    }

    /// First eight hex characters of the id, used in output names.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    pub fn start(&mut self) -> MontageResult<()> {
        self.transition(JobStatus::Running)
    }

    pub fn succeed(&mut self, artifact: Artifact, at: DateTime<Utc>) -> MontageResult<()> {
        self.transition(JobStatus::Succeeded)?;
        self.output = Some(artifact);
        self.finished_at = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> MontageResult<()> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(message.into());
        self.finished_at = Some(at);
        Ok(())
    }

    fn transition(&mut self, to: JobStatus) -> MontageResult<()> {
        let allowed = matches!(
            (self.status, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
        );
        if !allowed {
            return Err(MontageError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> RenderJob {
        RenderJob::new(
            Some("c-1".to_string()),
            SourceRef::Path(PathBuf::from("in.mp4")),
            Vec::new(),
            ExportProfile::default(),
            Utc::now(),
        )
    }

    #[test]
    fn test_happy_path() {
        let mut job = job();
        assert_eq!(job.status, JobStatus::Pending);
        job.start().unwrap();
        job.succeed(
            Artifact {
                path: PathBuf::from("out.mp4"),
                url: None,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.finished_at.is_some());
        assert_eq!(job.short_id().len(), 8);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = job();
        job.start().unwrap();
        job.fail("engine exploded", Utc::now()).unwrap();
        assert!(job.status.is_terminal());
        assert!(matches!(
            job.start(),
            Err(MontageError::InvalidTransition { .. })
        ));
        assert!(job.fail("again", Utc::now()).is_err());
        assert_eq!(job.error.as_deref(), Some("engine exploded"));
    }

    #[test]
    fn test_cannot_succeed_without_running() {
        let mut job = job();
        let artifact = Artifact {
            path: PathBuf::from("out.mp4"),
            url: None,
        };
        assert!(job.succeed(artifact, Utc::now()).is_err());
        assert_eq!(job.status, JobStatus::Pending);
    }
}

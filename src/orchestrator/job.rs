//! Export job records.

use crate::pipeline::{ExportRequest, ExportResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Progress reported as soon as a worker picks a job up.
pub const START_PROGRESS: u8 = 5;

/// Lifecycle of a job. Transitions only move forward:
/// `queued -> active -> completed | failed` (a queued job may also fail).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    /// Queued or active.
    pub fn is_pending(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Active)
    }

    pub fn is_finished(self) -> bool {
        !self.is_pending()
    }
}

/// One asynchronous export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub id: String,
    pub input_key: String,
    #[serde(default)]
    pub output_name: Option<String>,
    pub want_secondary: bool,
    pub status: JobStatus,
    /// 0 to 100, never decreasing.
    pub progress: u8,
    pub progress_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExportResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExportJob {
    pub fn new(id: impl Into<String>, request: &ExportRequest) -> Self {
        Self {
            id: id.into(),
            input_key: request.input_key.clone(),
            output_name: request.output_name.clone(),
            want_secondary: request.want_secondary,
            status: JobStatus::Queued,
            progress: 0,
            progress_message: "queued".to_string(),
            result: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn request(&self) -> ExportRequest {
        ExportRequest {
            input_key: self.input_key.clone(),
            output_name: self.output_name.clone(),
            want_secondary: self.want_secondary,
            job_id: Some(self.id.clone()),
        }
    }

    /// Move a queued job to active. Returns `false` for any other state.
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Queued {
            return false;
        }
        self.status = JobStatus::Active;
        self.report_progress(START_PROGRESS, "started");
        true
    }

    /// Record progress on an active job. Lower percentages are ignored.
    pub fn report_progress(&mut self, percent: u8, message: &str) {
        if self.status != JobStatus::Active || percent < self.progress {
            return;
        }
        self.progress = percent.min(100);
        self.progress_message = message.to_string();
    }

    pub fn complete(&mut self, result: ExportResult) -> bool {
        if self.status != JobStatus::Active {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.progress_message = "completed".to_string();
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        true
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_finished() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.progress_message = "failed".to_string();
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        true
    }

    /// Whether a finished job has outlived its retention period at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, completed_ttl: Duration, failed_ttl: Duration) -> bool {
        let Some(finished) = self.finished_at else {
            return false;
        };
        let ttl = match self.status {
            JobStatus::Completed => completed_ttl,
            JobStatus::Failed => failed_ttl,
            _ => return false,
        };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - finished > ttl,
            Err(_) => false,
        }
    }
}

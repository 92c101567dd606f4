// src/types/application.rs
//! Durable record of one application attempt and its status transitions.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one application attempt. `Submitted`, `Failed`,
/// `RequiresManual` and `Skipped` are terminal; a record in a terminal
/// state can no longer be transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Analyzing,
    Filling,
    Submitted,
    Failed,
    RequiresManual,
    Skipped,
}

impl ApplicationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::Failed | Self::RequiresManual | Self::Skipped
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicationMethod {
    EasyApply,
    Generic,
}

/// Append-only audit entry recorded while an attempt is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationEvent {
    pub at: DateTime<Utc>,
    pub label: String,
    pub detail: String,
}

impl ApplicationEvent {
    pub fn new(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            label: label.into(),
            detail: detail.into(),
        }
    }
}

/// One attempt to apply to one job for one profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobApplication {
    pub id: String,
    pub job_id: String,
    pub profile_id: String,
    pub status: ApplicationStatus,
    pub method: ApplicationMethod,
    pub platform: Option<String>,
    pub message: String,
    pub cover_letter: Option<String>,
    pub submission_snapshot: Option<serde_json::Value>,
    #[serde(default)]
    pub screenshots: Vec<String>,
    #[serde(default)]
    pub events: Vec<ApplicationEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobApplication {
    pub fn new(job_id: &str, profile_id: &str, method: ApplicationMethod) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            profile_id: profile_id.to_string(),
            status: ApplicationStatus::Pending,
            method,
            platform: None,
            message: String::new(),
            cover_letter: None,
            submission_snapshot: None,
            screenshots: Vec::new(),
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the attempt to a new status, recording an audit event. Fails if
    /// the record already reached a terminal status.
    pub fn transition(&mut self, status: ApplicationStatus, message: &str) -> Result<()> {
        if self.status.is_terminal() {
            anyhow::bail!(
                "application {} is already terminal ({:?}), cannot move to {:?}",
                self.id,
                self.status,
                status
            );
        }
        self.events
            .push(ApplicationEvent::new(format!("{:?}", status), message));
        self.status = status;
        self.message = message.to_string();
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn record_event(&mut self, label: &str, detail: &str) {
        self.events.push(ApplicationEvent::new(label, detail));
        self.updated_at = Utc::now();
    }
}

/// A discovered job, annotated with a match score by the external matching
/// collaborator before it reaches the navigator. Immutable from then on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListing {
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    pub platform: Option<String>,
    pub match_score: Option<f32>,
    pub match_analysis: Option<String>,
}

/// Login credentials for one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Caller-supplied knobs for one submission.
#[derive(Debug, Clone, Default)]
pub struct SubmissionOptions {
    /// Analyze and fill but never click the final submit control.
    pub dry_run: bool,
    /// Pre-written cover letter; when absent and a cover-letter field is
    /// present, one is generated from the profile and job context.
    pub cover_letter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_accumulate_events() {
        let mut app = JobApplication::new("job-1", "profile-1", ApplicationMethod::Generic);
        app.transition(ApplicationStatus::Analyzing, "analyzing page").unwrap();
        app.transition(ApplicationStatus::Filling, "filling form").unwrap();
        app.transition(ApplicationStatus::Submitted, "confirmation detected")
            .unwrap();
        assert_eq!(app.status, ApplicationStatus::Submitted);
        assert_eq!(app.events.len(), 3);
    }

    #[test]
    fn test_terminal_status_is_frozen() {
        let mut app = JobApplication::new("job-1", "profile-1", ApplicationMethod::Generic);
        app.transition(ApplicationStatus::Failed, "no form found").unwrap();
        assert!(app
            .transition(ApplicationStatus::Submitted, "should not happen")
            .is_err());
        assert_eq!(app.status, ApplicationStatus::Failed);
    }

    #[test]
    fn test_requires_manual_is_distinct_terminal() {
        let mut app = JobApplication::new("job-1", "profile-1", ApplicationMethod::EasyApply);
        app.transition(ApplicationStatus::RequiresManual, "login wall")
            .unwrap();
        assert!(app.status.is_terminal());
        assert_ne!(app.status, ApplicationStatus::Failed);
    }
}

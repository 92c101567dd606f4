// src/orchestrator.rs
//! Sequences discovery output through matching, navigation and submission.
//! Applications run strictly one at a time: concurrent sessions against
//! the same platform multiply detection risk and fight over credentials.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::config::AutomationConfig;
use crate::navigator::ApplicationNavigator;
use crate::platforms::JobPlatform;
use crate::repository::{ApplicationRepository, JobRepository, ProfileStore};
use crate::types::{
    ApplicationMethod, ApplicationStatus, Credentials, JobApplication, JobListing, Profile,
    SubmissionOptions,
};
use crate::utils::humanized_delay;

/// Per-job gate asked before any browser action is taken. Returning false
/// skips the job entirely.
pub type ConfirmationGate = Box<dyn Fn(&JobListing) -> bool + Send + Sync>;

#[derive(Default)]
pub struct HuntOptions {
    pub dry_run: bool,
    pub cover_letter: Option<String>,
    pub on_confirmation_required: Option<ConfirmationGate>,
}

#[derive(Debug, Default, Clone)]
pub struct HuntSummary {
    pub submitted: usize,
    pub failed: usize,
    pub requires_manual: usize,
    pub skipped: usize,
}

pub struct HuntOrchestrator {
    session: BrowserSession,
    config: Arc<AutomationConfig>,
    navigator: ApplicationNavigator,
    platforms: HashMap<&'static str, Arc<dyn JobPlatform>>,
    credentials: HashMap<String, Credentials>,
    jobs: Arc<dyn JobRepository>,
    applications: Arc<dyn ApplicationRepository>,
}

impl HuntOrchestrator {
    pub fn new(
        session: BrowserSession,
        config: Arc<AutomationConfig>,
        navigator: ApplicationNavigator,
        jobs: Arc<dyn JobRepository>,
        applications: Arc<dyn ApplicationRepository>,
    ) -> Self {
        Self {
            session,
            config,
            navigator,
            platforms: HashMap::new(),
            credentials: HashMap::new(),
            jobs,
            applications,
        }
    }

    /// Register a platform adapter. Adapters without credentials are never
    /// dispatched to.
    pub fn register_platform(
        &mut self,
        platform: Arc<dyn JobPlatform>,
        credentials: Option<Credentials>,
    ) {
        if let Some(credentials) = credentials {
            self.credentials
                .insert(platform.name().to_string(), credentials);
        }
        self.platforms.insert(platform.name(), platform);
    }

    /// Apply to each matched job in sequence. One job is fully processed,
    /// including the inter-job delay, before the next starts.
    pub async fn run_hunt(
        &self,
        profile: &Profile,
        jobs: Vec<JobListing>,
        options: &HuntOptions,
    ) -> Result<HuntSummary> {
        let mut summary = HuntSummary::default();
        let total = jobs.len();

        info!("Starting hunt: {} jobs for {}", total, profile.full_name());

        for (index, job) in jobs.into_iter().enumerate() {
            info!(
                "[{}/{}] {} at {} (score: {})",
                index + 1,
                total,
                job.title,
                job.company,
                job.match_score
                    .map(|s| format!("{:.0}", s))
                    .unwrap_or_else(|| "n/a".to_string())
            );

            if let Err(e) = self.jobs.upsert(&job).await {
                warn!("Failed to persist job {}: {}", job.id, e);
            }

            if let Some(minimum) = profile.preferences.min_match_score {
                if job.match_score.unwrap_or(0.0) < minimum {
                    info!("Skipping {}: below match threshold", job.id);
                    summary.skipped += 1;
                    continue;
                }
            }

            // The confirmation gate is the coarse cancellation point:
            // asked once per job, before any browser action.
            if let Some(gate) = &options.on_confirmation_required {
                if !gate(&job) {
                    info!("Skipping {}: confirmation declined", job.id);
                    let mut app =
                        JobApplication::new(&job.id, &profile.id, ApplicationMethod::Generic);
                    let _ = app.transition(ApplicationStatus::Skipped, "confirmation declined");
                    self.persist(&app).await;
                    summary.skipped += 1;
                    continue;
                }
            }

            let submission = SubmissionOptions {
                dry_run: options.dry_run,
                cover_letter: options.cover_letter.clone(),
            };

            let app = self.apply_one(&job, profile, &submission).await;
            match app.status {
                ApplicationStatus::Submitted => summary.submitted += 1,
                ApplicationStatus::RequiresManual => summary.requires_manual += 1,
                ApplicationStatus::Skipped => summary.skipped += 1,
                _ => summary.failed += 1,
            }
            info!("Attempt {} finished: {:?} ({})", app.id, app.status, app.message);
            self.persist(&app).await;

            if index + 1 < total {
                let (low, high) = self.config.delays.between_jobs_secs;
                humanized_delay(low * 1000..=high * 1000).await;
            }
        }

        info!(
            "Hunt complete: {} submitted, {} failed, {} manual, {} skipped",
            summary.submitted, summary.failed, summary.requires_manual, summary.skipped
        );
        Ok(summary)
    }

    /// Run the same hunt for every stored profile, still one application at
    /// a time across the whole run.
    pub async fn run_hunt_for_all(
        &self,
        store: &dyn ProfileStore,
        jobs: Vec<JobListing>,
        options: &HuntOptions,
    ) -> Result<HuntSummary> {
        let mut combined = HuntSummary::default();
        for profile in store.find_all().await? {
            let summary = self.run_hunt(&profile, jobs.clone(), options).await?;
            combined.submitted += summary.submitted;
            combined.failed += summary.failed;
            combined.requires_manual += summary.requires_manual;
            combined.skipped += summary.skipped;
        }
        Ok(combined)
    }

    /// Dispatch one job to its platform adapter when possible, the generic
    /// navigator otherwise.
    async fn apply_one(
        &self,
        job: &JobListing,
        profile: &Profile,
        submission: &SubmissionOptions,
    ) -> JobApplication {
        if let Some(platform_name) = job.platform.as_deref() {
            if self.platform_enabled(platform_name) {
                if let (Some(platform), Some(credentials)) = (
                    self.platforms.get(platform_name),
                    self.credentials.get(platform_name),
                ) {
                    return platform
                        .easy_apply(&self.session, job, profile, credentials, submission)
                        .await;
                }
            }
        }

        self.navigator
            .apply_to_job(&self.session, job, profile, submission)
            .await
    }

    fn platform_enabled(&self, name: &str) -> bool {
        match name {
            "linkedin" => self.config.platforms.linkedin_enabled,
            "indeed" => self.config.platforms.indeed_enabled,
            _ => false,
        }
    }

    async fn persist(&self, app: &JobApplication) {
        if let Err(e) = self.applications.create(app).await {
            warn!("Failed to persist application {}: {}", app.id, e);
            return;
        }
        if let Err(e) = self
            .applications
            .update_status(&app.id, app.status, &app.message)
            .await
        {
            warn!("Failed to persist status for {}: {}", app.id, e);
        }
        for event in &app.events {
            if let Err(e) = self.applications.add_event(&app.id, event).await {
                warn!("Failed to persist event for {}: {}", app.id, e);
            }
        }
    }

    /// Release the browser when the hunt run is over.
    pub async fn shutdown(self) -> Result<()> {
        self.session.close().await
    }
}

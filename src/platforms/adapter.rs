// src/platforms/adapter.rs
//! Shared fixed-selector engine behind the LinkedIn and Indeed adapters.
//! The sites differ only in their selector tables; the login state machine
//! and the bounded apply-modal loop are identical in shape.

use std::sync::Arc;

use anyhow::{Context, Result};
use chromiumoxide::Page;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use crate::browser::{
    capture_screenshot, restore_cookies, save_cookies, wait_for_selector, wait_for_settle,
    BrowserSession,
};
use crate::config::AutomationConfig;
use crate::form_analysis::{FormFiller, PageAnalyzer};
use crate::platforms::{JobPlatform, LoginOutcome, RateGate};
use crate::types::{
    ApplicationMethod, ApplicationStatus, Credentials, JobApplication, JobListing, PageAnalysis,
    Profile, SubmissionOptions,
};
use crate::utils::{humanized_delay, js_string};

/// Ceiling for the multi-step apply modal, mirroring the generic
/// navigator's advancing bound.
const MAX_APPLY_STEPS: u32 = 10;

/// CSS tables for one platform. Marker groups are comma-joined selector
/// lists so presence checks stay single queries.
pub struct PlatformSelectors {
    pub login_url: &'static str,
    pub username: &'static str,
    pub password: &'static str,
    pub login_submit: &'static str,
    pub logged_in_marker: &'static str,
    pub captcha_markers: &'static str,
    pub login_error: &'static str,
    pub apply_button: &'static str,
    pub modal: &'static str,
    pub next_step: &'static str,
    pub submit: &'static str,
    pub success_marker: &'static str,
}

pub struct FixedSelectorAdapter {
    name: &'static str,
    selectors: PlatformSelectors,
    gate: RateGate,
    config: Arc<AutomationConfig>,
    analyzer: Arc<PageAnalyzer>,
    filler: Arc<FormFiller>,
}

impl FixedSelectorAdapter {
    pub fn new(
        name: &'static str,
        selectors: PlatformSelectors,
        config: Arc<AutomationConfig>,
        analyzer: Arc<PageAnalyzer>,
        filler: Arc<FormFiller>,
    ) -> Self {
        let gate = RateGate::per_hour(config.platforms.max_applications_per_hour);
        Self {
            name,
            selectors,
            gate,
            config,
            analyzer,
            filler,
        }
    }

    async fn has_element(&self, page: &Page, selector: &str) -> bool {
        page.find_element(selector).await.is_ok()
    }

    async fn click(&self, page: &Page, selector: &str) -> Result<()> {
        humanized_delay(self.config.delays.around_clicks_ms.0..=self.config.delays.around_clicks_ms.1)
            .await;
        let element = page
            .find_element(selector)
            .await
            .with_context(|| format!("element not found: {}", selector))?;
        element.click().await.context("click failed")?;
        humanized_delay(self.config.delays.around_clicks_ms.0..=self.config.delays.around_clicks_ms.1)
            .await;
        Ok(())
    }

    async fn type_into(&self, page: &Page, selector: &str, text: &str) -> Result<()> {
        let element = page
            .find_element(selector)
            .await
            .with_context(|| format!("element not found: {}", selector))?;
        element.click().await.context("focus click failed")?;
        for ch in text.chars() {
            element
                .type_str(ch.to_string())
                .await
                .context("keystroke failed")?;
            humanized_delay(self.config.delays.keystroke_ms.0..=self.config.delays.keystroke_ms.1)
                .await;
        }
        Ok(())
    }

    async fn login_with_credentials(
        &self,
        page: &Page,
        credentials: &Credentials,
    ) -> Result<LoginOutcome> {
        page.goto(self.selectors.login_url)
            .await
            .context("failed to open login page")?;
        wait_for_selector(
            page,
            self.selectors.username,
            Duration::from_secs(self.config.timeouts.selector_secs),
        )
        .await?;

        self.type_into(page, self.selectors.username, &credentials.username)
            .await?;
        self.type_into(page, self.selectors.password, &credentials.password)
            .await?;
        self.click(page, self.selectors.login_submit).await?;
        wait_for_settle(page, 2000, 20_000).await.ok();

        if self.has_element(page, self.selectors.captcha_markers).await {
            warn!("{}: CAPTCHA challenge during login, stopping", self.name);
            return Ok(LoginOutcome::CaptchaDetected);
        }
        if self.has_element(page, self.selectors.login_error).await {
            return Ok(LoginOutcome::InvalidCredentials);
        }
        if self.has_element(page, self.selectors.logged_in_marker).await {
            save_cookies(page, &self.config.cookie_jar_path(self.name)).await.ok();
            return Ok(LoginOutcome::LoggedIn);
        }

        // Checkpoint/verification pages carry neither marker; treat them
        // like a CAPTCHA: a human has to finish this.
        let url = page.url().await.ok().flatten().unwrap_or_default();
        if url.contains("checkpoint") || url.contains("challenge") {
            return Ok(LoginOutcome::CaptchaDetected);
        }

        save_cookies(page, &self.config.cookie_jar_path(self.name)).await.ok();
        Ok(LoginOutcome::LoggedIn)
    }

    /// Keep only fields that live inside the apply modal; the page behind
    /// the overlay keeps its own controls out of the fill pass.
    async fn restrict_to_modal(&self, page: &Page, analysis: &mut PageAnalysis) {
        let mut kept = Vec::new();
        for field in analysis.fields.drain(..) {
            let js = format!(
                r#"(() => {{
                    const modal = document.querySelector({modal});
                    if (!modal) return false;
                    return modal.querySelector({sel}) !== null;
                }})()"#,
                modal = js_string(self.selectors.modal),
                sel = js_string(&field.selector),
            );
            let inside = page
                .evaluate(js.as_str())
                .await
                .ok()
                .and_then(|r| r.value().and_then(|v| v.as_bool()))
                .unwrap_or(false);
            if inside {
                kept.push(field);
            }
        }
        analysis.fields = kept;
    }

    async fn run_apply_steps(
        &self,
        page: &Page,
        job: &JobListing,
        profile: &Profile,
        submission: &SubmissionOptions,
        app: &mut JobApplication,
    ) -> Result<()> {
        let navigation = timeout(
            Duration::from_secs(self.config.timeouts.navigation_secs),
            page.goto(job.url.clone()),
        )
        .await;
        match navigation {
            Ok(result) => {
                result.context("failed to open job page")?;
            }
            Err(_) => anyhow::bail!(
                "job page navigation timed out after {}s",
                self.config.timeouts.navigation_secs
            ),
        }
        wait_for_settle(page, 1500, 15_000).await.ok();

        app.transition(ApplicationStatus::Analyzing, "locating apply control")?;

        if !self.has_element(page, self.selectors.apply_button).await {
            app.transition(
                ApplicationStatus::Failed,
                "no easy-apply control on job page",
            )?;
            return Ok(());
        }
        self.click(page, self.selectors.apply_button).await?;

        wait_for_selector(
            page,
            self.selectors.modal,
            Duration::from_secs(self.config.timeouts.selector_secs),
        )
        .await
        .context("apply modal did not open")?;

        app.transition(ApplicationStatus::Filling, "filling easy-apply steps")?;

        for step in 1..=MAX_APPLY_STEPS {
            info!("{}: easy-apply step {}", self.name, step);

            let mut analysis = self.analyzer.analyze(page).await?;
            self.restrict_to_modal(page, &mut analysis).await;

            if !analysis.fields.is_empty() {
                let fill = self
                    .filler
                    .fill_form(page, profile, job, Some(&analysis))
                    .await?;
                if !fill.success() {
                    app.record_event(
                        "fill-errors",
                        &format!("step {}: {}", step, fill.errors.join("; ")),
                    );
                }
            }

            if self.has_element(page, self.selectors.submit).await {
                let path = self.config.screenshot_path(&app.id, "pre-submit");
                if let Some(saved) = capture_screenshot(page, &path).await {
                    app.screenshots.push(saved);
                }

                if submission.dry_run {
                    app.transition(ApplicationStatus::Skipped, "dry run, submission skipped")?;
                    return Ok(());
                }

                self.click(page, self.selectors.submit).await?;
                wait_for_settle(page, 2000, 15_000).await.ok();

                let modal_gone = !self.has_element(page, self.selectors.modal).await;
                if modal_gone || self.has_element(page, self.selectors.success_marker).await {
                    app.transition(ApplicationStatus::Submitted, "application submitted")?;
                } else {
                    let path = self.config.screenshot_path(&app.id, "failed");
                    if let Some(saved) = capture_screenshot(page, &path).await {
                        app.screenshots.push(saved);
                    }
                    app.transition(
                        ApplicationStatus::Failed,
                        "submit clicked but no confirmation appeared",
                    )?;
                }
                return Ok(());
            }

            if self.has_element(page, self.selectors.next_step).await {
                self.click(page, self.selectors.next_step).await?;
                wait_for_settle(page, 1500, 15_000).await.ok();
                continue;
            }

            app.transition(
                ApplicationStatus::Failed,
                &format!("no actionable control in apply modal at step {}", step),
            )?;
            return Ok(());
        }

        app.transition(
            ApplicationStatus::Failed,
            &format!("apply flow did not complete within {} steps", MAX_APPLY_STEPS),
        )?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobPlatform for FixedSelectorAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_rate_limited(&self) -> bool {
        self.gate.is_tripped()
    }

    async fn ensure_login(&self, page: &Page, credentials: &Credentials) -> Result<LoginOutcome> {
        if !self.gate.acquire() {
            anyhow::bail!("{} is rate limited, refusing login attempt", self.name);
        }

        // A persisted session from an earlier run may still be valid.
        if restore_cookies(page, &self.config.cookie_jar_path(self.name)).await {
            page.goto(self.selectors.login_url)
                .await
                .context("failed to open platform")?;
            wait_for_settle(page, 1500, 10_000).await.ok();
            if self.has_element(page, self.selectors.logged_in_marker).await {
                info!("{}: restored session from cookie jar", self.name);
                return Ok(LoginOutcome::LoggedIn);
            }
        }

        self.login_with_credentials(page, credentials).await
    }

    async fn easy_apply(
        &self,
        session: &BrowserSession,
        job: &JobListing,
        profile: &Profile,
        credentials: &Credentials,
        submission: &SubmissionOptions,
    ) -> JobApplication {
        let mut app = JobApplication::new(&job.id, &profile.id, ApplicationMethod::EasyApply);
        app.platform = Some(self.name.to_string());

        // Pre-flight: fail before a page is even opened.
        if !self.gate.acquire() {
            let _ = app.transition(
                ApplicationStatus::Failed,
                &format!("{} rate limit reached, application rejected", self.name),
            );
            return app;
        }

        let page = match session.new_page().await {
            Ok(page) => page,
            Err(e) => {
                let _ = app.transition(
                    ApplicationStatus::Failed,
                    &format!("browser page unavailable: {}", e),
                );
                return app;
            }
        };

        match self.ensure_login(&page, credentials).await {
            Ok(LoginOutcome::LoggedIn) => {}
            Ok(LoginOutcome::CaptchaDetected) => {
                let path = self.config.screenshot_path(&app.id, "login-wall");
                if let Some(saved) = capture_screenshot(&page, &path).await {
                    app.screenshots.push(saved);
                }
                let _ = app.transition(
                    ApplicationStatus::RequiresManual,
                    "CAPTCHA challenge during login",
                );
                let _ = page.close().await;
                return app;
            }
            Ok(LoginOutcome::InvalidCredentials) => {
                let _ = app.transition(
                    ApplicationStatus::RequiresManual,
                    "platform rejected the stored credentials",
                );
                let _ = page.close().await;
                return app;
            }
            Err(e) => {
                let _ = app.transition(ApplicationStatus::Failed, &format!("login failed: {:#}", e));
                let _ = page.close().await;
                return app;
            }
        }

        if let Err(e) = self
            .run_apply_steps(&page, job, profile, submission, &mut app)
            .await
        {
            let path = self.config.screenshot_path(&app.id, "error");
            if let Some(saved) = capture_screenshot(&page, &path).await {
                app.screenshots.push(saved);
            }
            if !app.status.is_terminal() {
                let _ = app.transition(ApplicationStatus::Failed, &format!("{:#}", e));
            }
            warn!("{}: easy apply failed for {}: {:#}", self.name, job.id, e);
        }

        if let Err(e) = page.close().await {
            warn!("Failed to close page for attempt {}: {}", app.id, e);
        }
        app
    }
}

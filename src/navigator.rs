// src/navigator.rs
//! Multi-page application state machine. The advancing loop is bounded and
//! written against a driver trait so the contract is testable without a
//! real browser.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::Page;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use crate::ai::LanguageModel;
use crate::browser::{capture_screenshot, wait_for_settle, BrowserSession};
use crate::config::AutomationConfig;
use crate::form_analysis::{
    FormFiller, PageAnalyzer, ADVANCE_WORDS, SUBMIT_WORDS, SUCCESS_PHRASES,
};
use crate::types::{
    ApplicationMethod, ApplicationStatus, FillResult, JobApplication, JobListing, PageAnalysis,
    Profile, SubmissionOptions,
};
use crate::utils::humanized_delay;

/// Outcome of reaching the application URL.
#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub success: bool,
    pub current_page: String,
    pub error: Option<String>,
}

/// Outcome of the bounded multi-page loop.
#[derive(Debug, Clone)]
pub struct MultiPageResult {
    pub success: bool,
    pub total_pages: u32,
    pub error: Option<String>,
}

/// Page-level actions the advancing loop needs. The live implementation
/// drives a browser page; tests script the sequence.
#[async_trait]
pub trait FormPageDriver: Send {
    /// Click the next/continue affordance if one is present. `true` means
    /// the form advanced to a new page.
    async fn advance(&mut self) -> Result<bool>;
    /// Click the final submit control. `true` means a control was clicked.
    async fn submit(&mut self) -> Result<bool>;
    /// Whether a success indicator (confirmation text, toast) is visible.
    async fn success_visible(&mut self) -> Result<bool>;
}

/// Per-page fill callback, invoked exactly once per form page.
#[async_trait]
pub trait PageReadyHook: Send + Sync {
    async fn on_page_ready(&self, page_index: u32) -> Result<FillResult>;
}

/// The advancing loop: fill, advance, repeat, bounded by `max_pages`; then
/// submit and require a visible success indicator before claiming success.
pub async fn run_form_loop(
    driver: &mut dyn FormPageDriver,
    hook: &dyn PageReadyHook,
    max_pages: u32,
    skip_submit: bool,
) -> MultiPageResult {
    let mut total_pages = 0;
    let mut exhausted = true;

    for page_index in 1..=max_pages {
        total_pages = page_index;

        match hook.on_page_ready(page_index).await {
            Ok(fill) => {
                if !fill.success() {
                    return MultiPageResult {
                        success: false,
                        total_pages,
                        error: Some(format!(
                            "page {} fill failed: {}",
                            page_index,
                            fill.errors.join("; ")
                        )),
                    };
                }
            }
            Err(e) => {
                return MultiPageResult {
                    success: false,
                    total_pages,
                    error: Some(format!("page {} preparation failed: {}", page_index, e)),
                }
            }
        }

        match driver.advance().await {
            Ok(true) => {
                info!("Advanced past form page {}", page_index);
            }
            Ok(false) => {
                exhausted = false;
                break;
            }
            Err(e) => {
                return MultiPageResult {
                    success: false,
                    total_pages,
                    error: Some(format!("advance failed on page {}: {}", page_index, e)),
                }
            }
        }
    }

    // A continue control that never disappears means the form is not
    // actually progressing; stop instead of clicking forever.
    if exhausted {
        return MultiPageResult {
            success: false,
            total_pages,
            error: Some(format!(
                "form did not complete within {} pages",
                max_pages
            )),
        };
    }

    if skip_submit {
        info!("Dry run: skipping final submit after {} pages", total_pages);
        return MultiPageResult {
            success: true,
            total_pages,
            error: None,
        };
    }

    match driver.submit().await {
        Ok(true) => {}
        Ok(false) => {
            // Some single-page flows submit on the last advance; accept a
            // visible confirmation as success.
            return match driver.success_visible().await {
                Ok(true) => MultiPageResult {
                    success: true,
                    total_pages,
                    error: None,
                },
                _ => MultiPageResult {
                    success: false,
                    total_pages,
                    error: Some("no submit control found".to_string()),
                },
            };
        }
        Err(e) => {
            return MultiPageResult {
                success: false,
                total_pages,
                error: Some(format!("submit failed: {}", e)),
            }
        }
    }

    match driver.success_visible().await {
        Ok(true) => MultiPageResult {
            success: true,
            total_pages,
            error: None,
        },
        Ok(false) => MultiPageResult {
            success: false,
            total_pages,
            error: Some("submit completed without a success confirmation".to_string()),
        },
        Err(e) => MultiPageResult {
            success: false,
            total_pages,
            error: Some(format!("success detection failed: {}", e)),
        },
    }
}

/// Driver over a live browser page using word-ranked control scans.
pub struct LivePageDriver<'a> {
    page: &'a Page,
    config: &'a AutomationConfig,
    /// When set, a forensic screenshot is captured right before submit.
    screenshot_id: Option<String>,
    pub screenshots: Vec<String>,
}

impl<'a> LivePageDriver<'a> {
    pub fn new(page: &'a Page, config: &'a AutomationConfig, screenshot_id: Option<String>) -> Self {
        Self {
            page,
            config,
            screenshot_id,
            screenshots: Vec::new(),
        }
    }

    async fn click_control(&self, words: &[&str]) -> Result<bool> {
        let words_json = serde_json::to_string(words).unwrap_or_else(|_| "[]".to_string());
        let js = format!(
            r#"(() => {{
                const words = {words};
                const candidates = Array.from(document.querySelectorAll(
                    'button, input[type="submit"], input[type="button"], a[role="button"]'));
                const visible = el => {{
                    const r = el.getBoundingClientRect();
                    return r.width > 0 && r.height > 0;
                }};
                const textOf = el =>
                    ((el.innerText || el.value || '') + ' ' + (el.getAttribute('aria-label') || '')).toLowerCase();
                for (const word of words) {{
                    const el = candidates.find(c => visible(c) && textOf(c).includes(word));
                    if (el) {{ el.click(); return true; }}
                }}
                return false;
            }})()"#,
            words = words_json
        );

        humanized_delay(self.config.delays.around_clicks_ms.0..=self.config.delays.around_clicks_ms.1)
            .await;
        let result = self.page.evaluate(js.as_str()).await.context("control scan failed")?;
        let clicked = result.value().and_then(|v| v.as_bool()).unwrap_or(false);
        if clicked {
            wait_for_settle(self.page, 1500, 15_000).await.ok();
        }
        Ok(clicked)
    }
}

#[async_trait]
impl<'a> FormPageDriver for LivePageDriver<'a> {
    async fn advance(&mut self) -> Result<bool> {
        self.click_control(ADVANCE_WORDS).await
    }

    async fn submit(&mut self) -> Result<bool> {
        if let Some(id) = &self.screenshot_id {
            let path = self.config.screenshot_path(id, "pre-submit");
            if let Some(saved) = capture_screenshot(self.page, &path).await {
                self.screenshots.push(saved);
            }
        }
        self.click_control(SUBMIT_WORDS).await
    }

    async fn success_visible(&mut self) -> Result<bool> {
        let phrases = serde_json::to_string(SUCCESS_PHRASES).unwrap_or_else(|_| "[]".to_string());
        let js = format!(
            r#"(() => {{
                const phrases = {phrases};
                const text = (document.body.innerText || '').toLowerCase();
                return phrases.some(p => text.includes(p));
            }})()"#,
            phrases = phrases
        );
        let result = self.page.evaluate(js.as_str()).await.context("success scan failed")?;
        Ok(result.value().and_then(|v| v.as_bool()).unwrap_or(false))
    }
}

/// Classify an analyzed page into the navigator's page states.
pub fn classify_current_page(analysis: &PageAnalysis) -> &'static str {
    if analysis.classification.login_required {
        "login"
    } else if analysis.classification.is_confirmation {
        "confirmation"
    } else if analysis.classification.is_application_form {
        "form"
    } else {
        "unknown"
    }
}

/// Drives one application attempt end to end against an arbitrary site.
pub struct ApplicationNavigator {
    analyzer: Arc<PageAnalyzer>,
    filler: Arc<FormFiller>,
    llm: Arc<dyn LanguageModel>,
    config: Arc<AutomationConfig>,
}

impl ApplicationNavigator {
    pub fn new(
        analyzer: Arc<PageAnalyzer>,
        filler: Arc<FormFiller>,
        llm: Arc<dyn LanguageModel>,
        config: Arc<AutomationConfig>,
    ) -> Self {
        Self {
            analyzer,
            filler,
            llm,
            config,
        }
    }

    /// Navigate to the job's application URL and report which kind of page
    /// was reached. A login wall is a distinct, non-error outcome.
    pub async fn navigate_to_application(
        &self,
        page: &Page,
        job: &JobListing,
    ) -> NavigationResult {
        let navigation = timeout(
            Duration::from_secs(self.config.timeouts.navigation_secs),
            page.goto(job.url.clone()),
        )
        .await;

        match navigation {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return NavigationResult {
                    success: false,
                    current_page: "error".to_string(),
                    error: Some(format!("navigation failed: {}", e)),
                }
            }
            Err(_) => {
                return NavigationResult {
                    success: false,
                    current_page: "error".to_string(),
                    error: Some(format!(
                        "navigation timed out after {}s",
                        self.config.timeouts.navigation_secs
                    )),
                }
            }
        }

        wait_for_settle(page, 1500, 15_000).await.ok();

        match self.analyzer.analyze(page).await {
            Ok(analysis) => {
                let current_page = classify_current_page(&analysis);
                NavigationResult {
                    success: current_page == "form",
                    current_page: current_page.to_string(),
                    error: None,
                }
            }
            Err(e) => NavigationResult {
                success: false,
                current_page: "error".to_string(),
                error: Some(format!("page analysis failed: {}", e)),
            },
        }
    }

    /// Walk an already-loaded multi-page form, invoking the hook once per
    /// page and bounding the advance loop.
    pub async fn navigate_multi_page_form(
        &self,
        page: &Page,
        on_page_ready: &dyn PageReadyHook,
    ) -> MultiPageResult {
        let mut driver = LivePageDriver::new(page, self.config.as_ref(), None);
        run_form_loop(&mut driver, on_page_ready, self.config.max_form_pages, false).await
    }

    /// Own one application attempt end to end. Never returns an error: all
    /// failure modes land in the returned record's terminal status, and the
    /// page is closed on every path.
    pub async fn apply_to_job(
        &self,
        session: &BrowserSession,
        job: &JobListing,
        profile: &Profile,
        submission: &SubmissionOptions,
    ) -> JobApplication {
        let mut app = JobApplication::new(&job.id, &profile.id, ApplicationMethod::Generic);
        app.platform = job.platform.clone();
        app.cover_letter = submission.cover_letter.clone();

        info!("Applying to {} at {} ({})", job.title, job.company, job.url);

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

        if let Err(e) = self.run_attempt(&page, job, profile, submission, &mut app).await {
            let path = self.config.screenshot_path(&app.id, "error");
            if let Some(saved) = capture_screenshot(&page, &path).await {
                app.screenshots.push(saved);
            }
            if !app.status.is_terminal() {
                let _ = app.transition(ApplicationStatus::Failed, &format!("{:#}", e));
            }
            warn!("Application attempt {} failed: {:#}", app.id, e);
        }

        if let Err(e) = page.close().await {
            warn!("Failed to close page for attempt {}: {}", app.id, e);
        }
        app
    }

    async fn run_attempt(
        &self,
        page: &Page,
        job: &JobListing,
        profile: &Profile,
        submission: &SubmissionOptions,
        app: &mut JobApplication,
    ) -> Result<()> {
        app.transition(ApplicationStatus::Analyzing, "navigating to application")?;

        let nav = self.navigate_to_application(page, job).await;
        app.record_event("navigation", &nav.current_page);

        match nav.current_page.as_str() {
            "login" => {
                let path = self.config.screenshot_path(&app.id, "login-wall");
                if let Some(saved) = capture_screenshot(page, &path).await {
                    app.screenshots.push(saved);
                }
                app.transition(
                    ApplicationStatus::RequiresManual,
                    "application is behind a login wall",
                )?;
                return Ok(());
            }
            "error" => {
                anyhow::bail!(nav.error.unwrap_or_else(|| "navigation failed".to_string()));
            }
            _ => {}
        }

        let mut analysis = self.analyzer.analyze(page).await?;
        if analysis.is_empty() {
            let path = self.config.screenshot_path(&app.id, "failed");
            if let Some(saved) = capture_screenshot(page, &path).await {
                app.screenshots.push(saved);
            }
            app.transition(ApplicationStatus::Failed, "no form fields found on page")?;
            return Ok(());
        }

        self.attach_cover_letter(&mut analysis, profile, job, submission, app)
            .await;

        app.transition(ApplicationStatus::Filling, "filling application form")?;

        let hook = SequentialFillPass {
            filler: self.filler.clone(),
            page,
            profile,
            job,
            first_analysis: Mutex::new(Some(analysis)),
        };
        let mut driver = LivePageDriver::new(page, self.config.as_ref(), Some(app.id.clone()));
        let result = run_form_loop(
            &mut driver,
            &hook,
            self.config.max_form_pages,
            submission.dry_run,
        )
        .await;

        app.screenshots.extend(driver.screenshots.drain(..));
        app.submission_snapshot = Some(serde_json::json!({
            "total_pages": result.total_pages,
            "dry_run": submission.dry_run,
        }));

        if result.success {
            if submission.dry_run {
                app.transition(ApplicationStatus::Skipped, "dry run, submission skipped")?;
            } else {
                app.transition(ApplicationStatus::Submitted, "application submitted")?;
            }
            return Ok(());
        }

        let path = self.config.screenshot_path(&app.id, "failed");
        if let Some(saved) = capture_screenshot(page, &path).await {
            app.screenshots.push(saved);
        }
        app.transition(
            ApplicationStatus::Failed,
            &result
                .error
                .unwrap_or_else(|| "application did not complete".to_string()),
        )?;
        Ok(())
    }

    /// Pre-resolve cover-letter fields: a supplied letter wins, otherwise
    /// one is generated when the form actually asks for it.
    async fn attach_cover_letter(
        &self,
        analysis: &mut PageAnalysis,
        profile: &Profile,
        job: &JobListing,
        submission: &SubmissionOptions,
        app: &mut JobApplication,
    ) {
        let wants_letter = analysis
            .fields
            .iter()
            .any(|f| f.label.to_lowercase().contains("cover letter"));
        if !wants_letter {
            return;
        }

        let letter = match &submission.cover_letter {
            Some(letter) => letter.clone(),
            None => match self.generate_cover_letter(profile, job).await {
                Some(letter) => letter,
                None => return,
            },
        };

        for field in &mut analysis.fields {
            if field.label.to_lowercase().contains("cover letter") && field.value.is_none() {
                field.value = Some(letter.clone());
            }
        }
        app.cover_letter = Some(letter);
        app.record_event("cover-letter", "attached cover letter to form");
    }

    async fn generate_cover_letter(&self, profile: &Profile, job: &JobListing) -> Option<String> {
        let description: String = job.description.chars().take(2000).collect();
        let prompt = format!(
            r#"Write a short cover letter (under 250 words) for this application.

CANDIDATE: {name}
SKILLS: {skills}
RECENT EXPERIENCE: {experience}

JOB: {title} at {company}
DESCRIPTION: {description}

Write in first person, professional but warm. Reply with the letter only."#,
            name = profile.full_name(),
            skills = profile.skills.join(", "),
            experience = profile
                .experience
                .first()
                .map(|e| format!("{} at {}", e.title, e.company))
                .unwrap_or_default(),
            title = job.title,
            company = job.company,
            description = description,
        );

        match self.llm.complete("Cover Letter", &prompt).await {
            Ok(letter) => Some(letter.trim().to_string()),
            Err(e) => {
                warn!("Cover letter generation failed: {}", e);
                None
            }
        }
    }
}

/// Fill hook used by `apply_to_job`: the first page reuses the analysis
/// that was already produced, later pages re-analyze the mutated DOM.
struct SequentialFillPass<'a> {
    filler: Arc<FormFiller>,
    page: &'a Page,
    profile: &'a Profile,
    job: &'a JobListing,
    first_analysis: Mutex<Option<PageAnalysis>>,
}

#[async_trait]
impl<'a> PageReadyHook for SequentialFillPass<'a> {
    async fn on_page_ready(&self, page_index: u32) -> Result<FillResult> {
        let first = self.first_analysis.lock().await.take();
        info!("Filling form page {}", page_index);
        self.filler
            .fill_form(self.page, self.profile, self.job, first.as_ref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageClassification;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedDriver {
        advances_remaining: u32,
        always_advance: bool,
        submit_available: bool,
        confirmation_shown: bool,
        submits: u32,
    }

    impl ScriptedDriver {
        fn pages(n: u32) -> Self {
            Self {
                advances_remaining: n.saturating_sub(1),
                always_advance: false,
                submit_available: true,
                confirmation_shown: true,
                submits: 0,
            }
        }
    }

    #[async_trait]
    impl FormPageDriver for ScriptedDriver {
        async fn advance(&mut self) -> Result<bool> {
            if self.always_advance {
                return Ok(true);
            }
            if self.advances_remaining > 0 {
                self.advances_remaining -= 1;
                Ok(true)
            } else {
                Ok(false)
            }
        }

        async fn submit(&mut self) -> Result<bool> {
            self.submits += 1;
            Ok(self.submit_available)
        }

        async fn success_visible(&mut self) -> Result<bool> {
            Ok(self.confirmation_shown)
        }
    }

    struct CountingHook(AtomicU32);

    #[async_trait]
    impl PageReadyHook for CountingHook {
        async fn on_page_ready(&self, _page_index: u32) -> Result<FillResult> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(FillResult {
                fields_filled: 1,
                fields_skipped: 0,
                errors: vec![],
            })
        }
    }

    #[tokio::test]
    async fn test_three_page_form_fills_each_page_once() {
        let mut driver = ScriptedDriver::pages(3);
        let hook = CountingHook(AtomicU32::new(0));

        let result = run_form_loop(&mut driver, &hook, 10, false).await;

        assert!(result.success);
        assert_eq!(result.total_pages, 3);
        assert_eq!(hook.0.load(Ordering::SeqCst), 3);
        assert_eq!(driver.submits, 1);
    }

    #[tokio::test]
    async fn test_stuck_continue_terminates_at_bound() {
        let mut driver = ScriptedDriver::pages(1);
        driver.always_advance = true;
        let hook = CountingHook(AtomicU32::new(0));

        let result = run_form_loop(&mut driver, &hook, 10, false).await;

        assert!(!result.success);
        assert_eq!(result.total_pages, 10);
        assert_eq!(hook.0.load(Ordering::SeqCst), 10);
        assert!(result.error.unwrap().contains("10 pages"));
    }

    #[tokio::test]
    async fn test_submit_without_confirmation_is_failure() {
        let mut driver = ScriptedDriver::pages(1);
        driver.confirmation_shown = false;
        let hook = CountingHook(AtomicU32::new(0));

        let result = run_form_loop(&mut driver, &hook, 10, false).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("success confirmation"));
    }

    #[tokio::test]
    async fn test_dry_run_never_submits() {
        let mut driver = ScriptedDriver::pages(2);
        let hook = CountingHook(AtomicU32::new(0));

        let result = run_form_loop(&mut driver, &hook, 10, true).await;

        assert!(result.success);
        assert_eq!(result.total_pages, 2);
        assert_eq!(driver.submits, 0);
    }

    #[tokio::test]
    async fn test_failed_fill_stops_the_loop() {
        struct FailingHook;

        #[async_trait]
        impl PageReadyHook for FailingHook {
            async fn on_page_ready(&self, _page_index: u32) -> Result<FillResult> {
                Ok(FillResult {
                    fields_filled: 0,
                    fields_skipped: 0,
                    errors: vec!["everything broke".to_string()],
                })
            }
        }

        let mut driver = ScriptedDriver::pages(3);
        let result = run_form_loop(&mut driver, &FailingHook, 10, false).await;

        assert!(!result.success);
        assert_eq!(result.total_pages, 1);
        assert_eq!(driver.submits, 0);
    }

    #[test]
    fn test_classify_current_page() {
        let mut analysis = PageAnalysis::default();
        assert_eq!(classify_current_page(&analysis), "unknown");

        analysis.classification = PageClassification {
            login_required: true,
            ..Default::default()
        };
        assert_eq!(classify_current_page(&analysis), "login");

        analysis.classification = PageClassification {
            is_application_form: true,
            ..Default::default()
        };
        assert_eq!(classify_current_page(&analysis), "form");

        analysis.classification = PageClassification {
            is_confirmation: true,
            ..Default::default()
        };
        assert_eq!(classify_current_page(&analysis), "confirmation");
    }
}

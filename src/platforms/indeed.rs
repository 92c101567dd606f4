// src/platforms/indeed.rs
//! Indeed Apply selector tables. Indeed renders its apply flow in an
//! in-page widget; the continue button doubles as the step control.

use std::sync::Arc;

use crate::config::AutomationConfig;
use crate::form_analysis::{FormFiller, PageAnalyzer};
use crate::platforms::{FixedSelectorAdapter, PlatformSelectors};

pub const PLATFORM_NAME: &str = "indeed";

const SELECTORS: PlatformSelectors = PlatformSelectors {
    login_url: "https://secure.indeed.com/account/login",
    username: "input[name=\"__email\"]",
    password: "input[name=\"__password\"]",
    login_submit: "button[type=\"submit\"]",
    logged_in_marker: "[data-gnav-element-name=\"AccountMenu\"], #AccountMenu",
    captcha_markers: ".g-recaptcha, iframe[src*=\"recaptcha\"], #captcha-challenge",
    login_error: ".icl-Alert--danger, #label-login-input-error",
    apply_button: "#indeedApplyButton, .ia-IndeedApplyButton, button[id*=\"indeedApplyButton\"]",
    modal: "#ia-container, .ia-Modal",
    next_step: ".ia-continueButton, button[data-testid=\"continue-button\"]",
    submit: "button[data-testid=\"indeed-apply-button-submit\"], .ia-SubmitButton",
    success_marker: ".ia-PostApply, [data-testid=\"post-apply\"], .ia-ApplyConfirmation",
};

pub fn platform(
    config: Arc<AutomationConfig>,
    analyzer: Arc<PageAnalyzer>,
    filler: Arc<FormFiller>,
) -> FixedSelectorAdapter {
    FixedSelectorAdapter::new(PLATFORM_NAME, SELECTORS, config, analyzer, filler)
}

/// Whether a listing points at an Indeed-hosted job.
pub fn hosts_job(url: &str) -> bool {
    url.contains("indeed.com/viewjob") || url.contains("indeed.com/job/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosts_job() {
        assert!(hosts_job("https://www.indeed.com/viewjob?jk=abc123"));
        assert!(!hosts_job("https://boards.greenhouse.io/acme/jobs/1"));
    }
}

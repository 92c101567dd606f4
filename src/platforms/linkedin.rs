// src/platforms/linkedin.rs
//! LinkedIn Easy Apply selector tables. The multi-step modal markup has
//! been stable for years; aria-labels are the most durable hooks.

use std::sync::Arc;

use crate::config::AutomationConfig;
use crate::form_analysis::{FormFiller, PageAnalyzer};
use crate::platforms::{FixedSelectorAdapter, PlatformSelectors};

pub const PLATFORM_NAME: &str = "linkedin";

const SELECTORS: PlatformSelectors = PlatformSelectors {
    login_url: "https://www.linkedin.com/login",
    username: "#username",
    password: "#password",
    login_submit: "button[type=\"submit\"]",
    logged_in_marker: ".global-nav, #global-nav",
    captcha_markers: "#captcha-internal, .challenge-dialog, iframe[src*=\"captcha\"]",
    login_error: "#error-for-username, #error-for-password",
    apply_button: ".jobs-apply-button, button[aria-label*=\"Easy Apply\"]",
    modal: ".jobs-easy-apply-modal, .jobs-easy-apply-content",
    next_step: "button[aria-label=\"Continue to next step\"], button[aria-label=\"Review your application\"]",
    submit: "button[aria-label=\"Submit application\"]",
    success_marker: ".artdeco-inline-feedback--success, .jobs-post-apply, h2[id*=\"post-apply\"]",
};

pub fn platform(
    config: Arc<AutomationConfig>,
    analyzer: Arc<PageAnalyzer>,
    filler: Arc<FormFiller>,
) -> FixedSelectorAdapter {
    FixedSelectorAdapter::new(PLATFORM_NAME, SELECTORS, config, analyzer, filler)
}

/// Whether a listing points at a LinkedIn-hosted job.
pub fn hosts_job(url: &str) -> bool {
    url.contains("linkedin.com/jobs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosts_job() {
        assert!(hosts_job("https://www.linkedin.com/jobs/view/1234"));
        assert!(!hosts_job("https://careers.acme.com/apply/1234"));
    }
}

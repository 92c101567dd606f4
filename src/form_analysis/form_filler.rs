// src/form_analysis/form_filler.rs
//! Commits resolved values into the live DOM with human-like pacing.
//! Element-not-found and not-visible are expected outcomes, never errors;
//! per-field failures are collected and the remaining fields still run.

use std::sync::Arc;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::ai::LanguageModel;
use crate::config::DelayConfig;
use crate::form_analysis::{FieldResolver, PageAnalyzer};
use crate::types::{FieldType, FillResult, FormField, JobListing, PageAnalysis, Profile, SelectOption};
use crate::utils::{humanized_delay, is_truthy, js_string, matching_key};

pub struct FormFiller {
    analyzer: Arc<PageAnalyzer>,
    resolver: FieldResolver,
    delays: DelayConfig,
}

enum FieldOutcome {
    Filled,
    AlreadyFilled,
    Skipped(String),
    Error(String),
}

impl FormFiller {
    pub fn new(analyzer: Arc<PageAnalyzer>, llm: Arc<dyn LanguageModel>, delays: DelayConfig) -> Self {
        Self {
            analyzer,
            resolver: FieldResolver::new(llm),
            delays,
        }
    }

    /// Fill every field of the page. When no analysis is supplied the page
    /// is analyzed first; a caller-supplied analysis must come from the
    /// current DOM state, not an earlier page.
    pub async fn fill_form(
        &self,
        page: &Page,
        profile: &Profile,
        job: &JobListing,
        analysis: Option<&PageAnalysis>,
    ) -> Result<FillResult> {
        let owned;
        let analysis = match analysis {
            Some(a) => a,
            None => {
                owned = self.analyzer.analyze(page).await?;
                &owned
            }
        };

        let mut result = FillResult::default();

        for field in &analysis.fields {
            humanized_delay(self.delays.between_fields_ms.0..=self.delays.between_fields_ms.1)
                .await;

            let outcome = self.fill_field(page, field, profile, job).await;
            record_outcome(&mut result, &field.label, outcome);
        }

        info!(
            "Fill pass: {} filled, {} skipped, {} errors",
            result.fields_filled,
            result.fields_skipped,
            result.errors.len()
        );
        Ok(result)
    }

    async fn fill_field(
        &self,
        page: &Page,
        field: &FormField,
        profile: &Profile,
        job: &JobListing,
    ) -> FieldOutcome {
        let value = self.resolver.resolve(field, profile, job).await;
        if value.is_empty() {
            if field.required {
                return FieldOutcome::Error(format!(
                    "no value resolved for required field '{}'",
                    field.label
                ));
            }
            return FieldOutcome::Skipped("no value resolved".to_string());
        }

        // Radio groups are addressed by name, not a single element.
        if field.field_type == FieldType::Radio {
            return self.fill_radio(page, field, &value).await;
        }

        if page.find_element(&field.selector).await.is_err() {
            return FieldOutcome::Skipped("element not found".to_string());
        }

        match self.is_visible(page, &field.selector).await {
            Ok(true) => {}
            Ok(false) => return FieldOutcome::Skipped("element not visible".to_string()),
            Err(e) => return FieldOutcome::Error(format!("visibility check failed: {}", e)),
        }

        match self.is_already_filled(page, field).await {
            Ok(true) => return FieldOutcome::AlreadyFilled,
            Ok(false) => {}
            Err(e) => {
                return FieldOutcome::Error(format!(
                    "pre-fill check failed for '{}': {}",
                    field.label, e
                ))
            }
        }

        let filled = match field.field_type {
            FieldType::Text | FieldType::Email | FieldType::Phone | FieldType::Textarea => {
                self.fill_text(page, field, &value).await
            }
            FieldType::Select => self.fill_select(page, field, &value).await,
            FieldType::Checkbox => self.fill_checkbox(page, field, &value).await,
            FieldType::File => self.fill_file(page, field, &value).await,
            FieldType::Radio => unreachable!("radio handled above"),
        };

        match filled {
            Ok(()) => FieldOutcome::Filled,
            Err(e) => FieldOutcome::Error(format!("failed to fill '{}': {}", field.label, e)),
        }
    }

    async fn fill_text(&self, page: &Page, field: &FormField, value: &str) -> Result<()> {
        let element = page.find_element(&field.selector).await?;

        humanized_delay(self.delays.around_clicks_ms.0..=self.delays.around_clicks_ms.1).await;
        element.click().await.context("click failed")?;

        let clear = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                el.value = '';
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(&field.selector)
        );
        page.evaluate(clear.as_str()).await.context("clear failed")?;

        for ch in value.chars() {
            element
                .type_str(ch.to_string())
                .await
                .context("keystroke failed")?;
            humanized_delay(self.delays.keystroke_ms.0..=self.delays.keystroke_ms.1).await;
        }

        humanized_delay(self.delays.around_clicks_ms.0..=self.delays.around_clicks_ms.1).await;
        Ok(())
    }

    async fn fill_select(&self, page: &Page, field: &FormField, value: &str) -> Result<()> {
        let options = if field.options.is_empty() {
            self.live_select_options(page, &field.selector).await?
        } else {
            field.options.clone()
        };

        let index = match best_option_match(&options, value) {
            Some(index) => index,
            None => first_non_empty_option(&options)
                .context("select has no usable options")?,
        };

        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.selectedIndex = {index};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(&field.selector),
            index = index
        );
        let ok: bool = self.eval(page, &js).await?;
        anyhow::ensure!(ok, "select element disappeared");
        Ok(())
    }

    async fn fill_checkbox(&self, page: &Page, field: &FormField, value: &str) -> Result<()> {
        let js = format!(
            "document.querySelector({}).checked",
            js_string(&field.selector)
        );
        let current: bool = self.eval(page, &js).await?;

        if checkbox_needs_click(current, value) {
            humanized_delay(self.delays.around_clicks_ms.0..=self.delays.around_clicks_ms.1).await;
            let element = page.find_element(&field.selector).await?;
            element.click().await.context("checkbox click failed")?;
        }
        Ok(())
    }

    async fn fill_radio(&self, page: &Page, field: &FormField, value: &str) -> FieldOutcome {
        let Some(group) = radio_group_name(&field.selector) else {
            return FieldOutcome::Skipped("radio group has no name".to_string());
        };

        let options = match self.live_radio_options(page, &group).await {
            Ok(options) if !options.is_empty() => options,
            Ok(_) => return FieldOutcome::Skipped("radio group not found".to_string()),
            Err(e) => return FieldOutcome::Error(format!("radio enumeration failed: {}", e)),
        };

        let checked = match self.radio_group_checked(page, &group).await {
            Ok(checked) => checked,
            Err(e) => return FieldOutcome::Error(format!("radio state check failed: {}", e)),
        };
        if checked {
            return FieldOutcome::AlreadyFilled;
        }

        // An unmatched group still gets an answer: the first radio is
        // selected rather than leaving a required group blank.
        let index = best_radio_match(&options, value).unwrap_or(0);

        humanized_delay(self.delays.around_clicks_ms.0..=self.delays.around_clicks_ms.1).await;
        let js = format!(
            r#"(() => {{
                const radios = document.querySelectorAll('input[type="radio"][name="{group}"]');
                if (radios.length <= {index}) return false;
                radios[{index}].click();
                return true;
            }})()"#,
            group = group,
            index = index
        );
        match self.eval::<bool>(page, &js).await {
            Ok(true) => FieldOutcome::Filled,
            Ok(false) => FieldOutcome::Skipped("radio option vanished".to_string()),
            Err(e) => FieldOutcome::Error(format!("radio click failed: {}", e)),
        }
    }

    async fn fill_file(&self, page: &Page, field: &FormField, value: &str) -> Result<()> {
        let element = page.find_element(&field.selector).await?;
        let params = SetFileInputFilesParams::builder()
            .files(vec![value.to_string()])
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(|e| anyhow::anyhow!("bad file params: {}", e))?;
        page.execute(params).await.context("file assignment failed")?;
        Ok(())
    }

    async fn is_visible(&self, page: &Page, selector: &str) -> Result<bool> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                const r = el.getBoundingClientRect();
                const s = getComputedStyle(el);
                return r.width > 0 && r.height > 0 && s.display !== 'none' && s.visibility !== 'hidden';
            }})()"#,
            sel = js_string(selector)
        );
        self.eval(page, &js).await
    }

    async fn is_already_filled(&self, page: &Page, field: &FormField) -> Result<bool> {
        let check = match field.field_type {
            FieldType::Checkbox => "el.checked",
            FieldType::Select => "el.selectedIndex > 0",
            FieldType::File => "el.files && el.files.length > 0",
            _ => "el.value && el.value.trim() !== ''",
        };
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                return !!({check});
            }})()"#,
            sel = js_string(&field.selector),
            check = check
        );
        self.eval(page, &js).await
    }

    async fn live_select_options(&self, page: &Page, selector: &str) -> Result<Vec<SelectOption>> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return [];
                return Array.from(el.options).map(o => ({{ value: o.value, text: o.textContent.trim() }}));
            }})()"#,
            sel = js_string(selector)
        );
        self.eval(page, &js).await
    }

    async fn live_radio_options(&self, page: &Page, group: &str) -> Result<Vec<SelectOption>> {
        let js = format!(
            r#"(() => {{
                const radios = document.querySelectorAll('input[type="radio"][name="{group}"]');
                return Array.from(radios).map(r => {{
                    let text = '';
                    if (r.labels && r.labels.length > 0) text = r.labels[0].innerText;
                    else if (r.closest('label')) text = r.closest('label').innerText;
                    return {{ value: r.value, text: text.trim() }};
                }});
            }})()"#,
            group = group
        );
        self.eval(page, &js).await
    }

    async fn radio_group_checked(&self, page: &Page, group: &str) -> Result<bool> {
        let js = format!(
            r#"Array.from(document.querySelectorAll('input[type="radio"][name="{}"]')).some(r => r.checked)"#,
            group
        );
        self.eval(page, &js).await
    }

    async fn eval<T: DeserializeOwned>(&self, page: &Page, js: &str) -> Result<T> {
        let result = page.evaluate(js).await.context("script evaluation failed")?;
        let value = result
            .value()
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value).context("unexpected script result shape")
    }
}

/// Fold one field's outcome into the page aggregate. An already-filled
/// field counts as filled without a write.
fn record_outcome(result: &mut FillResult, label: &str, outcome: FieldOutcome) {
    match outcome {
        FieldOutcome::Filled => {
            debug!("Filled field '{}'", label);
            result.fields_filled += 1;
        }
        FieldOutcome::AlreadyFilled => {
            debug!("Field '{}' already filled", label);
            result.fields_filled += 1;
        }
        FieldOutcome::Skipped(reason) => {
            debug!("Skipped field '{}': {}", label, reason);
            result.fields_skipped += 1;
        }
        FieldOutcome::Error(message) => {
            warn!("Field '{}' failed: {}", label, message);
            result.errors.push(message);
        }
    }
}

/// Ranked option match: exact case-insensitive on text or value, then
/// substring in either direction. `None` means nothing plausible matched.
pub fn best_option_match(options: &[SelectOption], target: &str) -> Option<usize> {
    let target = matching_key(target);
    if target.is_empty() {
        return None;
    }

    for (i, option) in options.iter().enumerate() {
        if matching_key(&option.text) == target || matching_key(&option.value) == target {
            return Some(i);
        }
    }

    for (i, option) in options.iter().enumerate() {
        let text = matching_key(&option.text);
        let value = matching_key(&option.value);
        if (!text.is_empty() && (text.contains(&target) || target.contains(&text)))
            || (!value.is_empty() && (value.contains(&target) || target.contains(&value)))
        {
            return Some(i);
        }
    }

    None
}

/// First option that is not a "Select..." style placeholder.
pub fn first_non_empty_option(options: &[SelectOption]) -> Option<usize> {
    options.iter().position(|o| {
        !o.value.trim().is_empty() && !matching_key(&o.text).starts_with("select")
    })
}

/// Radio matching mirrors select matching; the caller falls back to the
/// first radio when nothing matches.
pub fn best_radio_match(options: &[SelectOption], target: &str) -> Option<usize> {
    best_option_match(options, target)
}

pub fn checkbox_needs_click(currently_checked: bool, value: &str) -> bool {
    is_truthy(value) != currently_checked
}

fn radio_group_name(selector: &str) -> Option<String> {
    let start = selector.find("name=\"")? + 6;
    let rest = &selector[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> Vec<SelectOption> {
        pairs
            .iter()
            .map(|(value, text)| SelectOption {
                value: value.to_string(),
                text: text.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_exact_match_is_case_insensitive() {
        let opts = options(&[("", "Select..."), ("us", "United States"), ("ca", "Canada")]);
        assert_eq!(best_option_match(&opts, "united states"), Some(1));
        assert_eq!(best_option_match(&opts, "US"), Some(1));
    }

    #[test]
    fn test_substring_match_both_directions() {
        let opts = options(&[("1", "0-1 years"), ("2", "2-5 years"), ("3", "5+ years")]);
        assert_eq!(best_option_match(&opts, "2-5"), Some(1));

        let opts = options(&[("remote", "Remote")]);
        assert_eq!(best_option_match(&opts, "fully remote position"), Some(0));
    }

    #[test]
    fn test_no_match_returns_none() {
        let opts = options(&[("a", "Alpha"), ("b", "Beta")]);
        assert_eq!(best_option_match(&opts, "gamma"), None);
    }

    #[test]
    fn test_first_non_empty_skips_placeholder() {
        let opts = options(&[("", "Select an option"), ("us", "United States")]);
        assert_eq!(first_non_empty_option(&opts), Some(1));
    }

    #[test]
    fn test_radio_fallback_is_first_option() {
        let opts = options(&[("yes", "Yes"), ("no", "No")]);
        assert_eq!(best_radio_match(&opts, "maybe").unwrap_or(0), 0);
        assert_eq!(best_radio_match(&opts, "no"), Some(1));
    }

    #[test]
    fn test_checkbox_idempotence() {
        assert!(checkbox_needs_click(false, "yes"));
        assert!(!checkbox_needs_click(true, "yes"));
        assert!(checkbox_needs_click(true, "no"));
        assert!(!checkbox_needs_click(false, "no"));
    }

    #[test]
    fn test_aggregate_partial_success() {
        let mut result = FillResult::default();
        record_outcome(&mut result, "first name", FieldOutcome::Filled);
        record_outcome(&mut result, "email", FieldOutcome::AlreadyFilled);
        record_outcome(
            &mut result,
            "essay",
            FieldOutcome::Error("no value resolved for required field 'essay'".to_string()),
        );
        assert_eq!(result.fields_filled, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.success());
    }

    #[test]
    fn test_aggregate_all_errors_fails() {
        let mut result = FillResult::default();
        record_outcome(&mut result, "a", FieldOutcome::Error("a broke".to_string()));
        record_outcome(&mut result, "b", FieldOutcome::Error("b broke".to_string()));
        assert_eq!(result.fields_filled, 0);
        assert!(!result.success());
    }

    #[test]
    fn test_aggregate_single_mapped_field() {
        let mut result = FillResult::default();
        record_outcome(&mut result, "first name", FieldOutcome::Filled);
        assert_eq!(result.fields_filled, 1);
        assert_eq!(result.fields_skipped, 0);
        assert!(result.success());
    }

    #[test]
    fn test_radio_group_name_extraction() {
        assert_eq!(
            radio_group_name("input[type=\"radio\"][name=\"auth\"]").as_deref(),
            Some("auth")
        );
        assert_eq!(radio_group_name("#lonely-radio"), None);
    }
}

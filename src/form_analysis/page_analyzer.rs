// src/form_analysis/page_analyzer.rs
//! Turns a live page into a normalized `PageAnalysis`. Structural DOM
//! heuristics run first at near-zero cost; only fields they cannot classify
//! are shipped to the language model.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use chromiumoxide::Page;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::ai::{complete_json, LanguageModel};
use crate::form_analysis::{field_resolver, SUCCESS_PHRASES};
use crate::types::{FieldType, FormField, PageAnalysis, PageClassification, SelectOption};
use crate::utils::clean_text;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// URL path markers that identify an authentication wall.
const LOGIN_PATH_MARKERS: &[&str] = &["/login", "/signin", "/sign-in", "authwall", "/checkpoint"];

/// Longest markup snippet shipped to the model per ambiguous field.
const MAX_SNIPPET_CHARS: usize = 600;
const MAX_AMBIGUOUS_FIELDS: usize = 8;

pub struct PageAnalyzer {
    llm: Arc<dyn LanguageModel>,
    http: Client,
}

impl PageAnalyzer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { llm, http })
    }

    /// Analyze the currently loaded page. The returned analysis is only
    /// valid until the next navigation or DOM mutation.
    pub async fn analyze(&self, page: &Page) -> Result<PageAnalysis> {
        let html = page.content().await.context("Failed to read page content")?;
        let url = page.url().await.ok().flatten().unwrap_or_default();

        let mut analysis = analyze_html(&html, &url);

        let ambiguous = ambiguous_snippets(&html, &analysis);
        if !ambiguous.is_empty() {
            self.classify_with_model(&mut analysis, &ambiguous).await;
        }

        info!(
            "Page analysis: {} fields (form={}, login={}, confirmation={})",
            analysis.fields.len(),
            analysis.classification.is_application_form,
            analysis.classification.login_required,
            analysis.classification.is_confirmation
        );
        Ok(analysis)
    }

    /// Merge model-classified fields into the heuristic analysis. A parse
    /// failure contributes nothing; the page is never failed for it.
    async fn classify_with_model(&self, analysis: &mut PageAnalysis, snippets: &[String]) {
        let prompt = format!(
            r#"These HTML snippets are form controls from a job application page
that could not be classified structurally. For each control, return a JSON
array of objects with exactly these keys:
  "selector": a CSS selector that finds the element,
  "type": one of "text", "email", "phone", "textarea", "select", "checkbox", "radio", "file",
  "label": the question or label a human would read for it,
  "required": true or false,
  "profileMapping": one of {mappings:?} or null.

Reply with the JSON array only.

SNIPPETS:
{snippets}"#,
            mappings = field_resolver::PROFILE_MAPPING_KEYS,
            snippets = snippets.join("\n---\n"),
        );

        let Some(raw_fields) =
            complete_json::<Vec<ModelField>>(self.llm.as_ref(), "Field Classification", &prompt)
                .await
        else {
            warn!("Model field classification failed, ambiguous fields skipped");
            return;
        };

        let mut known: HashSet<String> =
            analysis.fields.iter().map(|f| f.selector.clone()).collect();
        for raw in raw_fields {
            match raw.into_field() {
                Some(field) => {
                    let position = analysis
                        .fields
                        .iter()
                        .position(|f| f.selector == field.selector);
                    if let Some(position) = position {
                        let existing = &mut analysis.fields[position];
                        if existing.label.is_empty() {
                            existing.label = field.label;
                        }
                        if existing.profile_mapping.is_none() {
                            existing.profile_mapping = field.profile_mapping;
                        }
                    } else if known.insert(field.selector.clone()) {
                        debug!("Model classified extra field: {}", field.label);
                        analysis.fields.push(field);
                    }
                }
                None => warn!("Dropping malformed model field"),
            }
        }
        analysis.classification.is_application_form = !analysis.fields.is_empty();
    }

    /// Best-effort lookup of a company's careers page via web search.
    pub async fn find_careers_page(&self, company_name: &str) -> Result<Option<String>> {
        let query = format!("{} careers jobs", company_name);
        info!("Searching for careers page: {}", company_name);

        let response = self
            .http
            .get("https://html.duckduckgo.com/html/")
            .query(&[("q", query.as_str())])
            .send()
            .await
            .context("Careers page search failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Search returned HTTP {}", response.status());
        }

        let body = response.text().await.context("Failed to read search results")?;
        Ok(pick_careers_url(&body))
    }
}

#[derive(Debug, Deserialize)]
struct ModelField {
    selector: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    label: String,
    #[serde(default)]
    required: bool,
    #[serde(rename = "profileMapping")]
    profile_mapping: Option<String>,
}

impl ModelField {
    fn into_field(self) -> Option<FormField> {
        let selector = self.selector.filter(|s| !s.trim().is_empty())?;
        let field_type = FieldType::parse(self.kind.as_deref()?)?;
        let mut field = FormField::new(selector, field_type);
        field.label = clean_text(&self.label);
        field.required = self.required;
        field.profile_mapping = self
            .profile_mapping
            .filter(|m| field_resolver::PROFILE_MAPPING_KEYS.contains(&m.as_str()));
        Some(field)
    }
}

/// Structural analysis of raw page HTML. Pure so it is testable without a
/// browser; the caller supplies the page URL for login detection.
pub fn analyze_html(html: &str, url: &str) -> PageAnalysis {
    let document = Html::parse_document(html);

    let labels_by_target = collect_label_targets(&document);
    let mut fields: Vec<FormField> = Vec::new();
    let mut seen_radio_groups: HashSet<String> = HashSet::new();
    let mut seen_selectors: HashSet<String> = HashSet::new();
    let mut has_password = false;

    let control_selector =
        Selector::parse("input, textarea, select").expect("static selector must parse");

    for element in document.select(&control_selector) {
        match classify_control(&element, &labels_by_target, &mut seen_radio_groups, &document) {
            ControlOutcome::Field(field) => {
                if seen_selectors.insert(field.selector.clone()) {
                    fields.push(field);
                }
            }
            ControlOutcome::Password => has_password = true,
            ControlOutcome::Ignored => {}
        }
    }

    let body_text = page_text(&document);
    let login_required = detect_login(url, has_password, fields.len());
    let is_confirmation = SUCCESS_PHRASES.iter().any(|p| body_text.contains(p));

    PageAnalysis {
        classification: PageClassification {
            is_application_form: !fields.is_empty() && !login_required,
            login_required,
            is_confirmation,
        },
        fields,
    }
}

enum ControlOutcome {
    Field(FormField),
    Password,
    Ignored,
}

fn classify_control(
    element: &ElementRef,
    labels_by_target: &HashMap<String, String>,
    seen_radio_groups: &mut HashSet<String>,
    document: &Html,
) -> ControlOutcome {
    let tag = element.value().name();
    let input_type = element
        .value()
        .attr("type")
        .unwrap_or("text")
        .to_lowercase();

    let field_type = match tag {
        "textarea" => FieldType::Textarea,
        "select" => FieldType::Select,
        "input" => match input_type.as_str() {
            "password" => return ControlOutcome::Password,
            "hidden" | "submit" | "button" | "reset" | "image" | "search" => {
                return ControlOutcome::Ignored
            }
            "email" => FieldType::Email,
            "tel" => FieldType::Phone,
            "checkbox" => FieldType::Checkbox,
            "radio" => FieldType::Radio,
            "file" => FieldType::File,
            _ => FieldType::Text,
        },
        _ => return ControlOutcome::Ignored,
    };

    // Radio inputs collapse into one field per name group.
    if field_type == FieldType::Radio {
        let Some(name) = element.value().attr("name") else {
            return ControlOutcome::Ignored;
        };
        if !seen_radio_groups.insert(name.to_string()) {
            return ControlOutcome::Ignored;
        }
        let mut field = FormField::new(
            format!("input[type=\"radio\"][name=\"{}\"]", name),
            FieldType::Radio,
        );
        field.label = radio_group_label(element, labels_by_target);
        field.options = radio_group_options(document, name, labels_by_target);
        field.required = has_required_marker(element, &field.label);
        return ControlOutcome::Field(field);
    }

    let label = find_label(element, labels_by_target);
    let mut field = FormField::new(css_selector_for(element), field_type);
    field.required = has_required_marker(element, &label);
    field.label = label;

    if field_type == FieldType::Select {
        field.options = select_options(element);
    }

    field.profile_mapping = infer_field_mapping(&field, element);
    ControlOutcome::Field(field)
}

/// Intent detection: input type, then name/autocomplete attributes, then
/// the shared label rules.
fn infer_field_mapping(field: &FormField, element: &ElementRef) -> Option<String> {
    match field.field_type {
        FieldType::Email => return Some("email".to_string()),
        FieldType::Phone => return Some("phone".to_string()),
        FieldType::File => {
            let key = field.label.to_lowercase();
            if key.contains("resume") || key.contains("cv") {
                return Some("resumePath".to_string());
            }
        }
        _ => {}
    }

    if let Some(mapping) = field_resolver::infer_mapping(&field.label) {
        return Some(mapping.to_string());
    }

    // Attribute names are noisier than labels (e.g. "fname"), so they are
    // only consulted when no label rule fired.
    for attr in ["autocomplete", "name", "id"] {
        if let Some(value) = element.value().attr(attr) {
            if let Some(mapping) = field_resolver::infer_mapping(&value.replace(['-', '_'], " ")) {
                return Some(mapping.to_string());
            }
        }
    }

    None
}

/// Map of label `for` targets to their text.
fn collect_label_targets(document: &Html) -> HashMap<String, String> {
    let label_selector = Selector::parse("label[for]").expect("static selector must parse");
    document
        .select(&label_selector)
        .filter_map(|label| {
            let target = label.value().attr("for")?;
            let text = clean_text(&label.text().collect::<Vec<_>>().join(" "));
            (!text.is_empty()).then(|| (target.to_string(), text))
        })
        .collect()
}

/// Label ladder: `label[for]`, wrapping `<label>`, `aria-label`,
/// `placeholder`, then nearby preceding text.
fn find_label(element: &ElementRef, labels_by_target: &HashMap<String, String>) -> String {
    if let Some(id) = element.value().attr("id") {
        if let Some(text) = labels_by_target.get(id) {
            return text.clone();
        }
    }

    for ancestor in element.ancestors().take(3) {
        if let Some(el) = ElementRef::wrap(ancestor) {
            if el.value().name() == "label" {
                let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
                if !text.is_empty() {
                    return text;
                }
            }
        }
    }

    if let Some(aria) = element.value().attr("aria-label") {
        let text = clean_text(aria);
        if !text.is_empty() {
            return text;
        }
    }

    if let Some(placeholder) = element.value().attr("placeholder") {
        let text = clean_text(placeholder);
        if !text.is_empty() {
            return text;
        }
    }

    preceding_text(element).unwrap_or_default()
}

/// Closest non-empty text node before the control, capped to one short run.
fn preceding_text(element: &ElementRef) -> Option<String> {
    for sibling in element.prev_siblings() {
        if let Some(el) = ElementRef::wrap(sibling) {
            let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
            if !text.is_empty() {
                return Some(text.chars().take(120).collect());
            }
        } else if let Some(text) = sibling.value().as_text() {
            let text = clean_text(text);
            if !text.is_empty() {
                return Some(text.chars().take(120).collect());
            }
        }
    }
    None
}

fn radio_group_label(element: &ElementRef, labels_by_target: &HashMap<String, String>) -> String {
    // A radio's own label names the option; the question usually lives on a
    // fieldset legend or the text before the group.
    for ancestor in element.ancestors().take(5) {
        if let Some(el) = ElementRef::wrap(ancestor) {
            if el.value().name() == "fieldset" {
                let legend_selector = Selector::parse("legend").expect("static selector");
                if let Some(legend) = el.select(&legend_selector).next() {
                    let text = clean_text(&legend.text().collect::<Vec<_>>().join(" "));
                    if !text.is_empty() {
                        return text;
                    }
                }
            }
        }
    }
    find_label(element, labels_by_target)
}

fn radio_group_options(
    document: &Html,
    name: &str,
    labels_by_target: &HashMap<String, String>,
) -> Vec<SelectOption> {
    let selector = Selector::parse("input[type=\"radio\"]").expect("static selector");
    document
        .select(&selector)
        .filter(|el| el.value().attr("name") == Some(name))
        .map(|el| {
            let value = el.value().attr("value").unwrap_or_default().to_string();
            let text = el
                .value()
                .attr("id")
                .and_then(|id| labels_by_target.get(id).cloned())
                .or_else(|| {
                    el.ancestors().take(2).find_map(|a| {
                        ElementRef::wrap(a).and_then(|p| {
                            (p.value().name() == "label").then(|| {
                                clean_text(&p.text().collect::<Vec<_>>().join(" "))
                            })
                        })
                    })
                })
                .unwrap_or_else(|| value.clone());
            SelectOption { value, text }
        })
        .collect()
}

fn select_options(element: &ElementRef) -> Vec<SelectOption> {
    let option_selector = Selector::parse("option").expect("static selector");
    element
        .select(&option_selector)
        .map(|opt| SelectOption {
            value: opt.value().attr("value").unwrap_or_default().to_string(),
            text: clean_text(&opt.text().collect::<Vec<_>>().join(" ")),
        })
        .collect()
}

fn has_required_marker(element: &ElementRef, label: &str) -> bool {
    element.value().attr("required").is_some()
        || element.value().attr("aria-required") == Some("true")
        || label.contains('*')
}

/// Selector synthesis ladder: id, name attribute, then a short positional
/// path. The result only needs to survive one fill pass.
fn css_selector_for(element: &ElementRef) -> String {
    if let Some(id) = element.value().attr("id") {
        if !id.is_empty() {
            if id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
                return format!("#{}", id);
            }
            return format!("[id=\"{}\"]", id);
        }
    }

    let tag = element.value().name();
    if let Some(name) = element.value().attr("name") {
        if !name.is_empty() {
            return format!("{}[name=\"{}\"]", tag, name);
        }
    }

    positional_path(element)
}

fn positional_path(element: &ElementRef) -> String {
    let mut segments: Vec<String> = Vec::new();
    let mut current = *element;

    for _ in 0..4 {
        let tag = current.value().name().to_string();
        let index = current
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .filter(|s| s.value().name() == tag)
            .count()
            + 1;
        segments.push(format!("{}:nth-of-type({})", tag, index));

        let Some(parent) = current.parent().and_then(ElementRef::wrap) else {
            break;
        };
        if let Some(id) = parent.value().attr("id") {
            if !id.is_empty() {
                segments.push(format!("#{}", id));
                break;
            }
        }
        if parent.value().name() == "body" || parent.value().name() == "form" {
            segments.push(parent.value().name().to_string());
            break;
        }
        current = parent;
    }

    segments.reverse();
    segments.join(" > ")
}

fn detect_login(url: &str, has_password: bool, visible_fields: usize) -> bool {
    let url = url.to_lowercase();
    if LOGIN_PATH_MARKERS.iter().any(|m| url.contains(m)) {
        return true;
    }
    // A password box on a page with barely any other inputs is a login
    // form, not an application form.
    has_password && visible_fields <= 2
}

fn page_text(document: &Html) -> String {
    let body_selector = Selector::parse("body").expect("static selector");
    document
        .select(&body_selector)
        .next()
        .map(|body| clean_text(&body.text().collect::<Vec<_>>().join(" ")).to_lowercase())
        .unwrap_or_default()
}

/// Markup snippets for fields the heuristics produced but could not name.
fn ambiguous_snippets(html: &str, analysis: &PageAnalysis) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut snippets = Vec::new();

    for field in &analysis.fields {
        if !field.label.is_empty() || field.profile_mapping.is_some() {
            continue;
        }
        if !matches!(field.field_type, FieldType::Textarea | FieldType::Select) {
            continue;
        }
        if let Ok(selector) = Selector::parse(&field.selector) {
            if let Some(element) = document.select(&selector).next() {
                let outer = element.html();
                snippets.push(outer.chars().take(MAX_SNIPPET_CHARS).collect());
            }
        }
        if snippets.len() >= MAX_AMBIGUOUS_FIELDS {
            break;
        }
    }
    snippets
}

/// Pull the first plausible careers URL out of a search result page.
fn pick_careers_url(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let result_selector = Selector::parse("a.result__a").ok()?;

    let mut first: Option<String> = None;
    for anchor in document.select(&result_selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(url) = decode_result_href(href) else {
            continue;
        };
        if first.is_none() {
            first = Some(url.clone());
        }
        let lower = url.to_lowercase();
        if ["career", "jobs", "greenhouse.io", "lever.co", "workable.com"]
            .iter()
            .any(|marker| lower.contains(marker))
        {
            return Some(url);
        }
    }
    first
}

/// Search result links are redirect-wrapped (`/l/?uddg=<encoded>`).
fn decode_result_href(href: &str) -> Option<String> {
    if let Some(pos) = href.find("uddg=") {
        let encoded = &href[pos + 5..];
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        return Some(percent_decode(encoded));
    }
    if href.starts_with("http") {
        return Some(href.to_string());
    }
    None
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPLICATION_FORM: &str = r#"
        <html><body>
          <form id="apply">
            <label for="fname">First Name *</label>
            <input id="fname" type="text" required>
            <label for="mail">Email</label>
            <input id="mail" type="email">
            <label>Phone<input type="tel" name="phone"></label>
            <fieldset>
              <legend>Are you authorized to work in the US?</legend>
              <label><input type="radio" name="auth" value="yes">Yes</label>
              <label><input type="radio" name="auth" value="no">No</label>
            </fieldset>
            <label for="country">Country</label>
            <select id="country">
              <option value="">Select...</option>
              <option value="us">United States</option>
              <option value="ca">Canada</option>
            </select>
            <input type="file" name="resume" aria-label="Resume upload">
            <input type="hidden" name="csrf" value="x">
            <input type="submit" value="Apply">
          </form>
        </body></html>"#;

    #[test]
    fn test_analyze_application_form() {
        let analysis = analyze_html(APPLICATION_FORM, "https://example.com/jobs/1/apply");
        assert!(analysis.classification.is_application_form);
        assert!(!analysis.classification.login_required);

        let labels: Vec<&str> = analysis.fields.iter().map(|f| f.label.as_str()).collect();
        assert!(labels.contains(&"First Name *"));
        assert!(labels.contains(&"Are you authorized to work in the US?"));

        let first_name = analysis
            .fields
            .iter()
            .find(|f| f.selector == "#fname")
            .unwrap();
        assert!(first_name.required);
        assert_eq!(first_name.profile_mapping.as_deref(), Some("firstName"));

        let email = analysis.fields.iter().find(|f| f.selector == "#mail").unwrap();
        assert_eq!(email.field_type, FieldType::Email);
        assert_eq!(email.profile_mapping.as_deref(), Some("email"));

        let country = analysis
            .fields
            .iter()
            .find(|f| f.field_type == FieldType::Select)
            .unwrap();
        assert_eq!(country.options.len(), 3);
        assert_eq!(country.options[1].value, "us");

        let resume = analysis
            .fields
            .iter()
            .find(|f| f.field_type == FieldType::File)
            .unwrap();
        assert_eq!(resume.profile_mapping.as_deref(), Some("resumePath"));
    }

    #[test]
    fn test_radio_group_collapses_to_one_field() {
        let analysis = analyze_html(APPLICATION_FORM, "https://example.com/apply");
        let radios: Vec<_> = analysis
            .fields
            .iter()
            .filter(|f| f.field_type == FieldType::Radio)
            .collect();
        assert_eq!(radios.len(), 1);
        assert_eq!(radios[0].options.len(), 2);
        assert_eq!(radios[0].selector, "input[type=\"radio\"][name=\"auth\"]");
    }

    #[test]
    fn test_login_wall_detection() {
        let login_html = r#"
            <html><body><form>
              <h1>Sign in</h1>
              <input type="text" name="session_key">
              <input type="password" name="session_password">
              <button type="submit">Sign in</button>
            </form></body></html>"#;

        let by_fields = analyze_html(login_html, "https://example.com/portal");
        assert!(by_fields.classification.login_required);
        assert!(!by_fields.classification.is_application_form);

        let by_url = analyze_html("<html><body></body></html>", "https://example.com/login?next=x");
        assert!(by_url.classification.login_required);
    }

    #[test]
    fn test_confirmation_detection() {
        let html = r#"<html><body><h1>Thank you for applying!</h1>
            <p>Your application has been received.</p></body></html>"#;
        let analysis = analyze_html(html, "https://example.com/apply/done");
        assert!(analysis.classification.is_confirmation);
        assert!(!analysis.classification.is_application_form);
    }

    #[test]
    fn test_positional_selector_for_anonymous_controls() {
        let html = r#"<html><body><form>
            <input type="text">
            <input type="text">
        </form></body></html>"#;
        let analysis = analyze_html(html, "https://example.com/f");
        assert_eq!(analysis.fields.len(), 2);
        assert_ne!(analysis.fields[0].selector, analysis.fields[1].selector);
        assert!(analysis.fields[1].selector.contains("nth-of-type(2)"));
    }

    #[test]
    fn test_pick_careers_url_prefers_careers_marker() {
        let html = r#"<html><body>
          <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.acme.com%2Fabout">About</a>
          <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.acme.com%2Fcareers">Careers</a>
        </body></html>"#;
        assert_eq!(
            pick_careers_url(html).as_deref(),
            Some("https://www.acme.com/careers")
        );
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(
            percent_decode("https%3A%2F%2Fexample.com%2Fjobs"),
            "https://example.com/jobs"
        );
    }
}

// src/types/form.rs
//! Site-agnostic representation of form fields and per-page fill outcomes.

use serde::{Deserialize, Serialize};

/// Kind of input control a normalized field maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Email,
    Phone,
    Textarea,
    Select,
    Checkbox,
    Radio,
    File,
}

impl FieldType {
    /// Parse a loosely-typed kind string, as returned by the language model.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "email" => Some(Self::Email),
            "phone" | "tel" => Some(Self::Phone),
            "textarea" => Some(Self::Textarea),
            "select" => Some(Self::Select),
            "checkbox" => Some(Self::Checkbox),
            "radio" => Some(Self::Radio),
            "file" => Some(Self::File),
            _ => None,
        }
    }

}

/// One selectable value/label pair of a select or radio group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
}

/// A normalized form field.
///
/// The selector is only valid for the lifetime of one fill pass; after any
/// navigation or DOM mutation the page must be re-analyzed instead of
/// reusing stale selectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    pub selector: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_mapping: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl FormField {
    pub fn new(selector: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            selector: selector.into(),
            field_type,
            label: String::new(),
            required: false,
            options: Vec::new(),
            profile_mapping: None,
            value: None,
        }
    }
}

/// Page-level classification produced alongside the field list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageClassification {
    pub is_application_form: bool,
    pub login_required: bool,
    pub is_confirmation: bool,
}

/// The analyzer's output for one loaded page. Produced fresh per page load
/// and superseded by a new analysis after any navigation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub fields: Vec<FormField>,
    pub classification: PageClassification,
}

impl PageAnalysis {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Aggregate outcome of filling one page. Carries no overall success
/// judgment beyond `success()`; whether the application went through is the
/// navigator's call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FillResult {
    pub fields_filled: usize,
    pub fields_skipped: usize,
    pub errors: Vec<String>,
}

impl FillResult {
    /// A page where at least one field was committed is a usable partial
    /// result; only all-errors-and-nothing-filled counts as failure.
    pub fn success(&self) -> bool {
        !(self.fields_filled == 0 && !self.errors.is_empty())
    }

    pub fn merge(&mut self, other: FillResult) {
        self.fields_filled += other.fields_filled;
        self.fields_skipped += other.fields_skipped;
        self.errors.extend(other.errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_parse() {
        assert_eq!(FieldType::parse("text"), Some(FieldType::Text));
        assert_eq!(FieldType::parse(" TEL "), Some(FieldType::Phone));
        assert_eq!(FieldType::parse("dropdown"), None);
    }

    #[test]
    fn test_fill_result_partial_success() {
        let result = FillResult {
            fields_filled: 2,
            fields_skipped: 0,
            errors: vec!["one field broke".to_string()],
        };
        assert!(result.success());
    }

    #[test]
    fn test_fill_result_all_errors_is_failure() {
        let result = FillResult {
            fields_filled: 0,
            fields_skipped: 0,
            errors: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        };
        assert!(!result.success());
    }

    #[test]
    fn test_fill_result_nothing_attempted_is_success() {
        assert!(FillResult::default().success());
    }
}

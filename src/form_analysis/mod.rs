// src/form_analysis/mod.rs
//! Form understanding: page analysis, value resolution and DOM fill.

pub mod field_resolver;
pub mod form_filler;
pub mod page_analyzer;

pub use field_resolver::FieldResolver;
pub use form_filler::FormFiller;
pub use page_analyzer::PageAnalyzer;

/// Phrases that mark a page (or toast) as a post-submission confirmation.
pub const SUCCESS_PHRASES: &[&str] = &[
    "application submitted",
    "application sent",
    "application received",
    "thank you for applying",
    "thanks for applying",
    "successfully submitted",
    "we have received your application",
    "your application has been",
];

/// Words that identify a next/continue affordance on multi-step forms.
pub const ADVANCE_WORDS: &[&str] = &["next", "continue", "save and continue", "proceed"];

/// Words that identify the final submit control.
pub const SUBMIT_WORDS: &[&str] = &[
    "submit application",
    "submit",
    "apply now",
    "apply",
    "send application",
    "finish",
];

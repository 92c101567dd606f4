//! Adaptive job-application automation: analyze unknown application forms,
//! resolve answers from a candidate profile, and drive multi-page flows to
//! a verified submitted/failed/requires-manual outcome.

pub mod ai;
pub mod browser;
pub mod config;
pub mod form_analysis;
pub mod logging;
pub mod navigator;
pub mod orchestrator;
pub mod platforms;
pub mod repository;
pub mod types;
pub mod utils;

pub use ai::{CompletionClient, LanguageModel};
pub use browser::BrowserSession;
pub use config::AutomationConfig;
pub use form_analysis::{FieldResolver, FormFiller, PageAnalyzer};
pub use navigator::{ApplicationNavigator, MultiPageResult, NavigationResult};
pub use orchestrator::{HuntOptions, HuntOrchestrator, HuntSummary};
pub use types::{
    ApplicationStatus, FillResult, FormField, JobApplication, JobListing, PageAnalysis, Profile,
};

// src/types/mod.rs
//! Shared data model for the application-automation core.

pub mod application;
pub mod form;
pub mod profile;

pub use application::{
    ApplicationEvent, ApplicationMethod, ApplicationStatus, Credentials, JobApplication,
    JobListing, SubmissionOptions,
};
pub use form::{FieldType, FillResult, FormField, PageAnalysis, PageClassification, SelectOption};
pub use profile::{ContactInfo, Education, Experience, JobPreferences, Profile};

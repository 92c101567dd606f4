// src/repository.rs
//! Persistence seams consumed by the orchestrator. Implementations live
//! with the embedding application; this crate only defines the contracts.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ApplicationEvent, ApplicationStatus, JobApplication, JobListing, Profile};

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Profile>>;
    async fn create(&self, profile: &Profile) -> Result<()>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn upsert(&self, job: &JobListing) -> Result<()>;
}

/// Application records plus their append-only audit trail.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn create(&self, application: &JobApplication) -> Result<()>;
    async fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
        message: &str,
    ) -> Result<()>;
    async fn add_event(&self, application_id: &str, event: &ApplicationEvent) -> Result<()>;
}

// src/platforms/mod.rs
//! Per-site adapters for platforms with stable markup and native
//! "Easy Apply" flows. Fixed selector tables replace AI-driven analysis.

pub mod adapter;
pub mod indeed;
pub mod linkedin;

use std::num::NonZeroU32;

use anyhow::Result;
use async_trait::async_trait;
use chromiumoxide::Page;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;

use crate::browser::BrowserSession;
use crate::types::{Credentials, JobApplication, JobListing, Profile, SubmissionOptions};

pub use adapter::{FixedSelectorAdapter, PlatformSelectors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    LoggedIn,
    CaptchaDetected,
    InvalidCredentials,
}

#[async_trait]
pub trait JobPlatform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the platform gate currently rejects another operation.
    /// Checked before every network-costly call; a limited platform fails
    /// immediately instead of queuing.
    fn is_rate_limited(&self) -> bool;

    /// Log in, restoring a persisted session first when possible. A
    /// detected CAPTCHA is a hard stop, never solved or bypassed.
    async fn ensure_login(&self, page: &Page, credentials: &Credentials) -> Result<LoginOutcome>;

    /// Run the platform's native multi-step apply flow for one job.
    async fn easy_apply(
        &self,
        session: &BrowserSession,
        job: &JobListing,
        profile: &Profile,
        credentials: &Credentials,
        submission: &SubmissionOptions,
    ) -> JobApplication;
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Fail-fast rate gate. Each successful `acquire` consumes one permit, so
/// the gate is taken exactly once per network-costly operation.
pub struct RateGate {
    limiter: DirectLimiter,
    tripped: std::sync::atomic::AtomicBool,
}

impl RateGate {
    pub fn per_hour(max: u32) -> Self {
        let quota = Quota::per_hour(NonZeroU32::new(max).unwrap_or(nonzero!(1u32)));
        Self {
            limiter: RateLimiter::direct(quota),
            tripped: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Take one permit; `false` means the caller must not proceed.
    pub fn acquire(&self) -> bool {
        let ok = self.limiter.check().is_ok();
        self.tripped
            .store(!ok, std::sync::atomic::Ordering::Relaxed);
        ok
    }

    /// Last observed gate state, without consuming a permit.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_gate_trips_after_budget() {
        let gate = RateGate::per_hour(2);
        assert!(gate.acquire());
        assert!(!gate.is_tripped());
        assert!(gate.acquire());
        assert!(!gate.acquire());
        assert!(gate.is_tripped());
    }
}

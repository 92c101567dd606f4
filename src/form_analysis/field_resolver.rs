// src/form_analysis/field_resolver.rs
//! Decides what value goes into one normalized field. Ranked ladder:
//! explicit value, profile-mapping dictionary, label heuristics, then the
//! language model for open-ended questions. Never errors; an unresolvable
//! field resolves to an empty string and the caller decides severity.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::ai::LanguageModel;
use crate::types::{FormField, JobListing, Profile};
use crate::utils::matching_key;

/// Keys of the fixed profile-attribute dictionary.
pub const PROFILE_MAPPING_KEYS: &[&str] = &[
    "firstName",
    "lastName",
    "fullName",
    "email",
    "phone",
    "linkedin",
    "website",
    "github",
    "location",
    "city",
    "resumePath",
];

/// Ordered case-insensitive substring rules from label text to a mapping
/// key. First match wins, so the specific variants sit above the bare
/// "name" catch-all.
const LABEL_RULES: &[(&[&str], &str)] = &[
    (&["first name", "given name", "forename"], "firstName"),
    (&["last name", "surname", "family name"], "lastName"),
    (&["full name", "your name"], "fullName"),
    (&["e-mail", "email"], "email"),
    (&["phone", "mobile", "telephone"], "phone"),
    (&["linkedin"], "linkedin"),
    (&["github"], "github"),
    (&["website", "portfolio", "personal site"], "website"),
    (&["city"], "city"),
    (&["location", "address"], "location"),
    (&["resume", "curriculum", "cv"], "resumePath"),
    (&["name"], "fullName"),
];

/// Infer a profile mapping from label text, if any rule matches.
pub fn infer_mapping(label: &str) -> Option<&'static str> {
    let key = matching_key(label);
    if key.is_empty() {
        return None;
    }
    for (patterns, mapping) in LABEL_RULES {
        if patterns.iter().any(|p| key.contains(p)) {
            return Some(mapping);
        }
    }
    None
}

/// Look up a dictionary key against the profile. Unknown keys yield `None`;
/// known keys yield the profile's value, empty when the profile has none.
pub fn mapped_value(key: &str, profile: &Profile) -> Option<String> {
    let value = match key {
        "firstName" => profile.first_name.clone(),
        "lastName" => profile.last_name.clone(),
        "fullName" => profile.full_name(),
        "email" => profile.contact.email.clone(),
        "phone" => profile.contact.phone.clone(),
        "linkedin" => profile.contact.linkedin.clone().unwrap_or_default(),
        "website" => profile.contact.website.clone().unwrap_or_default(),
        "github" => profile.contact.github.clone().unwrap_or_default(),
        "location" => profile.contact.location.clone().unwrap_or_default(),
        "city" => profile.contact.city.clone().unwrap_or_default(),
        "resumePath" => profile
            .resume_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        _ => return None,
    };
    Some(value)
}

pub struct FieldResolver {
    llm: Arc<dyn LanguageModel>,
}

impl FieldResolver {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Produce the value to enter into `field`, or empty to signal "skip".
    pub async fn resolve(&self, field: &FormField, profile: &Profile, job: &JobListing) -> String {
        if let Some(value) = &field.value {
            return value.clone();
        }

        if let Some(mapping) = &field.profile_mapping {
            if let Some(value) = mapped_value(mapping, profile) {
                debug!("Resolved '{}' via mapping {}", field.label, mapping);
                return value;
            }
            warn!("Unknown profile mapping '{}' on field '{}'", mapping, field.label);
        }

        if let Some(mapping) = infer_mapping(&field.label) {
            // Factual fields the profile cannot answer stay empty; asking
            // the model to invent contact data would be worse than a skip.
            debug!("Resolved '{}' via label rule {}", field.label, mapping);
            return mapped_value(mapping, profile).unwrap_or_default();
        }

        self.resolve_with_model(field, profile, job).await
    }

    async fn resolve_with_model(
        &self,
        field: &FormField,
        profile: &Profile,
        job: &JobListing,
    ) -> String {
        let options = if field.options.is_empty() {
            String::new()
        } else {
            format!(
                "\nChoose exactly one of these options and answer with its text:\n{}",
                field
                    .options
                    .iter()
                    .map(|o| format!("- {}", o.text))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        };

        let description: String = job.description.chars().take(1500).collect();
        let prompt = format!(
            r#"You are filling a job application form on behalf of a candidate.

QUESTION: {label}
FIELD TYPE: {kind:?}{options}

JOB: {title} at {company}
JOB DESCRIPTION (excerpt): {description}

CANDIDATE: {name}, skills: {skills}

Answer the question concisely and professionally, as the candidate would on
a job application. Reply with the answer only, no preamble. For yes/no
questions reply "yes" or "no"."#,
            label = field.label,
            kind = field.field_type,
            options = options,
            title = job.title,
            company = job.company,
            description = description,
            name = profile.full_name(),
            skills = profile.skills.join(", "),
        );

        match self.llm.complete("Application Answer", &prompt).await {
            Ok(answer) => {
                let answer = answer.trim().to_string();
                debug!("Model answered '{}' for '{}'", answer, field.label);
                answer
            }
            Err(e) => {
                warn!("Model could not answer '{}': {}", field.label, e);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContactInfo, FieldType, SelectOption};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct OfflineModel;

    #[async_trait]
    impl LanguageModel for OfflineModel {
        async fn complete(&self, _context: &str, _prompt: &str) -> Result<String> {
            anyhow::bail!("offline")
        }
    }

    struct CannedModel(&'static str);

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(&self, _context: &str, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn test_profile() -> Profile {
        Profile {
            id: "p1".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            contact: ContactInfo {
                email: "a@b.com".to_string(),
                phone: "+1 555 0100".to_string(),
                linkedin: Some("https://linkedin.com/in/janedoe".to_string()),
                ..Default::default()
            },
            experience: vec![],
            education: vec![],
            skills: vec!["Rust".to_string()],
            resume_path: Some(PathBuf::from("/data/jane/resume.pdf")),
            preferences: Default::default(),
        }
    }

    fn test_job() -> JobListing {
        JobListing {
            id: "j1".to_string(),
            title: "Backend Engineer".to_string(),
            company: "Acme".to_string(),
            location: String::new(),
            description: String::new(),
            url: "https://example.com/jobs/1".to_string(),
            platform: None,
            match_score: None,
            match_analysis: None,
        }
    }

    fn field(label: &str) -> FormField {
        let mut f = FormField::new("#f", FieldType::Text);
        f.label = label.to_string();
        f
    }

    #[tokio::test]
    async fn test_explicit_value_wins() {
        let resolver = FieldResolver::new(std::sync::Arc::new(OfflineModel));
        let mut f = field("Email");
        f.value = Some("override@example.com".to_string());
        let value = resolver.resolve(&f, &test_profile(), &test_job()).await;
        assert_eq!(value, "override@example.com");
    }

    #[tokio::test]
    async fn test_profile_mapping_is_deterministic() {
        let resolver = FieldResolver::new(std::sync::Arc::new(OfflineModel));
        let mut f = field("whatever");
        f.profile_mapping = Some("email".to_string());
        let value = resolver.resolve(&f, &test_profile(), &test_job()).await;
        assert_eq!(value, "a@b.com");
    }

    #[tokio::test]
    async fn test_label_rules_cover_name_variants() {
        let resolver = FieldResolver::new(std::sync::Arc::new(OfflineModel));
        let profile = test_profile();
        let job = test_job();

        assert_eq!(resolver.resolve(&field("First Name *"), &profile, &job).await, "Jane");
        assert_eq!(resolver.resolve(&field("Surname"), &profile, &job).await, "Doe");
        assert_eq!(resolver.resolve(&field("Your name"), &profile, &job).await, "Jane Doe");
        assert_eq!(
            resolver.resolve(&field("Resume/CV"), &profile, &job).await,
            "/data/jane/resume.pdf"
        );
    }

    #[tokio::test]
    async fn test_specific_rules_beat_bare_name() {
        assert_eq!(infer_mapping("First name"), Some("firstName"));
        assert_eq!(infer_mapping("Company name"), Some("fullName"));
        assert_eq!(infer_mapping("Why us?"), None);
    }

    #[tokio::test]
    async fn test_unresolvable_field_is_empty_not_error() {
        let resolver = FieldResolver::new(std::sync::Arc::new(OfflineModel));
        let value = resolver
            .resolve(&field("Why do you want to work here?"), &test_profile(), &test_job())
            .await;
        assert_eq!(value, "");
    }

    #[tokio::test]
    async fn test_open_question_goes_to_model() {
        let resolver = FieldResolver::new(std::sync::Arc::new(CannedModel("Because of the team.")));
        let mut f = field("Why do you want to work here?");
        f.field_type = FieldType::Textarea;
        let value = resolver.resolve(&f, &test_profile(), &test_job()).await;
        assert_eq!(value, "Because of the team.");
    }

    #[tokio::test]
    async fn test_select_prompt_lists_options() {
        let resolver = FieldResolver::new(std::sync::Arc::new(CannedModel("United States")));
        let mut f = field("Country of residence");
        f.field_type = FieldType::Select;
        f.options = vec![SelectOption {
            value: "us".to_string(),
            text: "United States".to_string(),
        }];
        let value = resolver.resolve(&f, &test_profile(), &test_job()).await;
        assert_eq!(value, "United States");
    }
}

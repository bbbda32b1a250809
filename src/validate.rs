//! Submission form validation
//!
//! The encoder accepts anything; these checks run before a submission is
//! persisted. Every problem is reported, keyed by the field it concerns.

use crate::model::{AccessPolicy, InterfaceKind};
use crate::signing::{AgentSubmission, SecondaryInterface};
use crate::store::is_wallet_address;
use std::fmt;
use thiserror::Error;

/// One failed check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All failed checks of a submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", .errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Message recorded for `field`, if any
    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

/// Whether `value` parses as an absolute URL
pub fn is_valid_url(value: &str) -> bool {
    url::Url::parse(value.trim()).is_ok()
}

fn check_url(errors: &mut ValidationErrors, field: &str, label: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(field, format!("{label} is required"));
    } else if !is_valid_url(value) {
        errors.push(field, format!("{label} is invalid"));
    }
}

fn check_key_request_url(
    errors: &mut ValidationErrors,
    field: &str,
    kind: Option<InterfaceKind>,
    access: Option<AccessPolicy>,
    value: &str,
) {
    let value = value.trim();
    if kind == Some(InterfaceKind::Api) && access == Some(AccessPolicy::KeyRequired) && value.is_empty() {
        errors.push(field, "Key request URL is required for key-required APIs");
    } else if !value.is_empty() && !is_valid_url(value) {
        errors.push(field, "Key request URL is invalid");
    }
}

fn check_secondary(errors: &mut ValidationErrors, index: usize, s: &SecondaryInterface) {
    let prefix = format!("secondary[{index}]");
    if s.kind.is_none() {
        errors.push(format!("{prefix}.kind"), "Kind is required");
    }
    check_url(errors, &format!("{prefix}.url"), "URL", &s.url);
    if s.display_name.trim().is_empty() {
        errors.push(format!("{prefix}.displayName"), "Name is required");
    }
    check_key_request_url(
        errors,
        &format!("{prefix}.keyRequestUrl"),
        s.kind,
        s.access,
        &s.key_request_url,
    );
}

/// Check a submission the way the listing form does
pub fn validate_submission(
    submission: &AgentSubmission,
    max_tags: usize,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if submission.name.trim().is_empty() {
        errors.push("name", "Name is required");
    }
    if submission.summary.trim().is_empty() {
        errors.push("summary", "Summary is required");
    }
    check_url(&mut errors, "websiteUrl", "Website URL", &submission.website_url);
    check_url(&mut errors, "thumbnailUrl", "Thumbnail URL", &submission.thumbnail_url);

    if submission.owner_wallet.trim().is_empty() {
        errors.push("ownerWallet", "Owner wallet is required");
    } else if !is_wallet_address(&submission.owner_wallet) {
        errors.push("ownerWallet", "Owner wallet looks invalid");
    }
    if submission.agent_wallet.trim().is_empty() {
        errors.push("agentWallet", "Agent wallet is required");
    } else if !is_wallet_address(&submission.agent_wallet) {
        errors.push("agentWallet", "Agent wallet looks invalid");
    }
    if !submission.donation_wallet.is_empty() && !is_wallet_address(&submission.donation_wallet) {
        errors.push("donationWallet", "Donation wallet looks invalid");
    }

    if submission.primary_kind.is_none() {
        errors.push("primaryKind", "Primary kind is required");
    }
    check_url(&mut errors, "primaryUrl", "Primary URL", &submission.primary_url);
    let (access, key_request_url) = submission.effective_primary_access();
    check_key_request_url(
        &mut errors,
        "keyRequestUrl",
        submission.primary_kind,
        access,
        key_request_url,
    );

    for (index, secondary) in submission.secondary.iter().enumerate() {
        check_secondary(&mut errors, index, secondary);
    }

    if submission.tag_slugs.len() > max_tags {
        errors.push("tagSlugs", format!("At most {max_tags} tags are allowed"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Signed submission flow
//!
//! A listing is published by posting the submission the owner's wallet
//! signed, the message version it was encoded with, and the signature. The
//! service validates the form, checks freshness, re-derives the canonical
//! message, verifies the signature, claims the nonce, then persists.

use crate::config::{SubmissionSection, MAX_SUBMISSION_WINDOW_SECS};
use crate::error::{RegistryError, RegistryResult};
use crate::model::{slugify, AccessPolicy, CreateAgentInput, CreatedAgent, InterfaceInput, InterfaceKind};
use crate::observability::metrics;
use crate::signing::{verify_submission, AgentSubmission, MessageVersion, SecondaryInterface};
use crate::store::AgentStore;
use crate::validate::validate_submission;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn, Instrument};

/// Body of `POST {base}/agents`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedSubmission {
    pub submission: AgentSubmission,
    #[serde(default)]
    pub version: MessageVersion,
    pub signature: String,
}

/// Time limits applied to submission timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionPolicy {
    pub max_message_age: Duration,
    pub max_future_skew: Duration,
    pub max_tags: usize,
}

impl From<&SubmissionSection> for SubmissionPolicy {
    fn from(section: &SubmissionSection) -> Self {
        Self {
            max_message_age: window(section.max_message_age_secs),
            max_future_skew: window(section.max_future_skew_secs),
            max_tags: section.max_tags,
        }
    }
}

/// Seconds as a duration, saturating at the configured ceiling
fn window(secs: u64) -> Duration {
    let secs = secs.min(MAX_SUBMISSION_WINDOW_SECS) as i64;
    Duration::try_seconds(secs).unwrap_or_else(Duration::zero)
}

impl SubmissionPolicy {
    /// Reject timestamps that are missing, malformed, stale or too far ahead
    pub fn check_freshness(&self, timestamp: &str, now: DateTime<Utc>) -> RegistryResult<()> {
        let timestamp = timestamp.trim();
        if timestamp.is_empty() {
            return Err(RegistryError::invalid_input("Timestamp is required"));
        }
        let signed_at = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| RegistryError::invalid_input(format!("Timestamp is not RFC 3339: {e}")))?
            .with_timezone(&Utc);

        let latest = now
            .checked_add_signed(self.max_future_skew)
            .ok_or_else(|| RegistryError::internal("future skew overflows the clock"))?;
        let earliest = now
            .checked_sub_signed(self.max_message_age)
            .ok_or_else(|| RegistryError::internal("message age overflows the clock"))?;

        if signed_at > latest {
            return Err(RegistryError::invalid_input("Timestamp is in the future"));
        }
        if signed_at < earliest {
            return Err(RegistryError::invalid_input("Submission has expired"));
        }
        Ok(())
    }

    /// How long a claimed nonce must be remembered
    fn nonce_retention(&self) -> Duration {
        self.max_message_age + self.max_future_skew
    }
}

/// Nonces already used, per owner wallet
///
/// Entries only need to outlive the freshness window: an older submission is
/// rejected as expired before its nonce is looked at.
#[derive(Debug)]
pub struct NonceLedger {
    retention: Duration,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl NonceLedger {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn key(owner: &str, nonce: &str) -> String {
        format!("{owner}:{nonce}")
    }

    /// Record a nonce; false when it was already claimed
    pub fn claim(&self, owner: &str, nonce: &str, now: DateTime<Utc>) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let retention = self.retention;
        seen.retain(|_, claimed_at| now - *claimed_at <= retention);

        let key = Self::key(owner, nonce);
        if seen.contains_key(&key) {
            return false;
        }
        seen.insert(key, now);
        true
    }

    /// Forget a claim so the same signed submission can be retried
    pub fn release(&self, owner: &str, nonce: &str) {
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        seen.remove(&Self::key(owner, nonce));
    }

    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .map(|seen| seen.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn secondary_input(secondary: &SecondaryInterface) -> RegistryResult<InterfaceInput> {
    let kind = secondary
        .kind
        .ok_or_else(|| RegistryError::invalid_input("Secondary interface kind is required"))?;
    let (access_policy, key_request_url) = match kind {
        InterfaceKind::Api => (
            Some(secondary.access.unwrap_or(AccessPolicy::Public)),
            non_empty(&secondary.key_request_url),
        ),
        InterfaceKind::WebUi => (None, None),
    };
    Ok(InterfaceInput {
        kind,
        url: secondary.url.trim().to_string(),
        access_policy,
        key_request_url,
        display_name: non_empty(&secondary.display_name),
        notes: non_empty(&secondary.notes),
    })
}

/// Slug a submission is stored under before uniqueness suffixes
pub fn submission_slug(submission: &AgentSubmission) -> RegistryResult<String> {
    let source = if submission.slug.trim().is_empty() {
        &submission.name
    } else {
        &submission.slug
    };
    let slug = slugify(source);
    if slug.is_empty() {
        return Err(RegistryError::invalid_input(
            "Slug could not be derived from the name",
        ));
    }
    Ok(slug)
}

/// Convert a verified submission into store input
pub fn to_create_input(submission: &AgentSubmission, slug: String) -> RegistryResult<CreateAgentInput> {
    let kind = submission
        .primary_kind
        .ok_or_else(|| RegistryError::invalid_input("Primary kind is required"))?;
    let (access_policy, key_request_url) = submission.effective_primary_access();

    let mut tag_slugs: Vec<String> = Vec::with_capacity(submission.tag_slugs.len());
    for tag in &submission.tag_slugs {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tag_slugs.contains(&tag) {
            tag_slugs.push(tag);
        }
    }

    Ok(CreateAgentInput {
        slug,
        name: submission.name.trim().to_string(),
        summary: submission.summary.trim().to_string(),
        thumbnail_url: non_empty(&submission.thumbnail_url),
        website_url: non_empty(&submission.website_url),
        socials: Default::default(),
        owner_wallet: submission.owner_wallet.trim().to_string(),
        agent_wallet: submission.agent_wallet.trim().to_string(),
        status: None,
        primary_interface: InterfaceInput {
            kind,
            url: submission.primary_url.trim().to_string(),
            access_policy,
            key_request_url: non_empty(key_request_url),
            display_name: None,
            notes: None,
        },
        secondary_interfaces: submission
            .secondary
            .iter()
            .map(secondary_input)
            .collect::<RegistryResult<_>>()?,
        tag_slugs,
        donation_wallet: non_empty(&submission.donation_wallet),
    })
}

/// Accepts signed submissions and writes them to the store
pub struct SubmissionService {
    store: Arc<dyn AgentStore>,
    policy: SubmissionPolicy,
    ledger: NonceLedger,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn AgentStore>, section: &SubmissionSection) -> Self {
        let policy = SubmissionPolicy::from(section);
        Self {
            store,
            ledger: NonceLedger::new(policy.nonce_retention()),
            policy,
        }
    }

    pub fn policy(&self) -> &SubmissionPolicy {
        &self.policy
    }

    pub async fn submit(&self, signed: SignedSubmission) -> RegistryResult<CreatedAgent> {
        self.submit_at(signed, Utc::now()).await
    }

    /// Run the whole flow with an explicit clock
    pub async fn submit_at(
        &self,
        signed: SignedSubmission,
        now: DateTime<Utc>,
    ) -> RegistryResult<CreatedAgent> {
        let span = crate::submission_span!(
            owner = %signed.submission.owner_wallet,
            version = %signed.version
        );
        let result = self.process(signed, now).instrument(span).await;

        match &result {
            Ok(created) => {
                metrics().submission_accepted();
                info!(id = %created.id, slug = %created.slug, "Submission accepted");
            }
            Err(e) => {
                metrics().submission_rejected();
                warn!(error = %e, status = e.status_code(), "Submission rejected");
            }
        }
        result
    }

    async fn process(&self, signed: SignedSubmission, now: DateTime<Utc>) -> RegistryResult<CreatedAgent> {
        let SignedSubmission {
            submission,
            version,
            signature,
        } = signed;

        validate_submission(&submission, self.policy.max_tags)
            .map_err(|errors| RegistryError::invalid_input(errors.to_string()))?;
        if submission.nonce.trim().is_empty() {
            return Err(RegistryError::invalid_input("Nonce is required"));
        }
        self.policy.check_freshness(&submission.timestamp, now)?;

        verify_submission(&submission, version, &signature)?;
        debug!("Signature verified");

        let slug = submission_slug(&submission)?;
        let input = to_create_input(&submission, slug)?;

        let owner = submission.owner_wallet.as_str();
        let nonce = submission.nonce.as_str();
        if !self.ledger.claim(owner, nonce, now) {
            return Err(RegistryError::NonceReused {
                nonce: nonce.to_string(),
            });
        }

        match self.store.create_agent(input).await {
            Ok(created) => Ok(created),
            Err(e) => {
                self.ledger.release(owner, nonce);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::{sign_submission, KeypairWallet, WalletSigner};
    use crate::store::{LookupKey, SeedStore, SqliteStore};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:30Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn owner() -> KeypairWallet {
        KeypairWallet::from_seed([11u8; 32])
    }

    fn submission(wallet: &KeypairWallet) -> AgentSubmission {
        AgentSubmission {
            name: "Ledger Lens".to_string(),
            summary: "Reads ledgers".to_string(),
            thumbnail_url: "https://img.example.com/lens.png".to_string(),
            website_url: "https://lens.example.com".to_string(),
            primary_kind: Some(InterfaceKind::Api),
            primary_url: "https://lens.example.com/api".to_string(),
            owner_wallet: wallet.address(),
            agent_wallet: KeypairWallet::from_seed([12u8; 32]).address(),
            tag_slugs: vec!["data".to_string(), "Data".to_string(), "finance".to_string()],
            nonce: "nonce-1".to_string(),
            timestamp: "2025-03-01T12:00:00.000Z".to_string(),
            ..Default::default()
        }
    }

    async fn signed(
        wallet: &KeypairWallet,
        submission: AgentSubmission,
        version: MessageVersion,
    ) -> SignedSubmission {
        let (_, signature) = sign_submission(wallet, &submission, version).await.unwrap();
        SignedSubmission {
            submission,
            version,
            signature: signature.signature_base58(),
        }
    }

    fn sqlite_service() -> SubmissionService {
        let store: Arc<dyn AgentStore> = Arc::new(SqliteStore::open(None).unwrap());
        SubmissionService::new(store, &SubmissionSection::default())
    }

    #[test]
    fn test_signed_submission_body_defaults_version() {
        let body: SignedSubmission = serde_json::from_str(
            r#"{"submission":{"name":"x","tagSlugs":null},"signature":"sig"}"#,
        )
        .unwrap();
        assert_eq!(body.version, MessageVersion::V1);
        assert!(body.submission.tag_slugs.is_empty());
    }

    #[test]
    fn test_freshness_window() {
        let policy = SubmissionPolicy::from(&SubmissionSection::default());
        let now = now();
        assert!(policy.check_freshness("2025-03-01T12:00:00Z", now).is_ok());
        assert!(policy.check_freshness("2025-03-01T12:01:00Z", now).is_ok());

        let expired = policy.check_freshness("2025-03-01T11:40:00Z", now).unwrap_err();
        assert_eq!(expired.to_string(), "Invalid input: Submission has expired");
        let future = policy.check_freshness("2025-03-01T12:05:00Z", now).unwrap_err();
        assert!(future.to_string().contains("future"));
        assert_eq!(policy.check_freshness("yesterday", now).unwrap_err().status_code(), 400);
        assert_eq!(policy.check_freshness("", now).unwrap_err().status_code(), 400);
    }

    #[test]
    fn test_oversized_windows_saturate() {
        let section = SubmissionSection {
            max_message_age_secs: u64::MAX / 4,
            max_future_skew_secs: 9_000_000_000_000,
            max_tags: 4,
        };
        let policy = SubmissionPolicy::from(&section);
        assert_eq!(policy.max_message_age, Duration::seconds(MAX_SUBMISSION_WINDOW_SECS as i64));
        assert_eq!(policy.max_future_skew, Duration::seconds(MAX_SUBMISSION_WINDOW_SECS as i64));

        let now = now();
        assert!(policy.check_freshness("2025-02-28T13:00:00Z", now).is_ok());
        assert!(policy.check_freshness("2025-03-02T11:00:00Z", now).is_ok());
        assert!(policy.check_freshness("2025-02-27T12:00:00Z", now).is_err());
        assert!(policy.check_freshness("2025-03-03T12:00:00Z", now).is_err());
    }

    #[test]
    fn test_nonce_ledger_claim_release_and_expiry() {
        let ledger = NonceLedger::new(Duration::seconds(60));
        let t0 = now();
        assert!(ledger.claim("owner", "n1", t0));
        assert!(!ledger.claim("owner", "n1", t0));
        assert!(ledger.claim("other", "n1", t0));

        ledger.release("owner", "n1");
        assert!(ledger.claim("owner", "n1", t0));

        assert!(ledger.claim("owner", "n2", t0 + Duration::seconds(120)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_submission_slug_falls_back_to_name() {
        let mut s = AgentSubmission {
            name: "My Great Agent!".to_string(),
            ..Default::default()
        };
        assert_eq!(submission_slug(&s).unwrap(), "my-great-agent");
        s.slug = "Custom Slug".to_string();
        assert_eq!(submission_slug(&s).unwrap(), "custom-slug");
        s.slug = "***".to_string();
        assert_eq!(submission_slug(&s).unwrap_err().status_code(), 400);
    }

    #[test]
    fn test_create_input_normalises_primary_and_tags() {
        let wallet = owner();
        let mut s = submission(&wallet);
        s.primary_kind = Some(InterfaceKind::WebUi);
        s.primary_access = Some(AccessPolicy::KeyRequired);
        s.key_request_url = "https://lens.example.com/keys".to_string();

        let input = to_create_input(&s, "ledger-lens".to_string()).unwrap();
        assert_eq!(input.primary_interface.access_policy, None);
        assert_eq!(input.primary_interface.key_request_url, None);
        assert_eq!(input.tag_slugs, vec!["data", "finance"]);
        assert_eq!(input.donation_wallet, None);
    }

    #[tokio::test]
    async fn test_accepted_submission_is_persisted() {
        let service = sqlite_service();
        let wallet = owner();
        let body = signed(&wallet, submission(&wallet), MessageVersion::V1).await;

        let created = service.submit_at(body, now()).await.unwrap();
        assert_eq!(created.slug, "ledger-lens");

        let agent = service
            .store
            .find_agent(&LookupKey::Slug("ledger-lens".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agent.id, created.id);
        assert_eq!(agent.owner_wallet, wallet.address());
        let primary = agent.primary_interface().unwrap();
        assert_eq!(primary.access_policy, Some(AccessPolicy::Public));
        assert!(agent.has_tag("finance"));
    }

    #[tokio::test]
    async fn test_text_version_is_accepted() {
        let service = sqlite_service();
        let wallet = owner();
        let body = signed(&wallet, submission(&wallet), MessageVersion::V1Text).await;
        assert!(service.submit_at(body, now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_replayed_nonce_is_rejected() {
        let service = sqlite_service();
        let wallet = owner();
        let body = signed(&wallet, submission(&wallet), MessageVersion::V1).await;

        service.submit_at(body.clone(), now()).await.unwrap();
        let err = service.submit_at(body, now()).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_fresh_nonce_gets_unique_slug() {
        let service = sqlite_service();
        let wallet = owner();
        let first = signed(&wallet, submission(&wallet), MessageVersion::V1).await;
        service.submit_at(first, now()).await.unwrap();

        let mut again = submission(&wallet);
        again.nonce = "nonce-2".to_string();
        let second = signed(&wallet, again, MessageVersion::V1).await;
        let created = service.submit_at(second, now()).await.unwrap();
        assert_eq!(created.slug, "ledger-lens-2");
    }

    #[tokio::test]
    async fn test_tampered_submission_fails_verification() {
        let service = sqlite_service();
        let wallet = owner();
        let mut body = signed(&wallet, submission(&wallet), MessageVersion::V1).await;
        body.submission.summary = "Something else".to_string();

        let err = service.submit_at(body, now()).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_signature_from_other_wallet_fails() {
        let service = sqlite_service();
        let wallet = owner();
        let impostor = KeypairWallet::from_seed([99u8; 32]);
        let body = signed(&impostor, submission(&wallet), MessageVersion::V1).await;

        let err = service.submit_at(body, now()).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_wrong_version_fails_verification() {
        let service = sqlite_service();
        let wallet = owner();
        let mut body = signed(&wallet, submission(&wallet), MessageVersion::V1).await;
        body.version = MessageVersion::V1Text;

        let err = service.submit_at(body, now()).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_invalid_form_is_rejected_before_verification() {
        let service = sqlite_service();
        let wallet = owner();
        let mut s = submission(&wallet);
        s.website_url = String::new();
        let body = SignedSubmission {
            submission: s,
            version: MessageVersion::V1,
            signature: "not-even-a-signature".to_string(),
        };

        let err = service.submit_at(body, now()).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("websiteUrl"));
    }

    #[tokio::test]
    async fn test_expired_submission_is_rejected() {
        let service = sqlite_service();
        let wallet = owner();
        let body = signed(&wallet, submission(&wallet), MessageVersion::V1).await;

        let err = service
            .submit_at(body, now() + Duration::hours(1))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_failed_persist_releases_nonce() {
        let store: Arc<dyn AgentStore> = Arc::new(SeedStore::from_seed());
        let service = SubmissionService::new(store, &SubmissionSection::default());
        let wallet = owner();
        let body = signed(&wallet, submission(&wallet), MessageVersion::V1).await;

        let first = service.submit_at(body.clone(), now()).await.unwrap_err();
        assert_eq!(first.status_code(), 501);
        let second = service.submit_at(body, now()).await.unwrap_err();
        assert_eq!(second.status_code(), 501);
        assert!(service.ledger.is_empty());
    }
}

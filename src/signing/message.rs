//! Canonical agent-submission message
//!
//! Serializes an [`AgentSubmission`] into the exact text a wallet signs when
//! publishing a listing, so that a verifier holding the same submission data
//! can re-derive the identical bytes.
//!
//! ## Formats
//!
//! Two versioned formats exist. The first line is always the version marker.
//!
//! - `v1`: every field is the standard-alphabet base64 of its UTF-8 bytes.
//!   Secondary interfaces are six pipe-joined base64 fields per line, tags are
//!   one base64 slug per line. The base64 alphabet contains neither `|` nor a
//!   newline, so no field content can be confused with a delimiter.
//! - `v1-text`: the same fields in the same order, labelled and verbatim, for
//!   showing to a person before they sign. Section sizes are written as counts
//!   so the block boundaries stay parseable.
//!
//! In `v1-text` the `|` delimiter and newlines inside free-text fields (notes,
//! display names, summary) are NOT escaped. Content containing either makes
//! the text ambiguous to read back; verification always re-derives the message
//! from structured data, so signatures are unaffected.
//!
//! Layout of `v1` (sections joined with `\n`, an empty section still yields
//! one empty line):
//!
//! ```text
//! v1
//! slug / name / summary / thumbnail url / website url
//! primary kind / primary url / primary access / key-request url
//! <secondary lines: kind|url|access|key_request_url|display_name|notes>
//! <tag lines>
//! owner wallet / agent wallet / donation wallet / nonce / timestamp
//! ```

use crate::model::{AccessPolicy, InterfaceKind};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Marker of the machine-oriented format
pub const VERSION_V1: &str = "v1";
/// Marker of the human-readable format
pub const VERSION_V1_TEXT: &str = "v1-text";

/// Version of the canonical message format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageVersion {
    #[default]
    #[serde(rename = "v1")]
    V1,
    #[serde(rename = "v1-text")]
    V1Text,
}

impl MessageVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageVersion::V1 => VERSION_V1,
            MessageVersion::V1Text => VERSION_V1_TEXT,
        }
    }

    /// Read the version marker from the first line of a message
    pub fn detect(message: &str) -> Option<Self> {
        let first = message.split('\n').next()?;
        first.parse().ok()
    }
}

impl fmt::Display for MessageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            VERSION_V1 => Ok(MessageVersion::V1),
            VERSION_V1_TEXT => Ok(MessageVersion::V1Text),
            other => Err(format!("unsupported message version '{other}'")),
        }
    }
}

/// Secondary interface as it appears in a submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecondaryInterface {
    #[serde(deserialize_with = "empty_as_none")]
    pub kind: Option<InterfaceKind>,
    #[serde(deserialize_with = "null_as_empty")]
    pub url: String,
    #[serde(deserialize_with = "empty_as_none")]
    pub access: Option<AccessPolicy>,
    #[serde(deserialize_with = "null_as_empty")]
    pub key_request_url: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub display_name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub notes: String,
}

impl SecondaryInterface {
    fn fields(&self) -> [&str; 6] {
        [
            self.kind.as_ref().map_or("", InterfaceKind::as_str),
            &self.url,
            self.access.as_ref().map_or("", AccessPolicy::as_str),
            &self.key_request_url,
            &self.display_name,
            &self.notes,
        ]
    }

    /// Display name, then url; remaining fields only keep the order total
    fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.display_name
            .cmp(&other.display_name)
            .then_with(|| self.url.cmp(&other.url))
            .then_with(|| self.fields().cmp(&other.fields()))
    }
}

/// Payload a wallet holder signs to publish a listing
///
/// Never persisted as-is. Every absent or null text field is an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSubmission {
    #[serde(deserialize_with = "null_as_empty")]
    pub slug: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub summary: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub thumbnail_url: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub website_url: String,
    #[serde(deserialize_with = "empty_as_none")]
    pub primary_kind: Option<InterfaceKind>,
    #[serde(deserialize_with = "null_as_empty")]
    pub primary_url: String,
    #[serde(deserialize_with = "empty_as_none")]
    pub primary_access: Option<AccessPolicy>,
    #[serde(deserialize_with = "null_as_empty")]
    pub key_request_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub secondary: Vec<SecondaryInterface>,
    #[serde(deserialize_with = "null_as_default")]
    pub tag_slugs: Vec<String>,
    #[serde(alias = "ownerWalletBase58", deserialize_with = "null_as_empty")]
    pub owner_wallet: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub agent_wallet: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub donation_wallet: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub nonce: String,
    #[serde(alias = "tsISO", deserialize_with = "null_as_empty")]
    pub timestamp: String,
}

impl AgentSubmission {
    /// Primary access policy and key-request URL as they are signed
    ///
    /// Non-API primaries carry neither; an API primary without a policy is public.
    pub fn effective_primary_access(&self) -> (Option<AccessPolicy>, &str) {
        match self.primary_kind {
            Some(InterfaceKind::Api) => (
                Some(self.primary_access.unwrap_or(AccessPolicy::Public)),
                &self.key_request_url,
            ),
            _ => (None, ""),
        }
    }

    fn sorted_secondary(&self) -> Vec<&SecondaryInterface> {
        let mut secondary: Vec<&SecondaryInterface> = self.secondary.iter().collect();
        secondary.sort_by(|a, b| a.canonical_cmp(b));
        secondary
    }

    fn sorted_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.tag_slugs.iter().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

/// Encoded message ready to be shown or signed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMessage {
    version: MessageVersion,
    text: String,
}

impl CanonicalMessage {
    /// Encode a submission in the given format
    pub fn encode(submission: &AgentSubmission, version: MessageVersion) -> Self {
        let text = match version {
            MessageVersion::V1 => encode_v1(submission),
            MessageVersion::V1Text => encode_v1_text(submission),
        };
        Self { version, text }
    }

    pub fn version(&self) -> MessageVersion {
        self.version
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// UTF-8 bytes handed to the wallet signing capability
    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for CanonicalMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Build the `v1` message for a submission
pub fn build_agent_create_message(submission: &AgentSubmission) -> String {
    encode_v1(submission)
}

fn b64(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

fn encode_v1(s: &AgentSubmission) -> String {
    let (access, key_request_url) = s.effective_primary_access();

    let secondary_lines = s
        .sorted_secondary()
        .into_iter()
        .map(|iface| {
            iface
                .fields()
                .iter()
                .map(|field| b64(field))
                .collect::<Vec<_>>()
                .join("|")
        })
        .collect::<Vec<_>>()
        .join("\n");

    let tag_lines = s
        .sorted_tags()
        .into_iter()
        .map(b64)
        .collect::<Vec<_>>()
        .join("\n");

    [
        VERSION_V1.to_string(),
        b64(&s.slug),
        b64(&s.name),
        b64(&s.summary),
        b64(&s.thumbnail_url),
        b64(&s.website_url),
        b64(s.primary_kind.as_ref().map_or("", InterfaceKind::as_str)),
        b64(&s.primary_url),
        b64(access.as_ref().map_or("", AccessPolicy::as_str)),
        b64(key_request_url),
        secondary_lines,
        tag_lines,
        b64(&s.owner_wallet),
        b64(&s.agent_wallet),
        b64(&s.donation_wallet),
        b64(&s.nonce),
        b64(&s.timestamp),
    ]
    .join("\n")
}

fn encode_v1_text(s: &AgentSubmission) -> String {
    let (access, key_request_url) = s.effective_primary_access();
    let secondary = s.sorted_secondary();
    let tags = s.sorted_tags();

    let mut lines: Vec<String> = vec![
        VERSION_V1_TEXT.to_string(),
        format!("slug: {}", s.slug),
        format!("name: {}", s.name),
        format!("summary: {}", s.summary),
        format!("thumbnail_url: {}", s.thumbnail_url),
        format!("website_url: {}", s.website_url),
        format!(
            "primary_kind: {}",
            s.primary_kind.as_ref().map_or("", InterfaceKind::as_str)
        ),
        format!("primary_url: {}", s.primary_url),
        format!(
            "primary_access: {}",
            access.as_ref().map_or("", AccessPolicy::as_str)
        ),
        format!("key_request_url: {key_request_url}"),
        format!("secondary_interfaces: {}", secondary.len()),
    ];
    lines.extend(secondary.iter().map(|iface| iface.fields().join("|")));
    lines.push(format!("tags: {}", tags.len()));
    lines.extend(tags.iter().map(|t| t.to_string()));
    lines.extend([
        format!("owner_wallet: {}", s.owner_wallet),
        format!("agent_wallet: {}", s.agent_wallet),
        format!("donation_wallet: {}", s.donation_wallet),
        format!("nonce: {}", s.nonce),
        format!("timestamp: {}", s.timestamp),
    ]);
    lines.join("\n")
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

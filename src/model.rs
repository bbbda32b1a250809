//! Catalog data model
//!
//! Agents, their network interfaces and tags as stored by every backend and
//! served over the HTTP query surface. JSON uses camelCase field names so the
//! web client can consume records without a mapping layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of network interface an agent exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    Api,
    WebUi,
}

impl InterfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceKind::Api => "api",
            InterfaceKind::WebUi => "web_ui",
        }
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(InterfaceKind::Api),
            "web_ui" => Ok(InterfaceKind::WebUi),
            other => Err(format!("unknown interface kind '{other}'")),
        }
    }
}

/// Access policy of an API interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    Public,
    KeyRequired,
}

impl AccessPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessPolicy::Public => "public",
            AccessPolicy::KeyRequired => "key_required",
        }
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(AccessPolicy::Public),
            "key_required" => Ok(AccessPolicy::KeyRequired),
            other => Err(format!("unknown access policy '{other}'")),
        }
    }
}

/// Publication state of a listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Draft,
    #[default]
    Published,
    Archived,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Draft => "draft",
            AgentStatus::Published => "published",
            AgentStatus::Archived => "archived",
        }
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(AgentStatus::Draft),
            "published" => Ok(AgentStatus::Published),
            "archived" => Ok(AgentStatus::Archived),
            other => Err(format!("unknown agent status '{other}'")),
        }
    }
}

/// A catalog tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    /// Unique, used for filtering and URLs
    pub slug: String,
    pub label: String,
    pub category: Option<String>,
}

/// A network interface attached to an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInterface {
    pub id: String,
    pub agent_id: String,
    pub kind: InterfaceKind,
    pub url: String,
    pub access_policy: Option<AccessPolicy>,
    #[serde(default)]
    pub key_request_url: Option<String>,
    pub is_primary: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// An agent listing with its resolved interfaces and tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub summary: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub socials: BTreeMap<String, String>,
    pub owner_wallet: String,
    #[serde(default)]
    pub agent_wallet: Option<String>,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub donation_wallet: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub interfaces: Vec<AgentInterface>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Agent {
    /// The interface marked primary, if any
    pub fn primary_interface(&self) -> Option<&AgentInterface> {
        self.interfaces.iter().find(|i| i.is_primary)
    }

    /// Whether the agent carries a tag with the given slug (case-insensitive)
    pub fn has_tag(&self, slug: &str) -> bool {
        self.tags.iter().any(|t| t.slug.eq_ignore_ascii_case(slug))
    }
}

/// Interface fields supplied when creating or editing an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceInput {
    pub kind: InterfaceKind,
    pub url: String,
    #[serde(default)]
    pub access_policy: Option<AccessPolicy>,
    #[serde(default)]
    pub key_request_url: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Input for creating a new listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentInput {
    pub slug: String,
    pub name: String,
    pub summary: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub socials: BTreeMap<String, String>,
    pub owner_wallet: String,
    pub agent_wallet: String,
    #[serde(default)]
    pub status: Option<AgentStatus>,
    pub primary_interface: InterfaceInput,
    #[serde(default)]
    pub secondary_interfaces: Vec<InterfaceInput>,
    #[serde(default)]
    pub tag_slugs: Vec<String>,
    #[serde(default)]
    pub donation_wallet: Option<String>,
}

/// Partial update of an existing listing
///
/// Absent fields keep their stored value. A provided secondary list replaces
/// every secondary interface; a provided tag list replaces every tag link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentInput {
    pub name: Option<String>,
    pub summary: Option<String>,
    pub thumbnail_url: Option<String>,
    pub website_url: Option<String>,
    pub socials: Option<BTreeMap<String, String>>,
    pub status: Option<AgentStatus>,
    pub primary_interface: Option<InterfaceInput>,
    pub secondary_interfaces: Option<Vec<InterfaceInput>>,
    pub tag_slugs: Option<Vec<String>>,
    pub donation_wallet: Option<String>,
}

/// Identifier and final slug of a freshly created listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedAgent {
    pub id: String,
    pub slug: String,
}

/// Reference to an existing agent for edits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentRef {
    Id(String),
    Slug(String),
}

impl fmt::Display for AgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentRef::Id(id) => write!(f, "id={id}"),
            AgentRef::Slug(slug) => write!(f, "slug={slug}"),
        }
    }
}

/// Turn free text into a URL slug: lowercase ASCII alphanumerics joined by single dashes
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

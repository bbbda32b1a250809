//! Hosted catalog backend over a PostgREST API
//!
//! Reads go through the `agents_with_relations` view, which embeds each
//! agent's interfaces and tags. Creation writes the base tables one request
//! at a time. Editing is not offered by the hosted backend.

use super::{slug_candidates, AgentStore, LookupKey};
use crate::error::{RegistryError, RegistryResult};
use crate::model::{
    AccessPolicy, Agent, AgentInterface, AgentRef, AgentStatus, CreateAgentInput, CreatedAgent,
    InterfaceInput, InterfaceKind, Tag, UpdateAgentInput,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Row shape of the `agents_with_relations` view
#[derive(Debug, Deserialize)]
struct RemoteAgent {
    id: String,
    slug: String,
    name: String,
    #[serde(default)]
    summary: String,
    thumbnail_url: Option<String>,
    website_url: Option<String>,
    #[serde(default)]
    socials: Option<BTreeMap<String, String>>,
    owner_wallet: String,
    agent_wallet: Option<String>,
    #[serde(default)]
    status: Option<AgentStatus>,
    donation_wallet: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    interfaces: Option<Vec<RemoteInterface>>,
    #[serde(default)]
    tags: Option<Vec<Tag>>,
}

#[derive(Debug, Deserialize)]
struct RemoteInterface {
    id: String,
    agent_id: String,
    kind: InterfaceKind,
    url: String,
    access_policy: Option<AccessPolicy>,
    key_request_url: Option<String>,
    #[serde(default)]
    is_primary: bool,
    display_name: Option<String>,
    notes: Option<String>,
}

impl From<RemoteInterface> for AgentInterface {
    fn from(r: RemoteInterface) -> Self {
        AgentInterface {
            id: r.id,
            agent_id: r.agent_id,
            kind: r.kind,
            url: r.url,
            access_policy: r.access_policy,
            key_request_url: r.key_request_url,
            is_primary: r.is_primary,
            display_name: r.display_name,
            notes: r.notes,
        }
    }
}

impl From<RemoteAgent> for Agent {
    fn from(r: RemoteAgent) -> Self {
        let mut interfaces: Vec<AgentInterface> = r
            .interfaces
            .unwrap_or_default()
            .into_iter()
            .map(AgentInterface::from)
            .collect();
        interfaces.sort_by_key(|i| !i.is_primary);
        Agent {
            id: r.id,
            slug: r.slug,
            name: r.name,
            summary: r.summary,
            thumbnail_url: r.thumbnail_url,
            website_url: r.website_url,
            socials: r.socials.unwrap_or_default(),
            owner_wallet: r.owner_wallet,
            agent_wallet: r.agent_wallet,
            status: r.status.unwrap_or_default(),
            donation_wallet: r.donation_wallet,
            created_at: r.created_at,
            interfaces,
            tags: r.tags.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct InterfaceRow<'a> {
    agent_id: &'a str,
    kind: InterfaceKind,
    url: &'a str,
    access_policy: Option<AccessPolicy>,
    key_request_url: Option<&'a str>,
    is_primary: bool,
    display_name: Option<&'a str>,
    notes: Option<&'a str>,
}

impl<'a> InterfaceRow<'a> {
    fn new(agent_id: &'a str, input: &'a InterfaceInput, is_primary: bool) -> Self {
        Self {
            agent_id,
            kind: input.kind,
            url: &input.url,
            access_policy: input.access_policy,
            key_request_url: input.key_request_url.as_deref(),
            is_primary,
            display_name: input.display_name.as_deref(),
            notes: input.notes.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InsertedAgent {
    id: String,
    slug: String,
}

/// PostgREST-backed store
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
}

impl RestStore {
    /// Build a client for `base_url` authenticating with the anonymous key
    pub fn new(base_url: impl Into<String>, anon_key: impl AsRef<str>) -> RegistryResult<Self> {
        let anon_key = anon_key.as_ref();
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(anon_key)
                .map_err(|_| RegistryError::invalid_input("anon key is not a valid header value"))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {anon_key}"))
                .map_err(|_| RegistryError::invalid_input("anon key is not a valid header value"))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, resource)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        resource: &str,
        query: &[(&str, String)],
    ) -> RegistryResult<T> {
        debug!(resource, ?query, "Upstream GET");
        let response = self
            .client
            .get(self.endpoint(resource))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(resource, status = status.as_u16(), "Upstream read failed");
            return Err(RegistryError::upstream(format!(
                "{resource} returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        resource: &str,
        body: &B,
        return_representation: bool,
    ) -> RegistryResult<reqwest::Response> {
        let prefer = if return_representation {
            "return=representation"
        } else {
            "return=minimal"
        };
        let response = self
            .client
            .post(self.endpoint(resource))
            .header("Prefer", prefer)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(resource, status = status.as_u16(), "Upstream write failed");
            return Err(RegistryError::upstream(format!(
                "insert into {resource} returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(response)
    }

    async fn select_agents(&self, query: &[(&str, String)]) -> RegistryResult<Vec<Agent>> {
        let rows: Vec<RemoteAgent> = self.get_json("agents_with_relations", query).await?;
        Ok(rows.into_iter().map(Agent::from).collect())
    }

    async fn slug_taken(&self, slug: &str) -> RegistryResult<bool> {
        let rows: Vec<IdRow> = self
            .get_json(
                "agents",
                &[
                    ("select", "id".to_string()),
                    ("slug", format!("eq.{slug}")),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl AgentStore for RestStore {
    fn backend(&self) -> &'static str {
        "rest"
    }

    async fn list_agents(&self) -> RegistryResult<Vec<Agent>> {
        self.select_agents(&[
            ("status", "eq.published".to_string()),
            ("order", "created_at.desc".to_string()),
        ])
        .await
    }

    async fn get_agent(&self, id: &str) -> RegistryResult<Option<Agent>> {
        let agents = self
            .select_agents(&[("id", format!("eq.{id}")), ("limit", "1".to_string())])
            .await?;
        Ok(agents.into_iter().next())
    }

    async fn find_agent(&self, key: &LookupKey) -> RegistryResult<Option<Agent>> {
        let agents = self
            .select_agents(&[
                (key.kind(), format!("eq.{}", key.value())),
                ("limit", "1".to_string()),
            ])
            .await?;
        Ok(agents.into_iter().next())
    }

    async fn list_tags(&self) -> RegistryResult<Vec<Tag>> {
        self.get_json(
            "tags",
            &[
                ("select", "id,slug,label,category".to_string()),
                ("order", "label.asc".to_string()),
            ],
        )
        .await
    }

    async fn create_agent(&self, input: CreateAgentInput) -> RegistryResult<CreatedAgent> {
        let base = input.slug.trim();
        if base.is_empty() {
            return Err(RegistryError::invalid_input("Slug required"));
        }

        let mut slug = base.to_string();
        for candidate in slug_candidates(base) {
            if !self.slug_taken(&candidate).await? {
                slug = candidate;
                break;
            }
        }

        let inserted: Vec<InsertedAgent> = self
            .post_json(
                "agents?select=id,slug",
                &json!({
                    "slug": slug,
                    "name": input.name,
                    "summary": input.summary,
                    "thumbnail_url": input.thumbnail_url,
                    "website_url": input.website_url,
                    "socials": input.socials,
                    "owner_wallet": input.owner_wallet,
                    "agent_wallet": input.agent_wallet,
                    "status": input.status.unwrap_or_default(),
                    "donation_wallet": input.donation_wallet,
                }),
                true,
            )
            .await?
            .json()
            .await?;
        let created = inserted
            .into_iter()
            .next()
            .ok_or_else(|| RegistryError::upstream("agent insert returned no row"))?;

        self.post_json(
            "agent_interfaces",
            &InterfaceRow::new(&created.id, &input.primary_interface, true),
            false,
        )
        .await?;

        if !input.secondary_interfaces.is_empty() {
            let rows: Vec<InterfaceRow<'_>> = input
                .secondary_interfaces
                .iter()
                .map(|s| InterfaceRow::new(&created.id, s, false))
                .collect();
            self.post_json("agent_interfaces", &rows, false).await?;
        }

        if !input.tag_slugs.is_empty() {
            let tags: Vec<IdRow> = self
                .get_json(
                    "tags",
                    &[
                        ("select", "id".to_string()),
                        ("slug", format!("in.({})", input.tag_slugs.join(","))),
                    ],
                )
                .await?;
            if !tags.is_empty() {
                let links: Vec<_> = tags
                    .iter()
                    .map(|t| json!({ "agent_id": created.id, "tag_id": t.id }))
                    .collect();
                self.post_json("agent_tags", &links, false).await?;
            }
        }

        info!(id = %created.id, slug = %created.slug, "Created agent upstream");
        Ok(CreatedAgent {
            id: created.id,
            slug: created.slug,
        })
    }

    async fn update_agent(&self, _target: &AgentRef, _input: UpdateAgentInput) -> RegistryResult<()> {
        Err(RegistryError::unsupported(
            "Editing agents is not supported in online mode",
        ))
    }
}

//! Static seed catalog
//!
//! Used to populate an empty SQLite database and as the read-only `seed`
//! data mode.

use super::{AgentStore, LookupKey};
use crate::error::{RegistryError, RegistryResult};
use crate::model::{
    AccessPolicy, Agent, AgentInterface, AgentRef, AgentStatus, CreateAgentInput, CreatedAgent,
    InterfaceKind, Tag, UpdateAgentInput,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

fn tag(slug: &str, label: &str, category: &str) -> Tag {
    Tag {
        id: format!("tag-{slug}"),
        slug: slug.to_string(),
        label: label.to_string(),
        category: Some(category.to_string()),
    }
}

/// Tags shipped with the catalog
pub fn seed_tags() -> Vec<Tag> {
    vec![
        tag("research", "Research", "capability"),
        tag("coding", "Coding", "capability"),
        tag("writing", "Writing", "capability"),
        tag("data", "Data Analysis", "capability"),
        tag("automation", "Automation", "capability"),
        tag("finance", "Finance", "domain"),
        tag("support", "Customer Support", "domain"),
        tag("defi", "DeFi", "domain"),
    ]
}

struct SeedInterface {
    kind: InterfaceKind,
    url: &'static str,
    access: Option<AccessPolicy>,
    key_request_url: Option<&'static str>,
    display_name: Option<&'static str>,
}

struct SeedAgent {
    id: &'static str,
    slug: &'static str,
    name: &'static str,
    summary: &'static str,
    owner_wallet: &'static str,
    agent_wallet: &'static str,
    status: AgentStatus,
    created_at: i64,
    primary: SeedInterface,
    secondary: Vec<SeedInterface>,
    tags: &'static [&'static str],
}

const fn api(url: &'static str, access: AccessPolicy) -> SeedInterface {
    SeedInterface {
        kind: InterfaceKind::Api,
        url,
        access: Some(access),
        key_request_url: None,
        display_name: None,
    }
}

const fn web(url: &'static str) -> SeedInterface {
    SeedInterface {
        kind: InterfaceKind::WebUi,
        url,
        access: None,
        key_request_url: None,
        display_name: None,
    }
}

fn seed_records() -> Vec<SeedAgent> {
    vec![
        SeedAgent {
            id: "a997f351-754a-49cd-a5cf-edfa5a9196f0",
            slug: "research-scout",
            name: "Research Scout",
            summary: "Finds, reads and summarises papers on any topic you give it.",
            owner_wallet: "YWXXL6A7pNpHXvmBa2EaQAmb2qaLix6mwHaQBPrFbbrZ",
            agent_wallet: "MASi45ub7Qe4ZE36UT5G6cU4ud8Fhhe4deS4F3cw9KTA",
            status: AgentStatus::Published,
            created_at: 1_740_830_400,
            primary: api("https://scout.example.com/v1", AccessPolicy::Public),
            secondary: vec![],
            tags: &["research", "data"],
        },
        SeedAgent {
            id: "844a7034-e77f-4e48-90a6-ec179556585e",
            slug: "code-reviewer",
            name: "Code Reviewer",
            summary: "Reviews pull requests and flags bugs before they ship.",
            owner_wallet: "NhFgtsqwDtGuSptFDaYPo22sJXHDmfPVtoPQ6F7FXDNE",
            agent_wallet: "b8dLcukC7edhDQ7cn5d4gEYkbUrMWeWQLGsCmrG6dLaY",
            status: AgentStatus::Published,
            created_at: 1_741_435_200,
            primary: SeedInterface {
                key_request_url: Some("https://reviewer.example.com/keys"),
                ..api("https://reviewer.example.com/api", AccessPolicy::KeyRequired)
            },
            secondary: vec![SeedInterface {
                display_name: Some("Dashboard"),
                ..web("https://reviewer.example.com/app")
            }],
            tags: &["coding", "automation"],
        },
        SeedAgent {
            id: "e0cfab4c-eaef-44d2-93bf-6d016bae4b5b",
            slug: "market-pulse",
            name: "Market Pulse",
            summary: "Daily market sentiment and on-chain flow charts.",
            owner_wallet: "Xgzgv1XiPti6vj8RsnqDXyCUshN6toSWSp6oBB92AezW",
            agent_wallet: "yNoVKf58ZTBqNAYT3j5qcdsyuMNmPfYetW5v6JXmj54o",
            status: AgentStatus::Published,
            created_at: 1_742_040_000,
            primary: web("https://pulse.example.com"),
            secondary: vec![],
            tags: &["finance", "data", "defi"],
        },
        SeedAgent {
            id: "26debfdb-8825-4e56-a179-b37d806c10b5",
            slug: "support-desk",
            name: "Support Desk",
            summary: "Answers customer questions from your docs around the clock.",
            owner_wallet: "tiAgufXjPAcc921toi7ap9UxDuxE2HEKZGqeMHbTv94p",
            agent_wallet: "mLidkuVKnRyjP2WPBg8Y4ErK9pGSSxY6BVScJy9uUxcJ",
            status: AgentStatus::Published,
            created_at: 1_742_644_800,
            primary: api("https://desk.example.com/chat", AccessPolicy::Public),
            secondary: vec![SeedInterface {
                display_name: Some("Webhook"),
                key_request_url: Some("https://desk.example.com/keys"),
                ..api("https://desk.example.com/hooks", AccessPolicy::KeyRequired)
            }],
            tags: &["support", "writing"],
        },
        SeedAgent {
            id: "df703017-04c9-478d-82b3-359986048719",
            slug: "draft-helper",
            name: "Draft Helper",
            summary: "Turns bullet points into polished prose.",
            owner_wallet: "tcSSSS7XhS4D5EVB8Nf471dAb7Qg25xEgRAhHPfQX88w",
            agent_wallet: "nTPkyRFA6CAFjF1YveCHK1ATbQgdM9mwZgikp4Wzxrxk",
            status: AgentStatus::Draft,
            created_at: 1_743_249_600,
            primary: web("https://drafts.example.com"),
            secondary: vec![],
            tags: &["writing"],
        },
    ]
}

fn build_interface(agent_id: &str, index: usize, seed: &SeedInterface, primary: bool) -> AgentInterface {
    AgentInterface {
        id: format!("{agent_id}-if{index}"),
        agent_id: agent_id.to_string(),
        kind: seed.kind,
        url: seed.url.to_string(),
        access_policy: seed.access,
        key_request_url: seed.key_request_url.map(str::to_string),
        is_primary: primary,
        display_name: seed.display_name.map(str::to_string),
        notes: None,
    }
}

/// Agents shipped with the catalog, including one unpublished draft
pub fn seed_agents() -> Vec<Agent> {
    let tags = seed_tags();
    seed_records()
        .into_iter()
        .map(|record| {
            let mut interfaces = vec![build_interface(record.id, 0, &record.primary, true)];
            interfaces.extend(
                record
                    .secondary
                    .iter()
                    .enumerate()
                    .map(|(i, s)| build_interface(record.id, i + 1, s, false)),
            );
            Agent {
                id: record.id.to_string(),
                slug: record.slug.to_string(),
                name: record.name.to_string(),
                summary: record.summary.to_string(),
                thumbnail_url: Some(format!("https://img.example.com/{}.png", record.slug)),
                website_url: Some(format!("https://{}.example.com", record.slug)),
                socials: BTreeMap::new(),
                owner_wallet: record.owner_wallet.to_string(),
                agent_wallet: Some(record.agent_wallet.to_string()),
                status: record.status,
                donation_wallet: None,
                created_at: DateTime::<Utc>::from_timestamp(record.created_at, 0).unwrap_or_default(),
                interfaces,
                tags: tags
                    .iter()
                    .filter(|t| record.tags.contains(&t.slug.as_str()))
                    .cloned()
                    .collect(),
            }
        })
        .collect()
}

/// Read-only store over an in-memory snapshot
pub struct SeedStore {
    tags: Vec<Tag>,
    agents: Vec<Agent>,
}

impl SeedStore {
    pub fn new(tags: Vec<Tag>, agents: Vec<Agent>) -> Self {
        Self { tags, agents }
    }

    pub fn from_seed() -> Self {
        Self::new(seed_tags(), seed_agents())
    }
}

#[async_trait]
impl AgentStore for SeedStore {
    fn backend(&self) -> &'static str {
        "seed"
    }

    async fn list_agents(&self) -> RegistryResult<Vec<Agent>> {
        let mut agents: Vec<Agent> = self
            .agents
            .iter()
            .filter(|a| a.status == AgentStatus::Published)
            .cloned()
            .collect();
        agents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(agents)
    }

    async fn get_agent(&self, id: &str) -> RegistryResult<Option<Agent>> {
        Ok(self.agents.iter().find(|a| a.id == id).cloned())
    }

    async fn find_agent(&self, key: &LookupKey) -> RegistryResult<Option<Agent>> {
        let found = self.agents.iter().find(|a| match key {
            LookupKey::Id(id) => &a.id == id,
            LookupKey::Wallet(wallet) => a.agent_wallet.as_deref() == Some(wallet.as_str()),
            LookupKey::Slug(slug) => &a.slug == slug,
        });
        Ok(found.cloned())
    }

    async fn list_tags(&self) -> RegistryResult<Vec<Tag>> {
        let mut tags = self.tags.clone();
        tags.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(tags)
    }

    async fn create_agent(&self, _input: CreateAgentInput) -> RegistryResult<CreatedAgent> {
        Err(RegistryError::unsupported(
            "Creating agents is not supported in seed mode",
        ))
    }

    async fn update_agent(&self, _target: &AgentRef, _input: UpdateAgentInput) -> RegistryResult<()> {
        Err(RegistryError::unsupported(
            "Editing agents is not supported in seed mode",
        ))
    }
}

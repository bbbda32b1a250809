//! Storage backends for the agent catalog
//!
//! Every backend implements [`AgentStore`]. The handle is built once at
//! startup by [`open_store`] and handed to the catalog and submission
//! services as an `Arc<dyn AgentStore>`.

pub mod rest;
pub mod seed;
pub mod sqlite;

use crate::config::{DataMode, RegistryConfig};
use crate::error::{RegistryError, RegistryResult};
use crate::model::{Agent, AgentRef, CreateAgentInput, CreatedAgent, Tag, UpdateAgentInput};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub use rest::RestStore;
pub use seed::SeedStore;
pub use sqlite::SqliteStore;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// How an agent lookup key should be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    /// 36 characters of hex digits and dashes
    Id(String),
    /// 32 to 44 characters of the base58 alphabet
    Wallet(String),
    Slug(String),
}

impl LookupKey {
    /// Classify a raw key by its shape
    pub fn classify(key: &str) -> Self {
        if key.len() == 36 && key.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            LookupKey::Id(key.to_string())
        } else if (32..=44).contains(&key.len()) && key.chars().all(|c| BASE58_ALPHABET.contains(c))
        {
            LookupKey::Wallet(key.to_string())
        } else {
            LookupKey::Slug(key.to_string())
        }
    }

    pub fn value(&self) -> &str {
        match self {
            LookupKey::Id(v) | LookupKey::Wallet(v) | LookupKey::Slug(v) => v,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LookupKey::Id(_) => "id",
            LookupKey::Wallet(_) => "agent_wallet",
            LookupKey::Slug(_) => "slug",
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind(), self.value())
    }
}

/// Whether a string has the shape of a base58 wallet address
pub fn is_wallet_address(value: &str) -> bool {
    matches!(LookupKey::classify(value), LookupKey::Wallet(_))
}

/// Catalog storage operations shared by all backends
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Published agents with interfaces and tags, newest first
    async fn list_agents(&self) -> RegistryResult<Vec<Agent>>;

    /// Any agent by id, regardless of status
    async fn get_agent(&self, id: &str) -> RegistryResult<Option<Agent>>;

    /// Resolve a classified lookup key
    async fn find_agent(&self, key: &LookupKey) -> RegistryResult<Option<Agent>>;

    /// All tags ordered by label
    async fn list_tags(&self) -> RegistryResult<Vec<Tag>>;

    /// Persist a new listing; the slug is made unique by suffixing `-2`, `-3`, ...
    async fn create_agent(&self, input: CreateAgentInput) -> RegistryResult<CreatedAgent>;

    /// Apply a partial update
    async fn update_agent(&self, target: &AgentRef, input: UpdateAgentInput) -> RegistryResult<()>;
}

/// Build the store selected by configuration
pub async fn open_store(config: &RegistryConfig) -> RegistryResult<Arc<dyn AgentStore>> {
    let store: Arc<dyn AgentStore> = match config.data.mode {
        DataMode::Local => {
            let path = config.data.database_path.clone();
            let store = tokio::task::spawn_blocking(move || SqliteStore::open(path.as_deref()))
                .await??;
            Arc::new(store)
        }
        DataMode::Online => {
            let url = config
                .upstream
                .url
                .clone()
                .ok_or_else(|| RegistryError::internal("online mode requires an upstream url"))?;
            let anon_key = config.get_upstream_anon_key()?;
            Arc::new(RestStore::new(url, anon_key)?)
        }
        DataMode::Seed => Arc::new(SeedStore::from_seed()),
    };

    info!(backend = store.backend(), "Storage backend ready");
    Ok(store)
}

/// Candidate slugs tried in order when `base` is taken
pub(crate) fn slug_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string()).chain((2u32..).map(move |n| format!("{base}-{n}")))
}

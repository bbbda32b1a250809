//! Catalog query layer
//!
//! Tag listing, agent lookup by id / wallet / slug, and the paginated tag
//! listing with `all` / `any` matching. Unknown tags are rejected or dropped
//! depending on the strict-tags setting.

use crate::error::{RegistryError, RegistryResult};
use crate::filter::{
    retain_matching, AccessFilter, FilterOptions, InterfaceFilter, PSEUDO_TAG_API_KEY,
    PSEUDO_TAG_PUBLIC_API,
};
use crate::model::{Agent, Tag};
use crate::store::{AgentStore, LookupKey};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Page size used when the client does not ask for one
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// How requested tags combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Agent must carry every requested tag
    #[default]
    All,
    /// Agent must carry at least one requested tag
    Any,
}

impl MatchMode {
    /// `any` (case-insensitive) selects union matching; everything else is `all`
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("any") {
            MatchMode::Any
        } else {
            MatchMode::All
        }
    }
}

/// Parameters of the agent listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Raw tag tokens, pseudo-tags included
    pub tags: Vec<String>,
    pub match_mode: MatchMode,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub query: Option<String>,
    pub interface: InterfaceFilter,
    pub access: AccessFilter,
}

impl ListQuery {
    /// Build from decoded query-string pairs; the first occurrence of a key wins
    pub fn from_pairs<I, K, V>(pairs: I) -> RegistryResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = ListQuery::default();
        let mut seen = HashSet::new();

        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.as_ref();
            if !seen.insert(key.to_string()) {
                continue;
            }
            match key {
                "tags" => query.tags = split_tags(value),
                "match" => query.match_mode = MatchMode::parse_lenient(value),
                "page" => query.page = value.trim().parse().ok(),
                "limit" => query.limit = value.trim().parse().ok(),
                "q" => query.query = Some(value.to_string()),
                "interface" => {
                    query.interface = value.parse().map_err(RegistryError::invalid_input)?
                }
                "access" => query.access = value.parse().map_err(RegistryError::invalid_input)?,
                _ => {}
            }
        }
        Ok(query)
    }
}

/// Split a comma-separated tag list, dropping empty entries
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_pseudo_tag(token: &str) -> bool {
    token.eq_ignore_ascii_case(PSEUDO_TAG_PUBLIC_API) || token.eq_ignore_ascii_case(PSEUDO_TAG_API_KEY)
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
}

/// Read-side service over an injected store
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn AgentStore>,
    strict_tags: bool,
    max_page_size: usize,
}

impl CatalogService {
    pub fn new(store: Arc<dyn AgentStore>, strict_tags: bool, max_page_size: usize) -> Self {
        Self {
            store,
            strict_tags,
            max_page_size: max_page_size.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn AgentStore> {
        &self.store
    }

    pub async fn list_tags(&self) -> RegistryResult<Vec<Tag>> {
        self.store.list_tags().await
    }

    /// Resolve a raw lookup key to one agent
    pub async fn lookup_agent(&self, raw_key: &str) -> RegistryResult<Agent> {
        let key = LookupKey::classify(raw_key);
        debug!(%key, "Looking up agent");
        self.store
            .find_agent(&key)
            .await?
            .ok_or_else(|| RegistryError::not_found("Agent not found"))
    }

    /// Resolve page and limit against defaults and the configured maximum
    pub fn page_bounds(&self, query: &ListQuery) -> (usize, usize) {
        let page = query.page.unwrap_or(1).max(1) as usize;
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE as i64)
            .clamp(1, self.max_page_size as i64) as usize;
        (page, limit)
    }

    /// Paginated, tag-filtered listing of published agents
    pub async fn list_agents(&self, query: &ListQuery) -> RegistryResult<Page<Agent>> {
        let (page, limit) = self.page_bounds(query);

        let (pseudo, mut slugs): (Vec<String>, Vec<String>) =
            query.tags.iter().cloned().partition(|t| is_pseudo_tag(t));

        if !slugs.is_empty() {
            let known: HashSet<String> = self
                .store
                .list_tags()
                .await?
                .into_iter()
                .map(|t| t.slug)
                .collect();
            let unknown: Vec<String> = slugs.iter().filter(|s| !known.contains(*s)).cloned().collect();
            if !unknown.is_empty() {
                if self.strict_tags {
                    return Err(RegistryError::unknown_tags(unknown));
                }
                debug!(?unknown, "Dropping unknown tags");
                slugs.retain(|s| known.contains(s));
            }
        }

        let mut opts = FilterOptions::new()
            .with_tag_tokens(&pseudo)
            .with_interface_kind(query.interface)
            .with_access(query.access);
        if let Some(q) = &query.query {
            opts = opts.with_query(q.as_str());
        }

        let mut agents = self.store.list_agents().await?;
        if !slugs.is_empty() {
            match query.match_mode {
                MatchMode::All => opts = opts.with_tag_tokens(&slugs),
                MatchMode::Any => agents.retain(|a| slugs.iter().any(|s| a.has_tag(s))),
            }
        }
        let matched = retain_matching(agents, &opts);

        let total = matched.len();
        let start = (page - 1).saturating_mul(limit);
        let items: Vec<Agent> = matched.into_iter().skip(start).take(limit).collect();

        debug!(total, page, limit, returned = items.len(), "Listed agents");
        Ok(Page {
            items,
            page,
            limit,
            total,
        })
    }
}

//! Agent search filter
//!
//! Selects the agents matching a free-text query, a set of required tags and
//! constraints on the primary interface. Every active condition must hold.
//!
//! Two tokens that look like tags are really interface constraints:
//! `public-api` (primary is an API with public access) and `api-key` (primary
//! is an API requiring a key). [`FilterOptions::with_tag_tokens`] lifts them
//! out of a raw tag list into explicit flags; requesting both is allowed and
//! simply matches nothing. Raw tokens are trimmed as well as lower-cased, so
//! `" Data "` requires the `data` tag, and blank tokens are ignored.

use crate::model::{AccessPolicy, Agent, InterfaceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Pseudo-tag for a public API primary interface
pub const PSEUDO_TAG_PUBLIC_API: &str = "public-api";
/// Pseudo-tag for a key-gated API primary interface
pub const PSEUDO_TAG_API_KEY: &str = "api-key";

/// Constraint on the primary interface kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceFilter {
    #[default]
    Any,
    Api,
    WebUi,
}

impl InterfaceFilter {
    fn admits(&self, kind: InterfaceKind) -> bool {
        match self {
            InterfaceFilter::Any => true,
            InterfaceFilter::Api => kind == InterfaceKind::Api,
            InterfaceFilter::WebUi => kind == InterfaceKind::WebUi,
        }
    }
}

impl FromStr for InterfaceFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "any" => Ok(InterfaceFilter::Any),
            "api" => Ok(InterfaceFilter::Api),
            "web_ui" => Ok(InterfaceFilter::WebUi),
            other => Err(format!("unknown interface filter '{other}'")),
        }
    }
}

/// Constraint on the primary API access policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessFilter {
    #[default]
    Any,
    Public,
    KeyRequired,
}

impl AccessFilter {
    fn policy(&self) -> Option<AccessPolicy> {
        match self {
            AccessFilter::Any => None,
            AccessFilter::Public => Some(AccessPolicy::Public),
            AccessFilter::KeyRequired => Some(AccessPolicy::KeyRequired),
        }
    }
}

impl FromStr for AccessFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "any" => Ok(AccessFilter::Any),
            "public" => Ok(AccessFilter::Public),
            "key_required" => Ok(AccessFilter::KeyRequired),
            other => Err(format!("unknown access filter '{other}'")),
        }
    }
}

/// Search criteria
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Case-insensitive substring matched against name and summary
    pub query: String,
    /// Lower-cased tag slugs that must all be present
    pub required_tags: BTreeSet<String>,
    pub interface_kind: InterfaceFilter,
    pub access: AccessFilter,
    /// Primary must be an API with public access
    pub require_public_api: bool,
    /// Primary must be an API requiring a key
    pub require_api_key: bool,
}

impl FilterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Add raw tag tokens, lifting the pseudo-tags into their flags
    pub fn with_tag_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for token in tokens {
            let token = token.as_ref().trim().to_lowercase();
            match token.as_str() {
                "" => {}
                PSEUDO_TAG_PUBLIC_API => self.require_public_api = true,
                PSEUDO_TAG_API_KEY => self.require_api_key = true,
                _ => {
                    self.required_tags.insert(token);
                }
            }
        }
        self
    }

    pub fn with_interface_kind(mut self, kind: InterfaceFilter) -> Self {
        self.interface_kind = kind;
        self
    }

    pub fn with_access(mut self, access: AccessFilter) -> Self {
        self.access = access;
        self
    }

    fn normalized_query(&self) -> String {
        self.query.trim().to_lowercase()
    }

    /// Whether no condition is active
    pub fn is_unconstrained(&self) -> bool {
        self.normalized_query().is_empty()
            && self.required_tags.is_empty()
            && self.interface_kind == InterfaceFilter::Any
            && self.access == AccessFilter::Any
            && !self.require_public_api
            && !self.require_api_key
    }

    /// Test a single agent against every active condition
    pub fn matches(&self, agent: &Agent) -> bool {
        Matcher::new(self).matches(agent)
    }
}

/// Criteria with the query pre-normalised, reused across a whole collection
struct Matcher<'a> {
    opts: &'a FilterOptions,
    query: String,
}

impl<'a> Matcher<'a> {
    fn new(opts: &'a FilterOptions) -> Self {
        Self {
            opts,
            query: opts.normalized_query(),
        }
    }

    fn matches(&self, agent: &Agent) -> bool {
        if !self.query.is_empty() {
            let haystack = format!("{}\n{}", agent.name, agent.summary).to_lowercase();
            if !haystack.contains(&self.query) {
                return false;
            }
        }

        if !self.opts.required_tags.is_empty() {
            let agent_tags: BTreeSet<String> =
                agent.tags.iter().map(|t| t.slug.to_lowercase()).collect();
            if !self.opts.required_tags.is_subset(&agent_tags) {
                return false;
            }
        }

        let primary = agent.primary_interface();

        if self.opts.interface_kind != InterfaceFilter::Any {
            match primary {
                Some(p) if self.opts.interface_kind.admits(p.kind) => {}
                _ => return false,
            }
        }

        if let Some(policy) = self.opts.access.policy() {
            if !primary_api_has(agent, policy) {
                return false;
            }
        }

        if self.opts.require_public_api && !primary_api_has(agent, AccessPolicy::Public) {
            return false;
        }
        if self.opts.require_api_key && !primary_api_has(agent, AccessPolicy::KeyRequired) {
            return false;
        }

        true
    }
}

fn primary_api_has(agent: &Agent, policy: AccessPolicy) -> bool {
    matches!(
        agent.primary_interface(),
        Some(p) if p.kind == InterfaceKind::Api && p.access_policy == Some(policy)
    )
}

/// Select matching agents, preserving input order
pub fn filter_agents<'a>(agents: &'a [Agent], opts: &FilterOptions) -> Vec<&'a Agent> {
    let matcher = Matcher::new(opts);
    agents.iter().filter(|a| matcher.matches(a)).collect()
}

/// Owned variant of [`filter_agents`] for callers that already hold the collection
pub fn retain_matching(agents: Vec<Agent>, opts: &FilterOptions) -> Vec<Agent> {
    let matcher = Matcher::new(opts);
    agents.into_iter().filter(|a| matcher.matches(a)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentInterface, AgentStatus, Tag};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn agent(
        slug: &str,
        summary: &str,
        tags: &[&str],
        primary: Option<(InterfaceKind, Option<AccessPolicy>)>,
    ) -> Agent {
        Agent {
            id: format!("id-{slug}"),
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            summary: summary.to_string(),
            thumbnail_url: None,
            website_url: None,
            socials: BTreeMap::new(),
            owner_wallet: "owner".to_string(),
            agent_wallet: None,
            status: AgentStatus::Published,
            donation_wallet: None,
            created_at: Utc::now(),
            interfaces: primary
                .map(|(kind, access_policy)| AgentInterface {
                    id: format!("if-{slug}"),
                    agent_id: format!("id-{slug}"),
                    kind,
                    url: "https://example.com".to_string(),
                    access_policy,
                    key_request_url: None,
                    is_primary: true,
                    display_name: None,
                    notes: None,
                })
                .into_iter()
                .collect(),
            tags: tags
                .iter()
                .map(|t| Tag {
                    id: format!("tag-{t}"),
                    slug: t.to_string(),
                    label: t.to_string(),
                    category: None,
                })
                .collect(),
        }
    }

    fn slugs(agents: &[&Agent]) -> Vec<String> {
        agents.iter().map(|a| a.slug.clone()).collect()
    }

    #[test]
    fn test_query_is_case_insensitive_over_name_and_summary() {
        let agents = vec![
            agent("starter", "Builds things", &[], None),
            agent("other", "A STARTER kit", &[], None),
            agent("third", "unrelated", &[], None),
        ];
        let opts = FilterOptions::new().with_query("  Starter ");
        assert_eq!(slugs(&filter_agents(&agents, &opts)), vec!["starter", "other"]);
    }

    #[test]
    fn test_blank_query_matches_everything() {
        let agents = vec![agent("a", "", &[], None), agent("b", "x", &["t"], None)];
        let opts = FilterOptions::new().with_query("   ");
        assert_eq!(filter_agents(&agents, &opts).len(), 2);
        assert!(opts.is_unconstrained());
    }

    #[test]
    fn test_tags_require_all() {
        let agents = vec![
            agent("both", "", &["a", "b"], None),
            agent("only-a", "", &["a"], None),
            agent("more", "", &["A", "b", "c"], None),
        ];
        let opts = FilterOptions::new().with_tag_tokens(["a", "B"]);
        assert_eq!(slugs(&filter_agents(&agents, &opts)), vec!["both", "more"]);
    }

    #[test]
    fn test_public_api_pseudo_tag() {
        let agents = vec![
            agent("public", "", &[], Some((InterfaceKind::Api, Some(AccessPolicy::Public)))),
            agent(
                "keyed",
                "",
                &[],
                Some((InterfaceKind::Api, Some(AccessPolicy::KeyRequired))),
            ),
            agent("web", "", &[], Some((InterfaceKind::WebUi, None))),
            agent("none", "", &[], None),
        ];
        let opts = FilterOptions::new().with_tag_tokens(["public-api"]);
        assert!(opts.required_tags.is_empty());
        assert_eq!(slugs(&filter_agents(&agents, &opts)), vec!["public"]);

        let opts = FilterOptions::new().with_tag_tokens(["API-KEY"]);
        assert_eq!(slugs(&filter_agents(&agents, &opts)), vec!["keyed"]);
    }

    #[test]
    fn test_both_pseudo_tags_match_nothing() {
        let agents = vec![
            agent("public", "", &[], Some((InterfaceKind::Api, Some(AccessPolicy::Public)))),
            agent(
                "keyed",
                "",
                &[],
                Some((InterfaceKind::Api, Some(AccessPolicy::KeyRequired))),
            ),
        ];
        let opts = FilterOptions::new().with_tag_tokens(["public-api", "api-key"]);
        assert!(filter_agents(&agents, &opts).is_empty());
    }

    #[test]
    fn test_interface_kind_constraint() {
        let agents = vec![
            agent("web", "", &[], Some((InterfaceKind::WebUi, None))),
            agent("api", "", &[], Some((InterfaceKind::Api, Some(AccessPolicy::Public)))),
            agent("none", "", &[], None),
        ];
        let opts = FilterOptions::new().with_interface_kind(InterfaceFilter::WebUi);
        assert_eq!(slugs(&filter_agents(&agents, &opts)), vec!["web"]);
    }

    #[test]
    fn test_access_constraint_requires_api_primary() {
        let agents = vec![
            agent("web", "", &[], Some((InterfaceKind::WebUi, Some(AccessPolicy::Public)))),
            agent("api", "", &[], Some((InterfaceKind::Api, Some(AccessPolicy::Public)))),
            agent("unset", "", &[], Some((InterfaceKind::Api, None))),
        ];
        let opts = FilterOptions::new().with_access(AccessFilter::Public);
        assert_eq!(slugs(&filter_agents(&agents, &opts)), vec!["api"]);
    }

    #[test]
    fn test_tag_and_interface_scenario() {
        let a = agent("a", "", &["x", "y"], Some((InterfaceKind::WebUi, None)));
        let b = agent("b", "", &["x"], Some((InterfaceKind::Api, Some(AccessPolicy::Public))));
        let agents = vec![a, b];
        let opts = FilterOptions::new()
            .with_tag_tokens(["x"])
            .with_interface_kind(InterfaceFilter::Api);
        assert_eq!(slugs(&filter_agents(&agents, &opts)), vec!["b"]);
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("API".parse::<InterfaceFilter>().unwrap(), InterfaceFilter::Api);
        assert_eq!("".parse::<InterfaceFilter>().unwrap(), InterfaceFilter::Any);
        assert!("desktop".parse::<InterfaceFilter>().is_err());
        assert_eq!(
            "key_required".parse::<AccessFilter>().unwrap(),
            AccessFilter::KeyRequired
        );
        assert!("private".parse::<AccessFilter>().is_err());
    }

    #[test]
    fn test_retain_matching_owns_result() {
        let agents = vec![agent("a", "", &["t"], None), agent("b", "", &[], None)];
        let opts = FilterOptions::new().with_tag_tokens(["t"]);
        let kept = retain_matching(agents, &opts);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].slug, "a");
    }

    #[test]
    fn test_tag_tokens_are_trimmed_and_lowercased() {
        let agents = vec![
            agent("a", "", &["data"], None),
            agent("b", "", &["research"], None),
        ];
        let opts = FilterOptions::new().with_tag_tokens([" Data ", "", "  "]);
        assert_eq!(opts.required_tags, BTreeSet::from(["data".to_string()]));
        assert_eq!(slugs(&filter_agents(&agents, &opts)), vec!["a"]);

        let pseudo = FilterOptions::new().with_tag_tokens([" Public-API"]);
        assert!(pseudo.require_public_api);
        assert!(pseudo.required_tags.is_empty());
    }
}

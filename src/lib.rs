//! Agent Registry
//!
//! A catalog service for discovering and publishing AI agent listings.
//! Listings are published by submitting a canonical message signed with the
//! owner's ed25519 wallet; anyone can browse them by tag, interface kind and
//! access policy.
//!
//! # Overview
//!
//! - [`signing`]: canonical message encoding, signature verification, wallet signing
//! - [`filter`]: the pure agent filter predicate
//! - [`store`]: SQLite, hosted REST and static seed backends
//! - [`catalog`] and [`submission`]: the read and write services
//! - [`server`]: the warp HTTP surface
//!
//! # Quick Start
//!
//! ```rust
//! use agent_registry::filter::{filter_agents, FilterOptions};
//! use agent_registry::signing::{AgentSubmission, CanonicalMessage, MessageVersion};
//! use agent_registry::store::seed::seed_agents;
//!
//! // Filter the seed catalog down to public APIs tagged "data"
//! let agents = seed_agents();
//! let opts = FilterOptions::new().with_tag_tokens(["data", "public-api"]);
//! let matched = filter_agents(&agents, &opts);
//! assert_eq!(matched.len(), 1);
//!
//! // Encode a submission for signing
//! let submission = AgentSubmission {
//!     slug: "my-agent".to_string(),
//!     nonce: "n-1".to_string(),
//!     ..Default::default()
//! };
//! let message = CanonicalMessage::encode(&submission, MessageVersion::V1);
//! assert!(message.as_str().starts_with("v1\n"));
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod model;
pub mod observability;
pub mod rate_limit;
pub mod server;
pub mod signing;
pub mod store;
pub mod submission;
pub mod validate;

pub use catalog::{CatalogService, ListQuery, MatchMode, Page};
pub use config::{ConfigError, DataMode, RegistryConfig};
pub use error::{RegistryError, RegistryResult};
pub use model::{Agent, AgentInterface, AgentStatus, AccessPolicy, InterfaceKind, Tag};
pub use server::{serve, AppState};
pub use store::{open_store, AgentStore, LookupKey};
pub use submission::{SignedSubmission, SubmissionService};

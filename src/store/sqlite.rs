//! Embedded SQLite catalog
//!
//! The connection is opened and seeded once, then shared behind a mutex.
//! Queries run on the blocking pool via `spawn_blocking`.

use super::seed::{seed_agents, seed_tags};
use super::{slug_candidates, AgentStore, LookupKey};
use crate::error::{RegistryError, RegistryResult};
use crate::model::{
    Agent, AgentInterface, AgentRef, AgentStatus, CreateAgentInput, CreatedAgent, InterfaceInput,
    Tag, UpdateAgentInput,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    summary TEXT NOT NULL,
    thumbnail_url TEXT,
    website_url TEXT,
    socials TEXT NOT NULL DEFAULT '{}',
    owner_wallet TEXT NOT NULL,
    agent_wallet TEXT,
    status TEXT NOT NULL DEFAULT 'published',
    donation_wallet TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_agents_agent_wallet ON agents(agent_wallet);

CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    label TEXT NOT NULL,
    category TEXT
);

CREATE TABLE IF NOT EXISTS agent_tags (
    agent_id TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
    tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (agent_id, tag_id)
);

CREATE TABLE IF NOT EXISTS agent_interfaces (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
    kind TEXT NOT NULL CHECK (kind IN ('api', 'web_ui')),
    url TEXT NOT NULL,
    access_policy TEXT CHECK (access_policy IN ('public', 'key_required')),
    key_request_url TEXT,
    is_primary INTEGER NOT NULL DEFAULT 0,
    display_name TEXT,
    notes TEXT,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS ux_interfaces_primary
    ON agent_interfaces(agent_id) WHERE is_primary;
"#;

const AGENT_COLUMNS: &str = "id, slug, name, summary, thumbnail_url, website_url, socials, \
     owner_wallet, agent_wallet, status, donation_wallet, created_at";

/// SQLite-backed catalog store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, in memory when `None`, and seed it if empty
    pub fn open(path: Option<&Path>) -> RegistryResult<Self> {
        let conn = match path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch(SCHEMA_SQL)?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.seed_if_empty()?;
        Ok(store)
    }

    fn seed_if_empty(&self) -> RegistryResult<()> {
        let mut conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM agents", [], |row| row.get(0))?;
        if count > 0 {
            debug!(agents = count, "Database already populated, skipping seed");
            return Ok(());
        }

        let tx = conn.transaction()?;
        for tag in seed_tags() {
            tx.execute(
                "INSERT OR IGNORE INTO tags (id, slug, label, category) VALUES (?1, ?2, ?3, ?4)",
                params![tag.id, tag.slug, tag.label, tag.category],
            )?;
        }
        let agents = seed_agents();
        for agent in &agents {
            insert_seed_agent(&tx, agent)?;
        }
        tx.commit()?;

        info!(agents = agents.len(), "Seeded empty catalog database");
        Ok(())
    }

    fn lock(&self) -> RegistryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RegistryError::internal("database connection lock poisoned"))
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<F, T>(&self, f: F) -> RegistryResult<T>
    where
        F: FnOnce(&mut Connection) -> RegistryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let span = crate::store_span!(backend = "sqlite");
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let mut guard = conn
                .lock()
                .map_err(|_| RegistryError::internal("database connection lock poisoned"))?;
            f(&mut guard)
        })
        .await?
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    let socials: String = row.get(6)?;
    let socials: BTreeMap<String, String> =
        serde_json::from_str(&socials).map_err(|e| conversion_error(6, e.to_string()))?;
    let status: String = row.get(9)?;
    let status: AgentStatus = status.parse().map_err(|e| conversion_error(9, e))?;
    let created_at: String = row.get(11)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| conversion_error(11, e.to_string()))?
        .with_timezone(&Utc);

    Ok(Agent {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        summary: row.get(3)?,
        thumbnail_url: row.get(4)?,
        website_url: row.get(5)?,
        socials,
        owner_wallet: row.get(7)?,
        agent_wallet: row.get(8)?,
        status,
        donation_wallet: row.get(10)?,
        created_at,
        interfaces: Vec::new(),
        tags: Vec::new(),
    })
}

fn interface_from_row(row: &Row<'_>) -> rusqlite::Result<AgentInterface> {
    let kind: String = row.get(2)?;
    let access: Option<String> = row.get(4)?;
    Ok(AgentInterface {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        kind: kind.parse().map_err(|e| conversion_error(2, e))?,
        url: row.get(3)?,
        access_policy: access
            .map(|a| a.parse())
            .transpose()
            .map_err(|e| conversion_error(4, e))?,
        key_request_url: row.get(5)?,
        is_primary: row.get(6)?,
        display_name: row.get(7)?,
        notes: row.get(8)?,
    })
}

/// Fill in interfaces (primary first) and tags (by label)
fn load_relations(conn: &Connection, agent: &mut Agent) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, agent_id, kind, url, access_policy, key_request_url, is_primary, display_name, notes \
         FROM agent_interfaces WHERE agent_id = ?1 ORDER BY is_primary DESC, rowid",
    )?;
    agent.interfaces = stmt
        .query_map(params![agent.id], interface_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT t.id, t.slug, t.label, t.category FROM agent_tags at \
         JOIN tags t ON t.id = at.tag_id WHERE at.agent_id = ?1 ORDER BY t.label",
    )?;
    agent.tags = stmt
        .query_map(params![agent.id], |row| {
            Ok(Tag {
                id: row.get(0)?,
                slug: row.get(1)?,
                label: row.get(2)?,
                category: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(())
}

fn select_agent(conn: &Connection, column: &str, value: &str) -> rusqlite::Result<Option<Agent>> {
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE {column} = ?1 LIMIT 1");
    let agent = conn
        .query_row(&sql, params![value], agent_from_row)
        .optional()?;
    match agent {
        Some(mut agent) => {
            load_relations(conn, &mut agent)?;
            Ok(Some(agent))
        }
        None => Ok(None),
    }
}

fn insert_interface(
    tx: &Transaction<'_>,
    agent_id: &str,
    input: &InterfaceInput,
    primary: bool,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO agent_interfaces \
         (id, agent_id, kind, url, access_policy, key_request_url, is_primary, display_name, notes, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            Uuid::new_v4().to_string(),
            agent_id,
            input.kind.as_str(),
            input.url,
            input.access_policy.map(|a| a.as_str()),
            input.key_request_url,
            primary,
            input.display_name,
            input.notes,
            now_timestamp(),
        ],
    )?;
    Ok(())
}

/// Link tags by slug; slugs with no matching tag are skipped
fn link_tags(tx: &Transaction<'_>, agent_id: &str, slugs: &[String]) -> rusqlite::Result<usize> {
    let mut linked = 0;
    for slug in slugs {
        let tag_id: Option<String> = tx
            .query_row("SELECT id FROM tags WHERE slug = ?1", params![slug], |row| row.get(0))
            .optional()?;
        if let Some(tag_id) = tag_id {
            linked += tx.execute(
                "INSERT OR IGNORE INTO agent_tags (agent_id, tag_id) VALUES (?1, ?2)",
                params![agent_id, tag_id],
            )?;
        }
    }
    Ok(linked)
}

fn insert_seed_agent(tx: &Transaction<'_>, agent: &Agent) -> RegistryResult<()> {
    let created_at = agent.created_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    tx.execute(
        "INSERT OR IGNORE INTO agents \
         (id, slug, name, summary, thumbnail_url, website_url, socials, owner_wallet, agent_wallet, \
          status, donation_wallet, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        params![
            agent.id,
            agent.slug,
            agent.name,
            agent.summary,
            agent.thumbnail_url,
            agent.website_url,
            serde_json::to_string(&agent.socials)
                .map_err(|e| RegistryError::internal(e.to_string()))?,
            agent.owner_wallet,
            agent.agent_wallet,
            agent.status.as_str(),
            agent.donation_wallet,
            created_at,
        ],
    )?;
    for iface in &agent.interfaces {
        tx.execute(
            "INSERT OR IGNORE INTO agent_interfaces \
             (id, agent_id, kind, url, access_policy, key_request_url, is_primary, display_name, notes, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                iface.id,
                agent.id,
                iface.kind.as_str(),
                iface.url,
                iface.access_policy.map(|a| a.as_str()),
                iface.key_request_url,
                iface.is_primary,
                iface.display_name,
                iface.notes,
                created_at,
            ],
        )?;
    }
    for tag in &agent.tags {
        tx.execute(
            "INSERT OR IGNORE INTO agent_tags (agent_id, tag_id) VALUES (?1, ?2)",
            params![agent.id, tag.id],
        )?;
    }
    Ok(())
}

fn create_in_tx(conn: &mut Connection, input: CreateAgentInput) -> RegistryResult<CreatedAgent> {
    let base = input.slug.trim().to_string();
    if base.is_empty() {
        return Err(RegistryError::invalid_input("Slug required"));
    }

    let tx = conn.transaction()?;
    let mut slug = base.clone();
    for candidate in slug_candidates(&base) {
        let taken: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM agents WHERE slug = ?1 LIMIT 1",
                params![candidate],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_none() {
            slug = candidate;
            break;
        }
    }

    let id = Uuid::new_v4().to_string();
    let now = now_timestamp();
    let socials = serde_json::to_string(&input.socials)
        .map_err(|e| RegistryError::invalid_input(e.to_string()))?;
    tx.execute(
        "INSERT INTO agents \
         (id, slug, name, summary, thumbnail_url, website_url, socials, owner_wallet, agent_wallet, \
          status, donation_wallet, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        params![
            id,
            slug,
            input.name,
            input.summary,
            input.thumbnail_url,
            input.website_url,
            socials,
            input.owner_wallet,
            input.agent_wallet,
            input.status.unwrap_or_default().as_str(),
            input.donation_wallet,
            now,
        ],
    )?;

    insert_interface(&tx, &id, &input.primary_interface, true)?;
    for secondary in &input.secondary_interfaces {
        insert_interface(&tx, &id, secondary, false)?;
    }
    link_tags(&tx, &id, &input.tag_slugs)?;
    tx.commit()?;

    Ok(CreatedAgent { id, slug })
}

fn update_in_tx(conn: &mut Connection, target: &AgentRef, input: UpdateAgentInput) -> RegistryResult<()> {
    let tx = conn.transaction()?;
    let id: Option<String> = match target {
        AgentRef::Id(id) => tx
            .query_row("SELECT id FROM agents WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?,
        AgentRef::Slug(slug) => tx
            .query_row("SELECT id FROM agents WHERE slug = ?1", params![slug], |row| row.get(0))
            .optional()?,
    };
    let id = id.ok_or_else(|| RegistryError::not_found("Agent not found"))?;

    let socials = input
        .socials
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RegistryError::invalid_input(e.to_string()))?;
    tx.execute(
        "UPDATE agents SET \
           name = COALESCE(?2, name), \
           summary = COALESCE(?3, summary), \
           thumbnail_url = COALESCE(?4, thumbnail_url), \
           website_url = COALESCE(?5, website_url), \
           socials = COALESCE(?6, socials), \
           status = COALESCE(?7, status), \
           updated_at = ?8, \
           donation_wallet = COALESCE(?9, donation_wallet) \
         WHERE id = ?1",
        params![
            id,
            input.name,
            input.summary,
            input.thumbnail_url,
            input.website_url,
            socials,
            input.status.map(|s| s.as_str()),
            now_timestamp(),
            input.donation_wallet,
        ],
    )?;

    if let Some(primary) = &input.primary_interface {
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM agent_interfaces WHERE agent_id = ?1 AND is_primary",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(iface_id) => {
                tx.execute(
                    "UPDATE agent_interfaces SET kind = ?2, url = ?3, access_policy = ?4, key_request_url = ?5 \
                     WHERE id = ?1",
                    params![
                        iface_id,
                        primary.kind.as_str(),
                        primary.url,
                        primary.access_policy.map(|a| a.as_str()),
                        primary.key_request_url,
                    ],
                )?;
            }
            None => insert_interface(&tx, &id, primary, true)?,
        }
    }

    if let Some(secondaries) = &input.secondary_interfaces {
        tx.execute(
            "DELETE FROM agent_interfaces WHERE agent_id = ?1 AND NOT is_primary",
            params![id],
        )?;
        for secondary in secondaries {
            insert_interface(&tx, &id, secondary, false)?;
        }
    }

    if let Some(tag_slugs) = &input.tag_slugs {
        tx.execute("DELETE FROM agent_tags WHERE agent_id = ?1", params![id])?;
        link_tags(&tx, &id, tag_slugs)?;
    }

    tx.commit()?;
    Ok(())
}

#[async_trait]
impl AgentStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn list_agents(&self) -> RegistryResult<Vec<Agent>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {AGENT_COLUMNS} FROM agents WHERE status = 'published' \
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut agents = stmt
                .query_map([], agent_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for agent in &mut agents {
                load_relations(conn, agent)?;
            }
            Ok(agents)
        })
        .await
    }

    async fn get_agent(&self, id: &str) -> RegistryResult<Option<Agent>> {
        let id = id.to_string();
        self.with_conn(move |conn| Ok(select_agent(conn, "id", &id)?))
            .await
    }

    async fn find_agent(&self, key: &LookupKey) -> RegistryResult<Option<Agent>> {
        let key = key.clone();
        self.with_conn(move |conn| Ok(select_agent(conn, key.kind(), key.value())?))
            .await
    }

    async fn list_tags(&self) -> RegistryResult<Vec<Tag>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, slug, label, category FROM tags ORDER BY label ASC")?;
            let tags = stmt
                .query_map([], |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        slug: row.get(1)?,
                        label: row.get(2)?,
                        category: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tags)
        })
        .await
    }

    async fn create_agent(&self, input: CreateAgentInput) -> RegistryResult<CreatedAgent> {
        let created = self.with_conn(move |conn| create_in_tx(conn, input)).await?;
        info!(id = %created.id, slug = %created.slug, "Created agent");
        Ok(created)
    }

    async fn update_agent(&self, target: &AgentRef, input: UpdateAgentInput) -> RegistryResult<()> {
        let target_owned = target.clone();
        self.with_conn(move |conn| update_in_tx(conn, &target_owned, input))
            .await?;
        info!(agent = %target, "Updated agent");
        Ok(())
    }
}

//! PostgreSQL glossary store
//!
//! Each engine action runs in one transaction. Terminal and non-terminal
//! proposal transitions are `UPDATE ... WHERE status = expected AND
//! revision = expected`, term
//! content updates are `UPDATE ... WHERE version = expected`; a zero row
//! count rolls the whole transaction back.

use crate::config::DatabaseConfig;
use crate::proposal::{AuditEvent, Proposal, ProposalKind, ProposalStatus};
use crate::store::{CommitOutcome, GlossaryStore, StoreError, StoreResult, TermWrite, Transition};
use crate::term::{ContentField, Term, TermContent, TermFilter, VersionEntry};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::Json;
use tokio_postgres::{Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

const TERM_NAME_INDEX: &str = "idx_terms_name_lower";

const TERM_COLUMNS: &str = "id, name, category, definition, why_exists, used_when, not_used_when, \
     examples_good, examples_bad, synonyms, status, visibility, owner, version, created_at, updated_at";

const PROPOSAL_COLUMNS: &str = "id, kind, term_id, base_version, content, changes_summary, status, \
     submitted_by, submitted_at, updated_at, revision, review_comment, reviewed_by, reviewed_at";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS terms (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        definition TEXT NOT NULL,
        why_exists TEXT,
        used_when TEXT,
        not_used_when TEXT,
        examples_good JSONB NOT NULL DEFAULT '[]',
        examples_bad JSONB NOT NULL DEFAULT '[]',
        synonyms JSONB NOT NULL DEFAULT '[]',
        status TEXT NOT NULL,
        visibility TEXT NOT NULL,
        owner TEXT,
        version INTEGER NOT NULL CHECK (version > 0),
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_terms_name_lower ON terms (lower(name))",
    "CREATE INDEX IF NOT EXISTS idx_terms_category ON terms (lower(category))",
    "CREATE TABLE IF NOT EXISTS term_versions (
        term_id UUID NOT NULL REFERENCES terms(id),
        version_number INTEGER NOT NULL CHECK (version_number > 0),
        snapshot JSONB NOT NULL,
        change_note TEXT,
        changed_by TEXT NOT NULL,
        changed_at TIMESTAMPTZ NOT NULL,
        checksum TEXT NOT NULL,
        PRIMARY KEY (term_id, version_number)
    )",
    "CREATE TABLE IF NOT EXISTS proposals (
        id UUID PRIMARY KEY,
        kind TEXT NOT NULL,
        term_id UUID REFERENCES terms(id),
        base_version INTEGER,
        content JSONB NOT NULL,
        changes_summary TEXT,
        status TEXT NOT NULL,
        submitted_by TEXT NOT NULL,
        submitted_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        revision BIGINT NOT NULL DEFAULT 1 CHECK (revision > 0),
        review_comment TEXT,
        reviewed_by TEXT,
        reviewed_at TIMESTAMPTZ,
        CHECK ((kind = 'edit') = (term_id IS NOT NULL))
    )",
    "ALTER TABLE proposals ADD COLUMN IF NOT EXISTS revision BIGINT NOT NULL DEFAULT 1",
    "CREATE INDEX IF NOT EXISTS idx_proposals_status ON proposals (status)",
    "CREATE TABLE IF NOT EXISTS proposal_events (
        seq BIGSERIAL PRIMARY KEY,
        id UUID NOT NULL UNIQUE,
        proposal_id UUID NOT NULL REFERENCES proposals(id) ON DELETE CASCADE,
        event_type TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        comment TEXT,
        edited_fields JSONB NOT NULL DEFAULT '[]',
        occurred_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_proposal_events_proposal ON proposal_events (proposal_id, occurred_at, seq)",
];

/// Store backed by a PostgreSQL connection pool
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool from settings and verify it with a round trip
    pub async fn connect(settings: &DatabaseConfig) -> anyhow::Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(settings.host.clone());
        cfg.port = Some(settings.port);
        cfg.user = Some(settings.user.clone());
        cfg.password = Some(settings.password.clone());
        cfg.dbname = Some(settings.database.clone());
        cfg.pool = Some(PoolConfig::new(settings.max_pool_size));
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = if settings.require_tls {
            let certs = rustls_native_certs::load_native_certs();
            let mut root_store = rustls::RootCertStore::empty();
            for cert in certs.certs {
                root_store.add(cert).ok();
            }

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
            cfg.create_pool(Some(Runtime::Tokio1), tls)
                .map_err(|e| anyhow::anyhow!("Failed to create TLS pool: {}", e))?
        } else {
            cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
                .map_err(|e| anyhow::anyhow!("Failed to create pool: {}", e))?
        };

        let client = pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get pool connection: {}", e))?;
        client
            .query_one("SELECT 1 as ok", &[])
            .await
            .map_err(|e| anyhow::anyhow!("Failed to verify database connection: {}", e))?;

        info!("✅ Database connection successful (TLS: {})", settings.require_tls);
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they don't exist
    pub async fn init_schema(&self) -> StoreResult<()> {
        let client = self.pool.get().await?;
        for statement in SCHEMA {
            client.execute(*statement, &[]).await?;
        }
        info!("✅ Glossary tables initialized");
        Ok(())
    }
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{}: {}", what, err))
}

fn is_name_conflict(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
        && err.as_db_error().and_then(|db| db.constraint()) == Some(TERM_NAME_INDEX)
}

fn term_from_row(row: &Row) -> StoreResult<Term> {
    let Json(examples_good): Json<Vec<String>> = row.try_get("examples_good")?;
    let Json(examples_bad): Json<Vec<String>> = row.try_get("examples_bad")?;
    let Json(synonyms): Json<Vec<String>> = row.try_get("synonyms")?;
    let status: String = row.try_get("status")?;
    let visibility: String = row.try_get("visibility")?;

    Ok(Term {
        id: row.try_get("id")?,
        content: TermContent {
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            definition: row.try_get("definition")?,
            why_exists: row.try_get("why_exists")?,
            used_when: row.try_get("used_when")?,
            not_used_when: row.try_get("not_used_when")?,
            examples_good,
            examples_bad,
            synonyms,
        },
        status: status.parse().map_err(|e| corrupt("terms.status", e))?,
        visibility: visibility.parse().map_err(|e| corrupt("terms.visibility", e))?,
        owner: row.try_get("owner")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &Row) -> StoreResult<VersionEntry> {
    let Json(snapshot): Json<TermContent> = row.try_get("snapshot")?;
    Ok(VersionEntry {
        term_id: row.try_get("term_id")?,
        version_number: row.try_get("version_number")?,
        snapshot,
        change_note: row.try_get("change_note")?,
        changed_by: row.try_get("changed_by")?,
        changed_at: row.try_get("changed_at")?,
        checksum: row.try_get("checksum")?,
    })
}

fn proposal_from_row(row: &Row) -> StoreResult<Proposal> {
    let kind: String = row.try_get("kind")?;
    let term_id: Option<Uuid> = row.try_get("term_id")?;
    let base_version: Option<i32> = row.try_get("base_version")?;
    let kind = match (kind.as_str(), term_id) {
        ("new", None) => ProposalKind::New,
        ("edit", Some(term_id)) => ProposalKind::Edit {
            term_id,
            base_version: base_version.unwrap_or(1),
        },
        (other, _) => return Err(corrupt("proposals.kind", other)),
    };
    let Json(content): Json<TermContent> = row.try_get("content")?;
    let status: String = row.try_get("status")?;

    Ok(Proposal {
        id: row.try_get("id")?,
        kind,
        content,
        changes_summary: row.try_get("changes_summary")?,
        status: status.parse().map_err(|e| corrupt("proposals.status", e))?,
        submitted_by: row.try_get("submitted_by")?,
        submitted_at: row.try_get("submitted_at")?,
        updated_at: row.try_get("updated_at")?,
        revision: row.try_get("revision")?,
        review_comment: row.try_get("review_comment")?,
        reviewed_by: row.try_get("reviewed_by")?,
        reviewed_at: row.try_get("reviewed_at")?,
    })
}

fn event_from_row(row: &Row) -> StoreResult<AuditEvent> {
    let event_type: String = row.try_get("event_type")?;
    let Json(edited_fields): Json<Vec<ContentField>> = row.try_get("edited_fields")?;
    Ok(AuditEvent {
        id: row.try_get("id")?,
        proposal_id: row.try_get("proposal_id")?,
        event_type: event_type.parse().map_err(|e| corrupt("proposal_events.event_type", e))?,
        actor_id: row.try_get("actor_id")?,
        comment: row.try_get("comment")?,
        edited_fields,
        timestamp: row.try_get("occurred_at")?,
    })
}

async fn insert_entry(client: &Transaction<'_>, entry: &VersionEntry) -> StoreResult<()> {
    client
        .execute(
            "INSERT INTO term_versions
                (term_id, version_number, snapshot, change_note, changed_by, changed_at, checksum)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &entry.term_id,
                &entry.version_number,
                &Json(&entry.snapshot),
                &entry.change_note,
                &entry.changed_by,
                &entry.changed_at,
                &entry.checksum,
            ],
        )
        .await?;
    Ok(())
}

async fn insert_event(client: &Transaction<'_>, event: &AuditEvent) -> StoreResult<()> {
    client
        .execute(
            "INSERT INTO proposal_events
                (id, proposal_id, event_type, actor_id, comment, edited_fields, occurred_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &event.id,
                &event.proposal_id,
                &event.event_type.as_str(),
                &event.actor_id,
                &event.comment,
                &Json(&event.edited_fields),
                &event.timestamp,
            ],
        )
        .await?;
    Ok(())
}

/// Apply a term write inside an open transaction.
///
/// Returns `Some(outcome)` when the write is refused; the caller must then
/// drop the transaction without committing.
async fn apply_term_write(client: &Transaction<'_>, write: &TermWrite) -> StoreResult<Option<CommitOutcome>> {
    match write {
        TermWrite::Create { term, entry } => {
            let c = &term.content;
            let inserted = client
                .execute(
                    "INSERT INTO terms
                        (id, name, category, definition, why_exists, used_when, not_used_when,
                         examples_good, examples_bad, synonyms, status, visibility, owner,
                         version, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
                    &[
                        &term.id,
                        &c.name,
                        &c.category,
                        &c.definition,
                        &c.why_exists,
                        &c.used_when,
                        &c.not_used_when,
                        &Json(&c.examples_good),
                        &Json(&c.examples_bad),
                        &Json(&c.synonyms),
                        &term.status.as_str(),
                        &term.visibility.as_str(),
                        &term.owner,
                        &term.version,
                        &term.created_at,
                        &term.updated_at,
                    ],
                )
                .await;
            match inserted {
                Ok(_) => {}
                Err(e) if is_name_conflict(&e) => return Ok(Some(CommitOutcome::DuplicateName(c.name.clone()))),
                Err(e) => return Err(e.into()),
            }
            insert_entry(client, entry).await?;
        }
        TermWrite::Update { term, expected_version, entry } => {
            let c = &term.content;
            let updated = client
                .execute(
                    "UPDATE terms SET
                        name = $3, category = $4, definition = $5, why_exists = $6,
                        used_when = $7, not_used_when = $8, examples_good = $9,
                        examples_bad = $10, synonyms = $11, version = $12, updated_at = $13
                     WHERE id = $1 AND version = $2",
                    &[
                        &term.id,
                        expected_version,
                        &c.name,
                        &c.category,
                        &c.definition,
                        &c.why_exists,
                        &c.used_when,
                        &c.not_used_when,
                        &Json(&c.examples_good),
                        &Json(&c.examples_bad),
                        &Json(&c.synonyms),
                        &term.version,
                        &term.updated_at,
                    ],
                )
                .await;
            let rows = match updated {
                Ok(rows) => rows,
                Err(e) if is_name_conflict(&e) => return Ok(Some(CommitOutcome::DuplicateName(c.name.clone()))),
                Err(e) => return Err(e.into()),
            };
            if rows == 0 {
                let current = client
                    .query_opt("SELECT version FROM terms WHERE id = $1", &[&term.id])
                    .await?;
                return Ok(Some(match current {
                    Some(row) => CommitOutcome::TermVersionMismatch { current: row.try_get(0)? },
                    None => CommitOutcome::TermMissing,
                }));
            }
            insert_entry(client, entry).await?;
        }
        TermWrite::Metadata { term } => {
            let rows = client
                .execute(
                    "UPDATE terms SET status = $2, visibility = $3, owner = $4, updated_at = $5 WHERE id = $1",
                    &[
                        &term.id,
                        &term.status.as_str(),
                        &term.visibility.as_str(),
                        &term.owner,
                        &term.updated_at,
                    ],
                )
                .await?;
            if rows == 0 {
                return Ok(Some(CommitOutcome::TermMissing));
            }
        }
    }
    Ok(None)
}

#[async_trait]
impl GlossaryStore for PgStore {
    async fn get_term(&self, id: Uuid) -> StoreResult<Option<Term>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {} FROM terms WHERE id = $1", TERM_COLUMNS);
        client.query_opt(sql.as_str(), &[&id]).await?.as_ref().map(term_from_row).transpose()
    }

    async fn find_term_by_name(&self, name: &str) -> StoreResult<Option<Term>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {} FROM terms WHERE lower(name) = lower($1)", TERM_COLUMNS);
        client.query_opt(sql.as_str(), &[&name]).await?.as_ref().map(term_from_row).transpose()
    }

    async fn list_terms(&self, filter: &TermFilter) -> StoreResult<Vec<Term>> {
        let client = self.pool.get().await?;
        // The query narrows candidates; the filter itself has the final say
        let sql = format!(
            "SELECT {} FROM terms
             WHERE ($1::text IS NULL OR lower(category) = lower($1))
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR visibility = $3)
               AND ($4::text IS NULL
                    OR name ILIKE '%' || $4 || '%'
                    OR definition ILIKE '%' || $4 || '%'
                    OR synonyms::text ILIKE '%' || $4 || '%')
             ORDER BY lower(name)",
            TERM_COLUMNS
        );
        let query = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
        let rows = client
            .query(
                sql.as_str(),
                &[
                    &filter.category,
                    &filter.status.map(|s| s.as_str()),
                    &filter.visibility.map(|v| v.as_str()),
                    &query,
                ],
            )
            .await?;

        let mut terms = Vec::with_capacity(rows.len());
        for row in &rows {
            let term = term_from_row(row)?;
            if filter.matches(&term) {
                terms.push(term);
            }
        }
        Ok(terms)
    }

    async fn write_term(&self, write: TermWrite) -> StoreResult<CommitOutcome> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        if let Some(outcome) = apply_term_write(&*tx, &write).await? {
            return Ok(outcome);
        }
        tx.commit().await?;
        debug!("Wrote term {} at v{}", write.term().id, write.term().version);
        Ok(CommitOutcome::Committed)
    }

    async fn term_history(&self, term_id: Uuid) -> StoreResult<Vec<VersionEntry>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT term_id, version_number, snapshot, change_note, changed_by, changed_at, checksum
                 FROM term_versions WHERE term_id = $1 ORDER BY version_number",
                &[&term_id],
            )
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn term_version(&self, term_id: Uuid, version: i32) -> StoreResult<Option<VersionEntry>> {
        let client = self.pool.get().await?;
        client
            .query_opt(
                "SELECT term_id, version_number, snapshot, change_note, changed_by, changed_at, checksum
                 FROM term_versions WHERE term_id = $1 AND version_number = $2",
                &[&term_id, &version],
            )
            .await?
            .as_ref()
            .map(entry_from_row)
            .transpose()
    }

    async fn insert_proposal(&self, proposal: &Proposal, event: &AuditEvent) -> StoreResult<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let base_version = match proposal.kind {
            ProposalKind::New => None,
            ProposalKind::Edit { base_version, .. } => Some(base_version),
        };
        tx.execute(
            "INSERT INTO proposals
                (id, kind, term_id, base_version, content, changes_summary, status,
                 submitted_by, submitted_at, updated_at, revision, review_comment, reviewed_by, reviewed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            &[
                &proposal.id,
                &proposal.kind.as_str(),
                &proposal.kind.term_id(),
                &base_version,
                &Json(&proposal.content),
                &proposal.changes_summary,
                &proposal.status.as_str(),
                &proposal.submitted_by,
                &proposal.submitted_at,
                &proposal.updated_at,
                &proposal.revision,
                &proposal.review_comment,
                &proposal.reviewed_by,
                &proposal.reviewed_at,
            ],
        )
        .await?;
        insert_event(&*tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_proposal(&self, id: Uuid) -> StoreResult<Option<Proposal>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {} FROM proposals WHERE id = $1", PROPOSAL_COLUMNS);
        client.query_opt(sql.as_str(), &[&id]).await?.as_ref().map(proposal_from_row).transpose()
    }

    async fn list_proposals(&self, status: Option<ProposalStatus>) -> StoreResult<Vec<Proposal>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {} FROM proposals WHERE ($1::text IS NULL OR status = $1) ORDER BY submitted_at DESC",
            PROPOSAL_COLUMNS
        );
        let rows = client.query(sql.as_str(), &[&status.map(|s| s.as_str())]).await?;
        rows.iter().map(proposal_from_row).collect()
    }

    async fn delete_proposal(&self, id: Uuid) -> StoreResult<bool> {
        let client = self.pool.get().await?;
        let rows = client.execute("DELETE FROM proposals WHERE id = $1", &[&id]).await?;
        Ok(rows > 0)
    }

    async fn commit_transition(&self, transition: Transition) -> StoreResult<CommitOutcome> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let proposal = &transition.proposal;

        let rows = tx
            .execute(
                "UPDATE proposals SET
                    content = $4, changes_summary = $5, status = $6, updated_at = $7,
                    review_comment = $8, reviewed_by = $9, reviewed_at = $10, revision = $11
                 WHERE id = $1 AND status = $2 AND revision = $3",
                &[
                    &proposal.id,
                    &transition.expected_status.as_str(),
                    &transition.expected_revision,
                    &Json(&proposal.content),
                    &proposal.changes_summary,
                    &proposal.status.as_str(),
                    &proposal.updated_at,
                    &proposal.review_comment,
                    &proposal.reviewed_by,
                    &proposal.reviewed_at,
                    &proposal.revision,
                ],
            )
            .await?;
        if rows == 0 {
            let current = tx
                .query_opt("SELECT status, revision FROM proposals WHERE id = $1", &[&proposal.id])
                .await?;
            let Some(row) = current else {
                return Ok(CommitOutcome::ProposalMissing);
            };
            let status: String = row.try_get(0)?;
            let status = status.parse().map_err(|e| corrupt("proposals.status", e))?;
            let revision: i64 = row.try_get(1)?;
            // The row matched neither guard, so this always yields a refusal
            return Ok(transition
                .refused_by(status, revision)
                .unwrap_or(CommitOutcome::RevisionMismatch { current: revision }));
        }

        if let Some(write) = &transition.term_write {
            if let Some(outcome) = apply_term_write(&*tx, write).await? {
                return Ok(outcome);
            }
        }
        insert_event(&*tx, &transition.event).await?;
        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    async fn audit_events(&self, proposal_id: Uuid) -> StoreResult<Vec<AuditEvent>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, proposal_id, event_type, actor_id, comment, edited_fields, occurred_at
                 FROM proposal_events WHERE proposal_id = $1 ORDER BY occurred_at, seq",
                &[&proposal_id],
            )
            .await?;
        rows.iter().map(event_from_row).collect()
    }
}

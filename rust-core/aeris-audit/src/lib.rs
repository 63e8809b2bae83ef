// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
//! Append-only audit trail for privileged state changes.
//!
//! Every role change and request rejection is recorded here as a side
//! effect of the triggering operation. The log is deliberately best-effort
//! on the write side: the authorization decision has already taken effect
//! by the time the entry is written, so a persistence failure is logged as
//! a warning and swallowed rather than surfaced to the caller
//! ([`AuditStore::record_best_effort`]).
//!
//! Entries are write-once. There is no update or delete path, and the read
//! side returns newest-first with a hard page cap.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Audit entries keyed by monotonic id, serialised as JSON.
const ENTRIES: TableDefinition<u64, &[u8]> = TableDefinition::new("audit_entries");

/// Single counter row holding the next entry id.
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

const COUNTER_ENTRIES: &str = "entries";

/// Hard cap on a single listing, regardless of the requested limit.
pub const MAX_PAGE_SIZE: usize = 200;

/// Errors from the audit store. Callers on the write path normally go
/// through [`AuditStore::record_best_effort`] and never see these.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit backend error: {0}")]
    Backend(String),

    #[error("corrupted audit entry: {0}")]
    Corrupted(String),
}

/// Enumerated action tags. Serialised as the stable SCREAMING_SNAKE strings
/// consumers match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    UserRoleUpdated,
    AdminRequestRejected,
    ProjectStatusUpdated,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::UserRoleUpdated => write!(f, "USER_ROLE_UPDATED"),
            AuditAction::AdminRequestRejected => write!(f, "ADMIN_REQUEST_REJECTED"),
            AuditAction::ProjectStatusUpdated => write!(f, "PROJECT_STATUS_UPDATED"),
        }
    }
}

/// What an audit entry points at.
///
/// A tagged union rather than a bare (string, id) pair, so an entry can
/// never carry an inconsistent type/id combination. Serialises flat into
/// the entry as `targetType` + `targetId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "targetType", content = "targetId", rename_all = "snake_case")]
pub enum AuditTarget {
    User(u64),
    Project(u64),
    AdminRequest(u64),
}

impl AuditTarget {
    pub fn id(&self) -> u64 {
        match self {
            AuditTarget::User(id) | AuditTarget::Project(id) | AuditTarget::AdminRequest(id) => {
                *id
            }
        }
    }
}

/// A recorded privileged state change.
///
/// `before`/`after` are shallow snapshots of only the changed fields (for a
/// role change: `{"role": "innovator"}` / `{"role": "regulator"}`), never
/// full entity dumps. The target is a weak reference: the pointed-at record
/// may outlive or predate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub actor_user_id: u64,
    pub action: AuditAction,
    #[serde(flatten)]
    pub target: AuditTarget,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub ip: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Input for a new entry; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_user_id: u64,
    pub action: AuditAction,
    pub target: AuditTarget,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub ip: String,
    pub user_agent: String,
}

/// The persistent, append-only audit store.
///
/// Lives in its own redb file, separate from the credential store, so an
/// audit outage can never take a business transaction down with it.
pub struct AuditStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl AuditStore {
    /// Open or create the audit database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuditError::Backend(format!("create data dir: {e}")))?;
        }

        let db = Database::create(&path)
            .map_err(|e| AuditError::Backend(format!("open redb: {e}")))?;

        let txn = db
            .begin_write()
            .map_err(|e| AuditError::Backend(format!("init txn: {e}")))?;
        {
            txn.open_table(ENTRIES)
                .map_err(|e| AuditError::Backend(format!("init entries: {e}")))?;
            txn.open_table(COUNTERS)
                .map_err(|e| AuditError::Backend(format!("init counters: {e}")))?;
        }
        txn.commit()
            .map_err(|e| AuditError::Backend(format!("init commit: {e}")))?;

        debug!(path = %path.display(), "opened audit store");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry. Returns the stored record.
    pub async fn record(&self, new_entry: NewAuditEntry) -> Result<AuditEntry, AuditError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<AuditEntry, AuditError> {
            let txn = db
                .begin_write()
                .map_err(|e| AuditError::Backend(format!("write txn: {e}")))?;

            let entry = {
                let mut entries = txn
                    .open_table(ENTRIES)
                    .map_err(|e| AuditError::Backend(format!("open entries: {e}")))?;
                let mut counters = txn
                    .open_table(COUNTERS)
                    .map_err(|e| AuditError::Backend(format!("open counters: {e}")))?;

                let id = counters
                    .get(COUNTER_ENTRIES)
                    .map_err(|e| AuditError::Backend(format!("counter read: {e}")))?
                    .map(|guard| guard.value())
                    .unwrap_or(0)
                    + 1;
                counters
                    .insert(COUNTER_ENTRIES, id)
                    .map_err(|e| AuditError::Backend(format!("counter write: {e}")))?;

                let entry = AuditEntry {
                    id,
                    actor_user_id: new_entry.actor_user_id,
                    action: new_entry.action,
                    target: new_entry.target,
                    before: new_entry.before,
                    after: new_entry.after,
                    ip: new_entry.ip,
                    user_agent: new_entry.user_agent,
                    created_at: Utc::now(),
                };

                let encoded = serde_json::to_vec(&entry)
                    .map_err(|e| AuditError::Corrupted(format!("encode: {e}")))?;
                entries
                    .insert(id, encoded.as_slice())
                    .map_err(|e| AuditError::Backend(format!("insert: {e}")))?;

                entry
            };

            txn.commit()
                .map_err(|e| AuditError::Backend(format!("commit: {e}")))?;

            Ok(entry)
        })
        .await
        .map_err(|e| AuditError::Backend(format!("task join: {e}")))?
    }

    /// Append an entry, swallowing any failure.
    ///
    /// The triggering mutation has already committed; reporting an audit
    /// failure to its caller would be misleading and could not undo the
    /// decision. Failures land in the log at warn level instead.
    pub async fn record_best_effort(&self, new_entry: NewAuditEntry) {
        let action = new_entry.action;
        let target = new_entry.target;
        match self.record(new_entry).await {
            Ok(entry) => {
                debug!(
                    entry_id = entry.id,
                    action = %action,
                    target = ?target,
                    "audit entry recorded"
                );
            }
            Err(e) => {
                warn!(
                    action = %action,
                    target = ?target,
                    error = %e,
                    "failed to record audit entry; continuing"
                );
            }
        }
    }

    /// List entries newest first. The limit is clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn list(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let db = Arc::clone(&self.db);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        tokio::task::spawn_blocking(move || -> Result<Vec<AuditEntry>, AuditError> {
            let txn = db
                .begin_read()
                .map_err(|e| AuditError::Backend(format!("read txn: {e}")))?;
            let entries = txn
                .open_table(ENTRIES)
                .map_err(|e| AuditError::Backend(format!("open entries: {e}")))?;

            // Ids are monotonic: walking the B-tree backwards gives
            // newest-first without a sort.
            let mut out = Vec::with_capacity(limit);
            let iter = entries
                .iter()
                .map_err(|e| AuditError::Backend(format!("scan: {e}")))?;
            for entry in iter.rev() {
                let (_, value) =
                    entry.map_err(|e| AuditError::Backend(format!("scan entry: {e}")))?;
                let decoded: AuditEntry = serde_json::from_slice(value.value())
                    .map_err(|e| AuditError::Corrupted(format!("decode: {e}")))?;
                out.push(decoded);
                if out.len() >= limit {
                    break;
                }
            }

            Ok(out)
        })
        .await
        .map_err(|e| AuditError::Backend(format!("task join: {e}")))?
    }
}

impl std::fmt::Debug for AuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditStore")
            .field("path", &self.path)
            .finish()
    }
}

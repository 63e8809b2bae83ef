// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// redb-backed registry of users and admin requests.
//
// # Design
//
// - Single redb `Database` file with five tables: user records, an email
//   uniqueness index, admin-request records, a pending-request-per-user
//   index, and monotonic id/regulator counters.
// - Read transactions for all reads (concurrent, lock-free).
// - One write transaction per mutating operation. The conflict checks
//   (duplicate email, duplicate pending request, first-admin existence,
//   pending status) happen inside the same transaction as the writes they
//   guard, so they cannot race.
// - Blocking redb work runs on `spawn_blocking` so request tasks are never
//   pinned on B-tree I/O.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::{
    AdminRequest, Elevation, NewUser, RequestStatus, Role, RoleChange, User,
};

/// User records keyed by id, serialised as JSON.
const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");

/// Email -> user id uniqueness index.
const USERS_BY_EMAIL: TableDefinition<&str, u64> = TableDefinition::new("users_by_email");

/// Admin-request records keyed by id, serialised as JSON.
const REQUESTS: TableDefinition<u64, &[u8]> = TableDefinition::new("admin_requests");

/// user id -> pending request id. The partial-uniqueness constraint: a row
/// here means the user has exactly one pending request.
const PENDING_BY_USER: TableDefinition<u64, u64> = TableDefinition::new("pending_by_user");

/// Monotonic counters: next ids plus the live regulator count.
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

const COUNTER_USERS: &str = "users";
const COUNTER_REQUESTS: &str = "admin_requests";
const COUNTER_REGULATORS: &str = "regulators";

/// The persistent credential and admin-request store.
///
/// Thread-safe: `Database` is `Send + Sync` and redb serialises write
/// transactions internally.
pub struct RegistryStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl RegistryStore {
    /// Open or create the registry database at the given path.
    ///
    /// Creates parent directories if needed and initialises all tables so
    /// read paths never observe a missing table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::backend("create data dir", e))?;
        }

        let db = Database::create(&path)
            .map_err(|e| StoreError::backend("open redb", e))?;

        // Initialise tables up front.
        let txn = db
            .begin_write()
            .map_err(|e| StoreError::backend("init txn", e))?;
        {
            txn.open_table(USERS)
                .map_err(|e| StoreError::backend("init users", e))?;
            txn.open_table(USERS_BY_EMAIL)
                .map_err(|e| StoreError::backend("init email index", e))?;
            txn.open_table(REQUESTS)
                .map_err(|e| StoreError::backend("init requests", e))?;
            txn.open_table(PENDING_BY_USER)
                .map_err(|e| StoreError::backend("init pending index", e))?;
            txn.open_table(COUNTERS)
                .map_err(|e| StoreError::backend("init counters", e))?;
        }
        txn.commit()
            .map_err(|e| StoreError::backend("init commit", e))?;

        debug!(path = %path.display(), "opened registry store");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Open the registry, retrying with exponential backoff if the file is
    /// locked by another process.
    ///
    /// Replaces the busy-wait loop the original initialisation used under
    /// lock contention: bounded budget, doubling delay starting at 50ms.
    pub fn open_with_retry(
        path: impl AsRef<Path>,
        max_attempts: u32,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut delay = Duration::from_millis(50);
        let mut last_err = None;

        for attempt in 1..=max_attempts.max(1) {
            match Self::open(path) {
                Ok(store) => return Ok(store),
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "registry open failed, backing off"
                    );
                    last_err = Some(e);
                    if attempt < max_attempts {
                        std::thread::sleep(delay);
                        delay = delay.saturating_mul(2);
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| StoreError::Backend("open retry budget exhausted".into())))
    }

    /// Filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Create a user, resolving the role inside the write transaction.
    ///
    /// Fails with [`StoreError::EmailExists`] if the email is taken and with
    /// [`StoreError::ElevationDenied`] if an admin-requested registration
    /// falls through to the keyed path with an invalid key. On any error no
    /// row is inserted.
    pub async fn create_user(
        &self,
        new_user: NewUser,
        elevation: Elevation,
    ) -> Result<User, StoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<User, StoreError> {
            let txn = db
                .begin_write()
                .map_err(|e| StoreError::backend("write txn", e))?;

            let user = {
                let mut users = txn
                    .open_table(USERS)
                    .map_err(|e| StoreError::backend("open users", e))?;
                let mut emails = txn
                    .open_table(USERS_BY_EMAIL)
                    .map_err(|e| StoreError::backend("open email index", e))?;
                let mut counters = txn
                    .open_table(COUNTERS)
                    .map_err(|e| StoreError::backend("open counters", e))?;

                let taken = emails
                    .get(new_user.email.as_str())
                    .map_err(|e| StoreError::backend("email lookup", e))?
                    .is_some();
                if taken {
                    return Err(StoreError::EmailExists);
                }

                // Role resolution happens here, under the write lock, so the
                // first-admin check cannot race with another registration.
                let role = match elevation {
                    Elevation::None => Role::Innovator,
                    Elevation::Requested {
                        bootstrap_enabled,
                        key_valid,
                    } => {
                        let has_admin = counter_value(&counters, COUNTER_REGULATORS)? > 0;
                        if !has_admin && bootstrap_enabled {
                            Role::Regulator
                        } else if key_valid {
                            Role::Regulator
                        } else {
                            return Err(StoreError::ElevationDenied);
                        }
                    }
                };

                let id = bump_counter(&mut counters, COUNTER_USERS)?;
                let user = User {
                    id,
                    name: new_user.name,
                    email: new_user.email,
                    password_hash: new_user.password_hash,
                    role,
                    created_at: Utc::now(),
                };

                let encoded = encode(&user)?;
                users
                    .insert(id, encoded.as_slice())
                    .map_err(|e| StoreError::backend("insert user", e))?;
                emails
                    .insert(user.email.as_str(), id)
                    .map_err(|e| StoreError::backend("insert email index", e))?;

                if role == Role::Regulator {
                    adjust_regulator_count(&mut counters, Role::Innovator, Role::Regulator)?;
                }

                user
            };

            txn.commit()
                .map_err(|e| StoreError::backend("commit", e))?;

            debug!(user_id = user.id, role = %user.role, "created user");
            Ok(user)
        })
        .await
        .map_err(|e| StoreError::backend("task join", e))?
    }

    /// Look up a user by id.
    pub async fn get_user(&self, id: u64) -> Result<Option<User>, StoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<Option<User>, StoreError> {
            let txn = db
                .begin_read()
                .map_err(|e| StoreError::backend("read txn", e))?;
            let users = txn
                .open_table(USERS)
                .map_err(|e| StoreError::backend("open users", e))?;

            match users.get(id).map_err(|e| StoreError::backend("get user", e))? {
                Some(guard) => Ok(Some(decode(guard.value())?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| StoreError::backend("task join", e))?
    }

    /// Look up a user by email (case-sensitive, as stored).
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let db = Arc::clone(&self.db);
        let email = email.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<User>, StoreError> {
            let txn = db
                .begin_read()
                .map_err(|e| StoreError::backend("read txn", e))?;
            let emails = txn
                .open_table(USERS_BY_EMAIL)
                .map_err(|e| StoreError::backend("open email index", e))?;

            let id = match emails
                .get(email.as_str())
                .map_err(|e| StoreError::backend("email lookup", e))?
            {
                Some(guard) => guard.value(),
                None => return Ok(None),
            };

            let users = txn
                .open_table(USERS)
                .map_err(|e| StoreError::backend("open users", e))?;
            match users.get(id).map_err(|e| StoreError::backend("get user", e))? {
                Some(guard) => Ok(Some(decode(guard.value())?)),
                None => Err(StoreError::corrupted(
                    "email index",
                    format!("dangling id {id} for {email}"),
                )),
            }
        })
        .await
        .map_err(|e| StoreError::backend("task join", e))?
    }

    /// List users, newest first, optionally filtered by a substring match on
    /// name or email.
    pub async fn list_users(&self, query: Option<String>) -> Result<Vec<User>, StoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<Vec<User>, StoreError> {
            let txn = db
                .begin_read()
                .map_err(|e| StoreError::backend("read txn", e))?;
            let users = txn
                .open_table(USERS)
                .map_err(|e| StoreError::backend("open users", e))?;

            let mut out = Vec::new();
            for entry in users.iter().map_err(|e| StoreError::backend("scan users", e))? {
                let (_, value) = entry.map_err(|e| StoreError::backend("scan entry", e))?;
                let user: User = decode(value.value())?;
                let keep = match &query {
                    Some(q) => user.name.contains(q) || user.email.contains(q),
                    None => true,
                };
                if keep {
                    out.push(user);
                }
            }

            // Ids are monotonic, so descending id == newest first.
            out.sort_by(|a, b| b.id.cmp(&a.id));
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::backend("task join", e))?
    }

    /// True iff at least one user holds the regulator role.
    pub async fn has_admin(&self) -> Result<bool, StoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<bool, StoreError> {
            let txn = db
                .begin_read()
                .map_err(|e| StoreError::backend("read txn", e))?;
            let counters = txn
                .open_table(COUNTERS)
                .map_err(|e| StoreError::backend("open counters", e))?;
            Ok(counter_value(&counters, COUNTER_REGULATORS)? > 0)
        })
        .await
        .map_err(|e| StoreError::backend("task join", e))?
    }

    /// Change a user's role directly. Returns the applied transition
    /// (before may equal after if the role was already set).
    pub async fn update_user_role(
        &self,
        user_id: u64,
        new_role: Role,
    ) -> Result<(User, RoleChange), StoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<(User, RoleChange), StoreError> {
            let txn = db
                .begin_write()
                .map_err(|e| StoreError::backend("write txn", e))?;

            let (user, change) = {
                let mut users = txn
                    .open_table(USERS)
                    .map_err(|e| StoreError::backend("open users", e))?;
                let mut counters = txn
                    .open_table(COUNTERS)
                    .map_err(|e| StoreError::backend("open counters", e))?;

                let mut user: User = match users
                    .get(user_id)
                    .map_err(|e| StoreError::backend("get user", e))?
                {
                    Some(guard) => decode(guard.value())?,
                    None => return Err(StoreError::UserNotFound(user_id)),
                };

                let before = user.role;
                user.role = new_role;

                let encoded = encode(&user)?;
                users
                    .insert(user_id, encoded.as_slice())
                    .map_err(|e| StoreError::backend("update user", e))?;
                adjust_regulator_count(&mut counters, before, new_role)?;

                (
                    user,
                    RoleChange {
                        user_id,
                        before,
                        after: new_role,
                    },
                )
            };

            txn.commit()
                .map_err(|e| StoreError::backend("commit", e))?;

            debug!(user_id, before = %change.before, after = %change.after, "updated user role");
            Ok((user, change))
        })
        .await
        .map_err(|e| StoreError::backend("task join", e))?
    }

    // -----------------------------------------------------------------------
    // Admin requests
    // -----------------------------------------------------------------------

    /// Create a pending admin request for a user.
    ///
    /// The pending-by-user index is checked and written in the same
    /// transaction, so two concurrent submissions cannot both insert.
    pub async fn submit_request(
        &self,
        user_id: u64,
        reason: Option<String>,
    ) -> Result<AdminRequest, StoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<AdminRequest, StoreError> {
            let txn = db
                .begin_write()
                .map_err(|e| StoreError::backend("write txn", e))?;

            let request = {
                let users = txn
                    .open_table(USERS)
                    .map_err(|e| StoreError::backend("open users", e))?;
                let mut requests = txn
                    .open_table(REQUESTS)
                    .map_err(|e| StoreError::backend("open requests", e))?;
                let mut pending = txn
                    .open_table(PENDING_BY_USER)
                    .map_err(|e| StoreError::backend("open pending index", e))?;
                let mut counters = txn
                    .open_table(COUNTERS)
                    .map_err(|e| StoreError::backend("open counters", e))?;

                if users
                    .get(user_id)
                    .map_err(|e| StoreError::backend("get user", e))?
                    .is_none()
                {
                    return Err(StoreError::UserNotFound(user_id));
                }

                if pending
                    .get(user_id)
                    .map_err(|e| StoreError::backend("pending lookup", e))?
                    .is_some()
                {
                    return Err(StoreError::DuplicateRequest);
                }

                let id = bump_counter(&mut counters, COUNTER_REQUESTS)?;
                let request = AdminRequest {
                    id,
                    user_id,
                    reason,
                    status: RequestStatus::Pending,
                    created_at: Utc::now(),
                };

                let encoded = encode(&request)?;
                requests
                    .insert(id, encoded.as_slice())
                    .map_err(|e| StoreError::backend("insert request", e))?;
                pending
                    .insert(user_id, id)
                    .map_err(|e| StoreError::backend("insert pending index", e))?;

                request
            };

            txn.commit()
                .map_err(|e| StoreError::backend("commit", e))?;

            debug!(request_id = request.id, user_id, "submitted admin request");
            Ok(request)
        })
        .await
        .map_err(|e| StoreError::backend("task join", e))?
    }

    /// Look up an admin request by id.
    pub async fn get_request(&self, id: u64) -> Result<Option<AdminRequest>, StoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<Option<AdminRequest>, StoreError> {
            let txn = db
                .begin_read()
                .map_err(|e| StoreError::backend("read txn", e))?;
            let requests = txn
                .open_table(REQUESTS)
                .map_err(|e| StoreError::backend("open requests", e))?;

            match requests
                .get(id)
                .map_err(|e| StoreError::backend("get request", e))?
            {
                Some(guard) => Ok(Some(decode(guard.value())?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| StoreError::backend("task join", e))?
    }

    /// List all admin requests, newest first.
    pub async fn list_requests(&self) -> Result<Vec<AdminRequest>, StoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<Vec<AdminRequest>, StoreError> {
            let txn = db
                .begin_read()
                .map_err(|e| StoreError::backend("read txn", e))?;
            let requests = txn
                .open_table(REQUESTS)
                .map_err(|e| StoreError::backend("open requests", e))?;

            let mut out = Vec::new();
            for entry in requests
                .iter()
                .map_err(|e| StoreError::backend("scan requests", e))?
            {
                let (_, value) = entry.map_err(|e| StoreError::backend("scan entry", e))?;
                out.push(decode::<AdminRequest>(value.value())?);
            }

            out.sort_by(|a, b| b.id.cmp(&a.id));
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::backend("task join", e))?
    }

    /// Terminally transition a pending request.
    ///
    /// On approval the request status flip, the pending-index removal and
    /// the target user's role update commit as one transaction: a crash or
    /// a failed role write can never leave the request approved on its own.
    ///
    /// Returns the updated request and, for approvals, the role transition
    /// that was applied (for the caller's audit entry).
    pub async fn resolve_request(
        &self,
        request_id: u64,
        approve: bool,
    ) -> Result<(AdminRequest, Option<RoleChange>), StoreError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(
            move || -> Result<(AdminRequest, Option<RoleChange>), StoreError> {
                let txn = db
                    .begin_write()
                    .map_err(|e| StoreError::backend("write txn", e))?;

                let (request, change) = {
                    let mut users = txn
                        .open_table(USERS)
                        .map_err(|e| StoreError::backend("open users", e))?;
                    let mut requests = txn
                        .open_table(REQUESTS)
                        .map_err(|e| StoreError::backend("open requests", e))?;
                    let mut pending = txn
                        .open_table(PENDING_BY_USER)
                        .map_err(|e| StoreError::backend("open pending index", e))?;
                    let mut counters = txn
                        .open_table(COUNTERS)
                        .map_err(|e| StoreError::backend("open counters", e))?;

                    let mut request: AdminRequest = match requests
                        .get(request_id)
                        .map_err(|e| StoreError::backend("get request", e))?
                    {
                        Some(guard) => decode(guard.value())?,
                        None => return Err(StoreError::RequestNotFound(request_id)),
                    };

                    if request.status != RequestStatus::Pending {
                        return Err(StoreError::RequestNotPending(request_id));
                    }

                    request.status = if approve {
                        RequestStatus::Approved
                    } else {
                        RequestStatus::Rejected
                    };

                    let encoded = encode(&request)?;
                    requests
                        .insert(request_id, encoded.as_slice())
                        .map_err(|e| StoreError::backend("update request", e))?;
                    pending
                        .remove(request.user_id)
                        .map_err(|e| StoreError::backend("clear pending index", e))?;

                    let change = if approve {
                        let mut user: User = match users
                            .get(request.user_id)
                            .map_err(|e| StoreError::backend("get user", e))?
                        {
                            Some(guard) => decode(guard.value())?,
                            None => return Err(StoreError::UserNotFound(request.user_id)),
                        };

                        let before = user.role;
                        user.role = Role::Regulator;
                        let encoded = encode(&user)?;
                        users
                            .insert(user.id, encoded.as_slice())
                            .map_err(|e| StoreError::backend("update user", e))?;
                        adjust_regulator_count(&mut counters, before, Role::Regulator)?;

                        Some(RoleChange {
                            user_id: user.id,
                            before,
                            after: Role::Regulator,
                        })
                    } else {
                        None
                    };

                    (request, change)
                };

                txn.commit()
                    .map_err(|e| StoreError::backend("commit", e))?;

                debug!(request_id, status = %request.status, "resolved admin request");
                Ok((request, change))
            },
        )
        .await
        .map_err(|e| StoreError::backend("task join", e))?
    }
}

impl std::fmt::Debug for RegistryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryStore")
            .field("path", &self.path)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Table helpers
// ---------------------------------------------------------------------------

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::corrupted("encode", e))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::corrupted("decode", e))
}

fn counter_value(
    counters: &impl ReadableTable<&'static str, u64>,
    key: &str,
) -> Result<u64, StoreError> {
    Ok(counters
        .get(key)
        .map_err(|e| StoreError::backend("counter read", e))?
        .map(|guard| guard.value())
        .unwrap_or(0))
}

fn bump_counter(
    counters: &mut redb::Table<'_, &'static str, u64>,
    key: &str,
) -> Result<u64, StoreError> {
    let next = counter_value(counters, key)? + 1;
    counters
        .insert(key, next)
        .map_err(|e| StoreError::backend("counter write", e))?;
    Ok(next)
}

/// Keep the regulator count in step with a role transition.
fn adjust_regulator_count(
    counters: &mut redb::Table<'_, &'static str, u64>,
    before: Role,
    after: Role,
) -> Result<(), StoreError> {
    let current = counter_value(counters, COUNTER_REGULATORS)?;
    let next = match (before, after) {
        (Role::Innovator, Role::Regulator) => current + 1,
        (Role::Regulator, Role::Innovator) => current.saturating_sub(1),
        _ => return Ok(()),
    };
    counters
        .insert(COUNTER_REGULATORS, next)
        .map_err(|e| StoreError::backend("counter write", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Test User".to_string(),
            email: email.to_string(),
            password_hash: "$2b$10$fakehashfakehashfakehash".to_string(),
        }
    }

    fn temp_store() -> (tempfile::TempDir, RegistryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::open(dir.path().join("registry.redb")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn plain_registration_is_innovator() {
        let (_dir, store) = temp_store();
        let user = store
            .create_user(new_user("a@x.com"), Elevation::None)
            .await
            .unwrap();
        assert_eq!(user.role, Role::Innovator);
        assert!(!store.has_admin().await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let (_dir, store) = temp_store();
        store
            .create_user(new_user("a@x.com"), Elevation::None)
            .await
            .unwrap();
        let err = store
            .create_user(new_user("a@x.com"), Elevation::None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmailExists));
    }

    #[tokio::test]
    async fn bootstrap_path_grants_regulator_once() {
        let (_dir, store) = temp_store();
        let elevation = Elevation::Requested {
            bootstrap_enabled: true,
            key_valid: false,
        };

        let first = store
            .create_user(new_user("first@x.com"), elevation)
            .await
            .unwrap();
        assert_eq!(first.role, Role::Regulator);
        assert!(store.has_admin().await.unwrap());

        // An admin now exists: same elevation falls through to the keyed
        // path and is refused without a valid key.
        let err = store
            .create_user(new_user("second@x.com"), elevation)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ElevationDenied));
        assert!(store.find_user_by_email("second@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bootstrap_disabled_requires_key_even_for_first_admin() {
        let (_dir, store) = temp_store();
        let err = store
            .create_user(
                new_user("a@x.com"),
                Elevation::Requested {
                    bootstrap_enabled: false,
                    key_valid: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ElevationDenied));

        let user = store
            .create_user(
                new_user("b@x.com"),
                Elevation::Requested {
                    bootstrap_enabled: false,
                    key_valid: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(user.role, Role::Regulator);
    }

    #[tokio::test]
    async fn single_pending_request_per_user() {
        let (_dir, store) = temp_store();
        let user = store
            .create_user(new_user("a@x.com"), Elevation::None)
            .await
            .unwrap();

        let request = store
            .submit_request(user.id, Some("need access".to_string()))
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);

        let err = store.submit_request(user.id, None).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRequest));
        assert_eq!(store.list_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approve_flips_role_and_clears_pending() {
        let (_dir, store) = temp_store();
        let user = store
            .create_user(new_user("a@x.com"), Elevation::None)
            .await
            .unwrap();
        let request = store.submit_request(user.id, None).await.unwrap();

        let (resolved, change) = store.resolve_request(request.id, true).await.unwrap();
        assert_eq!(resolved.status, RequestStatus::Approved);
        let change = change.unwrap();
        assert_eq!(change.before, Role::Innovator);
        assert_eq!(change.after, Role::Regulator);

        let user = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.role, Role::Regulator);
        assert!(store.has_admin().await.unwrap());

        // Pending slot freed: a new request is allowed again.
        store.submit_request(user.id, None).await.unwrap();
    }

    #[tokio::test]
    async fn resolved_request_cannot_transition_again() {
        let (_dir, store) = temp_store();
        let user = store
            .create_user(new_user("a@x.com"), Elevation::None)
            .await
            .unwrap();
        let request = store.submit_request(user.id, None).await.unwrap();
        store.resolve_request(request.id, false).await.unwrap();

        for approve in [true, false] {
            let err = store.resolve_request(request.id, approve).await.unwrap_err();
            assert!(matches!(err, StoreError::RequestNotPending(_)));
        }

        // Rejection never touched the role.
        let user = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.role, Role::Innovator);
    }

    #[tokio::test]
    async fn resolve_unknown_request_is_not_found() {
        let (_dir, store) = temp_store();
        let err = store.resolve_request(999, true).await.unwrap_err();
        assert!(matches!(err, StoreError::RequestNotFound(999)));
    }

    #[tokio::test]
    async fn role_update_adjusts_regulator_count() {
        let (_dir, store) = temp_store();
        let user = store
            .create_user(new_user("a@x.com"), Elevation::None)
            .await
            .unwrap();

        let (_, change) = store.update_user_role(user.id, Role::Regulator).await.unwrap();
        assert_eq!(change.before, Role::Innovator);
        assert!(store.has_admin().await.unwrap());

        store.update_user_role(user.id, Role::Innovator).await.unwrap();
        assert!(!store.has_admin().await.unwrap());
    }

    #[tokio::test]
    async fn list_users_filters_and_orders() {
        let (_dir, store) = temp_store();
        for email in ["ada@x.com", "grace@y.com", "ada2@z.com"] {
            store.create_user(new_user(email), Elevation::None).await.unwrap();
        }

        let all = store.list_users(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].id > all[1].id && all[1].id > all[2].id);

        let filtered = store.list_users(Some("ada".to_string())).await.unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[tokio::test]
    async fn store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.redb");
        let user_id = {
            let store = RegistryStore::open(&path).unwrap();
            store
                .create_user(
                    new_user("a@x.com"),
                    Elevation::Requested {
                        bootstrap_enabled: true,
                        key_valid: false,
                    },
                )
                .await
                .unwrap()
                .id
        };

        let store = RegistryStore::open_with_retry(&path, 3).unwrap();
        assert!(store.has_admin().await.unwrap());
        let user = store.get_user(user_id).await.unwrap().unwrap();
        assert_eq!(user.role, Role::Regulator);
    }
}

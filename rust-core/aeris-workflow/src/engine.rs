// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// The admin-request workflow engine.
//
// Orchestrates every path that can change a user's role:
//
// - first-admin bootstrap at registration (no key, only while no regulator
//   exists and the bootstrap flag is enabled),
// - keyed admin signup (shared secret, compared in constant time),
// - the self-serve request -> regulator approval/rejection flow,
// - direct regulator-initiated role updates (with the self-lockout guard).
//
// Role resolution and the conflict checks run inside the store's write
// transactions; this layer decides *what* to ask for, hashes credentials,
// and emits the audit trail.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use aeris_audit::{AuditAction, AuditEntry, AuditStore, AuditTarget, NewAuditEntry};
use aeris_store::{
    AdminRequest, Elevation, NewUser, RegistryStore, Role, User, UserSummary,
};

use crate::error::WorkflowError;

/// Environment-sourced knobs for the elevation paths.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Enables the no-key first-admin bootstrap path. Off by default: with
    /// the flag disabled an admin-requested registration always takes the
    /// keyed path, even when no regulator exists yet.
    pub bootstrap_enabled: bool,
    /// Shared secret for the keyed path. `None` means the keyed path is
    /// closed entirely.
    pub admin_signup_secret: Option<String>,
    /// bcrypt work factor for password hashing.
    pub bcrypt_cost: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            bootstrap_enabled: false,
            admin_signup_secret: None,
            bcrypt_cost: 10,
        }
    }
}

/// Who is performing a privileged operation, plus the request metadata the
/// audit trail captures.
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub user_id: u64,
    pub ip: String,
    pub user_agent: String,
}

/// Registration input as received from the client. `admin_requested` and
/// `admin_key` feed the elevation state machine; the role itself is never
/// client-supplied.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub admin_requested: bool,
    pub admin_key: Option<String>,
}

/// An admin request with its owner embedded, as listed for regulators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequestView {
    pub id: u64,
    pub user: UserSummary,
    pub reason: Option<String>,
    pub status: aeris_store::RequestStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Actor identity embedded in an audit listing.
#[derive(Debug, Clone, Serialize)]
pub struct AuditActor {
    pub id: u64,
    pub email: String,
}

/// An audit entry with its actor resolved, as listed for regulators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogView {
    pub id: u64,
    pub action: AuditAction,
    #[serde(flatten)]
    pub target: AuditTarget,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub actor: AuditActor,
    pub ip: String,
    pub user_agent: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The workflow engine. Cheap to clone behind `Arc`s.
#[derive(Debug, Clone)]
pub struct AdminWorkflow {
    store: Arc<RegistryStore>,
    audit: Arc<AuditStore>,
    config: WorkflowConfig,
}

impl AdminWorkflow {
    pub fn new(store: Arc<RegistryStore>, audit: Arc<AuditStore>, config: WorkflowConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    /// True iff at least one regulator exists. The client UI uses this to
    /// decide whether to demand a signup key.
    pub async fn has_admin(&self) -> Result<bool, WorkflowError> {
        Ok(self.store.has_admin().await?)
    }

    /// Register a new user.
    ///
    /// Without `admin_requested` the role is always `Innovator`, whatever
    /// else the payload contains. With it, elevation is resolved inside the
    /// store transaction: bootstrap path first (if enabled and no regulator
    /// exists), then the keyed path. A wrong key fails with
    /// [`WorkflowError::AdminKeyInvalid`] and creates no record.
    pub async fn register(&self, registration: Registration) -> Result<User, WorkflowError> {
        let elevation = if registration.admin_requested {
            Elevation::Requested {
                bootstrap_enabled: self.config.bootstrap_enabled,
                key_valid: self.key_matches(registration.admin_key.as_deref()),
            }
        } else {
            Elevation::None
        };

        let password_hash = hash_password(registration.password, self.config.bcrypt_cost).await?;

        let user = self
            .store
            .create_user(
                NewUser {
                    name: registration.name,
                    email: registration.email,
                    password_hash,
                },
                elevation,
            )
            .await
            .map_err(|e| {
                if matches!(e, aeris_store::StoreError::ElevationDenied) {
                    warn!("admin-requested registration refused: invalid signup key");
                }
                WorkflowError::from(e)
            })?;

        info!(user_id = user.id, role = %user.role, "user registered");
        Ok(user)
    }

    /// Verify credentials. One error for unknown email and wrong password.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, WorkflowError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(WorkflowError::InvalidCredentials)?;

        let valid = verify_password(password.to_string(), user.password_hash.clone()).await?;
        if !valid {
            warn!(user_id = user.id, "login failed: wrong password");
            return Err(WorkflowError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Look up a user (session resolution, `/auth/me`).
    pub async fn get_user(&self, user_id: u64) -> Result<Option<User>, WorkflowError> {
        Ok(self.store.get_user(user_id).await?)
    }

    /// Submit a self-serve elevation request. At most one pending request
    /// per user; a second submission fails with `DuplicateRequest`.
    pub async fn submit_request(
        &self,
        user_id: u64,
        reason: Option<String>,
    ) -> Result<AdminRequest, WorkflowError> {
        let request = self.store.submit_request(user_id, reason).await?;
        info!(request_id = request.id, user_id, "admin request submitted");
        Ok(request)
    }

    /// List all admin requests with their owners embedded, newest first.
    pub async fn list_requests(&self) -> Result<Vec<AdminRequestView>, WorkflowError> {
        let requests = self.store.list_requests().await?;
        let mut views = Vec::with_capacity(requests.len());
        for request in requests {
            views.push(self.request_view(request).await?);
        }
        Ok(views)
    }

    /// Approve a pending request: flips it to approved and promotes the
    /// owner to regulator in one storage transaction, then records exactly
    /// one `USER_ROLE_UPDATED` audit entry (best-effort).
    pub async fn approve_request(
        &self,
        request_id: u64,
        actor: &ActorContext,
    ) -> Result<AdminRequestView, WorkflowError> {
        let (request, change) = self.store.resolve_request(request_id, true).await?;

        if let Some(change) = change {
            self.audit
                .record_best_effort(NewAuditEntry {
                    actor_user_id: actor.user_id,
                    action: AuditAction::UserRoleUpdated,
                    target: AuditTarget::User(change.user_id),
                    before: Some(json!({ "role": change.before.to_string() })),
                    after: Some(json!({ "role": change.after.to_string() })),
                    ip: actor.ip.clone(),
                    user_agent: actor.user_agent.clone(),
                })
                .await;
        }

        info!(
            request_id,
            actor_user_id = actor.user_id,
            target_user_id = request.user_id,
            "admin request approved"
        );
        self.request_view(request).await
    }

    /// Reject a pending request. The owner's role is untouched; the
    /// rejection itself is audited.
    pub async fn reject_request(
        &self,
        request_id: u64,
        actor: &ActorContext,
    ) -> Result<AdminRequestView, WorkflowError> {
        let (request, _) = self.store.resolve_request(request_id, false).await?;

        self.audit
            .record_best_effort(NewAuditEntry {
                actor_user_id: actor.user_id,
                action: AuditAction::AdminRequestRejected,
                target: AuditTarget::AdminRequest(request.id),
                before: Some(json!({ "status": "pending" })),
                after: Some(json!({ "status": "rejected" })),
                ip: actor.ip.clone(),
                user_agent: actor.user_agent.clone(),
            })
            .await;

        info!(
            request_id,
            actor_user_id = actor.user_id,
            "admin request rejected"
        );
        self.request_view(request).await
    }

    /// Direct role change outside the request flow (demotions, manual
    /// promotions). A regulator can never demote themselves.
    pub async fn update_user_role(
        &self,
        target_user_id: u64,
        new_role: Role,
        actor: &ActorContext,
    ) -> Result<User, WorkflowError> {
        if actor.user_id == target_user_id && new_role == Role::Innovator {
            let current = self
                .store
                .get_user(target_user_id)
                .await?
                .ok_or(WorkflowError::UserNotFound(target_user_id))?;
            if current.role == Role::Regulator {
                warn!(user_id = actor.user_id, "self-demotion refused");
                return Err(WorkflowError::SelfDemotionForbidden);
            }
        }

        let (user, change) = self.store.update_user_role(target_user_id, new_role).await?;

        self.audit
            .record_best_effort(NewAuditEntry {
                actor_user_id: actor.user_id,
                action: AuditAction::UserRoleUpdated,
                target: AuditTarget::User(change.user_id),
                before: Some(json!({ "role": change.before.to_string() })),
                after: Some(json!({ "role": change.after.to_string() })),
                ip: actor.ip.clone(),
                user_agent: actor.user_agent.clone(),
            })
            .await;

        info!(
            target_user_id,
            actor_user_id = actor.user_id,
            role = %new_role,
            "user role updated"
        );
        Ok(user)
    }

    /// List users, newest first, optionally filtered on name/email.
    pub async fn list_users(
        &self,
        query: Option<String>,
    ) -> Result<Vec<UserSummary>, WorkflowError> {
        let users = self.store.list_users(query).await?;
        Ok(users.iter().map(User::summary).collect())
    }

    /// List audit entries newest first with actors resolved. A missing
    /// actor record (never deleted in the current scope, but the reference
    /// is weak) degrades to a placeholder instead of failing the listing.
    pub async fn audit_logs(&self, limit: usize) -> Result<Vec<AuditLogView>, WorkflowError> {
        let entries = self
            .audit
            .list(limit)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;

        let mut views = Vec::with_capacity(entries.len());
        for entry in entries {
            views.push(self.audit_view(entry).await?);
        }
        Ok(views)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Constant-time comparison against the configured signup secret.
    /// A missing secret or missing key never matches.
    fn key_matches(&self, supplied: Option<&str>) -> bool {
        match (&self.config.admin_signup_secret, supplied) {
            (Some(secret), Some(supplied)) => {
                secret.as_bytes().ct_eq(supplied.as_bytes()).into()
            }
            _ => false,
        }
    }

    async fn request_view(&self, request: AdminRequest) -> Result<AdminRequestView, WorkflowError> {
        let user = self
            .store
            .get_user(request.user_id)
            .await?
            .ok_or(WorkflowError::UserNotFound(request.user_id))?;

        Ok(AdminRequestView {
            id: request.id,
            user: user.summary(),
            reason: request.reason,
            status: request.status,
            created_at: request.created_at,
        })
    }

    async fn audit_view(&self, entry: AuditEntry) -> Result<AuditLogView, WorkflowError> {
        let actor = match self.store.get_user(entry.actor_user_id).await? {
            Some(user) => AuditActor {
                id: user.id,
                email: user.email,
            },
            None => AuditActor {
                id: entry.actor_user_id,
                email: "unknown".to_string(),
            },
        };

        Ok(AuditLogView {
            id: entry.id,
            action: entry.action,
            target: entry.target,
            before: entry.before,
            after: entry.after,
            actor,
            ip: entry.ip,
            user_agent: entry.user_agent,
            created_at: entry.created_at,
        })
    }
}

/// bcrypt is CPU-bound; keep it off the async request path.
async fn hash_password(password: String, cost: u32) -> Result<String, WorkflowError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| WorkflowError::Hashing(format!("task join: {e}")))?
        .map_err(|e| WorkflowError::Hashing(e.to_string()))
}

async fn verify_password(password: String, hash: String) -> Result<bool, WorkflowError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| WorkflowError::Hashing(format!("task join: {e}")))?
        .map_err(|e| WorkflowError::Hashing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeris_store::RequestStatus;

    fn actor(user_id: u64) -> ActorContext {
        ActorContext {
            user_id,
            ip: "127.0.0.1".to_string(),
            user_agent: "test-agent".to_string(),
        }
    }

    fn registration(email: &str, admin_requested: bool, admin_key: Option<&str>) -> Registration {
        Registration {
            name: "Test User".to_string(),
            email: email.to_string(),
            password: "pw123456".to_string(),
            admin_requested,
            admin_key: admin_key.map(String::from),
        }
    }

    fn engine(config: WorkflowConfig) -> (tempfile::TempDir, AdminWorkflow) {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::open(dir.path().join("registry.redb")).unwrap();
        let audit = AuditStore::open(dir.path().join("audit.redb")).unwrap();
        let workflow = AdminWorkflow::new(Arc::new(store), Arc::new(audit), config);
        (dir, workflow)
    }

    fn bootstrap_config() -> WorkflowConfig {
        WorkflowConfig {
            bootstrap_enabled: true,
            admin_signup_secret: Some("sky-secret".to_string()),
            // Minimum bcrypt allows; keeps the test suite fast.
            bcrypt_cost: 4,
        }
    }

    #[tokio::test]
    async fn role_is_never_client_assigned() {
        let (_dir, workflow) = engine(bootstrap_config());

        // Even with a valid key in the payload, no admin_requested means
        // innovator.
        let user = workflow
            .register(registration("a@x.com", false, Some("sky-secret")))
            .await
            .unwrap();
        assert_eq!(user.role, Role::Innovator);
        assert!(!workflow.has_admin().await.unwrap());
    }

    #[tokio::test]
    async fn first_admin_bootstraps_without_key() {
        let (_dir, workflow) = engine(bootstrap_config());

        let user = workflow
            .register(registration("a@x.com", true, None))
            .await
            .unwrap();
        assert_eq!(user.role, Role::Regulator);
        assert!(workflow.has_admin().await.unwrap());
    }

    #[tokio::test]
    async fn key_gate_once_admin_exists() {
        let (_dir, workflow) = engine(bootstrap_config());
        workflow
            .register(registration("first@x.com", true, None))
            .await
            .unwrap();

        // Wrong key and missing key both refuse without creating a record.
        for key in [Some("wrong"), None] {
            let err = workflow
                .register(registration("second@x.com", true, key))
                .await
                .unwrap_err();
            assert!(matches!(err, WorkflowError::AdminKeyInvalid));
        }
        assert!(workflow
            .login("second@x.com", "pw123456")
            .await
            .is_err());

        // The correct key still works.
        let user = workflow
            .register(registration("second@x.com", true, Some("sky-secret")))
            .await
            .unwrap();
        assert_eq!(user.role, Role::Regulator);
    }

    #[tokio::test]
    async fn bootstrap_flag_off_requires_key_for_first_admin() {
        let (_dir, workflow) = engine(WorkflowConfig {
            bootstrap_enabled: false,
            ..bootstrap_config()
        });

        let err = workflow
            .register(registration("a@x.com", true, None))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::AdminKeyInvalid));
    }

    #[tokio::test]
    async fn login_accepts_correct_password_only() {
        let (_dir, workflow) = engine(bootstrap_config());
        workflow
            .register(registration("a@x.com", false, None))
            .await
            .unwrap();

        let user = workflow.login("a@x.com", "pw123456").await.unwrap();
        assert_eq!(user.email, "a@x.com");

        let err = workflow.login("a@x.com", "nope-nope").await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidCredentials));
        let err = workflow.login("ghost@x.com", "pw123456").await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidCredentials));
    }

    #[tokio::test]
    async fn approval_promotes_and_audits_exactly_once() {
        let (_dir, workflow) = engine(bootstrap_config());
        let regulator = workflow
            .register(registration("reg@x.com", true, None))
            .await
            .unwrap();
        let innovator = workflow
            .register(registration("inn@x.com", false, None))
            .await
            .unwrap();

        let request = workflow
            .submit_request(innovator.id, Some("need access".to_string()))
            .await
            .unwrap();

        let view = workflow
            .approve_request(request.id, &actor(regulator.id))
            .await
            .unwrap();
        assert_eq!(view.status, RequestStatus::Approved);
        assert_eq!(view.user.id, innovator.id);

        let promoted = workflow.get_user(innovator.id).await.unwrap().unwrap();
        assert_eq!(promoted.role, Role::Regulator);

        let logs = workflow.audit_logs(50).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, AuditAction::UserRoleUpdated);
        assert_eq!(logs[0].target, AuditTarget::User(innovator.id));
        assert_eq!(logs[0].after.as_ref().unwrap()["role"], "regulator");
        assert_eq!(logs[0].actor.id, regulator.id);

        // Approving again must fail and must not add a second entry.
        let err = workflow
            .approve_request(request.id, &actor(regulator.id))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::RequestNotPending(_)));
        assert_eq!(workflow.audit_logs(50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejection_audits_and_leaves_role() {
        let (_dir, workflow) = engine(bootstrap_config());
        let regulator = workflow
            .register(registration("reg@x.com", true, None))
            .await
            .unwrap();
        let innovator = workflow
            .register(registration("inn@x.com", false, None))
            .await
            .unwrap();
        let request = workflow.submit_request(innovator.id, None).await.unwrap();

        let view = workflow
            .reject_request(request.id, &actor(regulator.id))
            .await
            .unwrap();
        assert_eq!(view.status, RequestStatus::Rejected);

        let user = workflow.get_user(innovator.id).await.unwrap().unwrap();
        assert_eq!(user.role, Role::Innovator);

        let logs = workflow.audit_logs(50).await.unwrap();
        assert_eq!(logs[0].action, AuditAction::AdminRequestRejected);
        assert_eq!(logs[0].target, AuditTarget::AdminRequest(request.id));
    }

    #[tokio::test]
    async fn duplicate_pending_request_refused() {
        let (_dir, workflow) = engine(bootstrap_config());
        let user = workflow
            .register(registration("a@x.com", false, None))
            .await
            .unwrap();

        workflow.submit_request(user.id, None).await.unwrap();
        let err = workflow.submit_request(user.id, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateRequest));
    }

    #[tokio::test]
    async fn self_demotion_is_blocked() {
        let (_dir, workflow) = engine(bootstrap_config());
        let regulator = workflow
            .register(registration("reg@x.com", true, None))
            .await
            .unwrap();

        let err = workflow
            .update_user_role(regulator.id, Role::Innovator, &actor(regulator.id))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::SelfDemotionForbidden));

        let user = workflow.get_user(regulator.id).await.unwrap().unwrap();
        assert_eq!(user.role, Role::Regulator);
        // Nothing was audited for the refused change.
        assert!(workflow.audit_logs(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn regulator_can_demote_someone_else() {
        let (_dir, workflow) = engine(bootstrap_config());
        let first = workflow
            .register(registration("first@x.com", true, None))
            .await
            .unwrap();
        let second = workflow
            .register(registration("second@x.com", true, Some("sky-secret")))
            .await
            .unwrap();

        let demoted = workflow
            .update_user_role(second.id, Role::Innovator, &actor(first.id))
            .await
            .unwrap();
        assert_eq!(demoted.role, Role::Innovator);

        let logs = workflow.audit_logs(50).await.unwrap();
        assert_eq!(logs[0].before.as_ref().unwrap()["role"], "regulator");
        assert_eq!(logs[0].after.as_ref().unwrap()["role"], "innovator");
    }

    #[tokio::test]
    async fn request_listing_embeds_users_newest_first() {
        let (_dir, workflow) = engine(bootstrap_config());
        let a = workflow
            .register(registration("a@x.com", false, None))
            .await
            .unwrap();
        let b = workflow
            .register(registration("b@x.com", false, None))
            .await
            .unwrap();

        workflow.submit_request(a.id, None).await.unwrap();
        workflow.submit_request(b.id, None).await.unwrap();

        let views = workflow.list_requests().await.unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].user.email, "b@x.com");
        assert_eq!(views[1].user.email, "a@x.com");
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Core record types for the credential store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User role. `Innovator` is the default for every registration; the only
/// paths to `Regulator` are the bootstrap path, the keyed path, an approved
/// admin request, or a direct regulator-initiated role update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Innovator,
    Regulator,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Innovator => write!(f, "innovator"),
            Role::Regulator => write!(f, "regulator"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "innovator" => Ok(Role::Innovator),
            "regulator" => Ok(Role::Regulator),
            _ => Err(()),
        }
    }
}

/// A persisted user record. The password hash never leaves the store layer
/// except for login verification; HTTP responses use [`UserSummary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    /// Unique, compared case-sensitively as stored.
    pub email: String,
    /// bcrypt hash, never the plaintext.
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Public projection of a user, safe to serialise into responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Input for creating a user. The caller hashes the password before the
/// record reaches the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// How a registration wants its role resolved.
///
/// The store evaluates `Requested` inside the registration write
/// transaction so the "does any regulator exist" check cannot race with a
/// concurrent registration.
#[derive(Debug, Clone, Copy)]
pub enum Elevation {
    /// Plain registration: role is always `Innovator`.
    None,
    /// `adminRequested=true` registration.
    ///
    /// Resolution: if no regulator exists and `bootstrap_enabled` is set,
    /// the bootstrap path grants `Regulator` with no key. Otherwise the
    /// keyed path applies: `key_valid` must be true or the registration is
    /// refused with [`StoreError::ElevationDenied`](crate::StoreError) and
    /// no row is inserted.
    Requested {
        bootstrap_enabled: bool,
        key_valid: bool,
    },
}

/// Status of an admin request. Terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Approved => write!(f, "approved"),
            RequestStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A self-serve elevation request. Holds a weak reference to the user by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRequest {
    pub id: u64,
    pub user_id: u64,
    pub reason: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// Role transition applied by an approval or a direct role update, reported
/// back to the caller so it can be audited.
#[derive(Debug, Clone, Copy)]
pub struct RoleChange {
    pub user_id: u64,
    pub before: Role,
    pub after: Role,
}

// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Store error taxonomy.

use thiserror::Error;

/// Errors produced by the credential store.
///
/// Conflict variants (`EmailExists`, `DuplicateRequest`, `RequestNotPending`,
/// `ElevationDenied`) are returned from inside a write transaction and
/// guarantee that no row was inserted or mutated.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A user with this email is already registered.
    #[error("email already registered")]
    EmailExists,

    /// An admin-requested registration was refused: a regulator already
    /// exists (or bootstrap is disabled) and the supplied key did not match.
    #[error("admin elevation denied")]
    ElevationDenied,

    /// The user already has a pending admin request.
    #[error("a pending admin request already exists for this user")]
    DuplicateRequest,

    /// No user with the given id.
    #[error("user {0} not found")]
    UserNotFound(u64),

    /// No admin request with the given id.
    #[error("admin request {0} not found")]
    RequestNotFound(u64),

    /// The request has already been approved or rejected.
    #[error("admin request {0} is not pending")]
    RequestNotPending(u64),

    /// The storage backend could not be reached or a transaction failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored record could not be decoded.
    #[error("corrupted record: {0}")]
    Corrupted(String),
}

impl StoreError {
    pub(crate) fn backend(context: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Backend(format!("{context}: {err}"))
    }

    pub(crate) fn corrupted(context: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Corrupted(format!("{context}: {err}"))
    }
}

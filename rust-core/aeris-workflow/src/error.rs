// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Workflow error taxonomy.
//
// Each variant maps to exactly one stable error code in the HTTP envelope;
// the API layer does that mapping, nothing here knows about status codes.

use aeris_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Registration with an email that is already taken.
    #[error("email already registered")]
    EmailExists,

    /// Admin-requested registration with a bad or missing key while a
    /// regulator already exists (or bootstrap is disabled).
    #[error("invalid admin signup key")]
    AdminKeyInvalid,

    /// Login with an unknown email or a wrong password. Deliberately one
    /// variant for both so the response cannot reveal which side failed.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The user already has a pending admin request.
    #[error("a pending admin request already exists")]
    DuplicateRequest,

    /// The request has already been approved or rejected.
    #[error("admin request {0} is not pending")]
    RequestNotPending(u64),

    /// Unknown admin request id.
    #[error("admin request {0} not found")]
    RequestNotFound(u64),

    /// Unknown user id.
    #[error("user {0} not found")]
    UserNotFound(u64),

    /// A regulator tried to demote themselves to innovator.
    #[error("cannot demote yourself from regulator to innovator")]
    SelfDemotionForbidden,

    /// Password hashing or verification failed.
    #[error("credential hashing error: {0}")]
    Hashing(String),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmailExists => WorkflowError::EmailExists,
            StoreError::ElevationDenied => WorkflowError::AdminKeyInvalid,
            StoreError::DuplicateRequest => WorkflowError::DuplicateRequest,
            StoreError::UserNotFound(id) => WorkflowError::UserNotFound(id),
            StoreError::RequestNotFound(id) => WorkflowError::RequestNotFound(id),
            StoreError::RequestNotPending(id) => WorkflowError::RequestNotPending(id),
            StoreError::Backend(msg) | StoreError::Corrupted(msg) => {
                WorkflowError::Storage(msg)
            }
        }
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
//
//! Aeris admin-request workflow.
//!
//! The state machine governing who can become a regulator:
//!
//! ```text
//!  [no admin exists] --(register adminRequested, bootstrap on)--> regulator
//!  [admin exists]    --(register adminRequested, key matches)---> regulator
//!  [admin exists]    --(register adminRequested, key mismatch)--> AdminKeyInvalid
//!  innovator --(submit request)--> pending
//!  pending --(regulator approves)--> approved + user promoted
//!  pending --(regulator rejects)--> rejected (role unchanged)
//!  approved|rejected --(approve/reject)--> RequestNotPending
//! ```
//!
//! Every successful transition that touches a role writes one audit entry
//! through [`aeris_audit`].

pub mod engine;
pub mod error;

pub use engine::{
    ActorContext, AdminRequestView, AdminWorkflow, AuditActor, AuditLogView, Registration,
    WorkflowConfig,
};
pub use error::WorkflowError;

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Aeris Credential Store
//
// Persisted user and admin-request records backed by redb (pure Rust,
// B-tree, ACID, single-file). This is the leaf crate of the authorization
// core: everything that decides who may become a regulator ultimately reads
// and writes through here.
//
// # Modules
//
// - [`types`] -- `User`, `Role`, `AdminRequest`, `RequestStatus` and the
//   registration inputs.
// - [`error`] -- The `StoreError` enum covering conflict, not-found and
//   backend failure modes.
// - [`registry`] -- The `RegistryStore`: transactional operations over the
//   redb file.
//
// # Transactional contract
//
// Every check-then-write sequence (email uniqueness, first-admin bootstrap,
// duplicate pending request, approve/reject status flip) executes inside a
// single redb write transaction. redb serialises write transactions, so two
// concurrent registrations cannot both observe "no regulator exists" and
// two concurrent approvals cannot both see a pending request.

pub mod error;
pub mod registry;
pub mod types;

pub use error::StoreError;
pub use registry::RegistryStore;
pub use types::{
    AdminRequest, Elevation, NewUser, RequestStatus, Role, RoleChange, User, UserSummary,
};

//! manifold-state — embedded state store for Manifold.
//!
//! Backed by [redb](https://docs.rs/redb), holds the manifest tree
//! (environments, applications, releases, deployments), the four lock
//! scopes, and the append-only event-sourcing log (ESL).
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{environment}/{application}`, `{application}/{version}`)
//! enable prefix scans for related records. The ESL table is keyed by its
//! `u64` sequence number, so iteration order is replay order.
//!
//! Every mutation goes through a [`StateWriter`] (one redb write
//! transaction). redb admits a single writer at a time, and readers
//! ([`StateReader`]) see a consistent snapshot that never includes an
//! uncommitted write. Both implement [`StateRead`], so code that validates
//! against current state reads its own uncommitted writes when handed the
//! writer.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{StateRead, StateReader, StateStore, StateWriter, epoch_secs};
pub use types::*;

//! manifold-repository — the transformer apply engine.
//!
//! Applies [`Transformer`]s to the manifest state held in a
//! [`manifold_state::StateStore`], gated by the lock hierarchy, and records
//! every applied transformer as a row of the event-sourcing log in the same
//! write transaction as its state change.
//!
//! # Components
//!
//! - **`transformer`** — the closed set of change operations and their event types
//! - **`esl`** — encode/decode between transformers and event-log rows
//! - **`locks`** — which lock scopes block a deploy
//! - **`transform`** — per-variant validation and mutation
//! - **`release_train`** — planning and fan-out of release trains
//! - **`apply`** — the batch and internal entry points, replay and history

pub mod apply;
pub mod error;
pub mod esl;
pub mod locks;
pub mod release_train;
pub mod transform;
pub mod transformer;
pub mod validation;

pub use apply::{Applied, Repository};
pub use error::{RepoResult, RepositoryError};
pub use esl::{EslEnvelope, EslError};
pub use locks::{BlockingLock, LockTarget};
pub use release_train::{SkipReason, TrainDeployment, TrainReport, TrainSkip};
pub use transform::StateChange;
pub use transformer::*;

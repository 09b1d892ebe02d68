//! manifold-health — readiness of Manifold's background components.
//!
//! # Architecture
//!
//! ```text
//! HealthServer (shared registry)
//!   ├── HealthReporter per component
//!   │   ├── report_health(Starting | Ready | Failed, message)
//!   │   └── retry(shutdown, work) with a swappable Backoff
//!   ├── GET /healthz  → 200/500 + {"<name>":{"health":..,"message":..}}
//!   └── GET /metrics  → background_job_ready{name=".."} 1|0
//! ```
//!
//! A [`Supervisor`] spawns named tasks, each with its own reporter, and
//! serves the router until shutdown.

pub mod backoff;
pub mod exposition;
pub mod health;
pub mod retry;
pub mod server;
pub mod supervisor;

pub use backoff::{Backoff, ExponentialBackoff};
pub use exposition::render_readiness;
pub use health::{Health, HealthReporter, HealthServer, Report};
pub use retry::{Permanent, permanent};
pub use server::health_router;
pub use supervisor::{Supervisor, SupervisorHandle};

//! Supervisor: runs named background tasks next to the health endpoint.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::health::{HealthReporter, HealthServer};
use crate::server::health_router;

type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type TaskFn = Box<dyn FnOnce(HealthReporter, watch::Receiver<bool>) -> TaskFuture + Send>;

/// A set of named background tasks sharing one health registry.
pub struct Supervisor {
    health: HealthServer,
    tasks: Vec<(String, TaskFn)>,
}

/// Running tasks started by [`Supervisor::spawn`].
pub struct SupervisorHandle {
    tasks: Vec<(String, JoinHandle<anyhow::Result<()>>)>,
}

impl Supervisor {
    pub fn new(health: HealthServer) -> Self {
        Self {
            health,
            tasks: Vec::new(),
        }
    }

    /// Register a task. It receives its own reporter and the shutdown signal.
    pub fn task<F, Fut>(mut self, name: &str, run: F) -> Self
    where
        F: FnOnce(HealthReporter, watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let run: TaskFn = Box::new(move |reporter, shutdown| Box::pin(run(reporter, shutdown)));
        self.tasks.push((name.to_string(), run));
        self
    }

    pub fn health(&self) -> &HealthServer {
        &self.health
    }

    /// Start every task. Reporters are registered before any task runs, so
    /// readiness is `Starting` until each task says otherwise.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> SupervisorHandle {
        let reporters: Vec<HealthReporter> = self
            .tasks
            .iter()
            .map(|(name, _)| self.health.reporter(name))
            .collect();

        let tasks = self
            .tasks
            .into_iter()
            .zip(reporters)
            .map(|((name, run), reporter)| {
                let handle = tokio::spawn(run(reporter, shutdown.clone()));
                info!(task = %name, "background task started");
                (name, handle)
            })
            .collect();

        SupervisorHandle { tasks }
    }

    /// Spawn every task and serve the health router on `addr` until shutdown.
    pub async fn run(self, addr: SocketAddr, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = health_router(self.health.clone());
        let handle = self.spawn(shutdown.clone());

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "health server listening");

        let mut server_shutdown = shutdown;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                // Also returns if the sender is dropped.
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await?;

        handle.join().await;
        Ok(())
    }
}

impl SupervisorHandle {
    /// Wait for every task to finish, logging failures.
    pub async fn join(self) {
        for (name, handle) in self.tasks {
            match handle.await {
                Ok(Ok(())) => info!(task = %name, "background task stopped"),
                Ok(Err(e)) => error!(task = %name, error = %e, "background task failed"),
                Err(e) => error!(task = %name, error = %e, "background task panicked"),
            }
        }
    }
}

use std::sync::Arc;

use actix_web::dev::ServerHandle;
use sqlx::{Pool, Postgres};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::worker::WorkerPool;

/// Handles graceful shutdown of the application
///
/// This module orchestrates graceful shutdown by:
/// 1. Listening for shutdown signals (SIGTERM, SIGINT/CTRL+C)
/// 2. Stopping the HTTP server (stops accepting new scrape requests)
/// 3. Draining the worker pool so in-flight runs finish and report
/// 4. Closing database connections
pub struct ShutdownCoordinator {
    server_handle: ServerHandle,
    server_task: JoinHandle<Result<(), std::io::Error>>,
    workers: Arc<WorkerPool>,
    pool: Option<Pool<Postgres>>,
}

impl ShutdownCoordinator {
    pub fn new(
        server_handle: ServerHandle,
        server_task: JoinHandle<Result<(), std::io::Error>>,
        workers: Arc<WorkerPool>,
        pool: Option<Pool<Postgres>>,
    ) -> Self {
        Self {
            server_handle,
            server_task,
            workers,
            pool,
        }
    }

    /// Wait for CTRL+C or SIGTERM (Unix only), then shut down
    ///
    /// Also returns when the server task ends on its own.
    pub async fn wait_for_shutdown(mut self) -> Result<(), std::io::Error> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install CTRL+C signal handler: {:?}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM signal handler: {:?}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received CTRL+C signal, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM signal, initiating graceful shutdown...");
            }
            result = &mut self.server_task => {
                error!("HTTP server exited unexpectedly: {:?}", result);
                self.workers.drain().await;
                if let Some(pool) = &self.pool {
                    pool.close().await;
                }
                return match result {
                    Ok(outcome) => outcome,
                    Err(e) => Err(std::io::Error::other(e)),
                };
            }
        }

        self.shutdown().await
    }

    /// Perform the actual shutdown sequence
    async fn shutdown(self) -> Result<(), std::io::Error> {
        // 1. Stop HTTP server (stop accepting new requests)
        info!("Stopping HTTP server (no longer accepting new requests)...");
        self.server_handle.stop(true).await;
        info!("HTTP server stopped accepting new requests");

        // 2. Let in-flight scrape runs finish and report their outcome
        self.workers.drain().await;

        // 3. Wait for HTTP server task to complete
        info!("Waiting for HTTP server to fully shut down...");
        match self.server_task.await {
            Ok(Ok(_)) => info!("HTTP server shut down successfully"),
            Ok(Err(e)) => error!("HTTP server encountered error during shutdown: {:?}", e),
            Err(e) => error!("HTTP server task panicked: {:?}", e),
        }

        // 4. Close database connections
        if let Some(pool) = self.pool {
            info!("Closing database connection pool...");
            pool.close().await;
            info!("Database connections closed");
        }

        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}

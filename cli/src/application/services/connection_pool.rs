//! All-or-nothing connection establishment for a fleet.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use crate::application::ports::{ProgressReporter, TargetConnection};
use crate::domain::error::ConnectionError;

/// Owns every connection of a run.
///
/// Construction is a pre-flight barrier: either every connection reaches
/// `Connected`, or every attempted one is disposed and the first error is
/// returned. Deployers borrow connections from the pool; only the pool
/// disposes them.
pub struct ConnectionPool<C> {
    connections: Vec<C>,
}

impl<C: TargetConnection> ConnectionPool<C> {
    /// Connect every target in order.
    ///
    /// # Errors
    ///
    /// Returns the `ConnectionError` of the first target that fails. Before
    /// returning, every connection attempted so far (including the failed
    /// one) has been disposed; later targets are never contacted.
    pub async fn establish(
        connections: Vec<C>,
        reporter: &impl ProgressReporter,
    ) -> Result<Self, ConnectionError> {
        for (index, conn) in connections.iter().enumerate() {
            let target = conn.target_name();
            reporter.step(&format!("[{target}] connecting..."));
            match conn.connect().await {
                Ok(()) => {
                    tracing::info!(target_name = target, "connected");
                    reporter.success(&format!("[{target}] connected"));
                }
                Err(e) => {
                    tracing::error!(target_name = target, error = %e, "connection failed, tearing down pool");
                    reporter.error(&e.to_string());
                    for attempted in &connections[..=index] {
                        attempted.dispose().await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self { connections })
    }

    #[must_use]
    pub fn connections(&self) -> &[C] {
        &self.connections
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Dispose every connection. Idempotent.
    pub async fn dispose_all(&self) {
        for conn in &self.connections {
            conn.dispose().await;
            tracing::debug!(target_name = conn.target_name(), "connection disposed");
        }
    }
}

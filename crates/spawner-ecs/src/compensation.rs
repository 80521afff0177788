//! Compensating stop for a run whose spawn did not complete.

use std::sync::Arc;
use std::time::Duration;

use spawner_core::Context;
use tracing::{info, warn};

use crate::backend::ClusterBackend;

/// Stops a submitted run unless disarmed.
///
/// The stop runs under its own bounded context, never the caller's: a
/// cancelled caller must still get its run cleaned up. If the guard is
/// dropped while armed (the spawn future itself was dropped), the stop is
/// scheduled on the current tokio runtime.
pub(crate) struct Compensation<B: ClusterBackend + 'static> {
    backend: Arc<B>,
    cluster: String,
    run_id: String,
    timeout: Duration,
    armed: bool,
}

impl<B: ClusterBackend + 'static> Compensation<B> {
    pub(crate) fn arm(
        backend: Arc<B>,
        cluster: impl Into<String>,
        run_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            cluster: cluster.into(),
            run_id: run_id.into(),
            timeout,
            armed: true,
        }
    }

    /// The run is committed; leave it alone.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }

    /// Stop the run now. Failures are logged, never returned.
    pub(crate) async fn fire(mut self) {
        self.armed = false;
        stop_run(&*self.backend, &self.cluster, &self.run_id, self.timeout).await;
    }
}

impl<B: ClusterBackend + 'static> Drop for Compensation<B> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                run_id = %self.run_id,
                cluster = %self.cluster,
                "No runtime left to stop abandoned run"
            );
            return;
        };
        let backend = Arc::clone(&self.backend);
        let cluster = std::mem::take(&mut self.cluster);
        let run_id = std::mem::take(&mut self.run_id);
        let timeout = self.timeout;
        handle.spawn(async move {
            stop_run(&*backend, &cluster, &run_id, timeout).await;
        });
    }
}

async fn stop_run<B: ClusterBackend + ?Sized>(
    backend: &B,
    cluster: &str,
    run_id: &str,
    timeout: Duration,
) {
    let ctx = Context::background().with_timeout(timeout);
    match backend.stop(&ctx, cluster, run_id).await {
        Ok(()) => info!(run_id = %run_id, cluster = %cluster, "Compensating stop issued"),
        Err(e) => warn!(
            run_id = %run_id,
            cluster = %cluster,
            error = %e,
            "Compensating stop failed; run may still be running"
        ),
    }
}

//! Fargate spawner: the spawn, ps and kill orchestration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use spawner_core::{Context, SpawnError, Spawner, World};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::backend::{ClusterBackend, RunRequest, UnitDescription};
use crate::compensation::Compensation;
use crate::error::Phase;
use crate::task::{Task, TaskDefinition};

/// Adapter name reported on every world this spawner creates.
pub const NAME: &str = concat!("ecs.fargate-v", env!("CARGO_PKG_VERSION"));

/// Wait between two status queries while a task starts.
pub const LAST_STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Deadline of the stop issued when a spawn fails after submission.
pub const COMPENSATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Port used in world addresses when the request names none.
pub const DEFAULT_SERVICE_PORT: &str = "8080";

/// Fargate spawner configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FargateConfig {
    /// Wait between two status queries.
    pub poll_interval: Duration,

    /// Deadline of a compensating stop.
    pub compensation_timeout: Duration,

    /// Port worlds listen on unless the request says otherwise.
    pub service_port: String,
}

impl Default for FargateConfig {
    fn default() -> Self {
        Self {
            poll_interval: LAST_STATUS_POLL_INTERVAL,
            compensation_timeout: COMPENSATION_TIMEOUT,
            service_port: DEFAULT_SERVICE_PORT.to_string(),
        }
    }
}

/// Spawner running worlds as Fargate tasks on a [`ClusterBackend`].
pub struct Fargate<B: ClusterBackend + 'static> {
    backend: Arc<B>,
    config: FargateConfig,
}

impl<B: ClusterBackend + 'static> Fargate<B> {
    /// Create a spawner with the default configuration.
    pub fn new(backend: B) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    /// Create a spawner sharing an existing backend.
    pub fn from_arc(backend: Arc<B>) -> Self {
        Self {
            backend,
            config: FargateConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: FargateConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the wait between status queries.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the default service port.
    pub fn with_service_port(mut self, port: impl Into<String>) -> Self {
        self.config.service_port = port.into();
        self
    }

    /// Set the deadline of compensating stops.
    pub fn with_compensation_timeout(mut self, timeout: Duration) -> Self {
        self.config.compensation_timeout = timeout;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &FargateConfig {
        &self.config
    }

    /// Submit the task, then bring it up under a compensation guard.
    async fn spawn_task(&self, ctx: &Context, def: &TaskDefinition) -> Result<World, SpawnError> {
        let submitted = match self.backend.submit_run(ctx, &RunRequest::from(def)).await {
            Ok(submitted) => submitted,
            Err(e) => {
                if !e.is_refusal() {
                    warn!(error = %e, "Run request outcome unknown, a task may have started");
                }
                return Err(e.into_spawn_error(Phase::Submit));
            }
        };

        let cluster = submitted
            .cluster_ref
            .clone()
            .unwrap_or_else(|| def.cluster.clone());
        info!(run_id = %submitted.run_id, cluster = %cluster, "Task submitted");

        // From here on every failure has to stop the task again.
        let compensation = Compensation::arm(
            Arc::clone(&self.backend),
            cluster.clone(),
            submitted.run_id.clone(),
            self.config.compensation_timeout,
        );

        match self.bring_up(ctx, def, &cluster, &submitted.run_id).await {
            Ok(world) => {
                compensation.disarm();
                info!(run_id = %world.id, addr = %world.addr, "World running");
                Ok(world)
            }
            Err(e) => {
                warn!(run_id = %submitted.run_id, error = %e, "Spawn failed, stopping task");
                compensation.fire().await;
                Err(e)
            }
        }
    }

    async fn bring_up(
        &self,
        ctx: &Context,
        def: &TaskDefinition,
        cluster: &str,
        run_id: &str,
    ) -> Result<World, SpawnError> {
        let unit = self.wait_running(ctx, cluster, run_id).await?;
        let host = self.resolve_host(ctx, &unit).await?;
        let port = def.service.as_deref().unwrap_or(self.config.service_port.as_str());

        let task = Task {
            arn: run_id.to_string(),
            cluster_arn: unit.cluster_ref.unwrap_or_else(|| cluster.to_string()),
            addr: Some(join_host_port(&host, port)),
        };
        task.into_world(self.name(), &def.cluster)
    }

    /// Poll until the task reports running.
    ///
    /// Bounded only by `ctx`; callers wanting a provisioning limit attach a
    /// deadline.
    async fn wait_running(
        &self,
        ctx: &Context,
        cluster: &str,
        run_id: &str,
    ) -> Result<UnitDescription, SpawnError> {
        let mut polls: u32 = 0;
        loop {
            tokio::select! {
                biased;
                err = ctx.done() => return Err(err.into()),
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }

            polls += 1;
            let unit = self
                .backend
                .describe(ctx, cluster, run_id)
                .await
                .map_err(|e| e.into_spawn_error(Phase::Poll))?;
            if unit.status.is_running() {
                debug!(run_id = %run_id, polls, "Task running");
                return Ok(unit);
            }
            debug!(run_id = %run_id, status = ?unit.status, polls, "Task not running yet");
        }
    }

    /// Public host of the unit's network interface. Never empty.
    async fn resolve_host(&self, ctx: &Context, unit: &UnitDescription) -> Result<String, SpawnError> {
        let eni = unit.network_interface_id()?;
        let host = self
            .backend
            .resolve_address(ctx, eni)
            .await
            .map_err(|e| e.into_spawn_error(Phase::Resolve))?;
        if host.is_empty() {
            return Err(SpawnError::Attachment(format!(
                "network interface {eni} of {} has no public address",
                unit.run_id
            )));
        }
        Ok(host)
    }

    /// World for a running unit found while listing. Address is best effort.
    async fn observe(&self, ctx: &Context, galaxy: &str, unit: UnitDescription) -> Result<World, SpawnError> {
        let addr = match self.resolve_host(ctx, &unit).await {
            Ok(host) => Some(join_host_port(&host, &self.config.service_port)),
            Err(SpawnError::Cancelled(e)) => return Err(e.into()),
            Err(e) => {
                warn!(run_id = %unit.run_id, error = %e, "Address unavailable, listing without it");
                None
            }
        };
        let task = Task {
            cluster_arn: unit.cluster_ref.unwrap_or_else(|| galaxy.to_string()),
            arn: unit.run_id,
            addr,
        };
        task.into_world(self.name(), galaxy)
    }
}

#[async_trait]
impl<B: ClusterBackend + 'static> Spawner for Fargate<B> {
    fn name(&self) -> &str {
        NAME
    }

    async fn spawn(&self, ctx: &Context, request: &[u8]) -> Result<World, SpawnError> {
        let def = TaskDefinition::from_slice(request)?;
        let span = info_span!("spawn", cluster = %def.cluster, task_definition = %def.name);
        self.spawn_task(ctx, &def).instrument(span).await
    }

    async fn kill(&self, ctx: &Context, world: &World) -> Result<(), SpawnError> {
        let task = Task::from_world(world)?;
        if world.spawner != NAME {
            debug!(spawner = %world.spawner, "Killing world created by another spawner version");
        }
        info!(run_id = %task.arn, cluster = %task.cluster_arn, "Stopping task");
        self.backend
            .stop(ctx, &task.cluster_arn, &task.arn)
            .await
            .map_err(|e| e.into_spawn_error(Phase::Other))
    }

    async fn ps(&self, ctx: &Context, galaxy: &str) -> Result<Vec<World>, SpawnError> {
        let mut worlds = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .backend
                .list_run_ids(ctx, galaxy, page_token.as_deref())
                .await
                .map_err(|e| e.into_spawn_error(Phase::Other))?;

            for run_id in &page.run_ids {
                let unit = self
                    .backend
                    .describe(ctx, galaxy, run_id)
                    .await
                    .map_err(|e| e.into_spawn_error(Phase::Other))?;
                if unit.status.is_terminal() {
                    debug!(run_id = %run_id, "Skipping stopped task");
                    continue;
                }
                if !unit.status.is_running() {
                    debug!(run_id = %run_id, status = ?unit.status, "Skipping task not running yet");
                    continue;
                }
                worlds.push(self.observe(ctx, galaxy, unit).await?);
            }

            match page.next_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(galaxy = %galaxy, count = worlds.len(), "Listed running worlds");
        Ok(worlds)
    }
}

/// `host:port`, bracketing IPv6 hosts.
fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

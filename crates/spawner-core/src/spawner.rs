//! The lifecycle contract every backend adapter implements.

use async_trait::async_trait;

use crate::{Context, SpawnError, World};

/// Launches, lists and tears down worlds on one cluster backend.
///
/// Every method honors `ctx`: an in-flight call or a pending poll aborts
/// as soon as the context ends.
#[async_trait]
pub trait Spawner: Send + Sync {
    /// Stable adapter name, including a version tag.
    fn name(&self) -> &str;

    /// Start a world from a JSON request payload.
    ///
    /// On success the world is ready to accept connections on `addr`. On
    /// failure nothing is left running.
    async fn spawn(&self, ctx: &Context, request: &[u8]) -> Result<World, SpawnError>;

    /// Stop a world previously returned by this spawner.
    async fn kill(&self, ctx: &Context, world: &World) -> Result<(), SpawnError>;

    /// List the running worlds in `galaxy`.
    async fn ps(&self, ctx: &Context, galaxy: &str) -> Result<Vec<World>, SpawnError>;
}

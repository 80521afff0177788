//! Spawn request and task coordinate types.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use spawner_core::{Details, SpawnError, World};

/// Accept `null` where a collection is expected.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Per-container override applied to the task definition at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerOverride {
    /// Name of a container in the task definition.
    pub name: String,

    /// Replaces the container's command.
    #[serde(default, deserialize_with = "nullable")]
    pub command: Vec<String>,

    /// Extra environment variables for the container.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub environment: BTreeMap<String, String>,
}

/// A spawn request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Task definition family and revision, e.g. `video-encoder:3`.
    pub name: String,

    /// Cluster to run in. Doubles as the world's galaxy.
    pub cluster: String,

    #[serde(default, deserialize_with = "nullable")]
    pub subnets: Vec<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub security_groups: Vec<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub overrides: Vec<ContainerOverride>,

    /// Port the world listens on; the spawner's default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl TaskDefinition {
    /// Decode and validate a request payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, SpawnError> {
        let definition: Self = serde_json::from_slice(payload)
            .map_err(|e| SpawnError::decode("task definition", e))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Check the fields the backend cannot do without.
    pub fn validate(&self) -> Result<(), SpawnError> {
        if self.name.trim().is_empty() {
            return Err(SpawnError::decode("task definition", "name is empty"));
        }
        if self.cluster.trim().is_empty() {
            return Err(SpawnError::decode("task definition", "cluster is empty"));
        }
        if let Some(i) = self.overrides.iter().position(|o| o.name.trim().is_empty()) {
            return Err(SpawnError::decode(
                "task definition",
                format!("override {i} has no container name"),
            ));
        }
        Ok(())
    }

    /// A filled-in request, handy as a template.
    pub fn example() -> Self {
        Self {
            name: "video-encoder".to_string(),
            cluster: "keepinmind".to_string(),
            subnets: vec!["subnet-1234".to_string(), "subnet-5678".to_string()],
            security_groups: vec!["sg-1234".to_string(), "sg-5678".to_string()],
            overrides: vec![ContainerOverride {
                name: "worker".to_string(),
                command: ["ffmpeg", "-i", "this", "-o", "that"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                environment: BTreeMap::new(),
            }],
            service: None,
        }
    }
}

/// Everything needed to reach or stop a running task.
///
/// Serialized into [`World::details`]; callers must keep it if they want to
/// kill the world later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub arn: String,
    pub cluster_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
}

impl Task {
    /// Wrap these coordinates in a caller-facing world.
    pub fn into_world(self, spawner: &str, galaxy: &str) -> Result<World, SpawnError> {
        let details = Details::encode(&self)?;
        Ok(World {
            id: self.arn,
            galaxy: galaxy.to_string(),
            addr: self.addr.unwrap_or_default(),
            spawner: spawner.to_string(),
            details,
        })
    }

    /// Recover the coordinates from a world this spawner produced.
    pub fn from_world(world: &World) -> Result<Self, SpawnError> {
        world.details.decode()
    }
}

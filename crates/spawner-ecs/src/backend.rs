//! The cluster execution backend the Fargate spawner drives.
//!
//! Implement [`ClusterBackend`] to run worlds on something other than the
//! real ECS API, e.g. a scripted double in tests.

use async_trait::async_trait;
use spawner_core::{Context, SpawnError, UnitStatus};

use crate::error::BackendError;
use crate::task::{ContainerOverride, TaskDefinition};

/// Attachment type that links a task to its network interface.
pub const ENI_ATTACHMENT_TYPE: &str = "ElasticNetworkInterface";

/// Attachment detail holding the network interface id.
pub const NETWORK_INTERFACE_ID_DETAIL: &str = "networkInterfaceId";

/// Everything needed to submit one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub task_definition: String,
    pub cluster: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub overrides: Vec<ContainerOverride>,
}

impl From<&TaskDefinition> for RunRequest {
    fn from(def: &TaskDefinition) -> Self {
        Self {
            task_definition: def.name.clone(),
            cluster: def.cluster.clone(),
            subnets: def.subnets.clone(),
            security_groups: def.security_groups.clone(),
            overrides: def.overrides.clone(),
        }
    }
}

/// A run the backend accepted. Not necessarily running yet.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedRun {
    pub run_id: String,
    /// Backend's own reference to the cluster, when it reports one.
    pub cluster_ref: Option<String>,
}

/// One key/value pair of attachment metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentDetail {
    pub name: String,
    pub value: String,
}

/// Backend metadata linking a unit to a resource such as a network interface.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub kind: String,
    pub details: Vec<AttachmentDetail>,
}

impl Attachment {
    /// A network interface attachment pointing at `eni`.
    pub fn network_interface(eni: impl Into<String>) -> Self {
        Self {
            kind: ENI_ATTACHMENT_TYPE.to_string(),
            details: vec![AttachmentDetail {
                name: NETWORK_INTERFACE_ID_DETAIL.to_string(),
                value: eni.into(),
            }],
        }
    }

    /// Value of the first detail called `name`.
    pub fn detail(&self, name: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }
}

/// Current state of a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDescription {
    pub run_id: String,
    pub cluster_ref: Option<String>,
    pub status: UnitStatus,
    pub attachments: Vec<Attachment>,
}

impl UnitDescription {
    /// Id of the unit's network interface.
    ///
    /// The first network interface attachment wins; any others are ignored.
    pub fn network_interface_id(&self) -> Result<&str, SpawnError> {
        let attachment = self
            .attachments
            .iter()
            .find(|a| a.kind == ENI_ATTACHMENT_TYPE)
            .ok_or_else(|| {
                SpawnError::Attachment(format!(
                    "missing attachment: {} has no {ENI_ATTACHMENT_TYPE}",
                    self.run_id
                ))
            })?;
        match attachment.detail(NETWORK_INTERFACE_ID_DETAIL) {
            Some(eni) if !eni.is_empty() => Ok(eni),
            _ => Err(SpawnError::Attachment(format!(
                "missing interface id: {ENI_ATTACHMENT_TYPE} attachment of {} has no {NETWORK_INTERFACE_ID_DETAIL}",
                self.run_id
            ))),
        }
    }
}

/// One page of run identifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunIdPage {
    pub run_ids: Vec<String>,
    /// Continuation token; `None` on the last page.
    pub next_token: Option<String>,
}

/// Remote service that runs units in clusters.
///
/// Every call honors `ctx` and returns [`BackendError::Cancelled`] once it
/// has ended.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Submit a run. Returns as soon as the backend has accepted it.
    async fn submit_run(
        &self,
        ctx: &Context,
        request: &RunRequest,
    ) -> Result<SubmittedRun, BackendError>;

    /// Current status and attachments of a unit.
    async fn describe(
        &self,
        ctx: &Context,
        cluster: &str,
        run_id: &str,
    ) -> Result<UnitDescription, BackendError>;

    /// Ask the backend to stop a unit.
    async fn stop(&self, ctx: &Context, cluster: &str, run_id: &str) -> Result<(), BackendError>;

    /// One page of the unit ids in `cluster`.
    async fn list_run_ids(
        &self,
        ctx: &Context,
        cluster: &str,
        page_token: Option<&str>,
    ) -> Result<RunIdPage, BackendError>;

    /// Public address of a network attachment. May be empty if it has none.
    async fn resolve_address(
        &self,
        ctx: &Context,
        attachment_id: &str,
    ) -> Result<String, BackendError>;
}

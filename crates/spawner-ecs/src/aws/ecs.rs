//! ECS JSON wire types.

use std::fmt;

use serde::{Deserialize, Serialize};
use spawner_core::UnitStatus;

use crate::backend::{Attachment, AttachmentDetail, RunRequest, UnitDescription};
use crate::error::BackendError;

pub(crate) const TARGET_PREFIX: &str = "AmazonEC2ContainerServiceV20141113";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RunTaskInput {
    pub cluster: String,
    pub task_definition: String,
    pub launch_type: &'static str,
    pub count: u32,
    pub network_configuration: NetworkConfiguration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<TaskOverride>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NetworkConfiguration {
    pub awsvpc_configuration: AwsVpcConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AwsVpcConfiguration {
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskOverride {
    pub container_overrides: Vec<ContainerOverride>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContainerOverride {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<KeyValuePair>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct KeyValuePair {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl From<&RunRequest> for RunTaskInput {
    fn from(request: &RunRequest) -> Self {
        let container_overrides: Vec<_> = request
            .overrides
            .iter()
            .map(|o| ContainerOverride {
                name: o.name.clone(),
                command: o.command.clone(),
                environment: o
                    .environment
                    .iter()
                    .map(|(name, value)| KeyValuePair {
                        name: Some(name.clone()),
                        value: Some(value.clone()),
                    })
                    .collect(),
            })
            .collect();

        Self {
            cluster: request.cluster.clone(),
            task_definition: request.task_definition.clone(),
            launch_type: "FARGATE",
            count: 1,
            network_configuration: NetworkConfiguration {
                awsvpc_configuration: AwsVpcConfiguration {
                    subnets: request.subnets.clone(),
                    security_groups: request.security_groups.clone(),
                    assign_public_ip: "ENABLED",
                },
            },
            overrides: (!container_overrides.is_empty())
                .then_some(TaskOverride { container_overrides }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DescribeTasksInput {
    pub cluster: String,
    pub tasks: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StopTaskInput {
    pub cluster: String,
    pub task: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListTasksInput {
    pub cluster: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListTasksOutput {
    #[serde(default)]
    pub task_arns: Vec<String>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Answer to both RunTask and DescribeTasks.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TasksOutput {
    #[serde(default)]
    pub tasks: Vec<EcsTask>,
    #[serde(default)]
    pub failures: Vec<Failure>,
}

impl TasksOutput {
    /// The single task asked for, or the reason there is none.
    pub fn into_task(self, operation: &str) -> Result<EcsTask, BackendError> {
        match (self.tasks.into_iter().next(), self.failures.first()) {
            (Some(task), _) => Ok(task),
            (None, Some(failure)) => Err(BackendError::Failure(format!("{operation}: {failure}"))),
            (None, None) => Err(BackendError::Failure(format!(
                "{operation}: unable to fulfil request"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EcsTask {
    pub task_arn: String,
    #[serde(default)]
    pub cluster_arn: Option<String>,
    #[serde(default)]
    pub last_status: Option<String>,
    #[serde(default)]
    pub attachments: Vec<EcsAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EcsAttachment {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub details: Vec<KeyValuePair>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Failure {
    #[serde(default)]
    pub arn: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason.as_deref().unwrap_or("unknown failure"))?;
        if let Some(arn) = &self.arn {
            write!(f, " ({arn})")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// ECS error body, e.g. `{"__type":"ClientException","message":"..."}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(rename = "__type", default)]
    pub kind: Option<String>,
    #[serde(alias = "Message", default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn into_error(self, status: u16) -> BackendError {
        // `__type` may carry a namespace: "com.amazonaws.ecs#ClientException".
        let code = self
            .kind
            .as_deref()
            .map(|k| k.rsplit('#').next().unwrap_or(k).to_string())
            .unwrap_or_else(|| format!("HTTP {status}"));
        BackendError::Api {
            code,
            message: self.message.unwrap_or_default(),
        }
    }
}

/// Map an ECS `lastStatus` onto the unit lifecycle.
pub(crate) fn unit_status(last_status: Option<&str>) -> UnitStatus {
    match last_status {
        Some("PROVISIONING" | "PENDING" | "ACTIVATING") => UnitStatus::Pending,
        Some("RUNNING") => UnitStatus::Running,
        Some("DEACTIVATING" | "STOPPING" | "DEPROVISIONING") => UnitStatus::Stopping,
        Some("STOPPED" | "DELETED") => UnitStatus::Stopped,
        _ => UnitStatus::Unknown,
    }
}

impl From<EcsTask> for UnitDescription {
    fn from(task: EcsTask) -> Self {
        Self {
            status: unit_status(task.last_status.as_deref()),
            run_id: task.task_arn,
            cluster_ref: task.cluster_arn,
            attachments: task
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    kind: a.kind.unwrap_or_default(),
                    details: a
                        .details
                        .into_iter()
                        .filter_map(|kv| {
                            Some(AttachmentDetail {
                                name: kv.name?,
                                value: kv.value.unwrap_or_default(),
                            })
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

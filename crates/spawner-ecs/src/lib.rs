//! ECS Fargate spawner.
//!
//! Runs each world as a Fargate task. Spawning submits the task, polls
//! until it is running, resolves the public address of its network
//! interface and, if anything after the submission fails, stops the task
//! again before reporting the error.
//!
//! The orchestration in [`Fargate`] only talks to a [`ClusterBackend`];
//! [`AwsBackend`] is the implementation that calls the real ECS and EC2
//! APIs.
//!
//! # Example
//!
//! ```rust,no_run
//! use spawner_core::{Context, Spawner};
//! use spawner_ecs::{AwsBackend, AwsConfig, Fargate};
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = AwsBackend::new(AwsConfig::from_env()?);
//!     let fargate = Fargate::new(backend).with_service_port("8080");
//!
//!     let request = br#"{"name":"svc:3","cluster":"c1","subnets":["sn-1"],"security_groups":["sg-1"]}"#;
//!     let world = fargate.spawn(&Context::background(), request).await?;
//!     println!("{} listening on {}", world.id, world.addr);
//!     Ok(())
//! }
//! ```

mod aws;
mod backend;
mod compensation;
mod error;
mod fargate;
mod task;

#[cfg(test)]
mod testing;

// Re-export main types
pub use aws::{AwsBackend, AwsConfig, CredentialSource, Credentials};
pub use backend::{
    Attachment, AttachmentDetail, ClusterBackend, RunIdPage, RunRequest, SubmittedRun,
    UnitDescription, ENI_ATTACHMENT_TYPE, NETWORK_INTERFACE_ID_DETAIL,
};
pub use error::{BackendError, Phase};
pub use fargate::{
    Fargate, FargateConfig, COMPENSATION_TIMEOUT, DEFAULT_SERVICE_PORT, LAST_STATUS_POLL_INTERVAL,
    NAME,
};
pub use task::{ContainerOverride, Task, TaskDefinition};

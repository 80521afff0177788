//! ECS and EC2 over HTTPS.
//!
//! ECS is called with its JSON 1.1 protocol, EC2 with the Query protocol.
//! Both are signed with Signature Version 4, with keys taken from the
//! environment, the shared AWS files, the ECS task role or the EC2 instance
//! profile.

mod client;
mod config;
mod credentials;
mod ec2;
mod ecs;
mod profile;
mod sigv4;

pub use client::AwsBackend;
pub use config::{AwsConfig, CredentialSource, Credentials};

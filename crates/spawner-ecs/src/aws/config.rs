//! Region, credentials and endpoints.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::profile::Profile;
use crate::error::BackendError;

/// Host serving task-role credentials to ECS containers.
const CONTAINER_CREDENTIALS_HOST: &str = "http://169.254.170.2";

/// EC2 instance metadata service.
const INSTANCE_METADATA_ENDPOINT: &str = "http://169.254.169.254";

/// AWS access keys, possibly temporary.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// When temporary keys stop working.
    pub expiry: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expiry: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Where the backend gets its keys from.
#[derive(Clone, PartialEq)]
pub enum CredentialSource {
    /// Keys from the environment or a shared credentials file.
    Static(Credentials),
    /// The ECS container credentials endpoint (task role).
    Container {
        url: String,
        authorization: Option<String>,
    },
    /// The EC2 instance metadata service (instance profile).
    InstanceMetadata { endpoint: String },
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(credentials) => f.debug_tuple("Static").field(credentials).finish(),
            Self::Container { url, authorization } => f
                .debug_struct("Container")
                .field("url", url)
                .field("authorization", &authorization.as_ref().map(|_| "<redacted>"))
                .finish(),
            Self::InstanceMetadata { endpoint } => f
                .debug_struct("InstanceMetadata")
                .field("endpoint", endpoint)
                .finish(),
        }
    }
}

impl CredentialSource {
    /// Pick the first source that applies: environment keys, profile keys,
    /// container endpoint, then instance metadata.
    fn detect(
        var: &dyn Fn(&str) -> Option<String>,
        profile: &Profile,
    ) -> Result<Self, BackendError> {
        match (var("AWS_ACCESS_KEY_ID"), var("AWS_SECRET_ACCESS_KEY")) {
            (Some(id), Some(secret)) => {
                return Ok(Self::Static(Credentials::new(id, secret, var("AWS_SESSION_TOKEN"))))
            }
            (Some(_), None) => {
                return Err(BackendError::Config("AWS_SECRET_ACCESS_KEY is not set".to_string()))
            }
            (None, Some(_)) => {
                return Err(BackendError::Config("AWS_ACCESS_KEY_ID is not set".to_string()))
            }
            (None, None) => {}
        }

        if let Some(credentials) = profile.credentials() {
            return Ok(Self::Static(credentials));
        }

        if let Some(path) = var("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI") {
            return Ok(Self::Container {
                url: format!("{CONTAINER_CREDENTIALS_HOST}{path}"),
                authorization: None,
            });
        }
        if let Some(url) = var("AWS_CONTAINER_CREDENTIALS_FULL_URI") {
            return Ok(Self::Container {
                url,
                authorization: var("AWS_CONTAINER_AUTHORIZATION_TOKEN"),
            });
        }

        if var("AWS_EC2_METADATA_DISABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            return Err(BackendError::Config(
                "no AWS credentials found in the environment, shared files or container endpoint"
                    .to_string(),
            ));
        }
        let endpoint = var("AWS_EC2_METADATA_SERVICE_ENDPOINT")
            .unwrap_or_else(|| INSTANCE_METADATA_ENDPOINT.to_string());
        Ok(Self::InstanceMetadata {
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

/// Where and as whom to call AWS.
#[derive(Debug, Clone, PartialEq)]
pub struct AwsConfig {
    pub region: String,
    pub credentials: CredentialSource,
    /// Overrides `https://ecs.<region>.amazonaws.com`.
    pub ecs_endpoint: Option<String>,
    /// Overrides `https://ec2.<region>.amazonaws.com`.
    pub ec2_endpoint: Option<String>,
}

impl AwsConfig {
    /// Read the configuration from the process environment and the shared
    /// AWS files.
    ///
    /// The region comes from `AWS_REGION`, `AWS_DEFAULT_REGION` or the
    /// profile's `region`. Credentials follow the usual AWS order:
    /// `AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY` (`AWS_SESSION_TOKEN`),
    /// the profile (`AWS_PROFILE`, default `default`) in
    /// `AWS_SHARED_CREDENTIALS_FILE`/`AWS_CONFIG_FILE` or `~/.aws`, the ECS
    /// container endpoint, then EC2 instance metadata. Endpoints can be
    /// overridden with `SPAWNER_ECS_ENDPOINT` and `SPAWNER_EC2_ENDPOINT`.
    pub fn from_env() -> Result<Self, BackendError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BackendError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let explicit_profile = var("AWS_PROFILE");
        let profile_name = explicit_profile.as_deref().unwrap_or("default");
        let home = var("HOME").or_else(|| var("USERPROFILE"));
        let shared_file = |key: &str, name: &str| {
            var(key)
                .map(PathBuf::from)
                .or_else(|| home.as_ref().map(|h| PathBuf::from(h).join(".aws").join(name)))
        };
        let profile = Profile::load(
            shared_file("AWS_SHARED_CREDENTIALS_FILE", "credentials").as_deref(),
            shared_file("AWS_CONFIG_FILE", "config").as_deref(),
            profile_name,
        )?;
        if explicit_profile.is_some() && profile.is_empty() {
            return Err(BackendError::Config(format!("profile {profile_name} not found")));
        }

        let region = var("AWS_REGION")
            .or_else(|| var("AWS_DEFAULT_REGION"))
            .or_else(|| profile.get("region").map(str::to_string))
            .ok_or_else(|| BackendError::Config("AWS_REGION is not set".to_string()))?;

        Ok(Self {
            region,
            credentials: CredentialSource::detect(&var, &profile)?,
            ecs_endpoint: var("SPAWNER_ECS_ENDPOINT"),
            ec2_endpoint: var("SPAWNER_EC2_ENDPOINT"),
        })
    }

    pub fn ecs_endpoint(&self) -> String {
        self.ecs_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://ecs.{}.amazonaws.com", self.region))
    }

    pub fn ec2_endpoint(&self) -> String {
        self.ec2_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://ec2.{}.amazonaws.com", self.region))
    }
}

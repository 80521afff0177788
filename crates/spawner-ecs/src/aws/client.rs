//! Cluster backend calling the real ECS and EC2 APIs.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use spawner_core::Context;
use tracing::debug;

use super::config::AwsConfig;
use super::credentials::CredentialsCache;
use super::ec2;
use super::ecs::{
    self, DescribeTasksInput, ErrorBody, ListTasksInput, ListTasksOutput, RunTaskInput,
    StopTaskInput, TasksOutput,
};
use super::sigv4::{uri_encode, Signer};
use crate::backend::{ClusterBackend, RunIdPage, RunRequest, SubmittedRun, UnitDescription};
use crate::error::BackendError;

const STOP_REASON: &str = "Stopped by spawner";

/// [`ClusterBackend`] backed by ECS (tasks) and EC2 (network interfaces).
pub struct AwsBackend {
    http: reqwest::Client,
    config: AwsConfig,
    credentials: CredentialsCache,
}

impl AwsBackend {
    /// Create a backend with a default HTTP client.
    pub fn new(config: AwsConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a backend sharing an existing HTTP client.
    pub fn with_client(http: reqwest::Client, config: AwsConfig) -> Self {
        let credentials = CredentialsCache::new(config.credentials.clone());
        Self {
            http,
            config,
            credentials,
        }
    }

    /// Call one ECS action.
    async fn ecs<Req, Resp>(&self, ctx: &Context, action: &str, input: &Req) -> Result<Resp, BackendError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(input)
            .map_err(|e| BackendError::Malformed(format!("{action} request: {e}")))?;
        let headers = [
            ("content-type", "application/x-amz-json-1.1".to_string()),
            ("x-amz-target", format!("{}.{action}", ecs::TARGET_PREFIX)),
        ];

        let (status, body) = self
            .send(ctx, "ecs", &self.config.ecs_endpoint(), &headers, payload)
            .await?;
        if !status.is_success() {
            let error = serde_json::from_slice::<ErrorBody>(&body)
                .map(|b| b.into_error(status.as_u16()))
                .unwrap_or_else(|_| BackendError::Api {
                    code: format!("HTTP {}", status.as_u16()),
                    message: String::from_utf8_lossy(&body).into_owned(),
                });
            return Err(error);
        }
        serde_json::from_slice(&body)
            .map_err(|e| BackendError::Malformed(format!("{action} response: {e}")))
    }

    /// Call one EC2 action and return the raw XML answer.
    async fn ec2(&self, ctx: &Context, action: &str, params: &[(&str, &str)]) -> Result<String, BackendError> {
        let mut form = format!("Action={action}&Version={}", ec2::API_VERSION);
        for (name, value) in params {
            form.push_str(&format!("&{}={}", uri_encode(name), uri_encode(value)));
        }
        let headers = [(
            "content-type",
            "application/x-www-form-urlencoded; charset=utf-8".to_string(),
        )];

        let (status, body) = self
            .send(ctx, "ec2", &self.config.ec2_endpoint(), &headers, form.into_bytes())
            .await?;
        let xml = String::from_utf8_lossy(&body).into_owned();
        if !status.is_success() {
            return Err(ec2::error_from_body(status.as_u16(), &xml));
        }
        Ok(xml)
    }

    /// Sign and POST `payload` to `endpoint`, honoring `ctx`.
    async fn send(
        &self,
        ctx: &Context,
        service: &str,
        endpoint: &str,
        headers: &[(&str, String)],
        payload: Vec<u8>,
    ) -> Result<(reqwest::StatusCode, Vec<u8>), BackendError> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| BackendError::Config(format!("endpoint {endpoint}: {e}")))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(BackendError::Config(format!("endpoint {endpoint} has no host"))),
        };

        let credentials = self.credentials.get(ctx).await?;
        let signer = Signer::new(&credentials, &self.config.region, service);
        let signed = signer.sign(Utc::now(), "POST", &host, headers, &payload)?;

        let mut request = self.http.post(url);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        for (name, value) in &signed {
            request = request.header(name.as_str(), value);
        }

        debug!(service = %service, endpoint = %endpoint, "AWS request");
        let response = ctx.run(request.body(payload).send()).await??;
        let status = response.status();
        let body = ctx.run(response.bytes()).await??;
        Ok((status, body.to_vec()))
    }
}

#[async_trait]
impl ClusterBackend for AwsBackend {
    async fn submit_run(
        &self,
        ctx: &Context,
        request: &RunRequest,
    ) -> Result<SubmittedRun, BackendError> {
        let output: TasksOutput = self
            .ecs(ctx, "RunTask", &RunTaskInput::from(request))
            .await?;
        // A single RunTask may start several tasks; only one is asked for.
        let task = output.into_task("run task")?;
        Ok(SubmittedRun {
            run_id: task.task_arn,
            cluster_ref: task.cluster_arn,
        })
    }

    async fn describe(
        &self,
        ctx: &Context,
        cluster: &str,
        run_id: &str,
    ) -> Result<UnitDescription, BackendError> {
        let input = DescribeTasksInput {
            cluster: cluster.to_string(),
            tasks: vec![run_id.to_string()],
        };
        let output: TasksOutput = self.ecs(ctx, "DescribeTasks", &input).await?;
        Ok(output.into_task("describe task")?.into())
    }

    async fn stop(&self, ctx: &Context, cluster: &str, run_id: &str) -> Result<(), BackendError> {
        let input = StopTaskInput {
            cluster: cluster.to_string(),
            task: run_id.to_string(),
            reason: STOP_REASON.to_string(),
        };
        let _: IgnoredAny = self.ecs(ctx, "StopTask", &input).await?;
        Ok(())
    }

    async fn list_run_ids(
        &self,
        ctx: &Context,
        cluster: &str,
        page_token: Option<&str>,
    ) -> Result<RunIdPage, BackendError> {
        let input = ListTasksInput {
            cluster: cluster.to_string(),
            next_token: page_token.map(str::to_string),
        };
        let output: ListTasksOutput = self.ecs(ctx, "ListTasks", &input).await?;
        Ok(RunIdPage {
            run_ids: output.task_arns,
            next_token: output.next_token,
        })
    }

    async fn resolve_address(
        &self,
        ctx: &Context,
        attachment_id: &str,
    ) -> Result<String, BackendError> {
        let xml = self
            .ec2(
                ctx,
                "DescribeNetworkInterfaces",
                &[("NetworkInterfaceId.1", attachment_id)],
            )
            .await?;
        ec2::public_ip(attachment_id, &xml)
    }
}

//! Temporary credentials from the ECS container endpoint or EC2 instance
//! metadata, cached until shortly before they expire.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use spawner_core::Context;
use tokio::sync::Mutex;
use tracing::debug;

use super::config::{CredentialSource, Credentials};
use crate::error::BackendError;

/// Keys expiring sooner than this are fetched again.
const REFRESH_MARGIN_SECS: i64 = 300;

const CONTAINER_TIMEOUT: Duration = Duration::from_secs(5);

/// Instance metadata answers fast or not at all (off EC2).
const INSTANCE_METADATA_TIMEOUT: Duration = Duration::from_secs(1);

const METADATA_TOKEN_TTL_SECS: &str = "21600";

/// Credentials document served by both endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TemporaryCredentials {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    access_key_id: String,
    #[serde(default)]
    secret_access_key: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
}

fn parse_credentials(source: &str, body: &[u8]) -> Result<Credentials, BackendError> {
    let doc: TemporaryCredentials = serde_json::from_slice(body)
        .map_err(|e| BackendError::Malformed(format!("{source}: {e}")))?;
    if let Some(code) = doc.code.as_deref().filter(|c| *c != "Success") {
        return Err(BackendError::Failure(format!(
            "{source}: {code}: {}",
            doc.message.unwrap_or_default()
        )));
    }
    if doc.access_key_id.is_empty() || doc.secret_access_key.is_empty() {
        return Err(BackendError::Malformed(format!("{source}: missing keys")));
    }
    Ok(Credentials {
        access_key_id: doc.access_key_id,
        secret_access_key: doc.secret_access_key,
        session_token: doc.token,
        expiry: doc.expiration,
    })
}

fn is_fresh(credentials: &Credentials, now: DateTime<Utc>) -> bool {
    credentials
        .expiry
        .map_or(true, |expiry| (expiry - now).num_seconds() > REFRESH_MARGIN_SECS)
}

/// Resolves a [`CredentialSource`] to keys, reusing them while valid.
pub(crate) struct CredentialsCache {
    source: CredentialSource,
    /// Link-local endpoints are never reached through a proxy.
    http: reqwest::Client,
    cached: Mutex<Option<Credentials>>,
}

impl CredentialsCache {
    pub(crate) fn new(source: CredentialSource) -> Self {
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            source,
            http,
            cached: Mutex::new(None),
        }
    }

    pub(crate) async fn get(&self, ctx: &Context) -> Result<Credentials, BackendError> {
        if let CredentialSource::Static(credentials) = &self.source {
            return Ok(credentials.clone());
        }

        let mut cached = ctx.run(self.cached.lock()).await?;
        if let Some(credentials) = cached.as_ref().filter(|c| is_fresh(c, Utc::now())) {
            return Ok(credentials.clone());
        }

        let fresh = ctx.run(fetch(&self.http, &self.source)).await??;
        debug!(expiry = ?fresh.expiry, "Refreshed AWS credentials");
        *cached = Some(fresh.clone());
        Ok(fresh)
    }
}

async fn fetch(http: &reqwest::Client, source: &CredentialSource) -> Result<Credentials, BackendError> {
    match source {
        CredentialSource::Static(credentials) => Ok(credentials.clone()),
        CredentialSource::Container { url, authorization } => {
            let mut request = http.get(url).timeout(CONTAINER_TIMEOUT);
            if let Some(token) = authorization {
                request = request.header("authorization", token);
            }
            let body = read_ok("container credentials", request.send().await?).await?;
            parse_credentials("container credentials", &body)
        }
        CredentialSource::InstanceMetadata { endpoint } => instance_credentials(http, endpoint).await,
    }
}

async fn instance_credentials(http: &reqwest::Client, endpoint: &str) -> Result<Credentials, BackendError> {
    let response = http
        .put(format!("{endpoint}/latest/api/token"))
        .header("x-aws-ec2-metadata-token-ttl-seconds", METADATA_TOKEN_TTL_SECS)
        .timeout(INSTANCE_METADATA_TIMEOUT)
        .send()
        .await
        .map_err(|e| {
            BackendError::Config(format!(
                "no AWS credentials found (instance metadata unreachable: {e})"
            ))
        })?;
    let token = read_ok("instance metadata token", response).await?;
    let token = String::from_utf8_lossy(&token).trim().to_string();

    let roles_url = format!("{endpoint}/latest/meta-data/iam/security-credentials/");
    let roles = metadata(http, &roles_url, &token).await?;
    let role = String::from_utf8_lossy(&roles)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BackendError::Config("no IAM role attached to this instance".to_string()))?;

    let body = metadata(http, &format!("{roles_url}{role}"), &token).await?;
    parse_credentials("instance metadata", &body)
}

async fn metadata(http: &reqwest::Client, url: &str, token: &str) -> Result<Vec<u8>, BackendError> {
    let response = http
        .get(url)
        .header("x-aws-ec2-metadata-token", token)
        .timeout(INSTANCE_METADATA_TIMEOUT)
        .send()
        .await?;
    read_ok("instance metadata", response).await
}

async fn read_ok(what: &str, response: reqwest::Response) -> Result<Vec<u8>, BackendError> {
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(BackendError::Failure(format!("{what}: HTTP {}", status.as_u16())));
    }
    Ok(body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const CONTAINER_DOC: &str = r#"{
        "RoleArn": "arn:aws:iam::123456789012:role/spawner",
        "AccessKeyId": "ASIATASK",
        "SecretAccessKey": "task-secret",
        "Token": "task-token",
        "Expiration": "2099-01-01T00:00:00Z"
    }"#;

    /// Answer one HTTP request per entry, in order, then return what was
    /// received.
    async fn serve(answers: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for (status, body) in answers {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut received = Vec::new();
                let mut chunk = [0u8; 1024];
                while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    received.extend_from_slice(&chunk[..n]);
                }
                requests.push(String::from_utf8_lossy(&received).into_owned());
                let response = format!(
                    "HTTP/1.1 {status} Answer\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
            requests
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn test_parse_container_document() {
        let credentials = parse_credentials("container credentials", CONTAINER_DOC.as_bytes()).unwrap();
        assert_eq!(credentials.access_key_id, "ASIATASK");
        assert_eq!(credentials.session_token.as_deref(), Some("task-token"));
        assert_eq!(
            credentials.expiry.map(|e| e.to_rfc3339()),
            Some("2099-01-01T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_parse_failed_metadata_document() {
        let body = br#"{"Code":"AssumeRoleUnauthorizedAccess","Message":"denied","LastUpdated":"2024-01-01T00:00:00Z"}"#;
        let err = parse_credentials("instance metadata", body).unwrap_err();
        assert_eq!(err.to_string(), "instance metadata: AssumeRoleUnauthorizedAccess: denied");
    }

    #[test]
    fn test_freshness() {
        let now = Utc::now();
        let mut credentials = Credentials::new("id", "secret", None);
        assert!(is_fresh(&credentials, now));

        credentials.expiry = Some(now + chrono::Duration::hours(1));
        assert!(is_fresh(&credentials, now));

        credentials.expiry = Some(now + chrono::Duration::minutes(2));
        assert!(!is_fresh(&credentials, now));
    }

    #[tokio::test]
    async fn test_container_credentials_are_cached() {
        let (base, server) = serve(vec![(200, CONTAINER_DOC.to_string())]).await;
        let cache = CredentialsCache::new(CredentialSource::Container {
            url: format!("{base}/v2/credentials/abc"),
            authorization: Some("Bearer xyz".to_string()),
        });
        let ctx = Context::background();

        let first = cache.get(&ctx).await.unwrap();
        let second = cache.get(&ctx).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.access_key_id, "ASIATASK");

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("GET /v2/credentials/abc "));
        assert!(requests[0].to_ascii_lowercase().contains("authorization: bearer xyz"));
    }

    #[tokio::test]
    async fn test_expiring_credentials_are_refetched() {
        let soon = (Utc::now() + chrono::Duration::minutes(1)).to_rfc3339();
        let expiring = format!(
            r#"{{"AccessKeyId":"ASIAOLD","SecretAccessKey":"s","Token":"t","Expiration":"{soon}"}}"#
        );
        let (base, server) = serve(vec![(200, expiring), (200, CONTAINER_DOC.to_string())]).await;
        let cache = CredentialsCache::new(CredentialSource::Container {
            url: format!("{base}/creds"),
            authorization: None,
        });
        let ctx = Context::background();

        assert_eq!(cache.get(&ctx).await.unwrap().access_key_id, "ASIAOLD");
        assert_eq!(cache.get(&ctx).await.unwrap().access_key_id, "ASIATASK");
        assert_eq!(server.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_instance_metadata_flow() {
        let doc = CONTAINER_DOC.replace("{", r#"{"Code": "Success","#);
        let (base, server) = serve(vec![
            (200, "imds-token".to_string()),
            (200, "spawner-role\n".to_string()),
            (200, doc),
        ])
        .await;
        let cache = CredentialsCache::new(CredentialSource::InstanceMetadata { endpoint: base });

        let credentials = cache.get(&Context::background()).await.unwrap();
        assert_eq!(credentials.secret_access_key, "task-secret");

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("PUT /latest/api/token "));
        assert!(requests[0].contains("x-aws-ec2-metadata-token-ttl-seconds: 21600"));
        assert!(requests[1].starts_with("GET /latest/meta-data/iam/security-credentials/ "));
        assert!(requests[2].starts_with("GET /latest/meta-data/iam/security-credentials/spawner-role "));
        assert!(requests[2].contains("x-aws-ec2-metadata-token: imds-token"));
    }

    #[tokio::test]
    async fn test_static_source_skips_network() {
        let credentials = Credentials::new("AKIDEXAMPLE", "secret", None);
        let cache = CredentialsCache::new(CredentialSource::Static(credentials.clone()));
        let ctx = Context::background();
        ctx.cancel();

        assert_eq!(cache.get(&ctx).await.unwrap(), credentials);
    }

    #[tokio::test]
    async fn test_failed_endpoint() {
        let (base, _server) = serve(vec![(500, String::new())]).await;
        let cache = CredentialsCache::new(CredentialSource::Container {
            url: format!("{base}/creds"),
            authorization: None,
        });

        let err = cache.get(&Context::background()).await.unwrap_err();
        assert_eq!(err.to_string(), "container credentials: HTTP 500");
    }
}

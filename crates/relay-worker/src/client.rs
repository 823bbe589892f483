//! Signed HTTP client for the worker protocol.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::warn;
use uuid::Uuid;

/// A leased job as returned by a successful poll.
#[derive(Debug, Clone, Deserialize)]
pub struct JobAssignment {
    pub job: JobInfo,
    pub lease_token: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub tenant_id: String,
    pub status: String,
    #[serde(default)]
    pub priority: i32,
    pub payload: Value,
    pub attempts: i32,
    pub max_attempts: i32,
    pub execution_timeout: Option<i32>,
}

/// HTTP client for one worker identity.
///
/// Transport and protocol errors are logged and reported as `None`/`false`;
/// the runner treats them as "try again later" rather than crashing.
pub struct WorkerClient {
    http: reqwest::Client,
    base_url: String,
    worker_id: String,
    tenant_id: Option<String>,
    api_key: Option<String>,
}

impl WorkerClient {
    pub fn new(base_url: impl Into<String>, worker_id: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            worker_id: worker_id.into(),
            tenant_id: None,
            api_key: None,
        }
    }

    /// Attach the tenant identity and signing key for authenticated brokers.
    pub fn with_credentials(
        mut self,
        tenant_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self.api_key = Some(api_key.into());
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Poll for a job. `None` means nothing claimable (or a transport error).
    pub async fn poll(&self) -> Option<JobAssignment> {
        let mut body = json!({ "worker_id": self.worker_id });
        if let Some(tenant) = &self.tenant_id {
            body["tenant_id"] = json!(tenant);
        }

        match self.post("/api/v1/workers/poll", &body).await {
            Ok(resp) if resp.status().is_success() => {
                resp.json::<Option<JobAssignment>>().await.ok().flatten()
            }
            Ok(resp) => {
                warn!(worker_id = %self.worker_id, status = %resp.status(), "poll rejected");
                None
            }
            Err(e) => {
                warn!(worker_id = %self.worker_id, error = %e, "poll failed");
                None
            }
        }
    }

    pub async fn heartbeat(&self, job_id: Uuid, lease_token: Uuid) -> bool {
        let body = json!({ "worker_id": self.worker_id, "lease_token": lease_token });
        self.post_ok(&format!("/api/v1/workers/{job_id}/heartbeat"), &body, "heartbeat")
            .await
    }

    pub async fn complete(&self, job_id: Uuid, lease_token: Uuid, result: Value) -> bool {
        let body = json!({
            "worker_id": self.worker_id,
            "lease_token": lease_token,
            "result": result,
        });
        self.post_ok(&format!("/api/v1/workers/{job_id}/complete"), &body, "complete")
            .await
    }

    pub async fn fail(&self, job_id: Uuid, lease_token: Uuid, error: &str) -> bool {
        let body = json!({
            "worker_id": self.worker_id,
            "lease_token": lease_token,
            "error": error,
        });
        self.post_ok(&format!("/api/v1/workers/{job_id}/fail"), &body, "fail")
            .await
    }

    async fn post_ok(&self, path: &str, body: &Value, what: &str) -> bool {
        match self.post(path, body).await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(worker_id = %self.worker_id, status = %resp.status(), "{what} rejected");
                false
            }
            Err(e) => {
                warn!(worker_id = %self.worker_id, error = %e, "{what} failed");
                false
            }
        }
    }

    /// Send a JSON body, signing the exact bytes transmitted.
    async fn post(&self, path: &str, body: &Value) -> anyhow::Result<reqwest::Response> {
        let bytes = serde_json::to_vec(body)?;

        let mut request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(tenant) = &self.tenant_id {
            request = request.header("X-Tenant-ID", tenant);
        }
        if let Some(key) = &self.api_key {
            request = request.header("X-Worker-Signature", sign_body(key, &bytes));
        }

        Ok(request.body(bytes).send().await?)
    }
}

/// Hex-encoded HMAC-SHA256 of the request body under the tenant key.
pub(crate) fn sign_body(api_key: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(api_key.as_bytes()).expect("HMAC can take any size key");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_is_deterministic_per_body_and_key() {
        let body = br#"{"worker_id":"w-1"}"#;
        assert_eq!(sign_body("key", body), sign_body("key", body));
        assert_ne!(sign_body("key", body), sign_body("other", body));
        assert_ne!(sign_body("key", body), sign_body("key", b"{}"));
    }

    #[test]
    fn signature_is_lowercase_hex() {
        let sig = sign_body("key", b"body");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn assignment_deserializes_from_poll_response() {
        let raw = r#"{
            "job": {
                "id": "018f6d7e-4b7a-7000-8000-000000000000",
                "tenant_id": "acme",
                "status": "leased",
                "priority": 5,
                "payload": {"task": "resize"},
                "attempts": 0,
                "max_attempts": 3,
                "execution_timeout": 120
            },
            "lease_token": "7f1a9f5e-9f3b-4e6c-b9c4-0cf5f1b8b0aa",
            "expires_at": "2025-03-01T12:00:00Z"
        }"#;
        let assignment: JobAssignment = serde_json::from_str(raw).unwrap();
        assert_eq!(assignment.job.tenant_id, "acme");
        assert_eq!(assignment.job.execution_timeout, Some(120));

        let none: Option<JobAssignment> = serde_json::from_str("null").unwrap();
        assert!(none.is_none());
    }
}

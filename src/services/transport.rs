use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};

use crate::models::intent::Destination;
use crate::models::outcome::SendOutcome;
use crate::services::credentials::Credential;

/// Cap on how much of a rejection body ends up in logs and journal records.
const REASON_BODY_LIMIT: usize = 256;

/// Network submission of one artifact plus its metadata to the collector.
///
/// Implementations never return `Err`; classifying the failure is the whole
/// result, and the coordinator's retry policy keys off that classification.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        artifact: &[u8],
        content_type: &str,
        destination: Destination,
        fields: &BTreeMap<String, String>,
        credential: &Credential,
    ) -> SendOutcome;
}

/// Multipart HTTP submission to the real collector.
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    /// `base_url` without a trailing slash; `timeout` bounds each request so
    /// a dead link fails the attempt instead of hanging a drain pass.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        artifact: &[u8],
        content_type: &str,
        destination: Destination,
        fields: &BTreeMap<String, String>,
        credential: &Credential,
    ) -> SendOutcome {
        let file_name = match content_type {
            "image/png" => "signature.png",
            _ => "capture.jpg",
        };
        let part = match Part::bytes(artifact.to_vec())
            .file_name(file_name)
            .mime_str(content_type)
        {
            Ok(part) => part,
            // an unparseable content type can never be fixed by retrying
            Err(e) => return SendOutcome::Rejected(format!("malformed payload: {e}")),
        };

        let mut form = Form::new().part("file", part);
        for (key, value) in fields {
            form = form.text(key.clone(), value.clone());
        }

        let url = format!("{}{}", self.base_url, destination.endpoint_path());
        let response = self
            .http
            .post(&url)
            .bearer_auth(&credential.token)
            .multipart(form)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                classify_status(status, &body)
            }
            Err(e) => SendOutcome::Transient(e.to_string()),
        }
    }
}

/// Map a collector response onto the retry taxonomy: 2xx delivered, 401
/// distinguished for credential refresh, other 4xx permanent, everything
/// else transient.
fn classify_status(status: StatusCode, body: &str) -> SendOutcome {
    if status.is_success() {
        return SendOutcome::Delivered;
    }
    if status == StatusCode::UNAUTHORIZED {
        return SendOutcome::Unauthorized;
    }
    let reason = format!("collector returned {status}: {}", truncate(body));
    if status.is_client_error() {
        SendOutcome::Rejected(reason)
    } else {
        SendOutcome::Transient(reason)
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(REASON_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

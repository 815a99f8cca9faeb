//! AWS IoT data-plane client.
//!
//! Two seams are exposed as traits so the webhook can be driven by fakes in
//! tests: [`ShadowStore`] for the device's desired-state document and
//! [`EventPublisher`] for the passthrough topic. [`IotDataClient`] implements
//! both over the HTTPS data plane:
//!
//! - `GET  /things/{thing}/shadow`
//! - `POST /things/{thing}/shadow`
//! - `POST /topics/{topic}?qos=0`
//!
//! Every request is SigV4-signed with the configured credentials.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use tracing::{debug, error};

use crate::config::AwsConfig;
use crate::shadow::ShadowDocument;
use crate::sigv4::{self, Credentials, SignableRequest};

/// Read and overwrite the device's shadow document.
#[async_trait]
pub trait ShadowStore: Send + Sync {
    /// Fetch the document. `None` when the device has no shadow at all.
    async fn get(&self) -> Result<Option<ShadowDocument>>;

    /// Replace the desired state with the one in `document`.
    async fn update(&self, document: &ShadowDocument) -> Result<()>;
}

/// Fire-and-forget delivery of passthrough events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &PassthroughEvent) -> Result<()>;
}

/// Event sent to the station for messages we don't answer ourselves.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PassthroughEvent {
    pub to: String,
    pub from: String,
    pub body: String,
    #[serde(rename = "Type")]
    pub kind: String,
}

#[derive(Clone)]
pub struct IotDataClient {
    aws: AwsConfig,
    thing_name: String,
    topic: String,
    http: reqwest::Client,
}

impl IotDataClient {
    pub fn new(aws: AwsConfig, thing_name: String, topic: String) -> Self {
        Self {
            aws,
            thing_name,
            topic,
            http: reqwest::Client::new(),
        }
    }

    fn shadow_path(&self) -> String {
        format!("/things/{}/shadow", self.thing_name)
    }

    /// Sign and send a request, returning the status and body text.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &str,
        body: Vec<u8>,
    ) -> Result<(StatusCode, String)> {
        let credentials = Credentials {
            access_key_id: &self.aws.access_key_id,
            secret_access_key: &self.aws.secret_access_key,
            session_token: self.aws.session_token.as_deref(),
        };
        let signable = SignableRequest {
            method: method.as_str(),
            host: &self.aws.endpoint,
            path,
            query,
            body: &body,
        };
        let headers = sigv4::sign(
            &signable,
            &credentials,
            &self.aws.region,
            sigv4::IOT_DATA_SERVICE,
            Utc::now(),
        );

        let mut url = format!(
            "https://{}{}",
            self.aws.endpoint,
            sigv4::uri_encode(path, false)
        );
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }

        debug!(%method, path, "IoT data-plane request");

        let mut builder = self.http.request(method, &url);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if !body.is_empty() {
            builder = builder
                .header("content-type", "application/json")
                .body(body);
        }

        let response = builder
            .send()
            .await
            .context("Failed to send request to IoT data plane")?;
        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read IoT data-plane response")?;

        Ok((status, text))
    }
}

#[async_trait]
impl ShadowStore for IotDataClient {
    async fn get(&self) -> Result<Option<ShadowDocument>> {
        let (status, text) = self
            .request(Method::GET, &self.shadow_path(), "", Vec::new())
            .await?;

        if status == StatusCode::NOT_FOUND {
            debug!(thing = %self.thing_name, "No shadow for thing");
            return Ok(None);
        }
        if !status.is_success() {
            error!(%status, body = %text, "GetThingShadow failed");
            bail!("GetThingShadow returned HTTP {status}: {text}");
        }

        let document = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse shadow document: {text}"))?;
        Ok(Some(document))
    }

    async fn update(&self, document: &ShadowDocument) -> Result<()> {
        let body = serde_json::to_vec(document).context("Failed to encode shadow document")?;
        let (status, text) = self
            .request(Method::POST, &self.shadow_path(), "", body)
            .await?;

        if !status.is_success() {
            error!(%status, body = %text, "UpdateThingShadow failed");
            bail!("UpdateThingShadow returned HTTP {status}: {text}");
        }
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for IotDataClient {
    async fn publish(&self, event: &PassthroughEvent) -> Result<()> {
        let body = serde_json::to_vec(event).context("Failed to encode event")?;
        let path = format!("/topics/{}", self.topic);
        let (status, text) = self.request(Method::POST, &path, "qos=0", body).await?;

        if !status.is_success() {
            bail!("Publish to {} returned HTTP {status}: {text}", self.topic);
        }
        Ok(())
    }
}

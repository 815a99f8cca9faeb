//! Process configuration, read from the environment once at startup.
//!
//! A `.env` file is honoured in development (loaded by `main` via dotenvy);
//! in production the variables come from the service manager. Nothing reads
//! the environment after [`Config::from_env`] returns.

use std::fmt;

use anyhow::{Context, Result};

/// Default listen address for the webhook server.
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default route the SMS provider posts to.
const DEFAULT_WEBHOOK_PATH: &str = "/sms";

#[derive(Clone)]
pub struct Config {
    pub listen_addr: String,
    pub webhook_path: String,
    /// Shared secret the provider signs webhooks with.
    pub auth_token: String,
    /// Public URL the provider was told to call; part of the signed data.
    pub request_url: String,
    pub aws: AwsConfig,
    pub thing_name: String,
    /// Event topic for passthrough messages.
    pub topic: String,
    pub mqtt: Option<MqttConfig>,
}

#[derive(Clone)]
pub struct AwsConfig {
    pub region: String,
    /// Data-plane host, e.g. `data-ats.iot.us-west-2.amazonaws.com`.
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).with_context(|| format!("{key} must be set"));

        let region = require("AWS_IOT_REGION")?;
        let endpoint = get("AWS_IOT_ENDPOINT")
            .unwrap_or_else(|| format!("data-ats.iot.{region}.amazonaws.com"));

        let aws = AwsConfig {
            endpoint,
            access_key_id: require("AWS_ACCESS_KEY_ID")?,
            secret_access_key: require("AWS_SECRET_ACCESS_KEY")?,
            session_token: get("AWS_SESSION_TOKEN"),
            region,
        };

        let mqtt = match get("MQTT_BROKER_URL") {
            Some(url) => {
                let (host, port) = parse_broker_url(&url)
                    .with_context(|| format!("Invalid MQTT_BROKER_URL '{url}'"))?;
                let client_id = get("MQTT_CLIENT_ID")
                    .unwrap_or_else(|| format!("weather-sms-{}", uuid::Uuid::new_v4().simple()));
                let credentials = match (get("MQTT_USERNAME"), get("MQTT_PASSWORD")) {
                    (Some(user), Some(pass)) => Some((user, pass)),
                    (Some(user), None) => Some((user, String::new())),
                    _ => None,
                };
                Some(MqttConfig {
                    host,
                    port,
                    client_id,
                    credentials,
                })
            }
            None => None,
        };

        let mut webhook_path =
            get("WEBHOOK_PATH").unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.to_string());
        if !webhook_path.starts_with('/') {
            webhook_path.insert(0, '/');
        }

        Ok(Self {
            listen_addr: get("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            webhook_path,
            auth_token: require("AUTH_TOKEN")?,
            request_url: require("REQUEST_URL")?,
            aws,
            thing_name: require("THING_NAME")?,
            topic: require("AWS_TOPIC")?,
            mqtt,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("webhook_path", &self.webhook_path)
            .field("auth_token", &"<redacted>")
            .field("request_url", &self.request_url)
            .field("aws", &self.aws)
            .field("thing_name", &self.thing_name)
            .field("topic", &self.topic)
            .field("mqtt", &self.mqtt)
            .finish()
    }
}

impl fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsConfig")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Split `mqtt://host:port` (scheme and port optional) into host and port.
fn parse_broker_url(url: &str) -> Result<(String, u16)> {
    let rest = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url)
        .trim_end_matches('/');

    match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().context("port is not a number")?;
            anyhow::ensure!(!host.is_empty(), "host is empty");
            Ok((host.to_string(), port))
        }
        None => {
            anyhow::ensure!(!rest.is_empty(), "host is empty");
            Ok((rest.to_string(), 1883))
        }
    }
}

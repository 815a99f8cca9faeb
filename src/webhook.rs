//! Inbound SMS webhook.
//!
//! Authentication: the provider signs every request with the account auth
//! token (see [`crate::signature`]). Unsigned, badly signed or incomplete
//! requests are acknowledged with an empty response and otherwise ignored,
//! so nothing is revealed to a caller that isn't the provider.
//!
//! Messages are then split three ways: help and settings are answered
//! directly, everything else is forwarded to the station, which replies on
//! its own.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::help;
use crate::intent::{classify, Intent};
use crate::iot::{EventPublisher, PassthroughEvent, ShadowStore};
use crate::settings;
use crate::signature::{self, FormParams, SIGNATURE_HEADER};
use crate::twiml::Reply;

/// Body the station sees for a forwarded message; it answers with the
/// current conditions regardless of what was texted.
pub const PASSTHROUGH_BODY: &str = "Give me some weather!";
pub const PASSTHROUGH_TYPE: &str = "Incoming";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub shadow: Arc<dyn ShadowStore>,
    pub publisher: Arc<dyn EventPublisher>,
}

pub fn router(state: AppState) -> Router {
    let path = state.config.webhook_path.clone();
    Router::new()
        .route(&path, post(handle_sms))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Fields every SMS webhook carries.
struct InboundSms {
    body: String,
    from: String,
    to: String,
}

impl InboundSms {
    fn from_params(params: &FormParams) -> Option<Self> {
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        Some(Self {
            body: get("Body")?,
            from: get("From")?,
            to: get("To")?,
        })
    }
}

async fn handle_sms(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(provided) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        warn!("Webhook rejected: missing signature header");
        return Reply::Empty.into_response();
    };

    let params = signature::parse_form(&String::from_utf8_lossy(&body));

    if !signature::validate(
        &state.config.auth_token,
        &state.config.request_url,
        &params,
        provided,
    ) {
        warn!("Webhook rejected: invalid signature");
        return Reply::Empty.into_response();
    }

    let Some(sms) = InboundSms::from_params(&params) else {
        warn!("Webhook rejected: missing Body, From or To");
        return Reply::Empty.into_response();
    };

    let intent = classify(&sms.body);
    debug!(from = %sms.from, ?intent, "SMS received");

    let result = match intent {
        Intent::Help => help::handle(&sms.body, &sms.from, state.shadow.as_ref()).await,
        Intent::Set => {
            settings::handle(&sms.body, &sms.from, state.shadow.as_ref(), Utc::now()).await
        }
        Intent::Passthrough => Ok(passthrough(&sms, state.publisher.clone())),
    };

    match result {
        Ok(reply) => reply.into_response(),
        Err(e) => {
            error!(from = %sms.from, ?intent, "Failed to handle SMS: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, Reply::Empty).into_response()
        }
    }
}

/// Forward the message to the station on a background task. Delivery is
/// best effort; the caller gets an empty reply without waiting for it.
fn passthrough(sms: &InboundSms, publisher: Arc<dyn EventPublisher>) -> Reply {
    let event = PassthroughEvent {
        to: sms.to.clone(),
        from: sms.from.clone(),
        body: PASSTHROUGH_BODY.to_string(),
        kind: PASSTHROUGH_TYPE.to_string(),
    };

    tokio::spawn(async move {
        match publisher.publish(&event).await {
            Ok(()) => info!(from = %event.from, "Forwarded SMS to station"),
            Err(e) => error!(from = %event.from, "Failed to publish passthrough event: {e:#}"),
        }
    });

    Reply::Empty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::{DesiredState, Units};
    use crate::testing::{MemoryPublisher, MemoryStore};
    use crate::twiml::EMPTY_RESPONSE;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";
    const URL: &str = "https://station.example.com/sms";

    fn test_config() -> Config {
        Config::from_lookup(|key| {
            let value = match key {
                "AWS_IOT_REGION" => "us-west-2",
                "AWS_ACCESS_KEY_ID" => "AKID",
                "AWS_SECRET_ACCESS_KEY" => "secret",
                "AUTH_TOKEN" => TOKEN,
                "REQUEST_URL" => URL,
                "THING_NAME" => "station",
                "AWS_TOPIC" => "twilio",
                _ => return None,
            };
            Some(value.to_string())
        })
        .unwrap()
    }

    struct Harness {
        store: Arc<MemoryStore>,
        publisher: Arc<MemoryPublisher>,
        app: Router,
    }

    fn harness(store: MemoryStore, publisher: MemoryPublisher) -> Harness {
        let store = Arc::new(store);
        let publisher = Arc::new(publisher);
        let app = router(AppState {
            config: Arc::new(test_config()),
            shadow: store.clone(),
            publisher: publisher.clone(),
        });
        Harness {
            store,
            publisher,
            app,
        }
    }

    fn encode(params: &[(&str, &str)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn signed_request(params: &[(&str, &str)]) -> Request<Body> {
        let owned: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let sig = signature::sign(TOKEN, URL, &owned);
        Request::post("/sms")
            .header("content-type", "application/x-www-form-urlencoded")
            .header("X-Twilio-Signature", sig)
            .body(Body::from(encode(params)))
            .unwrap()
    }

    fn sms(body: &str, from: &str) -> Request<Body> {
        signed_request(&[
            ("Body", body),
            ("From", from),
            ("To", "+18005551212"),
            ("MessageSid", "SM123"),
        ])
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn message_xml(text: &str) -> String {
        Reply::message(text).to_xml()
    }

    #[tokio::test]
    async fn missing_signature_gets_empty_ack() {
        let h = harness(MemoryStore::empty(), MemoryPublisher::default());
        let request = Request::post("/sms")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(encode(&[("Body", "? cur"), ("From", "+1"), ("To", "+2")])))
            .unwrap();

        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, EMPTY_RESPONSE);
        assert_eq!(h.store.reads(), 0);
    }

    #[tokio::test]
    async fn invalid_signature_touches_nothing() {
        let h = harness(MemoryStore::empty(), MemoryPublisher::default());
        for body in ["set alt 5", "? cur", "weather please"] {
            let request = Request::post("/sms")
                .header("X-Twilio-Signature", "bm90IGEgc2lnbmF0dXJl")
                .body(Body::from(encode(&[
                    ("Body", body),
                    ("From", "+15551234567"),
                    ("To", "+18005551212"),
                ])))
                .unwrap();
            let (status, reply) = send(&h.app, request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(reply, EMPTY_RESPONSE);
        }
        assert_eq!(h.store.reads(), 0);
        assert_eq!(h.store.writes(), 0);
        assert!(h.publisher.events().is_empty());
    }

    #[tokio::test]
    async fn missing_fields_get_empty_ack() {
        let h = harness(MemoryStore::empty(), MemoryPublisher::default());
        let request = signed_request(&[("Body", "hello"), ("From", "+15551234567")]);
        let (_, body) = send(&h.app, request).await;
        assert_eq!(body, EMPTY_RESPONSE);
        assert!(h.publisher.events().is_empty());
    }

    #[tokio::test]
    async fn help_menu_reply() {
        let h = harness(MemoryStore::empty(), MemoryPublisher::default());
        let (status, body) = send(&h.app, sms("?", "+15551234567")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, message_xml(help::MENU));
    }

    #[tokio::test]
    async fn current_settings_are_redacted_for_strangers() {
        let desired = DesiredState {
            m_num: Some("+1555".into()),
            units: Some(Units::Metric),
            ..Default::default()
        };
        let h = harness(MemoryStore::with_desired(desired), MemoryPublisher::default());

        let (_, body) = send(&h.app, sms("? cur", "+1999")).await;
        assert_eq!(body, message_xml("m_num: (not this number)\nunits: metric\n"));

        let (_, body) = send(&h.app, sms("? cur", "+1555")).await;
        assert_eq!(body, message_xml("m_num: +1555\nunits: metric\n"));
    }

    #[tokio::test]
    async fn set_writes_and_confirms() {
        let h = harness(
            MemoryStore::with_desired(DesiredState::default()),
            MemoryPublisher::default(),
        );
        let (_, body) = send(&h.app, sms("set units METRIC", "+15551234567")).await;
        assert_eq!(body, message_xml("Updating units to metric."));
        assert_eq!(h.store.writes(), 1);
        assert_eq!(h.store.desired().unwrap().units, Some(Units::Metric));
    }

    #[tokio::test]
    async fn set_from_stranger_is_unauthorized() {
        let desired = DesiredState {
            m_num: Some("+1555".into()),
            ..Default::default()
        };
        let h = harness(MemoryStore::with_desired(desired), MemoryPublisher::default());
        let (_, body) = send(&h.app, sms("set alt 100", "+1999")).await;
        assert_eq!(body, message_xml(settings::UNAUTHORIZED));
        assert_eq!(h.store.writes(), 0);
    }

    /// Let the spawned publish run; the test runtime is single-threaded.
    async fn published(publisher: &MemoryPublisher) -> Vec<PassthroughEvent> {
        for _ in 0..100 {
            let events = publisher.events();
            if !events.is_empty() {
                return events;
            }
            tokio::task::yield_now().await;
        }
        publisher.events()
    }

    #[tokio::test]
    async fn passthrough_publishes_and_acks_empty() {
        let h = harness(MemoryStore::empty(), MemoryPublisher::default());
        let (status, body) = send(&h.app, sms("How's the weather?", "+15551234567")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, EMPTY_RESPONSE);
        assert_eq!(
            published(&h.publisher).await,
            vec![PassthroughEvent {
                to: "+18005551212".into(),
                from: "+15551234567".into(),
                body: PASSTHROUGH_BODY.into(),
                kind: PASSTHROUGH_TYPE.into(),
            }]
        );
        assert_eq!(h.store.reads(), 0);
    }

    #[tokio::test]
    async fn passthrough_acks_empty_even_when_publish_fails() {
        let h = harness(MemoryStore::empty(), MemoryPublisher::failing());
        let (status, body) = send(&h.app, sms("weather", "+15551234567")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, EMPTY_RESPONSE);
        assert_eq!(published(&h.publisher).await.len(), 1);
    }

    #[tokio::test]
    async fn passthrough_does_not_wait_for_delivery() {
        let h = harness(MemoryStore::empty(), MemoryPublisher::stalled());
        let reply = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            send(&h.app, sms("weather", "+15551234567")),
        )
        .await
        .expect("reply must not wait on the publish");
        assert_eq!(reply, (StatusCode::OK, EMPTY_RESPONSE.to_string()));
    }

    #[tokio::test]
    async fn store_failure_is_a_server_error() {
        let h = harness(MemoryStore::failing(), MemoryPublisher::default());
        let (status, body) = send(&h.app, sms("set alt 5", "+15551234567")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, EMPTY_RESPONSE);
    }

    #[tokio::test]
    async fn health_check() {
        let h = harness(MemoryStore::empty(), MemoryPublisher::default());
        let request = Request::get("/healthz").body(Body::empty()).unwrap();
        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}

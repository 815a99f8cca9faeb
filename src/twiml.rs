//! Reply documents returned to the SMS provider.
//!
//! The provider reads the webhook response as a small XML document: an empty
//! `<Response>` means "do nothing", a `<Message>` child is sent back to the
//! texter as an SMS.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// The exact no-op document.
pub const EMPTY_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Acknowledge without replying; any answer arrives asynchronously.
    Empty,
    /// Reply synchronously with a single SMS.
    Message(String),
}

impl Reply {
    pub fn message(text: impl Into<String>) -> Self {
        Reply::Message(text.into())
    }

    pub fn to_xml(&self) -> String {
        match self {
            Reply::Empty => EMPTY_RESPONSE.to_string(),
            Reply::Message(text) => {
                format!("{XML_DECL}<Response><Message>{}</Message></Response>", escape(text))
            }
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/xml")],
            self.to_xml(),
        )
            .into_response()
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

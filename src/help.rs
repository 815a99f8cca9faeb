//! Help replies: the topic menu, per-topic usage, and a dump of the current
//! desired settings (`? cur`).

use std::fmt::Write as _;

use anyhow::Result;
use serde_json::Value;

use crate::intent::Topic;
use crate::iot::ShadowStore;
use crate::shadow::ShadowDocument;
use crate::twiml::Reply;

pub const MENU: &str = ":: Help (var)\n\
alt - Altitude\n\
cur - Current Set\n\
m_num - Master number\n\
t_num - Twilio Number\n\
alarm - Alarm\n\
units - Units\n\
tz - Timezone";

pub const NO_THING: &str = "No Thing found, set it up through AWS IoT.\n";
pub const NO_SHADOW: &str = "No shadow set, set it through AWS IoT.\n";

/// Shown in place of the master number to anyone but its owner.
pub const REDACTED: &str = "(not this number)";

const CURRENT: &str = "cur";

/// Usage text for a single topic.
pub fn usage(topic: Topic) -> &'static str {
    match topic {
        Topic::Altitude => ":: Help alt\nSet altitude in meters (integers):\nset alt 50\n",
        Topic::Timezone => ":: Help tz\nSet timezone adjust in minutes:\nset tz -480\n",
        Topic::MasterNumber => ":: Help m_num\nSet master number:\nset m_num +18005551212\n",
        Topic::TwilioNumber => ":: Help t_num\nSet Twilio number:\nset t_num +18005551212\n",
        Topic::Alarm => {
            ":: Help alarm\nSet alarm hours:minutes, 24 hour clock:\nset alarm 15:12\n"
        }
        Topic::Units => ":: Help units\nSet units type:\nset units imperial\nor\nset units metric",
    }
}

pub async fn handle(body: &str, from: &str, store: &dyn ShadowStore) -> Result<Reply> {
    let Some(word) = body.split_whitespace().nth(1) else {
        return Ok(Reply::message(MENU));
    };

    if word.eq_ignore_ascii_case(CURRENT) {
        let document = store.get().await?;
        return Ok(Reply::message(render_current(document.as_ref(), from)));
    }

    match Topic::parse(word) {
        Some(topic) => Ok(Reply::message(usage(topic))),
        None => Ok(Reply::message(MENU)),
    }
}

/// Render the desired state as `name: value` lines. The master number is
/// only shown to the number it names. A known key holding a value of the
/// wrong type is shown as stored.
pub fn render_current(document: Option<&ShadowDocument>, from: &str) -> String {
    let Some(document) = document else {
        return NO_THING.to_string();
    };
    let desired = match document.desired() {
        Some(d) if !d.is_empty() => d,
        _ => return NO_SHADOW.to_string(),
    };

    let shown =
        |key: &str, typed: Option<String>| typed.or_else(|| desired.raw(key).map(raw_text));
    let m_num = match &desired.m_num {
        Some(m_num) if m_num == from => Some(m_num.clone()),
        Some(_) => Some(REDACTED.to_string()),
        None => desired.raw("m_num").map(|_| REDACTED.to_string()),
    };

    let lines = [
        ("tz", shown("tz", desired.tz.map(|v| v.to_string()))),
        ("t_num", shown("t_num", desired.t_num.clone())),
        ("m_num", m_num),
        ("alarm", shown("alarm", desired.alarm.map(|v| v.to_string()))),
        ("units", shown("units", desired.units.map(|v| v.to_string()))),
        ("alt", shown("alt", desired.alt.map(|v| v.to_string()))),
    ];

    let mut out = String::new();
    for (key, value) in lines {
        if let Some(value) = value {
            let _ = writeln!(out, "{key}: {value}");
        }
    }

    if out.is_empty() {
        // Only keys this service doesn't know about.
        return NO_SHADOW.to_string();
    }
    out
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

//! Routing of inbound SMS bodies.

use std::fmt;

/// What an inbound message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Help,
    Set,
    /// Anything else; forwarded to the station.
    Passthrough,
}

/// Classify a message body. Help wins over set when both could match.
///
/// The provider intercepts a bare `HELP` itself, so `?` is the short alias.
pub fn classify(body: &str) -> Intent {
    let lower = body.to_lowercase();

    if lower.starts_with('?') || lower.starts_with("help") {
        return Intent::Help;
    }
    if lower.starts_with("s ") || lower.starts_with("set ") {
        return Intent::Set;
    }
    Intent::Passthrough
}

/// One of the six station settings, by its short token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Altitude,
    Timezone,
    MasterNumber,
    TwilioNumber,
    Alarm,
    Units,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::Altitude,
        Topic::Timezone,
        Topic::MasterNumber,
        Topic::TwilioNumber,
        Topic::Alarm,
        Topic::Units,
    ];

    /// Case-insensitive lookup of a topic token.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.to_ascii_lowercase();
        Self::ALL.into_iter().find(|t| t.token() == token)
    }

    pub fn token(self) -> &'static str {
        match self {
            Topic::Altitude => "alt",
            Topic::Timezone => "tz",
            Topic::MasterNumber => "m_num",
            Topic::TwilioNumber => "t_num",
            Topic::Alarm => "alarm",
            Topic::Units => "units",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

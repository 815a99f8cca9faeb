//! Typed view of the device shadow document.
//!
//! The remote store owns the document; we only ever read it and write back
//! the `state.desired` section. Keys use the short names the station firmware
//! subscribes to (`alt`, `tz`, `m_num`, `t_num`, `alarm`, `units`). Any other
//! desired keys are carried through untouched, and so are known keys holding
//! a value of the wrong type (edited by hand in the console, say): those stay
//! raw in `extra` instead of failing the whole read.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level shadow document. Only the parts we use are modelled; `reported`,
/// `metadata` and `version` are ignored on read and never written back.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ShadowDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ShadowState>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ShadowState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired: Option<DesiredState>,
}

/// The station's target configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(from = "Map<String, Value>")]
pub struct DesiredState {
    /// Altitude in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<i64>,
    /// Timezone offset in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tz: Option<i64>,
    /// The one number allowed to change settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m_num: Option<String>,
    /// The provider number the station texts from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_num: Option<String>,
    /// Next alarm, UTC epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<Units>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Imperial,
    Metric,
}

impl Units {
    /// Case-insensitive parse of `imperial` / `metric`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "imperial" => Some(Units::Imperial),
            "metric" => Some(Units::Metric),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Units::Imperial => "imperial",
            Units::Metric => "metric",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ShadowDocument {
    pub fn desired(&self) -> Option<&DesiredState> {
        self.state.as_ref()?.desired.as_ref()
    }

    /// Wrap a desired state as the write payload.
    pub fn from_desired(desired: DesiredState) -> Self {
        Self {
            state: Some(ShadowState {
                desired: Some(desired),
            }),
        }
    }
}

impl From<Map<String, Value>> for DesiredState {
    fn from(mut extra: Map<String, Value>) -> Self {
        Self {
            alt: take(&mut extra, "alt", Value::as_i64),
            tz: take(&mut extra, "tz", Value::as_i64),
            m_num: take(&mut extra, "m_num", |v| v.as_str().map(str::to_string)),
            t_num: take(&mut extra, "t_num", |v| v.as_str().map(str::to_string)),
            alarm: take(&mut extra, "alarm", Value::as_i64),
            units: take(&mut extra, "units", |v| v.as_str().and_then(Units::parse)),
            extra,
        }
    }
}

/// Move `key` out of `map` if `convert` accepts its value; otherwise leave it.
fn take<T>(
    map: &mut Map<String, Value>,
    key: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let value = convert(map.get(key)?)?;
    map.remove(key);
    Some(value)
}

impl DesiredState {
    /// A known key whose stored value didn't have the expected type.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.extra.get(key).filter(|v| !v.is_null())
    }

    pub fn is_empty(&self) -> bool {
        self.alt.is_none()
            && self.tz.is_none()
            && self.m_num.is_none()
            && self.t_num.is_none()
            && self.alarm.is_none()
            && self.units.is_none()
            && self.extra.is_empty()
    }

    /// Whether `from` may change settings. With no master number stored,
    /// anyone may. A master number that isn't a string matches nobody.
    pub fn authorizes(&self, from: &str) -> bool {
        match &self.m_num {
            Some(master) => master == from,
            None => self.raw("m_num").is_none(),
        }
    }
}

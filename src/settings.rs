//! `set <topic> <value>`: validate, authorize and write a setting to the
//! device's desired state.

use std::num::ParseIntError;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::intent::Topic;
use crate::iot::ShadowStore;
use crate::shadow::{DesiredState, ShadowDocument, Units};
use crate::twiml::Reply;

pub const UNAUTHORIZED: &str = "UNAUTHORIZED";

/// Largest timezone offset accepted, in minutes either side of UTC.
pub const MAX_TZ_MINUTES: i64 = 24 * 60;

pub const USAGE: &str = "Should be exactly 3 terms:\n\
set <term> <preference>\n\
Perhaps see help with '?'?";

/// Why a setting value was rejected. The message is sent back as the reply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingError {
    #[error("Altitude must be an integer, in meters.\n")]
    Altitude,
    #[error("Timezone must be an integer, in minutes.\n")]
    Timezone,
    #[error(
        "Number must start with '+' followed by country + local code then phone number ie '+18005551212'\n"
    )]
    PhoneNumber,
    #[error("Alarm must be in XX:YY format, will adjust to local timezone automatically.\n")]
    Alarm,
    #[error("Must be 'imperial' or 'metric' units, sans quotes.")]
    Units,
}

/// A validated setting, ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting {
    Altitude(i64),
    Timezone(i64),
    MasterNumber(String),
    TwilioNumber(String),
    /// Wall-clock alarm time; turned into an epoch when applied.
    Alarm(NaiveTime),
    Units(Units),
}

/// Parse a signed integer, ignoring any non-ASCII characters that SMS
/// gateways sometimes leave in the text.
pub fn parse_int(raw: &str) -> Result<i64, ParseIntError> {
    let cleaned: String = raw.chars().filter(char::is_ascii).collect();
    cleaned.parse()
}

pub fn parse_setting(topic: Topic, raw: &str) -> Result<Setting, SettingError> {
    match topic {
        Topic::Altitude => parse_int(raw)
            .map(Setting::Altitude)
            .map_err(|_| SettingError::Altitude),
        Topic::Timezone => parse_int(raw)
            .ok()
            .filter(|tz| (-MAX_TZ_MINUTES..=MAX_TZ_MINUTES).contains(tz))
            .map(Setting::Timezone)
            .ok_or(SettingError::Timezone),
        Topic::MasterNumber => parse_phone(raw).map(Setting::MasterNumber),
        Topic::TwilioNumber => parse_phone(raw).map(Setting::TwilioNumber),
        Topic::Alarm => parse_alarm(raw).map(Setting::Alarm),
        Topic::Units => Units::parse(raw)
            .map(Setting::Units)
            .ok_or(SettingError::Units),
    }
}

fn parse_phone(raw: &str) -> Result<String, SettingError> {
    if raw.starts_with('+') {
        Ok(raw.to_string())
    } else {
        Err(SettingError::PhoneNumber)
    }
}

fn parse_alarm(raw: &str) -> Result<NaiveTime, SettingError> {
    let (hours, minutes) = raw.split_once(':').ok_or(SettingError::Alarm)?;
    let hours = parse_int(hours).map_err(|_| SettingError::Alarm)?;
    let minutes = parse_int(minutes).map_err(|_| SettingError::Alarm)?;

    let hours = u32::try_from(hours).map_err(|_| SettingError::Alarm)?;
    let minutes = u32::try_from(minutes).map_err(|_| SettingError::Alarm)?;
    NaiveTime::from_hms_opt(hours, minutes, 0).ok_or(SettingError::Alarm)
}

/// Next epoch at which the station should ring for `time`.
///
/// The station keeps a local-time clock, so "now" is shifted by the stored
/// timezone offset before comparing. The candidate is `time` on today's UTC
/// date; if that is already behind the shifted clock it moves to tomorrow.
/// Offsets written outside this service may be arbitrary, so the shift saturates.
pub fn next_alarm_epoch(now: DateTime<Utc>, tz_minutes: i64, time: NaiveTime) -> i64 {
    let local_now = now.timestamp().saturating_add(tz_minutes.saturating_mul(60));
    let candidate = now.date_naive().and_time(time).and_utc();

    if candidate.timestamp() < local_now {
        (candidate + Duration::days(1)).timestamp()
    } else {
        candidate.timestamp()
    }
}

/// Apply a validated setting and return the confirmation text.
///
/// `tz_minutes` is the offset stored before this update.
fn apply(
    desired: &mut DesiredState,
    setting: Setting,
    now: DateTime<Utc>,
    tz_minutes: i64,
) -> String {
    match setting {
        Setting::Altitude(alt) => {
            desired.alt = Some(alt);
            format!("Updating altitude to {alt}m.\n")
        }
        Setting::Timezone(tz) => {
            desired.tz = Some(tz);
            format!("Updating timezone to {tz} min.\n")
        }
        Setting::MasterNumber(number) => {
            let reply = format!("Updating master number to {number}.\n");
            desired.m_num = Some(number);
            reply
        }
        Setting::TwilioNumber(number) => {
            let reply = format!(
                "Updating Twilio number to {number}.  Update webhook in Twilio console too!\n"
            );
            desired.t_num = Some(number);
            reply
        }
        Setting::Alarm(time) => {
            let epoch = next_alarm_epoch(now, tz_minutes, time);
            desired.alarm = Some(epoch);
            format!("Updating alarm to {epoch}.")
        }
        Setting::Units(units) => {
            desired.units = Some(units);
            format!("Updating units to {units}.")
        }
    }
}

pub async fn handle(
    body: &str,
    from: &str,
    store: &dyn ShadowStore,
    now: DateTime<Utc>,
) -> Result<Reply> {
    let document = store.get().await?;
    let mut desired = document
        .as_ref()
        .and_then(ShadowDocument::desired)
        .cloned()
        .unwrap_or_default();

    if !desired.authorizes(from) {
        warn!(from, "Settings change from a number other than the master number");
        return Ok(Reply::message(UNAUTHORIZED));
    }

    let words: Vec<&str> = body.split_whitespace().collect();
    let (topic, raw) = match words.as_slice() {
        [_, topic, raw] => match Topic::parse(topic) {
            Some(topic) => (topic, *raw),
            None => return Ok(Reply::message(USAGE)),
        },
        _ => return Ok(Reply::message(USAGE)),
    };

    let setting = match parse_setting(topic, raw) {
        Ok(setting) => setting,
        Err(e) => return Ok(Reply::message(e.to_string())),
    };

    let tz_minutes = desired.tz.unwrap_or(0);
    let reply = apply(&mut desired, setting, now, tz_minutes);
    // A value of the wrong type may still sit under this key.
    desired.extra.remove(topic.token());

    store.update(&ShadowDocument::from_desired(desired)).await?;
    info!(%topic, value = raw, from, "Setting updated");

    Ok(Reply::message(reply))
}

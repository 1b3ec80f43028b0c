//! Talker event normalization from decoded relay payloads
//!
//! The relay publishes one JSON object per talker transition:
//!
//! ```text
//! {"time":"09:00:00","talk":"start","call":"AB1C","tg":"100","server":"fm1"}
//! ```
//!
//! `time` is either a bare time-of-day or a full date-time. Bare times are
//! resolved against the local calendar date at the moment of ingestion.

use crate::clock::parse_ts;
use crate::error::{HeardError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TalkKind {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "stop")]
    Stop,
}

impl TalkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TalkKind::Start => "start",
            TalkKind::Stop => "stop",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Some(TalkKind::Start),
            "stop" => Some(TalkKind::Stop),
            _ => None,
        }
    }
}

/// A validated talker event, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub timestamp: NaiveDateTime,
    pub kind: TalkKind,
    pub station: String,
    pub group: i64,
    pub origin: String,
}

impl CanonicalEvent {
    pub fn is_start(&self) -> bool {
        matches!(self.kind, TalkKind::Start)
    }

    pub fn is_stop(&self) -> bool {
        matches!(self.kind, TalkKind::Stop)
    }
}

/// Raw talker message as decoded from the wire. Every field is optional
/// here; required-ness is enforced by [`normalize`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TalkerPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub talk: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub call: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tg: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub server: Option<String>,
}

impl TalkerPayload {
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Node metadata message. Only `call` is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodePayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub call: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub locator: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub rx_freq: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tx_freq: Option<String>,
}

impl NodePayload {
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Node metadata after validation
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub callsign: String,
    pub location: String,
    pub locator: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub rx_freq: String,
    pub tx_freq: String,
}

impl NodeInfo {
    pub fn from_payload(payload: NodePayload) -> Result<Self> {
        let callsign = required(payload.call, "call")?;
        Ok(Self {
            callsign,
            location: payload.location.unwrap_or_default(),
            locator: payload.locator.unwrap_or_default(),
            lat: payload.lat.filter(|v| v.is_finite()),
            lon: payload.lon.filter(|v| v.is_finite()),
            rx_freq: payload.rx_freq.unwrap_or_default(),
            tx_freq: payload.tx_freq.unwrap_or_default(),
        })
    }
}

/// Turn a decoded talker payload into a canonical event
///
/// `today` is the local calendar date used to complete a bare `HH:MM:SS`.
pub fn normalize(payload: TalkerPayload, today: NaiveDate) -> Result<CanonicalEvent> {
    let time = required(payload.time, "time")?;
    let talk = required(payload.talk, "talk")?;
    let station = required(payload.call, "call")?;
    let tg = required(payload.tg, "tg")?;

    let kind = TalkKind::parse(&talk)
        .ok_or_else(|| HeardError::validation("talk", format!("unknown kind '{}'", talk)))?;
    let timestamp = resolve_timestamp(&time, today)?;
    let group = parse_group(&tg);

    Ok(CanonicalEvent {
        timestamp,
        kind,
        station,
        group,
        origin: payload.server.unwrap_or_default(),
    })
}

/// Full date-times pass through; a bare time-of-day gets `today` prepended
pub fn resolve_timestamp(time: &str, today: NaiveDate) -> Result<NaiveDateTime> {
    if let Some(full) = parse_ts(time) {
        return Ok(full);
    }

    NaiveTime::parse_from_str(time.trim(), "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S%.f"))
        .map(|t| today.and_time(t))
        .map_err(|_| HeardError::validation("time", format!("unparseable '{}'", time)))
}

/// Leading signed integer of `tg`, so `"262abc"` and `"262.0"` give 262
///
/// No leading digits, or a value out of range, gives 0.
pub fn parse_group(tg: &str) -> i64 {
    let trimmed = tg.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['+', '-']));
    let digits = trimmed[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    trimmed[..sign_len + digits].parse().unwrap_or(0)
}

fn required(value: Option<String>, field: &'static str) -> Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(HeardError::validation(field, "missing or empty")),
    }
}

/// Accept strings, numbers and booleans as text; null and absent become None
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Accept numbers or numeric strings; anything else becomes None
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    #[test]
    fn test_bare_time_gets_local_date() {
        let payload = TalkerPayload::from_json(
            r#"{"time":"09:00:00","talk":"start","call":"AB1C","tg":"100","server":"fm1"}"#,
        )
        .unwrap();

        let event = normalize(payload, today()).unwrap();
        assert_eq!(
            event.timestamp,
            today().and_hms_opt(9, 0, 0).unwrap()
        );
        assert_eq!(event.kind, TalkKind::Start);
        assert_eq!(event.station, "AB1C");
        assert_eq!(event.group, 100);
        assert_eq!(event.origin, "fm1");
    }

    #[test]
    fn test_full_datetime_passes_through() {
        let payload = TalkerPayload::from_json(
            r#"{"time":"2025-12-31 23:59:58","talk":"stop","call":"DL1ABC","tg":262}"#,
        )
        .unwrap();

        let event = normalize(payload, today()).unwrap();
        assert_eq!(
            event.timestamp,
            NaiveDate::from_ymd_opt(2025, 12, 31)
                .unwrap()
                .and_hms_opt(23, 59, 58)
                .unwrap()
        );
        assert_eq!(event.group, 262);
        assert_eq!(event.origin, "");
    }

    #[test]
    fn test_unparseable_group_becomes_zero() {
        let payload = TalkerPayload::from_json(
            r#"{"time":"10:00:00","talk":"START","call":"X","tg":"abc"}"#,
        )
        .unwrap();

        let event = normalize(payload, today()).unwrap();
        assert_eq!(event.group, 0);
        assert_eq!(event.kind, TalkKind::Start);
    }

    #[test]
    fn test_group_takes_leading_integer() {
        assert_eq!(parse_group("262"), 262);
        assert_eq!(parse_group("262abc"), 262);
        assert_eq!(parse_group("262.0"), 262);
        assert_eq!(parse_group("  -5x"), -5);
        assert_eq!(parse_group("+7"), 7);
        assert_eq!(parse_group("-"), 0);
        assert_eq!(parse_group(""), 0);
        assert_eq!(parse_group("99999999999999999999"), 0);

        let payload = TalkerPayload::from_json(
            r#"{"time":"10:00:00","talk":"stop","call":"X","tg":"262abc"}"#,
        )
        .unwrap();
        assert_eq!(normalize(payload, today()).unwrap().group, 262);
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        for (json, field) in [
            (r#"{"talk":"start","call":"X","tg":"1"}"#, "time"),
            (r#"{"time":"10:00:00","call":"X","tg":"1"}"#, "talk"),
            (r#"{"time":"10:00:00","talk":"start","call":"","tg":"1"}"#, "call"),
            (r#"{"time":"10:00:00","talk":"start","call":"X","tg":null}"#, "tg"),
        ] {
            let payload = TalkerPayload::from_json(json).unwrap();
            match normalize(payload, today()) {
                Err(HeardError::Validation { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected validation error for {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_unknown_kind_and_bad_time_rejected() {
        let bad_kind = TalkerPayload::from_json(
            r#"{"time":"10:00:00","talk":"pause","call":"X","tg":"1"}"#,
        )
        .unwrap();
        assert!(normalize(bad_kind, today()).is_err());

        let bad_time = TalkerPayload::from_json(
            r#"{"time":"ten o'clock","talk":"stop","call":"X","tg":"1"}"#,
        )
        .unwrap();
        assert!(normalize(bad_time, today()).is_err());
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let err = TalkerPayload::from_json(r#"{"time": "#).unwrap_err();
        assert!(matches!(err, HeardError::Decode(_)));
    }

    #[test]
    fn test_node_payload_accepts_null_and_string_coordinates() {
        let payload = NodePayload::from_json(
            r#"{"call":"DB0XYZ","location":"Berlin","lat":"52.52","lon":null,"rx_freq":"145.600"}"#,
        )
        .unwrap();

        let node = NodeInfo::from_payload(payload).unwrap();
        assert_eq!(node.callsign, "DB0XYZ");
        assert_eq!(node.lat, Some(52.52));
        assert_eq!(node.lon, None);
        assert_eq!(node.locator, "");
        assert_eq!(node.rx_freq, "145.600");
    }

    #[test]
    fn test_node_payload_requires_call() {
        let payload = NodePayload::from_json(r#"{"location":"Berlin"}"#).unwrap();
        assert!(NodeInfo::from_payload(payload).is_err());
    }
}

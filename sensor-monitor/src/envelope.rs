//! Message envelopes exchanged between the network worker and the presentation cycle.
//!
//! An [`Envelope`] is the only thing that crosses the thread boundary: the worker
//! builds one per network event and hands it to the ingestion queue, the
//! reconciler applies it to presentation-owned state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Fields recognised in the inbound JSON payload.
pub const RECOGNIZED_FIELDS: [&str; 5] = [
    "temperature",
    "humidity",
    "lightIntensity",
    "lightCondition",
    "mlClassification",
];

/// Errors raised while decoding a raw MQTT payload into a reading.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload carries none of the recognised fields")]
    NoRecognizedFields,
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Ambient light state reported by the sensor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightCondition {
    Bright,
    Dark,
}

impl LightCondition {
    /// Parses both the Indonesian labels sent by the node (`Terang`/`Gelap`)
    /// and their English equivalents, case-insensitively.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "bright" | "terang" => Some(Self::Bright),
            "dark" | "gelap" => Some(Self::Dark),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bright => "Bright",
            Self::Dark => "Dark",
        }
    }
}

/// Label computed on the node by its ML model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Cold,
    Normal,
    Hot,
}

impl Classification {
    pub const ALL: [Classification; 3] = [Self::Cold, Self::Normal, Self::Hot];

    /// Accepts `dingin`/`normal`/`panas` as well as `cold`/`normal`/`hot`.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "cold" | "dingin" => Some(Self::Cold),
            "normal" => Some(Self::Normal),
            "hot" | "panas" => Some(Self::Hot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cold => "Cold",
            Self::Normal => "Normal",
            Self::Hot => "Hot",
        }
    }
}

/// One decoded sensor reading, stamped on arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
    /// Raw LDR value
    pub light_intensity: i64,
    pub light_condition: LightCondition,
    #[serde(rename = "mlClassification")]
    pub classification: Classification,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

impl SensorReading {
    /// Checks the invariants a reading must hold before it enters the history.
    pub fn validate(&self) -> Result<(), String> {
        if !self.temperature.is_finite() {
            return Err(format!("non-finite temperature {}", self.temperature));
        }
        if !self.humidity.is_finite() {
            return Err(format!("non-finite humidity {}", self.humidity));
        }
        Ok(())
    }
}

/// Normalised unit of data handed from the network worker to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    SensorReading(SensorReading),
    ConnectionStatus {
        connected: bool,
        received_at: OffsetDateTime,
    },
    DecodeError {
        raw_payload: Vec<u8>,
        reason: String,
        received_at: OffsetDateTime,
    },
}

impl Envelope {
    pub fn connection(connected: bool, received_at: OffsetDateTime) -> Self {
        Envelope::ConnectionStatus { connected, received_at }
    }

    pub fn received_at(&self) -> OffsetDateTime {
        match self {
            Envelope::SensorReading(reading) => reading.received_at,
            Envelope::ConnectionStatus { received_at, .. } => *received_at,
            Envelope::DecodeError { received_at, .. } => *received_at,
        }
    }

    pub(crate) fn set_received_at(&mut self, at: OffsetDateTime) {
        match self {
            Envelope::SensorReading(reading) => reading.received_at = at,
            Envelope::ConnectionStatus { received_at, .. } => *received_at = at,
            Envelope::DecodeError { received_at, .. } => *received_at = at,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::SensorReading(_) => "sensor_reading",
            Envelope::ConnectionStatus { .. } => "connection_status",
            Envelope::DecodeError { .. } => "decode_error",
        }
    }
}

/// Decodes a raw payload into an envelope. Never fails: a payload that cannot
/// be turned into a reading becomes an [`Envelope::DecodeError`].
pub fn decode_payload(payload: &[u8], received_at: OffsetDateTime) -> Envelope {
    match parse_reading(payload, received_at) {
        Ok(reading) => Envelope::SensorReading(reading),
        Err(e) => Envelope::DecodeError {
            raw_payload: payload.to_vec(),
            reason: e.to_string(),
            received_at,
        },
    }
}

/// Parses the JSON payload published by the sensor node.
///
/// Missing fields fall back to the node's boot defaults; fields that are
/// present but unusable are rejected.
pub fn parse_reading(payload: &[u8], received_at: OffsetDateTime) -> Result<SensorReading, PayloadError> {
    let value: Value = serde_json::from_slice(payload)?;
    let obj = value.as_object().ok_or(PayloadError::NotAnObject)?;

    if !RECOGNIZED_FIELDS.iter().any(|f| obj.contains_key(*f)) {
        return Err(PayloadError::NoRecognizedFields);
    }

    let temperature = float_field(obj, "temperature")?.unwrap_or(0.0);
    let humidity = float_field(obj, "humidity")?.unwrap_or(0.0);
    let light_intensity = int_field(obj, "lightIntensity")?.unwrap_or(0);
    let light_condition = label_field(obj, "lightCondition", LightCondition::parse)?
        .unwrap_or(LightCondition::Bright);
    let classification = label_field(obj, "mlClassification", Classification::parse)?
        .unwrap_or(Classification::Normal);

    Ok(SensorReading {
        temperature,
        humidity,
        light_intensity,
        light_condition,
        classification,
        received_at,
    })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> PayloadError {
    PayloadError::InvalidField { field, reason: reason.into() }
}

fn float_field(obj: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, PayloadError> {
    let number = match obj.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(field, "not representable as f64"))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(field, format!("`{s}` is not numeric")))?,
        Some(other) => return Err(invalid(field, format!("unexpected {}", json_type(other)))),
    };
    if !number.is_finite() {
        return Err(invalid(field, "not a finite number"));
    }
    Ok(Some(number))
}

fn int_field(obj: &Map<String, Value>, field: &'static str) -> Result<Option<i64>, PayloadError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            truncate(n.as_f64(), field).map(Some)
        }
        Some(Value::String(s)) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Some(i));
            }
            truncate(s.parse::<f64>().ok(), field)
                .map_err(|_| invalid(field, format!("`{s}` is not numeric")))
                .map(Some)
        }
        Some(other) => Err(invalid(field, format!("unexpected {}", json_type(other)))),
    }
}

fn truncate(value: Option<f64>, field: &'static str) -> Result<i64, PayloadError> {
    match value {
        // i64::MAX as f64 rounds up to 2^63, which is already out of range.
        Some(v) if v.is_finite() && v >= i64::MIN as f64 && v < i64::MAX as f64 => Ok(v.trunc() as i64),
        _ => Err(invalid(field, "not an integer")),
    }
}

fn label_field<T>(
    obj: &Map<String, Value>,
    field: &'static str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, PayloadError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse(s)
            .map(Some)
            .ok_or_else(|| invalid(field, format!("unknown label `{s}`"))),
        Some(other) => Err(invalid(field, format!("unexpected {}", json_type(other)))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const AT: OffsetDateTime = datetime!(2026-03-01 08:30:00 UTC);

    #[test]
    fn test_decode_node_payload() {
        let payload = br#"{"temperature":25.3,"humidity":60.1,"lightIntensity":820,"lightCondition":"Terang","mlClassification":"normal"}"#;
        let reading = parse_reading(payload, AT).unwrap();
        assert_eq!(reading.temperature, 25.3);
        assert_eq!(reading.humidity, 60.1);
        assert_eq!(reading.light_intensity, 820);
        assert_eq!(reading.light_condition, LightCondition::Bright);
        assert_eq!(reading.classification, Classification::Normal);
        assert_eq!(reading.received_at, AT);
    }

    #[test]
    fn test_decode_english_labels_and_coercion() {
        let payload = br#"{"temperature":"31","humidity":40,"lightIntensity":120.9,"lightCondition":"dark","mlClassification":"HOT"}"#;
        let reading = parse_reading(payload, AT).unwrap();
        assert_eq!(reading.temperature, 31.0);
        assert_eq!(reading.humidity, 40.0);
        assert_eq!(reading.light_intensity, 120);
        assert_eq!(reading.light_condition, LightCondition::Dark);
        assert_eq!(reading.classification, Classification::Hot);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let reading = parse_reading(br#"{"temperature":18.5}"#, AT).unwrap();
        assert_eq!(reading.temperature, 18.5);
        assert_eq!(reading.humidity, 0.0);
        assert_eq!(reading.light_intensity, 0);
        assert_eq!(reading.light_condition, LightCondition::Bright);
        assert_eq!(reading.classification, Classification::Normal);
    }

    #[test]
    fn test_malformed_payloads_become_decode_errors() {
        for payload in [
            &b"not json"[..],
            &b"[1,2,3]"[..],
            &br#"{"foo":1}"#[..],
            &br#"{"temperature":"warm"}"#[..],
            &br#"{"lightCondition":"dusk"}"#[..],
            &br#"{"humidity":true}"#[..],
        ] {
            match decode_payload(payload, AT) {
                Envelope::DecodeError { raw_payload, received_at, .. } => {
                    assert_eq!(raw_payload, payload);
                    assert_eq!(received_at, AT);
                }
                other => panic!("expected decode error for {:?}, got {:?}", payload, other),
            }
        }
    }

    #[test]
    fn test_invalid_field_reason_names_the_field() {
        let err = parse_reading(br#"{"mlClassification":"tepid"}"#, AT).unwrap_err();
        assert!(err.to_string().contains("mlClassification"));
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let mut reading = parse_reading(br#"{"temperature":20}"#, AT).unwrap();
        assert!(reading.validate().is_ok());
        reading.humidity = f64::NAN;
        assert!(reading.validate().is_err());
    }

    #[test]
    fn test_out_of_range_light_intensity_is_rejected() {
        for payload in [
            br#"{"lightIntensity":9223372036854775808}"#.as_slice(),
            br#"{"lightIntensity":1e19}"#.as_slice(),
            br#"{"lightIntensity":"9223372036854775808.5"}"#.as_slice(),
        ] {
            assert!(matches!(
                decode_payload(payload, AT),
                Envelope::DecodeError { .. }
            ));
        }
        let r = parse_reading(br#"{"lightIntensity":-9223372036854775808}"#, AT).unwrap();
        assert_eq!(r.light_intensity, i64::MIN);
    }

    #[test]
    fn test_classification_labels_round_trip() {
        for class in Classification::ALL {
            assert_eq!(Classification::parse(class.as_str()), Some(class));
        }
    }
}

/*!
Payload builders for the sensor node wire format.

The node publishes one flat JSON object per reading. Builders exist for the
vocabulary the node actually sends (Indonesian labels) and for the English
labels the monitor also accepts, plus deliberately broken payloads for
decode-error tests.
*/

use serde_json::{Map, Value};

/// Which label set to emit for `lightCondition` and `mlClassification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    /// `Terang`/`Gelap`, `dingin`/`normal`/`panas`
    Indonesian,
    /// `Bright`/`Dark`, `cold`/`normal`/`hot`
    English,
}

impl Vocabulary {
    pub fn light_label(&self, dark: bool) -> &'static str {
        match (self, dark) {
            (Vocabulary::Indonesian, false) => "Terang",
            (Vocabulary::Indonesian, true) => "Gelap",
            (Vocabulary::English, false) => "Bright",
            (Vocabulary::English, true) => "Dark",
        }
    }

    /// `class` is one of `cold`, `normal`, `hot`.
    pub fn class_label(&self, class: &str) -> String {
        match (self, class) {
            (Vocabulary::Indonesian, "cold") => "dingin".into(),
            (Vocabulary::Indonesian, "hot") => "panas".into(),
            (_, other) => other.to_string(),
        }
    }
}

/// Fluent builder for a single reading payload. Unset fields are omitted
/// from the JSON, which is how partial payloads are produced.
#[derive(Debug, Clone, Default)]
pub struct SensorPayloadBuilder {
    fields: Map<String, Value>,
}

impl SensorPayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A complete payload as the node sends it.
    pub fn reading(temperature: f64, humidity: f64, light: i64, dark: bool, class: &str, vocab: Vocabulary) -> Value {
        Self::new()
            .temperature(temperature)
            .humidity(humidity)
            .light_intensity(light)
            .light_condition(vocab.light_label(dark))
            .classification(&vocab.class_label(class))
            .build()
    }

    pub fn temperature(mut self, value: f64) -> Self {
        self.fields.insert("temperature".into(), Value::from(value));
        self
    }

    pub fn humidity(mut self, value: f64) -> Self {
        self.fields.insert("humidity".into(), Value::from(value));
        self
    }

    pub fn light_intensity(mut self, value: i64) -> Self {
        self.fields.insert("lightIntensity".into(), Value::from(value));
        self
    }

    pub fn light_condition(mut self, label: &str) -> Self {
        self.fields.insert("lightCondition".into(), Value::from(label));
        self
    }

    pub fn classification(mut self, label: &str) -> Self {
        self.fields.insert("mlClassification".into(), Value::from(label));
        self
    }

    /// Sets an arbitrary field, e.g. a numeric value sent as a string.
    pub fn raw_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.build().to_string().into_bytes()
    }
}

/// Payloads the monitor must turn into decode errors.
pub mod malformed {
    pub fn not_json() -> Vec<u8> {
        b"temperature=25.3;humidity=60".to_vec()
    }

    pub fn truncated() -> Vec<u8> {
        br#"{"temperature": 25.3, "humid"#.to_vec()
    }

    pub fn array() -> Vec<u8> {
        br#"[25.3, 60.1, 820]"#.to_vec()
    }

    pub fn unrelated_object() -> Vec<u8> {
        br#"{"status": "online", "uptime": 1234}"#.to_vec()
    }

    pub fn unknown_label() -> Vec<u8> {
        br#"{"temperature": 25.3, "mlClassification": "lukewarm"}"#.to_vec()
    }
}

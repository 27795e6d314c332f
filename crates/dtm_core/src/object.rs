//! Cumulocity domain objects
//!
//! Objects travel between the platform and smart functions as JSON tagged by
//! `cumulocityType`. The tag picks the payload shape; everything the shape
//! does not name (fragments, custom properties) is kept in a flattened map so
//! a round trip through these types is lossless.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Discriminator of [`CumulocityObject`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CumulocityType {
    Measurement,
    Event,
    Alarm,
    Operation,
    ManagedObject,
}

impl CumulocityType {
    pub fn as_str(self) -> &'static str {
        match self {
            CumulocityType::Measurement => "measurement",
            CumulocityType::Event => "event",
            CumulocityType::Alarm => "alarm",
            CumulocityType::Operation => "operation",
            CumulocityType::ManagedObject => "managedObject",
        }
    }
}

impl fmt::Display for CumulocityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Downstream system an output object is routed to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Destination {
    Cumulocity,
    Offloading,
    StreamingAnalytics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalId {
    pub external_id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Reference to the device or asset an object belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementSource {
    pub id: String,
}

impl MeasurementSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Routing envelope around a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routed<P> {
    pub payload: P,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_source: Option<Vec<ExternalId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
}

impl<P> Routed<P> {
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            external_source: None,
            destination: None,
        }
    }

    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }
}

/// A single series value inside a measurement fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementValue {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MeasurementValue {
    pub fn new(value: f64, unit: Option<&str>) -> Self {
        Self {
            value,
            unit: unit.map(str::to_owned),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(rename = "type")]
    pub kind: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MeasurementSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    /// Fragments keyed by name, each mapping series names to values.
    #[serde(flatten)]
    pub fragments: Map<String, Value>,
}

impl Measurement {
    pub fn new(kind: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            time: time.into(),
            source: None,
            id: None,
            self_link: None,
            fragments: Map::new(),
        }
    }

    #[must_use]
    pub fn with_source(mut self, id: impl Into<String>) -> Self {
        self.source = Some(MeasurementSource::new(id));
        self
    }

    /// Insert `fragment.series = value`, creating the fragment if needed.
    #[must_use]
    pub fn with_series(mut self, fragment: &str, series: &str, value: MeasurementValue) -> Self {
        let entry = self
            .fragments
            .entry(fragment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let (Value::Object(map), Ok(encoded)) = (entry, serde_json::to_value(value)) {
            map.insert(series.to_owned(), encoded);
        }
        self
    }

    /// Look up `fragment.series`. Returns `None` when either level is absent
    /// or the value does not have the `{ value, unit? }` shape.
    pub fn series(&self, fragment: &str, series: &str) -> Option<MeasurementValue> {
        let raw = self.fragments.get(fragment)?.get(series)?;
        serde_json::from_value(raw.clone()).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MeasurementSource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmSeverity {
    Critical,
    Major,
    Minor,
    Warning,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmStatus {
    Active,
    Acknowledged,
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub time: String,
    pub severity: AlarmSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AlarmStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MeasurementSource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Object exchanged with smart functions, discriminated by `cumulocityType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cumulocityType", rename_all = "camelCase")]
pub enum CumulocityObject {
    Measurement(Routed<Measurement>),
    Event(Routed<Event>),
    Alarm(Routed<Alarm>),
    Operation(Routed<Operation>),
    ManagedObject(Routed<ManagedObject>),
}

impl CumulocityObject {
    /// Validate a raw JSON value against the variant its tag names.
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        let tag = value
            .get("cumulocityType")
            .ok_or(ModelError::MissingDiscriminator)?
            .as_str()
            .ok_or(ModelError::MissingDiscriminator)?
            .to_owned();
        serde_json::from_value(value).map_err(|source| ModelError::InvalidShape {
            cumulocity_type: tag,
            source,
        })
    }

    pub fn to_value(&self) -> Result<Value, ModelError> {
        serde_json::to_value(self).map_err(ModelError::Encode)
    }

    pub fn cumulocity_type(&self) -> CumulocityType {
        match self {
            CumulocityObject::Measurement(_) => CumulocityType::Measurement,
            CumulocityObject::Event(_) => CumulocityType::Event,
            CumulocityObject::Alarm(_) => CumulocityType::Alarm,
            CumulocityObject::Operation(_) => CumulocityType::Operation,
            CumulocityObject::ManagedObject(_) => CumulocityType::ManagedObject,
        }
    }

    pub fn destination(&self) -> Option<Destination> {
        match self {
            CumulocityObject::Measurement(o) => o.destination,
            CumulocityObject::Event(o) => o.destination,
            CumulocityObject::Alarm(o) => o.destination,
            CumulocityObject::Operation(o) => o.destination,
            CumulocityObject::ManagedObject(o) => o.destination,
        }
    }

    pub fn as_measurement(&self) -> Option<&Routed<Measurement>> {
        match self {
            CumulocityObject::Measurement(m) => Some(m),
            _ => None,
        }
    }
}

/// Structural check used before handing raw JSON to typed code.
pub fn is_measurement(value: &Value) -> bool {
    value.get("cumulocityType").and_then(Value::as_str) == Some("measurement")
        && value.get("payload").is_some_and(Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temperature() -> Value {
        json!({
            "payload": {
                "id": "12345",
                "type": "c8y_Temperature",
                "time": "2026-01-26T10:00:00.000Z",
                "self": "https://example.com/measurement/12345",
                "source": { "id": "device123" },
                "c8y_Temperature": { "T": { "value": 25.5, "unit": "°C" } }
            },
            "cumulocityType": "measurement",
            "destination": "cumulocity"
        })
    }

    #[test]
    fn measurement_is_tagged_by_cumulocity_type() {
        let object = CumulocityObject::from_value(temperature()).unwrap();
        assert_eq!(object.cumulocity_type(), CumulocityType::Measurement);
        assert_eq!(object.destination(), Some(Destination::Cumulocity));

        let measurement = &object.as_measurement().unwrap().payload;
        assert_eq!(measurement.kind, "c8y_Temperature");
        assert_eq!(measurement.self_link.as_deref(), Some("https://example.com/measurement/12345"));
        let value = measurement.series("c8y_Temperature", "T").unwrap();
        assert_eq!(value.value, 25.5);
        assert_eq!(value.unit.as_deref(), Some("°C"));
        assert!(measurement.series("c8y_Temperature", "X").is_none());
        assert!(measurement.series("c8y_Humidity", "T").is_none());
    }

    #[test]
    fn round_trip_keeps_unknown_fragments() {
        let original = temperature();
        let object = CumulocityObject::from_value(original.clone()).unwrap();
        assert_eq!(object.to_value().unwrap(), original);
    }

    #[test]
    fn missing_tag_is_rejected() {
        let err = CumulocityObject::from_value(json!({ "payload": {} })).unwrap_err();
        assert!(matches!(err, ModelError::MissingDiscriminator));
    }

    #[test]
    fn wrong_payload_shape_names_the_variant() {
        let err = CumulocityObject::from_value(json!({
            "cumulocityType": "alarm",
            "payload": { "type": "c8y_Overheat", "time": "2026-01-26T10:00:00.000Z" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("alarm"), "{err}");
    }

    #[test]
    fn with_series_builds_nested_fragment() {
        let m = Measurement::new("c8y_Pressure", "2026-01-27T14:30:00.000Z")
            .with_source("111")
            .with_series("c8y_Pressure2", "P2", MeasurementValue::new(1013.25, Some("hPa")));
        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "c8y_Pressure",
                "time": "2026-01-27T14:30:00.000Z",
                "source": { "id": "111" },
                "c8y_Pressure2": { "P2": { "value": 1013.25, "unit": "hPa" } }
            })
        );
    }

    #[test]
    fn is_measurement_checks_tag_and_payload() {
        assert!(is_measurement(&temperature()));
        assert!(!is_measurement(&json!({ "cumulocityType": "event", "payload": {} })));
        assert!(!is_measurement(&json!({ "cumulocityType": "measurement" })));
        assert!(!is_measurement(&Value::Null));
    }
}

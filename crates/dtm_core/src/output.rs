//! Validation of what a smart function returned.

use crate::error::ModelError;
use crate::object::CumulocityObject;
use serde_json::Value;

/// Result of `onMessage`: nothing, one object, or several.
#[derive(Debug, Clone, PartialEq)]
pub enum SmartFunctionOutput {
    Suppressed,
    Single(CumulocityObject),
    Many(Vec<CumulocityObject>),
}

impl SmartFunctionOutput {
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        match value {
            Value::Null => Ok(SmartFunctionOutput::Suppressed),
            Value::Object(_) => CumulocityObject::from_value(value).map(SmartFunctionOutput::Single),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    CumulocityObject::from_value(item).map_err(|reason| ModelError::InvalidElement {
                        index,
                        reason: Box::new(reason),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(SmartFunctionOutput::Many),
            Value::Bool(_) => Err(ModelError::UnexpectedOutput { found: "boolean" }),
            Value::Number(_) => Err(ModelError::UnexpectedOutput { found: "number" }),
            Value::String(_) => Err(ModelError::UnexpectedOutput { found: "string" }),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, SmartFunctionOutput::Suppressed)
    }

    /// Flatten into the list of objects to forward.
    pub fn into_vec(self) -> Vec<CumulocityObject> {
        match self {
            SmartFunctionOutput::Suppressed => Vec::new(),
            SmartFunctionOutput::Single(object) => vec![object],
            SmartFunctionOutput::Many(objects) => objects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn measurement(asset: &str) -> Value {
        json!({
            "payload": {
                "source": { "id": asset },
                "type": "c8y_Temperature",
                "time": "2026-01-26T10:00:00.000Z",
                "c8y_Temperature2": { "T2": { "value": 25.5, "unit": "°C" } }
            },
            "cumulocityType": "measurement",
            "destination": "cumulocity"
        })
    }

    #[test]
    fn null_is_suppressed() {
        let output = SmartFunctionOutput::from_value(Value::Null).unwrap();
        assert!(output.is_suppressed());
        assert!(output.into_vec().is_empty());
    }

    #[test]
    fn single_and_many_flatten_the_same_way() {
        let single = SmartFunctionOutput::from_value(measurement("asset456")).unwrap();
        let many = SmartFunctionOutput::from_value(json!([measurement("asset456")])).unwrap();
        assert_eq!(single.into_vec(), many.into_vec());
    }

    #[test]
    fn bad_element_reports_its_index() {
        let err = SmartFunctionOutput::from_value(json!([measurement("a"), { "payload": {} }]))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidElement { index: 1, .. }), "{err}");
    }

    #[test]
    fn scalars_are_rejected() {
        let err = SmartFunctionOutput::from_value(json!(42)).unwrap_err();
        assert!(matches!(err, ModelError::UnexpectedOutput { found: "number" }));
    }
}

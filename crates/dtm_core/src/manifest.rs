//! Smart function manifest
//!
//! Describes the functions bundled in a distribution: which file holds each
//! one, which object type it consumes and which context data it needs.

use crate::error::ModelError;
use crate::object::CumulocityType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtmMeasurementInput {
    #[serde(default)]
    pub linked_asset: bool,
    #[serde(default)]
    pub linked_series: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputObject {
    #[serde(rename = "type")]
    pub kind: CumulocityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<DtmMeasurementInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtmSmartFunctionManifest {
    pub name: String,
    #[serde(default)]
    pub disabled: bool,
    pub smart_function_file: String,
    pub input: InputObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

impl DtmSmartFunctionManifest {
    /// Parse a manifest file: either a single entry or a list of entries.
    pub fn parse_all(text: &str) -> Result<Vec<Self>, ModelError> {
        let value: Value = serde_json::from_str(text).map_err(ModelError::Manifest)?;
        match value {
            Value::Array(_) => serde_json::from_value(value).map_err(ModelError::Manifest),
            _ => serde_json::from_value(value)
                .map(|entry| vec![entry])
                .map_err(ModelError::Manifest),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    pub fn needs_linked_asset(&self) -> bool {
        self.input.context.is_some_and(|c| c.linked_asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_and_single_entry() {
        let list = r#"[{
            "name": "linked-asset-copy",
            "smartFunctionFile": "onmessage.fn.js",
            "input": { "type": "measurement", "context": { "linkedAsset": true } },
            "tags": ["measurement"]
        }]"#;
        let entries = DtmSmartFunctionManifest::parse_all(list).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_enabled());
        assert!(entries[0].needs_linked_asset());
        assert_eq!(entries[0].input.kind, CumulocityType::Measurement);

        let single = r#"{
            "name": "off",
            "disabled": true,
            "smartFunctionFile": "off.fn.js",
            "input": { "type": "event" }
        }"#;
        let entries = DtmSmartFunctionManifest::parse_all(single).unwrap();
        assert!(!entries[0].is_enabled());
        assert!(!entries[0].needs_linked_asset());
    }

    #[test]
    fn unknown_input_type_is_rejected() {
        let text = r#"{ "name": "x", "smartFunctionFile": "x.js", "input": { "type": "metric" } }"#;
        assert!(matches!(
            DtmSmartFunctionManifest::parse_all(text),
            Err(ModelError::Manifest(_))
        ));
    }
}

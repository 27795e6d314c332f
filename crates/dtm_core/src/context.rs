//! Context handed to a smart function alongside the object it transforms.
//!
//! The platform fills `linkedAsset` / `linkedSeries` from the function's
//! input configuration. The harness adds `console` when the context crosses
//! into the sandbox; it is not part of this model.

use crate::error::ModelError;
use crate::DTM_RUNTIME;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Asset a linked series is copied into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedAsset {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// Maps a device series (`fragment.series`) onto a series of a linked asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtmAssetLink {
    pub fragment: String,
    pub series: String,
    /// May be null when the platform could not resolve the asset.
    #[serde(default)]
    pub asset: Option<LinkedAsset>,
}

impl DtmAssetLink {
    pub fn new(fragment: &str, series: &str, asset: LinkedAsset) -> Self {
        Self {
            fragment: fragment.to_owned(),
            series: series.to_owned(),
            asset: Some(asset),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedSeriesSource {
    pub id: String,
    pub fragment: String,
    pub series: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtmLinkedSeries {
    pub fragment: String,
    pub series: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<LinkedSeriesSource>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtmContext {
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_asset_id: Option<String>,
    #[serde(default)]
    pub linked_asset: Option<Vec<DtmAssetLink>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_series: Option<Vec<DtmLinkedSeries>>,
}

fn default_runtime() -> String {
    DTM_RUNTIME.to_owned()
}

impl DtmContext {
    #[must_use]
    pub fn with_linked_asset(mut self, link: DtmAssetLink) -> Self {
        self.linked_asset.get_or_insert_with(Vec::new).push(link);
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn to_value(&self) -> Result<Value, ModelError> {
        serde_json::to_value(self).map_err(ModelError::Encode)
    }
}

impl Default for DtmContext {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            params: None,
            linked_asset_id: None,
            linked_asset: None,
            linked_series: None,
        }
    }
}

//! DTM Core
//!
//! Data model shared by the harness and the tooling:
//! - Cumulocity domain objects (measurement, event, alarm, operation, managed object)
//! - Smart function context (linked assets, linked series, params)
//! - Smart function output validation
//! - Smart function manifest

pub mod context;
pub mod error;
pub mod manifest;
pub mod object;
pub mod output;

pub use context::{DtmAssetLink, DtmContext, DtmLinkedSeries, LinkedAsset, LinkedSeriesSource};
pub use error::ModelError;
pub use manifest::{DtmMeasurementInput, DtmSmartFunctionManifest, InputObject};
pub use object::{
    is_measurement, Alarm, AlarmSeverity, AlarmStatus, CumulocityObject, CumulocityType,
    Destination, Event, ExternalId, ManagedObject, Measurement, MeasurementSource,
    MeasurementValue, Operation, Routed,
};
pub use output::SmartFunctionOutput;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the function every smart function script must export.
pub const ON_MESSAGE_FN_NAME: &str = "onMessage";

/// Value of `context.runtime` handed to smart functions.
pub const DTM_RUNTIME: &str = "cumulocity-dtm";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}

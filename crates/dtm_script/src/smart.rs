//! Typed entry point for smart functions.
//!
//! `execute` speaks plain JSON. `on_message` is the call the platform makes:
//! a Cumulocity object in, zero or more Cumulocity objects out, with the
//! result checked against the object model before it is handed back.

use crate::error::{HarnessError, Result};
use crate::runner::SmartFunctionsRunner;
use dtm_core::{CumulocityObject, DtmContext, SmartFunctionOutput, ON_MESSAGE_FN_NAME};

impl SmartFunctionsRunner {
    /// Runs the script's `onMessage` export on `object`.
    pub fn on_message(
        &mut self,
        object: &CumulocityObject,
        context: &DtmContext,
    ) -> Result<SmartFunctionOutput> {
        let input = object.to_value().map_err(HarnessError::InvalidInput)?;
        let context = context.to_value().map_err(HarnessError::InvalidInput)?;
        let value = self.execute(ON_MESSAGE_FN_NAME, input, Some(context))?;
        SmartFunctionOutput::from_value(value).map_err(|reason| {
            tracing::debug!(%reason, "smart function output rejected");
            HarnessError::InvalidOutput {
                function: ON_MESSAGE_FN_NAME.to_string(),
                reason,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::LogLevel;
    use crate::options::RunnerOptions;
    use dtm_core::{
        AlarmSeverity, DtmAssetLink, LinkedAsset, Measurement, MeasurementValue, Routed,
    };
    use serde_json::{json, Map};
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn functions_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../functions")
    }

    fn bundled(file: &str) -> SmartFunctionsRunner {
        let mut runner = SmartFunctionsRunner::new(
            RunnerOptions::new(file)
                .with_base_dir(functions_dir())
                .with_capture_console(true),
        );
        runner.initialize().unwrap();
        runner
    }

    fn temperature(value: f64) -> CumulocityObject {
        let payload = Measurement::new("c8y_Temperature", "2026-01-26T10:00:00.000Z")
            .with_source("device123")
            .with_series("c8y_Temperature", "T", MeasurementValue::new(value, Some("°C")));
        CumulocityObject::Measurement(Routed::new(payload))
    }

    fn asset(id: &str, fragment: &str, series: &str) -> LinkedAsset {
        LinkedAsset {
            id: id.into(),
            fragment: Some(fragment.into()),
            series: Some(series.into()),
            label: None,
            extra: BTreeMap::new(),
        }
    }

    fn debug_logged(runner: &SmartFunctionsRunner, needle: &str) -> bool {
        runner
            .console_logs()
            .iter()
            .any(|log| log.level == LogLevel::Debug && log.contains(needle))
    }

    #[test]
    fn linked_series_is_copied_onto_the_asset() {
        let mut runner = bundled("onmessage.fn.ts");
        let context = DtmContext::default().with_linked_asset(DtmAssetLink::new(
            "c8y_Temperature",
            "T",
            asset("asset456", "c8y_Temperature2", "T2"),
        ));

        let output = runner.on_message(&temperature(25.5), &context).unwrap();
        let objects = output.into_vec();
        assert_eq!(objects.len(), 1);
        let copy = objects[0].as_measurement().unwrap();
        assert_eq!(copy.payload.source.as_ref().unwrap().id, "asset456");
        assert_eq!(
            copy.payload.series("c8y_Temperature2", "T2"),
            Some(MeasurementValue::new(25.5, Some("°C")))
        );
        assert!(copy.payload.series("c8y_Temperature", "T").is_none());
        assert!(debug_logged(&runner, "Created persistent measurement for asset asset456"));
    }

    #[test]
    fn raw_execute_returns_the_asset_measurement() {
        let mut runner = bundled("onmessage.fn.ts");
        let input = json!({
            "payload": {
                "id": "7001",
                "self": "https://tenant.example/measurement/measurements/7001",
                "source": { "id": "device123" },
                "type": "c8y_Temperature",
                "time": "2026-01-26T10:00:00.000Z",
                "c8y_Temperature": { "T": { "value": 25.5, "unit": "°C" } }
            },
            "cumulocityType": "measurement"
        });
        let context = json!({
            "runtime": "cumulocity-dtm",
            "linkedAsset": {
                "asset": { "id": "asset456", "fragment": "c8y_Temperature2", "series": "T2" },
                "fragment": "c8y_Temperature",
                "series": "T"
            }
        });

        let value = runner.execute(ON_MESSAGE_FN_NAME, input, Some(context)).unwrap();
        assert_eq!(
            value,
            json!([{
                "payload": {
                    "source": { "id": "asset456" },
                    "type": "c8y_Temperature",
                    "time": "2026-01-26T10:00:00.000Z",
                    "c8y_Temperature2": { "T2": { "value": 25.5, "unit": "°C" } }
                },
                "cumulocityType": "measurement",
                "destination": "cumulocity"
            }])
        );
    }

    #[test]
    fn every_link_gets_its_own_copy() {
        let mut runner = bundled("onmessage.fn.ts");
        let context = DtmContext::default()
            .with_linked_asset(DtmAssetLink::new("c8y_Temperature", "T", asset("a1", "f1", "s1")))
            .with_linked_asset(DtmAssetLink::new("c8y_Temperature", "T", asset("a2", "f2", "s2")));

        let objects = runner.on_message(&temperature(3.0), &context).unwrap().into_vec();
        let ids: Vec<&str> = objects
            .iter()
            .filter_map(|o| o.as_measurement())
            .filter_map(|m| m.payload.source.as_ref())
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, ["a1", "a2"]);
    }

    #[test]
    fn missing_link_suppresses_output() {
        let mut runner = bundled("onmessage.fn.ts");
        let output = runner.on_message(&temperature(1.0), &DtmContext::default()).unwrap();
        assert!(output.is_suppressed());
        assert!(debug_logged(&runner, "No linked asset in context"));
    }

    #[test]
    fn unresolved_asset_is_skipped() {
        let mut runner = bundled("onmessage.fn.ts");
        let mut link = DtmAssetLink::new("c8y_Temperature", "T", asset("x", "f", "s"));
        link.asset = None;
        let context = DtmContext::default().with_linked_asset(link);

        let output = runner.on_message(&temperature(30.0), &context).unwrap();
        assert_eq!(output, SmartFunctionOutput::Many(Vec::new()));
        assert!(debug_logged(&runner, "Skipping measurement processing for"));
    }

    #[test]
    fn absent_series_is_an_execution_error() {
        let mut runner = bundled("onmessage.fn.ts");
        let context = DtmContext::default().with_linked_asset(DtmAssetLink::new(
            "c8y_Pressure",
            "P",
            asset("asset456", "f", "s"),
        ));
        match runner.on_message(&temperature(1.0), &context) {
            Err(HarnessError::ExecutionError { message, .. }) => assert_eq!(
                message,
                "Fragment c8y_Pressure or series P not found in measurement"
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn threshold_alarm_uses_params_and_helpers() {
        let params = Map::from_iter([("limit".to_string(), json!(50))]);
        let mut runner = SmartFunctionsRunner::new(
            RunnerOptions::new("threshold-alarm.fn.ts")
                .with_base_dir(functions_dir())
                .with_capture_console(true)
                .with_params(params),
        );
        runner.initialize().unwrap();
        assert_eq!(runner.artifact().unwrap().modules().len(), 2);

        let quiet = runner.on_message(&temperature(20.0), &DtmContext::default()).unwrap();
        assert_eq!(quiet, SmartFunctionOutput::Many(Vec::new()));

        let objects = runner
            .on_message(&temperature(75.0), &DtmContext::default())
            .unwrap()
            .into_vec();
        assert_eq!(objects.len(), 1);
        let CumulocityObject::Alarm(alarm) = &objects[0] else {
            panic!("expected an alarm, got {:?}", objects[0]);
        };
        assert_eq!(alarm.payload.kind, "c8y_Temperature_T_threshold");
        assert_eq!(alarm.payload.severity, AlarmSeverity::Major);
        assert_eq!(alarm.payload.source.as_ref().unwrap().id, "device123");
        assert!(alarm.payload.text.contains("75 °C exceeds 50"));
        assert!(runner.console_logs().iter().any(|l| l.level == LogLevel::Log
            && l.contains("threshold exceeded")));
    }

    #[test]
    fn malformed_output_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("bad.ts"),
            "export function onMessage(obj: any) { return [obj, { cumulocityType: 'metric' }]; }\n",
        )
        .unwrap();
        let mut runner =
            SmartFunctionsRunner::new(RunnerOptions::new("bad.ts").with_base_dir(dir.path()));
        runner.initialize().unwrap();

        match runner.on_message(&temperature(1.0), &DtmContext::default()) {
            Err(HarnessError::InvalidOutput { function, .. }) => {
                assert_eq!(function, ON_MESSAGE_FN_NAME)
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

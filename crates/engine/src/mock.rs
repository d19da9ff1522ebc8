//! Mock payload loading for mocked runs.
//!
//! A mocked endpoint stage is satisfied by its `mock` definition instead of a
//! real HTTP call: the payload (inline or from a file next to the workflow
//! document) is template-resolved, parsed as JSON, and wrapped in a synthetic
//! response whose status is `mock.status`, falling back to the stage's
//! `expectedStatus`, then 200.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;

use flowctl_types::MockSpec;

use crate::context::{ResponseContext, TemplateContext};
use crate::error::{EngineError, EngineResult};
use crate::template::resolve_template;

const DEFAULT_MOCK_STATUS: u16 = 200;

/// Builds the synthetic response for a mocked endpoint stage.
pub fn build_mock_response(
    stage: &str,
    mock: &MockSpec,
    expected_status: Option<u16>,
    document_dir: &Path,
    context: &TemplateContext,
) -> EngineResult<ResponseContext> {
    let invalid = |reason: String| EngineError::InvalidMockPayload {
        stage: stage.to_string(),
        reason,
    };

    let raw = match (&mock.payload, &mock.payload_file) {
        (Some(_), Some(_)) => return Err(invalid("both payload and payloadFile are set".into())),
        (Some(payload), None) => payload.clone(),
        (None, Some(file)) => {
            let path = document_dir.join(file);
            fs::read_to_string(&path).map_err(|error| invalid(format!("cannot read payload file {}: {}", path.display(), error)))?
        }
        (None, None) => return Err(invalid("mock has neither payload nor payloadFile".into())),
    };

    let body = resolve_template(&raw, context)?;
    let json: Value = serde_json::from_str(&body).map_err(|error| invalid(format!("payload is not valid JSON: {}", error)))?;

    Ok(ResponseContext {
        status: mock.status.or(expected_status).unwrap_or(DEFAULT_MOCK_STATUS),
        body,
        headers: IndexMap::new(),
        json: Some(json),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use chrono::TimeZone;
    use flowctl_util::FixedClock;
    use indexmap::indexmap;
    use std::collections::HashMap;

    fn snapshot_parts() -> (ExecutionContext, FixedClock) {
        let execution = ExecutionContext::new(
            indexmap! {"id".to_string() => "abc".to_string()},
            HashMap::new(),
            Default::default(),
            0,
        );
        let clock = FixedClock::new(chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        (execution, clock)
    }

    #[test]
    fn inline_payload_is_resolved_and_parsed() {
        let (execution, clock) = snapshot_parts();
        let snapshot = execution.snapshot(&clock);
        let dir = tempfile::tempdir().expect("create temp dir");

        let mock = MockSpec {
            payload: Some("{\"id\": \"{{input.id}}\"}".into()),
            ..Default::default()
        };
        let response = build_mock_response("create", &mock, Some(201), dir.path(), &snapshot).expect("mock response");
        assert_eq!(response.status, 201);
        assert_eq!(response.json.as_ref().and_then(|json| json.get("id")).and_then(|id| id.as_str()), Some("abc"));
    }

    #[test]
    fn payload_file_is_read_next_to_the_document() {
        let (execution, clock) = snapshot_parts();
        let snapshot = execution.snapshot(&clock);
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join("mock.json"), "{\"ready\": true}").expect("write payload file");

        let mock = MockSpec {
            payload_file: Some("mock.json".into()),
            status: Some(202),
            ..Default::default()
        };
        let response = build_mock_response("probe", &mock, None, dir.path(), &snapshot).expect("mock response");
        assert_eq!(response.status, 202);
        assert_eq!(response.body, "{\"ready\": true}");
    }

    #[test]
    fn status_falls_back_to_expected_then_200() {
        let (execution, clock) = snapshot_parts();
        let snapshot = execution.snapshot(&clock);
        let dir = tempfile::tempdir().expect("create temp dir");

        let mock = MockSpec {
            payload: Some("{}".into()),
            ..Default::default()
        };
        assert_eq!(build_mock_response("s", &mock, Some(204), dir.path(), &snapshot).unwrap().status, 204);
        assert_eq!(build_mock_response("s", &mock, None, dir.path(), &snapshot).unwrap().status, 200);
    }

    #[test]
    fn conflicting_missing_or_invalid_payloads_are_rejected() {
        let (execution, clock) = snapshot_parts();
        let snapshot = execution.snapshot(&clock);
        let dir = tempfile::tempdir().expect("create temp dir");

        let both = MockSpec {
            payload: Some("{}".into()),
            payload_file: Some("mock.json".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_mock_response("s", &both, None, dir.path(), &snapshot),
            Err(EngineError::InvalidMockPayload { .. })
        ));

        let neither = MockSpec::default();
        assert!(matches!(
            build_mock_response("s", &neither, None, dir.path(), &snapshot),
            Err(EngineError::InvalidMockPayload { .. })
        ));

        let invalid = MockSpec {
            payload: Some("not json".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_mock_response("s", &invalid, None, dir.path(), &snapshot),
            Err(EngineError::InvalidMockPayload { .. })
        ));
    }
}

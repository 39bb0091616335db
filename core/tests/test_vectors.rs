//! Check response parsing and cache-key derivation against the JSON vectors
//! in `test-vectors/`.
//!
//! The vector files are shared fixtures: any client of the clinic API has to
//! map the same responses to the same error fields and the same params to the
//! same keys. Details are compared as parsed JSON, never as raw strings.

use clinic_core::client::parse_response;
use clinic_core::{ApiError, CacheKey, HttpResponse, QueryParams};
use serde_json::Value;

fn load(raw: &str) -> Vec<Value> {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

#[test]
fn error_response_vectors() {
    for case in load(include_str!("../../test-vectors/error_responses.json")) {
        let name = case["name"].as_str().unwrap();
        let sim = &case["response"];
        let response = HttpResponse::new(
            sim["status"].as_u64().unwrap() as u16,
            sim["body"].as_str().unwrap(),
        );

        let err: ApiError = parse_response::<Value>(&response).unwrap_err();
        let expected = &case["expected"];
        assert_eq!(
            err.status(),
            Some(expected["status"].as_u64().unwrap() as u16),
            "{name}: status"
        );
        assert_eq!(err.code().as_deref(), expected["code"].as_str(), "{name}: code");
        assert_eq!(err.message(), expected["message"].as_str().unwrap(), "{name}: message");
        assert_eq!(
            err.details().cloned().unwrap_or(Value::Null),
            expected["details"],
            "{name}: details"
        );
    }
}

#[test]
fn cache_key_vectors() {
    for case in load(include_str!("../../test-vectors/cache_keys.json")) {
        let name = case["name"].as_str().unwrap();
        let params = match &case["params"] {
            Value::Null => None,
            value => Some(QueryParams::from_serialize(value).unwrap()),
        };

        let key = CacheKey::new(case["endpoint"].as_str().unwrap(), params.as_ref());
        assert_eq!(key.as_str(), case["expected_key"].as_str().unwrap(), "{name}");
    }
}

#[test]
fn success_envelope_parses() {
    let response = HttpResponse::new(
        200,
        r#"{"data":{"message":"Doctor deactivated"},"success":true}"#,
    );
    let parsed: clinic_core::types::ApiResponse<clinic_core::types::MessageBody> =
        parse_response(&response).unwrap();
    assert!(parsed.success);
    assert_eq!(parsed.data.message, "Doctor deactivated");
    assert!(parsed.message.is_none());
}

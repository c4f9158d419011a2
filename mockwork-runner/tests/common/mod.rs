//! Shared fixtures for runner integration tests.

#![allow(dead_code)]

use mockwork_runner::prelude::*;
use serde_json::{Value, json};
use std::path::PathBuf;

/// Directory of a named fixture.
pub fn fixture_dir(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Host executing the named fixture's workflow.
pub fn fixture_host(name: &str) -> LocalWorkflowHost {
    LocalWorkflowHost::from_file(fixture_dir(name).join("workflow.json")).unwrap()
}

/// Builder for the named fixture, with its settings file loaded.
pub fn fixture_runner(name: &str) -> TestRunnerBuilder {
    init_test_tracing();
    TestRunner::builder(fixture_host(name))
        .with_settings_file(fixture_dir(name).join("local.settings.json"))
}

/// The person record served by the data endpoint.
pub fn person() -> Value {
    json!({
        "id": 54624,
        "title": "Mr",
        "firstName": "Peter",
        "lastName": "Smith",
        "dateOfBirth": "1970-04-25",
        "languageCode": "en-GB",
        "address": {
            "line1": "8 High Street",
            "line2": null,
            "town": "Luton",
            "county": "Bedfordshire",
            "postcode": "LT12 6TY",
            "countryCode": "UK",
            "countryName": "United Kingdom"
        }
    })
}

/// A person record padded with history so it spans several 512-byte chunks.
pub fn large_person() -> Value {
    let mut record = person();
    let history: Vec<Value> = (0..24)
        .map(|i| json!({ "year": 2000 + i, "note": format!("annual review entry {:02}", i) }))
        .collect();
    record["history"] = Value::Array(history);
    record
}

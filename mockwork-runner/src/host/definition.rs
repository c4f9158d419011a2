//! Workflow definition - the JSON document executed by [`LocalWorkflowHost`].
//!
//! [`LocalWorkflowHost`]: super::LocalWorkflowHost

use http::Method;
use mockwork_core::error::{MockworkError, Result};
use mockwork_core::monitor::ActionStatus;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// A workflow: one trigger and a sequence of named actions.
///
/// # Example
///
/// ```json
/// {
///   "name": "http-chunked-transfer",
///   "trigger": { "method": "POST", "responseStatus": 202 },
///   "actions": [
///     {
///       "name": "GET",
///       "type": "Http",
///       "inputs": { "method": "GET", "path": "/api/v1/data" }
///     },
///     {
///       "name": "POST",
///       "type": "Http",
///       "runAfter": ["Succeeded"],
///       "inputs": {
///         "method": "POST",
///         "path": "/api/v1.1/upload",
///         "body": { "kind": "actionOutput", "action": "GET" },
///         "transferMode": "chunked"
///       }
///     }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Workflow name.
    #[serde(default)]
    pub name: String,

    /// How the workflow is started.
    #[serde(default)]
    pub trigger: TriggerDefinition,

    /// Actions, executed in order.
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

/// Trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDefinition {
    /// Required trigger method. Any method is accepted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Status of the synchronous trigger response.
    #[serde(default = "default_response_status")]
    pub response_status: u16,
}

impl Default for TriggerDefinition {
    fn default() -> Self {
        Self {
            method: None,
            response_status: default_response_status(),
        }
    }
}

fn default_response_status() -> u16 {
    202
}

/// One named action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    /// Unique action name.
    pub name: String,

    /// Action kind.
    #[serde(rename = "type", default)]
    pub action_type: ActionType,

    /// Statuses of the preceding action that allow this one to run.
    #[serde(default = "default_run_after")]
    pub run_after: Vec<ActionStatus>,

    /// Action inputs.
    pub inputs: HttpAction,
}

fn default_run_after() -> Vec<ActionStatus> {
    vec![ActionStatus::Succeeded]
}

/// Supported action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActionType {
    /// Outbound HTTP call.
    #[default]
    Http,
}

/// Inputs of an HTTP action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpAction {
    /// HTTP method.
    pub method: String,

    /// Path relative to the mock server, or an absolute URL.
    /// May contain `@{appsetting('Name')}` placeholders.
    pub path: String,

    /// Request headers. Values may contain placeholders.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Where the request body comes from.
    #[serde(default)]
    pub body: BodySource,

    /// Whether to send the body in one request or through the chunked protocol.
    #[serde(default)]
    pub transfer_mode: TransferMode,

    /// Extra attempts after a 5xx response or a transport error.
    #[serde(default)]
    pub retry_count: u32,
}

/// Source of an action's request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BodySource {
    /// No body.
    #[default]
    None,
    /// The body of the trigger request.
    TriggerBody,
    /// The response body of an earlier action.
    ActionOutput {
        /// Name of the earlier action.
        action: String,
    },
    /// A literal JSON value.
    Json {
        /// The value to send.
        value: serde_json::Value,
    },
}

/// Transfer mode of an HTTP action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Single request.
    #[default]
    Whole,
    /// Chunked-transfer upload.
    Chunked,
}

impl WorkflowDefinition {
    /// Parse and validate a definition from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: Self =
            serde_json::from_str(json).map_err(|e| MockworkError::InvalidWorkflow {
                cause: e.to_string(),
            })?;
        definition.validate()?;
        Ok(definition)
    }

    /// Parse and validate a definition from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| MockworkError::Io {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    /// Check names, methods and body references.
    pub fn validate(&self) -> Result<()> {
        let invalid = |cause: String| MockworkError::InvalidWorkflow { cause };

        if let Some(method) = &self.trigger.method {
            parse_method(method).map_err(invalid)?;
        }
        if http::StatusCode::from_u16(self.trigger.response_status).is_err() {
            return Err(invalid(format!(
                "invalid trigger response status {}",
                self.trigger.response_status
            )));
        }

        let mut seen = HashSet::new();
        for action in &self.actions {
            if action.name.trim().is_empty() {
                return Err(invalid("action name must not be empty".to_string()));
            }
            if let BodySource::ActionOutput { action: source } = &action.inputs.body {
                if !seen.contains(source.as_str()) {
                    return Err(invalid(format!(
                        "action '{}' reads output of '{}', which does not run before it",
                        action.name, source
                    )));
                }
            }
            if !seen.insert(action.name.as_str()) {
                return Err(invalid(format!("duplicate action name '{}'", action.name)));
            }
            if action.run_after.is_empty() {
                return Err(invalid(format!(
                    "action '{}' has an empty runAfter list",
                    action.name
                )));
            }
            parse_method(&action.inputs.method).map_err(invalid)?;
        }
        Ok(())
    }

    /// Look up an action by name.
    pub fn action(&self, name: &str) -> Option<&ActionDefinition> {
        self.actions.iter().find(|a| a.name == name)
    }
}

pub(crate) fn parse_method(method: &str) -> std::result::Result<Method, String> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|e| format!("invalid method '{}': {}", method, e))
}

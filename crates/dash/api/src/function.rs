use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Registry record for a callable Function: a pair of Model names forming
/// the input (request) and output (reply) topics (spec.md §6, §4.6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema, CustomResource)]
#[kube(
    group = "dash.ulagbulag.io",
    version = "v1alpha1",
    kind = "Function",
    root = "FunctionCrd",
    status = "FunctionStatus",
    shortname = "fn",
    namespaced,
    printcolumn = r#"{
        "name": "input",
        "type": "string",
        "description": "input model name",
        "jsonPath": ".spec.input"
    }"#,
    printcolumn = r#"{
        "name": "output",
        "type": "string",
        "description": "output model name",
        "jsonPath": ".spec.output"
    }"#,
    printcolumn = r#"{
        "name": "state",
        "type": "string",
        "description": "state of the function",
        "jsonPath": ".status.state"
    }"#,
    printcolumn = r#"{
        "name": "created-at",
        "type": "date",
        "description": "created time",
        "jsonPath": ".metadata.creationTimestamp"
    }"#
)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// Model name backing the request-side topic.
    pub input: String,
    /// Model name backing the reply-side topic.
    pub output: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStatus {
    #[serde(default)]
    pub state: FunctionState,
}

#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    Default,
    EnumString,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum FunctionState {
    #[default]
    Pending,
    Ready,
    Deleting,
}

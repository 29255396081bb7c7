use ark_core_k8s::data::Url;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::model_user::ModelUserAccessTokenSecretRefSpec;

/// Registry record binding a Model name to one storage backend (spec.md §3
/// "Storage Binding", §6 `modelstoragebindings`). The Global Namespace lists
/// these to discover every model table it should federate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema, CustomResource)]
#[kube(
    group = "dash.ulagbulag.io",
    version = "v1alpha1",
    kind = "ModelStorageBinding",
    root = "ModelStorageBindingCrd",
    status = "ModelStorageBindingStatus",
    shortname = "msb",
    namespaced,
    printcolumn = r#"{
        "name": "model",
        "type": "string",
        "description": "bound model name",
        "jsonPath": ".spec.model"
    }"#,
    printcolumn = r#"{
        "name": "state",
        "type": "string",
        "description": "state of the model storage binding",
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
pub struct ModelStorageBindingSpec {
    pub model: String,
    pub storage: ModelStorageBindingStorageSpec,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ModelStorageBindingStorageSpec {
    Cloned { source: String, target: String },
    Owned { target: String },
}

impl ModelStorageBindingStorageSpec {
    pub fn target(&self) -> &str {
        match self {
            Self::Cloned { target, .. } | Self::Owned { target } => target,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelStorageBindingStatus {
    #[serde(default)]
    pub state: ModelStorageBindingState,
    #[serde(default)]
    pub storage: Option<ModelStorageBindingStorageStatus>,
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
pub enum ModelStorageBindingState {
    #[default]
    Pending,
    Ready,
    Deleting,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ModelStorageBindingStorageStatus {
    Cloned(ModelStorageBindingStorageTargetStatus),
    Owned(ModelStorageBindingStorageTargetStatus),
}

impl ModelStorageBindingStorageStatus {
    /// The resolved backend, if the binding targets object storage (spec.md
    /// §4.7: bindings whose storage kind is not `objectStorage` are skipped).
    pub fn object_storage(&self) -> Option<&ModelStorageBindingObjectStorageStatus> {
        match self {
            Self::Cloned(target) | Self::Owned(target) => target.object_storage.as_ref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelStorageBindingStorageTargetStatus {
    #[serde(default)]
    pub object_storage: Option<ModelStorageBindingObjectStorageStatus>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelStorageBindingObjectStorageStatus {
    #[serde(default)]
    pub endpoint: Option<Url>,
    #[serde(default)]
    pub secret_ref: ModelUserAccessTokenSecretRefSpec,
    #[serde(default)]
    pub borrowed: Option<bool>,
}

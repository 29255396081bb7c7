#[cfg(feature = "s3")]
pub mod s3;
#[cfg(feature = "deltalake")]
pub mod table;

use anyhow::Result;
use ark_core_k8s::data::Name;
use async_trait::async_trait;
use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Storage kind tag carried on the wire by a Payload Descriptor
/// (spec.md §3). `Passthrough` payloads never reach a [`Storage`]
/// implementor: `Model::get_payload` resolves them directly from the
/// descriptor's inline `value`.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
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
pub enum StorageType {
    Passthrough,
    #[cfg(feature = "s3")]
    S3,
}

/// Object Store Client operations used by the core (spec.md §4.3): PUT/GET
/// of arbitrary byte payloads keyed by `(bucket, object)`, where the bucket
/// is always the owning Model's own name.
#[async_trait]
pub trait Storage {
    async fn get(&self, model: &Name, path: &str) -> Result<Bytes>;

    async fn put_with_model(&self, model: &Name, path: &str, bytes: Bytes) -> Result<String>;
}

pub type Stream<T> = ::std::pin::Pin<Box<dyn Send + ::futures::Stream<Item = Result<T>>>>;

use std::{collections::BTreeMap, sync::Arc};

use anyhow::{bail, Result};
use ark_core_k8s::data::Name;
use bytes::Bytes;
use chrono::Utc;
use dash_pipe_api::storage::StorageS3Args;
use deltalake::{datafusion::execution::context::SessionContext, DeltaTable};
use futures::{stream::FuturesOrdered, TryStreamExt};
use inflector::Inflector;
use tracing::{instrument, Level};

use crate::{
    message::{DynMap, DynValue, PipeMessage, PipePayload, StorageType},
    storage::{
        s3,
        table::{self, TableState},
        Storage,
    },
};

/// A PUT input: either raw bytes or a structured value, JSON-encoded before
/// upload (spec.md §4.4 `build_envelope` step 2).
#[derive(Clone, Debug)]
pub enum PayloadInput {
    Bytes(Bytes),
    Json(DynValue),
}

impl PayloadInput {
    fn into_bytes(self) -> Result<Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Json(value) => ::serde_json::to_vec(&value).map(Into::into).map_err(Into::into),
        }
    }
}

impl From<Bytes> for PayloadInput {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for PayloadInput {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value.into())
    }
}

impl From<DynValue> for PayloadInput {
    fn from(value: DynValue) -> Self {
        Self::Json(value)
    }
}

/// Caller-supplied payload mapping. A `Vec` rather than a `HashMap` because
/// spec.md §3 invariant 1 requires the output descriptor order to match the
/// *iteration order* of the input mapping -- a property a hash map cannot
/// give us for free.
pub type Payloads = Vec<(String, PayloadInput)>;

/// Immutable per-model configuration: naming, storage-option normalization,
/// payload PUT/GET, envelope building, and table access (spec.md §3
/// "Model", §4.4). Cheap to clone (wraps its object-store client in `Arc`
/// internally via `s3::Storage`'s own `Clone`); created on demand and
/// shared by value, with no explicit teardown.
#[derive(Clone)]
pub struct Model {
    name: Name,
    table_name: String,
    table_uri: String,
    storage_options: BTreeMap<String, String>,
    s3_args: Arc<StorageS3Args>,
    s3: s3::Storage,
    timestamp: String,
    user_name: String,
}

impl Model {
    #[instrument(level = Level::INFO, skip(s3_args), err(Display))]
    pub fn new(name: Name, user_name: String, s3_args: StorageS3Args) -> Result<Self> {
        let table_name = name.as_str().replace('.', "_").to_snake_case();
        let table_uri = table::table_uri(name.as_str());
        let storage_options = normalize_storage_options(&s3_args);
        let s3 = s3::Storage::try_new(&s3_args, name.as_str().to_string())?;
        let timestamp = Utc::now().to_rfc3339().replace(':', "-");

        Ok(Self {
            name,
            table_name,
            table_uri,
            storage_options,
            s3_args: Arc::new(s3_args),
            s3,
            timestamp,
            user_name,
        })
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Depends only on `name` (spec.md §3 invariant 3).
    pub fn table_uri(&self) -> &str {
        &self.table_uri
    }

    pub fn storage_options(&self) -> &BTreeMap<String, String> {
        &self.storage_options
    }

    /// `<endpoint>/<bucket>/<object>` for external HTTP consumers; never
    /// signed (spec.md §4.4 `get_payload_url`).
    pub fn get_payload_url<Value>(&self, descriptor: &PipePayload<Value>) -> String
    where
        Value: schemars::JsonSchema,
    {
        let bucket = descriptor.model.as_ref().unwrap_or(&self.name);
        let path = descriptor.path.as_deref().unwrap_or_default();
        let endpoint = self.s3_args.s3_endpoint.to_string();
        let endpoint = endpoint.trim_end_matches('/');
        format!("{endpoint}/{bucket}/{path}")
    }

    /// Dispatches on `descriptor.storage` (spec.md §4.4 `get_payload`).
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn get_payload(&self, descriptor: &PipePayload) -> Result<Bytes> {
        match descriptor.storage {
            Some(StorageType::Passthrough) | None => {
                Ok(descriptor.value.clone().unwrap_or_default())
            }
            Some(StorageType::S3) => match descriptor.model.as_ref().zip(descriptor.path.as_ref())
            {
                Some((model, path)) => self.s3.get(model, path).await,
                // degenerate pass-through: either half of the locator is
                // missing, so there is nothing to fetch (spec.md §4.4).
                None => Ok(descriptor.value.clone().unwrap_or_default()),
            },
        }
    }

    /// Builds an envelope from a user value and a payload mapping (spec.md
    /// §4.4 `build_envelope`). PUTs run concurrently; the returned
    /// descriptor sequence preserves `payloads`' iteration order
    /// (invariants 1, 2; testable property 6).
    #[instrument(level = Level::INFO, skip(self, value, payloads), err(Display))]
    pub async fn build_envelope(&self, value: DynValue, payloads: Payloads) -> Result<PipeMessage> {
        let value = match value {
            DynValue::Object(_) => value,
            other => DynValue::Object({
                let mut map = DynMap::new();
                map.insert("value".to_string(), other);
                map
            }),
        };

        let descriptors = payloads
            .into_iter()
            .map(|(key, input)| self.put_payload(key, input))
            .collect::<FuturesOrdered<_>>()
            .try_collect::<Vec<_>>()
            .await?;

        Ok(PipeMessage::with_payloads(descriptors, value))
    }

    #[instrument(level = Level::INFO, skip(self, input), err(Display))]
    async fn put_payload(&self, key: String, input: PayloadInput) -> Result<PipePayload> {
        let path = format!(
            "payloads/{user_name}/{timestamp}/{key}",
            user_name = self.user_name,
            timestamp = self.timestamp,
        );
        let bytes = input.into_bytes()?;
        let object_name = self.s3.put_with_model(&self.name, &path, bytes).await?;
        Ok(PipePayload::with_location(key, self.name.clone(), object_name))
    }

    /// Opens `s3a://<name>/metadata/` as a columnar table (spec.md §4.4
    /// `to_table`). A `TableNotFound`-shaped state is recoverable; the
    /// Global Namespace loader skips such models with a warning.
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn to_table(&self) -> Result<(DeltaTable, TableState)> {
        table::load_table(&self.s3_args, &self.table_uri).await
    }

    /// Eager view: materializes the full table contents now.
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn to_table_eager(&self) -> Result<Vec<deltalake::arrow::record_batch::RecordBatch>> {
        let ctx = SessionContext::new();
        let df = self.to_table_lazy(&ctx).await?;
        df.collect().await.map_err(Into::into)
    }

    /// Lazy view: registers the table under its `table_name` and hands back
    /// a deferred-scan DataFrame the caller can filter/project further.
    #[instrument(level = Level::INFO, skip(self, ctx), err(Display))]
    pub async fn to_table_lazy(
        &self,
        ctx: &SessionContext,
    ) -> Result<deltalake::datafusion::prelude::DataFrame> {
        let (table, state) = self.to_table().await?;
        if matches!(state, TableState::Uninited) {
            bail!("table not found for model {name}", name = self.name);
        }

        ctx.register_table(&self.table_name, Arc::new(table))?;
        ctx.table(&self.table_name).await.map_err(Into::into)
    }
}

/// AWS storage-option normalization (spec.md §4.4): `AWS_ALLOW_HTTP`
/// defaults from the endpoint scheme, `AWS_S3_ALLOW_UNSAFE_RENAME` always
/// defaults `true`; caller-provided settings (here: everything
/// `StorageS3Args` already carries explicitly) are never overwritten.
fn normalize_storage_options(args: &StorageS3Args) -> BTreeMap<String, String> {
    let mut options = BTreeMap::new();
    options.insert(
        "AWS_ALLOW_HTTP".to_string(),
        (args.s3_endpoint.scheme() == "http").to_string(),
    );
    options.insert("AWS_ACCESS_KEY_ID".to_string(), args.access_key.clone());
    options.insert(
        "AWS_ENDPOINT_URL".to_string(),
        args.s3_endpoint.to_string().trim_end_matches('/').to_string(),
    );
    options.insert("AWS_REGION".to_string(), args.region.clone());
    options.insert("AWS_S3_ALLOW_UNSAFE_RENAME".to_string(), "true".to_string());
    options.insert("AWS_SECRET_ACCESS_KEY".to_string(), args.secret_key.clone());
    options
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::message::PipePayload;

    fn test_args() -> StorageS3Args {
        StorageS3Args {
            access_key: "test-access-key".into(),
            region: StorageS3Args::default_region().into(),
            s3_endpoint: "http://localhost:9000".parse().unwrap(),
            secret_key: "test-secret-key".into(),
        }
    }

    fn test_model(name: &str) -> Model {
        Model::new(name.parse().unwrap(), "tester".into(), test_args()).unwrap()
    }

    #[test]
    fn table_name_replaces_dots_and_snake_cases() {
        // spec.md §3 "Model": table_name is derived from the dotted model
        // name with dots replaced by underscores.
        let model = test_model("qa.in");
        assert_eq!(model.table_name(), "qa_in");
    }

    #[test]
    fn table_uri_depends_only_on_name() {
        let a = test_model("qa.in");
        let b = Model::new(
            "qa.in".parse().unwrap(),
            "someone-else".into(),
            StorageS3Args {
                access_key: "other".into(),
                ..test_args()
            },
        )
        .unwrap();
        assert_eq!(a.table_uri(), b.table_uri());
    }

    #[test]
    fn normalize_storage_options_infers_allow_http_from_scheme() {
        let options = normalize_storage_options(&test_args());
        assert_eq!(options.get("AWS_ALLOW_HTTP").map(String::as_str), Some("true"));
        assert_eq!(
            options.get("AWS_S3_ALLOW_UNSAFE_RENAME").map(String::as_str),
            Some("true")
        );
    }

    #[tokio::test]
    async fn get_payload_passthrough_reads_inline_value() {
        let model = test_model("qa.in");
        let descriptor = PipePayload::new("answer".into(), Some(Bytes::from_static(b"hello")));

        let bytes = model.get_payload(&descriptor).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn get_payload_degenerate_s3_descriptor_falls_back_to_inline_value() {
        let model = test_model("qa.in");
        let mut descriptor = PipePayload::new("answer".into(), Some(Bytes::from_static(b"hi")));
        descriptor.storage = Some(StorageType::S3);

        // `model`/`path` are both missing, so there is nothing to fetch.
        let bytes = model.get_payload(&descriptor).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"hi"));
    }

    #[test]
    fn get_payload_url_formats_endpoint_bucket_path() {
        let model = test_model("qa.in");
        let descriptor = PipePayload::<Bytes>::with_location(
            "answer".into(),
            "qa.in".parse().unwrap(),
            "payloads/tester/2024/answer".into(),
        );

        assert_eq!(
            model.get_payload_url(&descriptor),
            "http://localhost:9000/qa.in/payloads/tester/2024/answer",
        );
    }
}

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use ark_core_k8s::data::Name;
use dash_api::model_storage_binding::{
    ModelStorageBindingCrd, ModelStorageBindingObjectStorageStatus, ModelStorageBindingState,
};
use dash_pipe_api::storage::StorageS3Args;
use deltalake::datafusion::{execution::context::SessionContext, prelude::DataFrame};
use futures::{stream::FuturesUnordered, StreamExt};
use k8s_openapi::{api::core::v1::Secret, ByteString};
use kube::{api::ListParams, Api, Client};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{instrument, warn, Level};

use crate::{
    model::Model,
    schema::arrow::decoder::TryIntoTableDecoder,
    storage::{table::TableState, Stream},
};

/// Federated view over every `Ready`, object-storage-backed model binding
/// visible to this client's k8s credentials (spec.md §4.7 "Global
/// Namespace"). Built once at construction time and refreshable in place
/// via [`Namespace::update`]; queries already in flight keep using the
/// snapshot they started with.
pub struct Namespace {
    kube: Client,
    namespace: String,
    models: RwLock<BTreeMap<String, Model>>,
    ctx: RwLock<Arc<SessionContext>>,
}

impl Namespace {
    #[instrument(level = Level::INFO, skip(kube), err(Display))]
    pub async fn load(kube: Client, namespace: String, user_name: String) -> Result<Self> {
        let (models, ctx) = build(&kube, &namespace, &user_name).await?;
        Ok(Self {
            kube,
            namespace,
            models: RwLock::new(models),
            ctx: RwLock::new(Arc::new(ctx)),
        })
    }

    /// Rebuilds the model set and federated query context from scratch and
    /// swaps the result in atomically (spec.md §4.7 `update`).
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn update(&self, user_name: &str) -> Result<()> {
        let (models, ctx) = build(&self.kube, &self.namespace, user_name).await?;
        *self.models.write().await = models;
        *self.ctx.write().await = Arc::new(ctx);
        Ok(())
    }

    pub async fn model(&self, name: &str) -> Option<Model> {
        self.models.read().await.get(name).cloned()
    }

    pub async fn list_model_names(&self) -> Vec<String> {
        self.models.read().await.keys().cloned().collect()
    }

    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn sql(&self, query: &str) -> Result<DataFrame> {
        let ctx = self.ctx.read().await.clone();
        ctx.sql(query)
            .await
            .map_err(|error| anyhow!("failed to query global namespace: {error}"))
    }

    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn sql_and_decode<Value>(&self, query: &str) -> Result<Stream<Value>>
    where
        Value: 'static + Send + DeserializeOwned,
    {
        self.sql(query)
            .await?
            .try_into_decoder()
            .await
            .map_err(|error| anyhow!("failed to decode global namespace rows: {error}"))
    }
}

/// Lists `ModelStorageBinding`s, dedups by `(model, storage)`, keeps only
/// `Ready` bindings resolved to an object-storage backend, and opens each
/// surviving model's table into a shared federated `SessionContext`
/// (spec.md §4.7). A binding, secret, or table that cannot be loaded is
/// skipped with a warning rather than failing the whole namespace.
#[instrument(level = Level::INFO, skip(kube), err(Display))]
async fn build(
    kube: &Client,
    namespace: &str,
    user_name: &str,
) -> Result<(BTreeMap<String, Model>, SessionContext)> {
    let api = Api::<ModelStorageBindingCrd>::namespaced(kube.clone(), namespace);
    let bindings = api
        .list(&ListParams::default())
        .await
        .map_err(|error| anyhow!("failed to list model storage bindings: {error}"))?
        .items;

    let mut seen = BTreeSet::new();
    let mut tasks = FuturesUnordered::new();

    for binding in bindings {
        let model_name = binding.spec.model.clone();
        let storage_name = binding.spec.storage.target().to_string();
        if !seen.insert((model_name.clone(), storage_name)) {
            continue;
        }

        let Some(status) = binding.status else {
            continue;
        };
        if !matches!(status.state, ModelStorageBindingState::Ready) {
            continue;
        }

        let object_storage = match status.storage.as_ref().and_then(|storage| storage.object_storage()) {
            Some(object_storage) => object_storage.clone(),
            None => {
                warn!("model storage binding {model_name:?} is not backed by object storage; skipping");
                continue;
            }
        };

        let kube = kube.clone();
        let namespace = namespace.to_string();
        let user_name = user_name.to_string();
        tasks.push(async move {
            let name: Name = model_name
                .parse()
                .map_err(|error| anyhow!("invalid model name {model_name:?}: {error}"))?;
            let s3_args = load_storage_credentials(&kube, &namespace, &object_storage).await?;
            let table_key = name.to_string();
            Model::new(name, user_name, s3_args).map(|model| (table_key, model))
        });
    }

    let mut models = BTreeMap::new();
    while let Some(result) = tasks.next().await {
        match result {
            Ok((name, model)) => {
                models.insert(name, model);
            }
            Err(error) => warn!("failed to load model: {error}; skipping"),
        }
    }

    let ctx = SessionContext::new();
    for (name, model) in &models {
        match model.to_table().await {
            Ok((table, TableState::Inited)) => {
                ctx.register_table(model.table_name(), Arc::new(table))?;
            }
            Ok((_, TableState::Uninited)) => {
                warn!("model {name:?} has no table yet; skipping");
            }
            Err(error) => warn!("failed to open table for model {name:?}: {error}; skipping"),
        }
    }

    Ok((models, ctx))
}

#[instrument(level = Level::INFO, skip(kube, object_storage), err(Display))]
async fn load_storage_credentials(
    kube: &Client,
    namespace: &str,
    object_storage: &ModelStorageBindingObjectStorageStatus,
) -> Result<StorageS3Args> {
    let endpoint = object_storage
        .endpoint
        .clone()
        .ok_or_else(|| anyhow!("object storage binding has no endpoint"))?;

    let secret_ref = &object_storage.secret_ref;
    let api = Api::<Secret>::namespaced(kube.clone(), namespace);
    let secret = api.get(&secret_ref.name).await.map_err(|error| {
        anyhow!("failed to load object storage secret {:?}: {error}", secret_ref.name)
    })?;

    let data = secret.data.unwrap_or_default();
    let access_key = read_secret_key(&data, &secret_ref.map_access_key)?;
    let secret_key = read_secret_key(&data, &secret_ref.map_secret_key)?;

    Ok(StorageS3Args {
        access_key,
        region: StorageS3Args::default_region().into(),
        s3_endpoint: endpoint,
        secret_key,
    })
}

fn read_secret_key(data: &BTreeMap<String, ByteString>, key: &str) -> Result<String> {
    data.get(key)
        .ok_or_else(|| anyhow!("secret is missing key {key:?}"))
        .and_then(|value| {
            String::from_utf8(value.0.clone())
                .map_err(|error| anyhow!("secret key {key:?} is not valid UTF-8: {error}"))
        })
}

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};
use dash_pipe_api::storage::StorageS3Args;
use deltalake::{aws, datafusion::execution::context::SessionContext, DeltaTable, DeltaTableBuilder, DeltaTableError};
use tracing::{debug, instrument, Level};

/// `metadata/` object kind under a Model's bucket (spec.md §6 object layout).
const KIND_METADATA: &str = "metadata";

#[async_trait::async_trait]
pub trait StorageSessionContext {
    async fn register_table_with_name(
        &self,
        args: &StorageS3Args,
        table_name: &str,
        table_uri: &str,
    ) -> Result<TableState>;
}

#[async_trait::async_trait]
impl StorageSessionContext for SessionContext {
    async fn register_table_with_name(
        &self,
        args: &StorageS3Args,
        table_name: &str,
        table_uri: &str,
    ) -> Result<TableState> {
        let (table, state) = load_table(args, table_uri).await?;
        if let TableState::Inited = state {
            self.register_table(table_name, ::std::sync::Arc::new(table))?;
        }
        Ok(state)
    }
}

/// Opens a model's `s3a://<name>/metadata/` prefix as a Deltalake table
/// (spec.md §4.4 `to_table`, §4.4 storage-option normalization).
#[instrument(level = Level::INFO, skip_all, err(Display))]
pub async fn load_table(
    StorageS3Args {
        access_key,
        s3_endpoint,
        region,
        secret_key,
    }: &StorageS3Args,
    table_uri: &str,
) -> Result<(DeltaTable, TableState)> {
    let allow_http = s3_endpoint.scheme() == "http";

    let mut backend_config: HashMap<String, String> = HashMap::new();
    backend_config.insert("allow_http".to_string(), allow_http.to_string());
    backend_config.insert("AWS_ACCESS_KEY_ID".to_string(), access_key.clone());
    backend_config.insert("AWS_ENDPOINT_URL".to_string(), {
        let mut endpoint = s3_endpoint.to_string();
        if endpoint.ends_with('/') {
            endpoint.pop();
        }
        endpoint
    });
    backend_config.insert("AWS_REGION".to_string(), region.clone());
    backend_config.insert("AWS_S3_ALLOW_UNSAFE_RENAME".to_string(), "true".into());
    backend_config.insert("AWS_SECRET_ACCESS_KEY".to_string(), secret_key.clone());

    aws::register_handlers(None);

    let mut table = DeltaTableBuilder::from_valid_uri(table_uri)?
        .with_allow_http(allow_http)
        .with_storage_options(backend_config)
        .build()
        .map_err(|error| anyhow!("failed to init DeltaLake table: {error}"))?;

    match table.load().await {
        Ok(()) => {
            debug!("DeltaLake table schema: loaded");
            Ok((table, TableState::Inited))
        }
        Err(DeltaTableError::NotATable(_)) => {
            debug!("DeltaLake table schema: not yet initialized");
            Ok((table, TableState::Uninited))
        }
        Err(error) => {
            bail!("failed to load metadata table from DeltaLake object store: {error}")
        }
    }
}

/// Builds the `table_uri` for a model's bucket (spec.md §4.4 invariant 3:
/// `table_uri` depends only on `name`).
pub fn table_uri(bucket_name: &str) -> String {
    format!("s3a://{bucket_name}/{KIND_METADATA}/")
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableState {
    Inited,
    Uninited,
}

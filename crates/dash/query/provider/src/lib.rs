use anyhow::Result;
use clap::Parser;
pub use dash_pipe_provider::{deltalake, Name};
use dash_pipe_provider::{storage::Stream, Namespace, Runtime, RuntimeArgs};
use deltalake::datafusion::prelude::DataFrame;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{instrument, Level};

/// CLI/notebook front-end args (spec.md §1 OUT OF SCOPE "command-line
/// wrappers" -- those front-ends are consumed only through this interface).
#[derive(Clone, Debug, Serialize, Deserialize, Parser)]
pub struct QueryClientArgs {
    #[command(flatten)]
    pub runtime: RuntimeArgs,
}

/// Thin wrapper over the Global Namespace's federated `sql()`, shaped for
/// CLI/notebook front-ends that want query access without driving a
/// `Runtime` themselves (spec.md §4.7).
pub struct QueryClient {
    runtime: Runtime,
    namespace: Namespace,
}

impl QueryClient {
    #[instrument(level = Level::INFO, skip(args), err(Display))]
    pub async fn try_new(args: &QueryClientArgs) -> Result<Self> {
        let runtime = Runtime::new(args.runtime.clone());
        let namespace = runtime.namespace().await?;
        Ok(Self { runtime, namespace })
    }

    pub async fn list_table_names(&self) -> Vec<String> {
        self.namespace.list_model_names().await
    }

    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn sql(&self, sql: &str) -> Result<DataFrame> {
        self.namespace.sql(sql).await
    }

    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn sql_and_decode<Value>(&self, sql: &str) -> Result<Stream<Value>>
    where
        Value: 'static + Send + DeserializeOwned,
    {
        self.namespace.sql_and_decode(sql).await
    }

    /// Rebuilds the federation from the registry (spec.md §4.7 `update`).
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn update(&self) -> Result<()> {
        self.namespace.update(self.runtime.user_name()).await
    }
}

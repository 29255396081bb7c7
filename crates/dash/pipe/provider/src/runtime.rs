use std::sync::Arc;

use anyhow::{anyhow, Result};
use ark_core_k8s::data::Name;
use clap::{ArgAction, Parser};
use dash_api::function::FunctionCrd;
use dash_pipe_api::storage::StorageS3Args;
use gethostname::gethostname;
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{instrument, Level};

use crate::{
    channel::ModelChannel,
    function::Function,
    message::Codec,
    messengers::{init_messenger, Messenger, MessengerArgs, DEFAULT_REQUEST_TIMEOUT},
    model::Model,
    namespace::Namespace,
};

/// Client-side entry point (spec.md §4.8 "Runtime Root"). Loads env/CLI
/// configuration, derives identity, lazily builds the Messenger on first
/// use, and vends Models, Model Channels, Functions and the Global
/// Namespace -- all sharing the one Messenger connection.
pub struct Runtime {
    args: RuntimeArgs,
    user_name: String,
    messenger: OnceCell<Arc<dyn Messenger>>,
}

impl Runtime {
    pub fn new(args: RuntimeArgs) -> Self {
        let user_name = args
            .user_name
            .clone()
            .unwrap_or_else(|| gethostname().to_string_lossy().into_owned());

        Self {
            args,
            user_name,
            messenger: OnceCell::new(),
        }
    }

    #[instrument(level = Level::INFO)]
    pub async fn try_default() -> Result<Self> {
        ::ark_core::tracer::init_once();

        RuntimeArgs::try_parse()
            .map(Self::new)
            .map_err(|error| anyhow!("failed to parse runtime arguments: {error}"))
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Lazily connects the configured driver (spec.md §4.8). Fails with a
    /// `DriverUnavailable`-shaped error if the driver was not compiled in
    /// or fails to connect; the underlying connection is shared by every
    /// `ModelChannel`/`Function` this runtime hands out afterwards.
    async fn messenger(&self) -> Result<Arc<dyn Messenger>> {
        self.messenger
            .get_or_try_init(|| async { init_messenger(&self.args.messenger).await.map(Arc::from) })
            .await
            .map(Arc::clone)
    }

    /// Builds a [`Model`] for `name` using this runtime's identity and
    /// storage credentials (spec.md §4.8, §4.4).
    pub fn model(&self, name: Name) -> Result<Model> {
        Model::new(name, self.user_name.clone(), self.args.storage.clone())
    }

    /// Builds a [`ModelChannel`] bound to this runtime's (lazily-created)
    /// Messenger. `PIPE_QUEUE_GROUP=true` queue-subscribes every channel
    /// under its own topic name (spec.md §6, §3 invariant 4).
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn channel(&self, name: Name) -> Result<ModelChannel> {
        let model = self.model(name)?;
        let messenger = self.messenger().await?;
        Ok(ModelChannel::new(
            model,
            messenger,
            self.args.codec,
            self.args.queue_group,
        ))
    }

    /// Looks up a `functions` registry object by name and constructs the
    /// two Model Channels it names (spec.md §4.6, §4.8, §6). Fails with a
    /// `RegistryNotFound`-shaped error if the function is missing.
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn function(&self, name: &str) -> Result<Function> {
        let kube = self.kube_client().await?;
        let api = Api::<FunctionCrd>::namespaced(kube, &self.namespace_name());

        let crd = api
            .get(name)
            .await
            .map_err(|error| anyhow!("RegistryNotFound: function {name:?} not found: {error}"))?;

        let input: Name = crd
            .spec
            .input
            .parse()
            .map_err(|error| anyhow!("invalid function input model name: {error}"))?;
        let output: Name = crd
            .spec
            .output
            .parse()
            .map_err(|error| anyhow!("invalid function output model name: {error}"))?;

        let function_name: Name = name
            .parse()
            .map_err(|error| anyhow!("invalid function name {name:?}: {error}"))?;
        let messenger = self.messenger().await?;

        Ok(Function::new(
            function_name,
            self.model(input)?,
            self.model(output)?,
            messenger,
            self.args.codec,
            DEFAULT_REQUEST_TIMEOUT,
        ))
    }

    /// Loads the Global Namespace for this runtime's configured namespace
    /// (spec.md §4.7, §4.8).
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn namespace(&self) -> Result<Namespace> {
        let kube = self.kube_client().await?;
        Namespace::load(kube, self.namespace_name(), self.user_name.clone()).await
    }

    async fn kube_client(&self) -> Result<Client> {
        Client::try_default()
            .await
            .map_err(|error| anyhow!("failed to init k8s client: {error}"))
    }

    fn namespace_name(&self) -> String {
        self.args
            .namespace
            .clone()
            .unwrap_or_else(|| ::dash_api::consts::NAMESPACE.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Parser)]
pub struct RuntimeArgs {
    #[arg(
        long,
        env = "PIPE_ENCODER",
        value_name = "CODEC",
        default_value_t = Default::default(),
    )]
    #[serde(default)]
    pub codec: Codec,

    #[command(flatten)]
    pub messenger: MessengerArgs,

    /// Registry namespace scope for Function/Global Namespace discovery
    /// (spec.md §6, §4.7, §4.8).
    #[arg(long, env = "DASH_NAMESPACE", value_name = "NAMESPACE")]
    #[serde(default)]
    pub namespace: Option<String>,

    /// `true` queue-subscribes every vended `ModelChannel` under its own
    /// topic name (spec.md §6 `PIPE_QUEUE_GROUP`).
    #[arg(long, env = "PIPE_QUEUE_GROUP", action = ArgAction::SetTrue)]
    #[serde(default)]
    pub queue_group: bool,

    #[command(flatten)]
    pub storage: StorageS3Args,

    /// Caller identity; falls back to the local hostname (spec.md §3
    /// Model `user_name`).
    #[arg(long, env = "PIPE_USER", value_name = "NAME")]
    #[serde(default)]
    pub user_name: Option<String>,
}

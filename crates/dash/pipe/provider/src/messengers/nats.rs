use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Result};
use async_nats::{Client, ServerAddr, ToServerAddrs};
use async_trait::async_trait;
use bytes::Bytes;
use clap::{ArgAction, Parser};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tracing::{debug, instrument, Level};

use crate::message::Name;

/// Pending-message cap applied when `NATS_ALLOW_DROP=true` (spec.md §4.2,
/// §6, §8 scenario S6): newest-wins, drop-oldest.
const DROP_MODE_SUBSCRIPTION_CAPACITY: usize = 1;

pub struct Messenger {
    client: Client,
}

impl Messenger {
    #[instrument(level = Level::INFO, skip_all, err(Display))]
    pub async fn try_new(args: &MessengerNatsArgs) -> Result<Self> {
        debug!("Initializing Messenger IO - NATS");

        fn parse_addrs(args: &MessengerNatsArgs) -> Result<Vec<ServerAddr>> {
            let addrs = args
                .nats_addrs
                .iter()
                .map(|addr| {
                    if addr.contains("://") {
                        addr.clone()
                    } else {
                        format!("nats://{addr}")
                    }
                })
                .flat_map(|addr| {
                    addr.to_server_addrs()
                        .map_err(|error| anyhow!("failed to parse NATS address ({addr}): {error}"))
                })
                .flatten()
                .collect::<Vec<_>>();
            if addrs.is_empty() {
                bail!("failed to parse NATS address: no available addresses");
            }
            Ok(addrs)
        }

        #[instrument(level = Level::INFO, skip_all, err(Display))]
        async fn parse_password(args: &MessengerNatsArgs) -> Result<Option<String>> {
            match args.nats_password_path.as_ref() {
                Some(path) => ::tokio::fs::read_to_string(path)
                    .await
                    .map_err(|error| anyhow!("failed to read NATS password file: {error}"))
                    .map(|password| password.lines().next().unwrap_or_default().trim().to_string())
                    .map(Some),
                None => Ok(None),
            }
        }

        let mut config = ::async_nats::ConnectOptions::default().require_tls(args.nats_tls_required);
        if let Some(user) = args.nats_account.as_ref() {
            if let Some(pass) = parse_password(args).await? {
                config = config.user_and_password(user.clone(), pass);
            }
        }
        if args.nats_allow_drop {
            config = config.subscription_capacity(DROP_MODE_SUBSCRIPTION_CAPACITY);
        }

        config
            .connect(parse_addrs(args)?)
            .await
            .map(|client| Self { client })
            .map_err(|error| anyhow!("failed to init NATS client: {error}"))
    }
}

#[async_trait]
impl super::Messenger for Messenger {
    fn messenger_type(&self) -> super::MessengerType {
        super::MessengerType::Nats
    }

    #[instrument(level = Level::INFO, skip_all, err(Display))]
    async fn publisher(
        &self,
        topic: Name,
        reply: Option<Name>,
    ) -> Result<Option<Arc<dyn super::Publisher>>> {
        Ok(Some(Arc::new(Publisher {
            client: self.client.clone(),
            reply,
            topic,
        })))
    }

    #[instrument(level = Level::INFO, skip_all, err(Display))]
    async fn service(
        &self,
        topic: Name,
        timeout: Option<Duration>,
    ) -> Result<Option<Arc<dyn super::Service>>> {
        Ok(Some(Arc::new(Service {
            client: self.client.clone(),
            timeout: timeout.unwrap_or(super::DEFAULT_REQUEST_TIMEOUT),
            topic,
        })))
    }

    #[instrument(level = Level::INFO, skip_all, err(Display))]
    async fn subscriber(
        &self,
        topic: Name,
        queue: Option<Name>,
    ) -> Result<Option<Box<dyn super::Subscriber>>> {
        let inner = match queue {
            Some(queue) => {
                self.client
                    .queue_subscribe(topic.to_string(), queue.to_string())
                    .await
            }
            None => self.client.subscribe(topic.to_string()).await,
        }
        .map_err(|error| anyhow!("failed to subscribe NATS topic: {error}"))?;

        Ok(Some(Box::new(Subscriber { inner, topic })))
    }
}

pub struct Publisher {
    client: Client,
    reply: Option<Name>,
    topic: Name,
}

#[async_trait]
impl super::Publisher for Publisher {
    fn topic(&self) -> &Name {
        &self.topic
    }

    #[instrument(
        level = Level::INFO,
        skip_all,
        fields(data.len = %data.len(), data.model = %self.topic.as_str()),
        err(Display),
    )]
    async fn send_one(&self, data: Bytes) -> Result<()> {
        match self.reply.as_ref() {
            Some(reply) => {
                self.client
                    .publish_with_reply(self.topic.to_string(), reply.to_string(), data)
                    .await
            }
            None => self.client.publish(self.topic.to_string(), data).await,
        }
        .map_err(|error| anyhow!("failed to publish data to NATS: {error}"))
    }

    #[instrument(level = Level::INFO, skip_all, err(Display))]
    async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|error| anyhow!("failed to terminate NATS publisher: {error}"))
    }
}

pub struct Service {
    client: Client,
    timeout: Duration,
    topic: Name,
}

#[async_trait]
impl super::Service for Service {
    fn topic(&self) -> &Name {
        &self.topic
    }

    #[instrument(
        level = Level::INFO,
        skip_all,
        fields(data.len = %data.len(), data.model = %self.topic.as_str()),
        err(Display),
    )]
    async fn request_one(&self, data: Bytes) -> Result<Bytes> {
        timeout(self.timeout, self.client.request(self.topic.to_string(), data))
            .await
            .map_err(|_| anyhow!("timed out waiting for a reply on {}", self.topic))?
            .map(|message| message.payload)
            .map_err(|error| anyhow!("failed to request data from NATS: {error}"))
    }
}

pub struct Subscriber {
    inner: ::async_nats::Subscriber,
    topic: Name,
}

#[async_trait]
impl super::Subscriber for Subscriber {
    fn topic(&self) -> &Name {
        &self.topic
    }

    #[instrument(
        level = Level::INFO,
        skip_all,
        fields(data.model = %self.topic.as_str()),
        err(Display),
    )]
    async fn read_one(&mut self) -> Result<Option<Bytes>> {
        Ok(self.inner.next().await.map(|message| message.payload))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Parser)]
pub struct MessengerNatsArgs {
    #[arg(long, env = "NATS_ACCOUNT", value_name = "NAME")]
    #[serde(default)]
    nats_account: Option<String>,

    #[arg(long, env = "NATS_ADDRS", value_name = "ADDR")]
    nats_addrs: Vec<String>,

    /// `true` enables newest-wins, drop-oldest delivery with a pending
    /// limit of 1 (spec.md §4.2, §6, §8 scenario S6).
    #[arg(long, env = "NATS_ALLOW_DROP", action = ArgAction::SetTrue)]
    #[serde(default)]
    nats_allow_drop: bool,

    #[arg(long, env = "NATS_PASSWORD_PATH", value_name = "PATH")]
    #[serde(default)]
    nats_password_path: Option<PathBuf>,

    #[arg(long, env = "NATS_TLS_REQUIRED", action = ArgAction::SetTrue)]
    #[serde(default)]
    nats_tls_required: bool,
}

mod nats;

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, instrument, Level};

use crate::message::Name;

/// Default `Service::request` deadline (spec.md §4.2, §5).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves the configured driver and connects it. Fails with a
/// `DriverUnavailable`-shaped error if the selected driver was not compiled
/// in (e.g. `ros2`, specified only as a slot) or fails to connect.
#[instrument(level = Level::INFO, skip(args), err(Display))]
pub async fn init_messenger(args: &MessengerArgs) -> Result<Box<dyn Messenger>> {
    debug!("Initializing Messenger IO");

    match args.default_messenger {
        MessengerType::Nats => Ok(Box::new(self::nats::Messenger::try_new(&args.nats).await?)),
        MessengerType::Ros2 => {
            bail!("driver unavailable: \"ros2\" is not implemented in this runtime")
        }
    }
}

/// Transport-neutral publisher/subscriber/service capability set
/// (spec.md §4.2). Every method moves raw bytes: the Codec/envelope layer
/// lives one level up, in `crate::channel::ModelChannel`, so that a
/// malformed message body can be skipped by the subscriber loop without the
/// driver needing to know anything about envelopes. Each factory may return
/// `Ok(None)` when the driver does not support that access pattern.
#[async_trait]
pub trait Messenger
where
    Self: Send + Sync,
{
    fn messenger_type(&self) -> MessengerType;

    async fn publisher(&self, topic: Name, reply: Option<Name>)
        -> Result<Option<Arc<dyn Publisher>>>;

    async fn service(
        &self,
        topic: Name,
        timeout: Option<Duration>,
    ) -> Result<Option<Arc<dyn Service>>>;

    async fn subscriber(
        &self,
        topic: Name,
        queue: Option<Name>,
    ) -> Result<Option<Box<dyn Subscriber>>>;
}

/// Fire-and-forget send of a byte payload, optionally stamped with a
/// reply-topic (spec.md §4.2, §9 open question 3: reply routing is wired
/// but acted on only by drivers that implement it).
#[async_trait]
pub trait Publisher
where
    Self: Send + Sync,
{
    fn topic(&self) -> &Name;

    async fn send_one(&self, data: Bytes) -> Result<()>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Request-reply: send bytes, receive bytes within a deadline.
#[async_trait]
pub trait Service
where
    Self: Send + Sync,
{
    fn topic(&self) -> &Name;

    /// Fails with a `Timeout`-shaped error if no reply arrives within the
    /// deadline this `Service` was constructed with.
    async fn request_one(&self, data: Bytes) -> Result<Bytes>;
}

/// Delivers bytes in arrival order; `read_one` returns `Ok(None)` only when
/// the underlying stream has been permanently closed.
#[async_trait]
pub trait Subscriber
where
    Self: Send,
{
    fn topic(&self) -> &Name;

    async fn read_one(&mut self) -> Result<Option<Bytes>>;
}

#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    EnumString,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[strum(serialize_all = "lowercase")]
pub enum MessengerType {
    #[default]
    Nats,
    /// Unimplemented driver slot (spec.md OUT OF SCOPE). Selecting it fails
    /// at `init_messenger` with a driver-unavailable error.
    Ros2,
}

#[derive(Clone, Debug, Serialize, Deserialize, Parser)]
pub struct MessengerArgs {
    #[arg(
        long,
        env = "PIPE_DEFAULT_MESSENGER",
        value_name = "TYPE",
        default_value_t = Default::default(),
    )]
    #[serde(default)]
    default_messenger: MessengerType,

    #[command(flatten)]
    nats: self::nats::MessengerNatsArgs,
}

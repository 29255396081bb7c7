use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Result};
use ark_core_k8s::data::Name;
use futures::{stream::FuturesOrdered, TryStreamExt};
use tokio::sync::Mutex;
use tracing::{instrument, Level};

use crate::{
    messengers::{Messenger, Publisher, Service, Subscriber},
    message::{decode_opt, Codec, DynValue, PipeMessage},
    model::{Model, Payloads},
};

/// A [`Model`] bound to a [`Messenger`] (spec.md §4.5 "Model Channel").
/// Publisher/service handles are created lazily and cached for the
/// lifetime of the channel; the subscriber attaches lazily on the first
/// call to [`ModelChannel::next`] (spec.md §4.8).
pub struct ModelChannel {
    model: Model,
    messenger: Arc<dyn Messenger>,
    codec: Codec,
    queued: bool,
    timeout: Option<Duration>,
    publisher: Mutex<Option<Option<Arc<dyn Publisher>>>>,
    service: Mutex<Option<Option<Arc<dyn Service>>>>,
    subscriber: Mutex<SubscriberState>,
}

enum SubscriberState {
    Unattached,
    Attached(Box<dyn Subscriber>),
}

impl ModelChannel {
    pub fn new(model: Model, messenger: Arc<dyn Messenger>, codec: Codec, queued: bool) -> Self {
        Self::with_timeout(model, messenger, codec, queued, None)
    }

    /// Like [`ModelChannel::new`], but overrides the `Service`'s request
    /// deadline (spec.md §3 "Function" holds its own timeout alongside its
    /// two channels; see `crate::function::Function`).
    pub fn with_timeout(
        model: Model,
        messenger: Arc<dyn Messenger>,
        codec: Codec,
        queued: bool,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            model,
            messenger,
            codec,
            queued,
            timeout,
            publisher: Mutex::new(None),
            service: Mutex::new(None),
            subscriber: Mutex::new(SubscriberState::Unattached),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn name(&self) -> &Name {
        self.model.name()
    }

    async fn publisher(&self) -> Result<Option<Arc<dyn Publisher>>> {
        let mut slot = self.publisher.lock().await;
        if slot.is_none() {
            *slot = Some(self.messenger.publisher(self.name().clone(), None).await?);
        }
        Ok(slot.as_ref().unwrap().clone())
    }

    async fn service(&self) -> Result<Option<Arc<dyn Service>>> {
        let mut slot = self.service.lock().await;
        if slot.is_none() {
            *slot = Some(self.messenger.service(self.name().clone(), self.timeout).await?);
        }
        Ok(slot.as_ref().unwrap().clone())
    }

    /// Fire-and-forget send (spec.md §4.5 `publish`). Fails with a
    /// `PublishUnsupported`-shaped error if the driver has no publisher.
    #[instrument(level = Level::INFO, skip(self, value, payloads), err(Display))]
    pub async fn publish(&self, value: DynValue, payloads: Payloads) -> Result<PipeMessage> {
        let envelope = self.model.build_envelope(value, payloads).await?;
        let publisher = self
            .publisher()
            .await?
            .ok_or_else(|| anyhow!("PublishUnsupported: driver has no publisher for {}", self.name()))?;

        let bytes = envelope.to_bytes(self.codec)?;
        publisher.send_one(bytes).await?;
        Ok(envelope)
    }

    /// Request-reply (spec.md §4.5 `request`). Fails with a
    /// `ServiceUnsupported`-shaped error if the driver has no service, and
    /// surfaces the driver's own `Timeout`-shaped error on deadline.
    /// `load_payloads` controls whether the reply's side-payloads are
    /// rehydrated before returning (spec.md §4.5, §4.6).
    #[instrument(level = Level::INFO, skip(self, value, payloads), err(Display))]
    pub async fn request(
        &self,
        value: DynValue,
        payloads: Payloads,
        load_payloads: bool,
    ) -> Result<PipeMessage> {
        let envelope = self.model.build_envelope(value, payloads).await?;
        let service = self
            .service()
            .await?
            .ok_or_else(|| anyhow!("ServiceUnsupported: driver has no service for {}", self.name()))?;

        let request_bytes = envelope.to_bytes(self.codec)?;
        let reply_bytes = service.request_one(request_bytes).await?;
        let reply: PipeMessage = reply_bytes.try_into()?;

        if load_payloads {
            self.rehydrate(reply).await
        } else {
            Ok(reply)
        }
    }

    /// Reads the next message off the subscription, attaching it on first
    /// use (spec.md §4.8). A malformed body under a recognized opcode is
    /// skipped and the loop tries again; only a hard decode error or a
    /// permanently closed stream end the loop.
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn next(&self) -> Result<Option<PipeMessage>> {
        loop {
            let bytes = {
                let mut state = self.subscriber.lock().await;
                if matches!(*state, SubscriberState::Unattached) {
                    let queue = self.queued.then(|| self.name().clone());
                    let subscriber = self
                        .messenger
                        .subscriber(self.name().clone(), queue)
                        .await?
                        .ok_or_else(|| {
                            anyhow!("SubscribeUnsupported: driver has no subscriber for {}", self.name())
                        })?;
                    *state = SubscriberState::Attached(subscriber);
                }

                let subscriber = match &mut *state {
                    SubscriberState::Attached(subscriber) => subscriber,
                    SubscriberState::Unattached => unreachable!(),
                };

                match subscriber.read_one().await? {
                    Some(bytes) => bytes,
                    None => return Ok(None),
                }
            };

            match decode_opt::<PipeMessage>(&bytes)? {
                Some(envelope) => return self.rehydrate(envelope).await.map(Some),
                None => continue,
            }
        }
    }

    /// Fetches every out-of-band payload referenced by `envelope.payloads`
    /// concurrently, preserving descriptor order (spec.md §4.6 invariant:
    /// rehydrated order matches the envelope's own `__payloads` order).
    async fn rehydrate(&self, mut envelope: PipeMessage) -> Result<PipeMessage> {
        let model = &self.model;
        let values = envelope
            .payloads
            .iter()
            .map(|descriptor| model.get_payload(descriptor))
            .collect::<FuturesOrdered<_>>()
            .try_collect::<Vec<_>>()
            .await?;

        if values.len() != envelope.payloads.len() {
            bail!("payload rehydration returned a mismatched count");
        }

        for (descriptor, value) in envelope.payloads.iter_mut().zip(values) {
            descriptor.value = Some(value);
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use clap::Parser;
    use dash_pipe_api::storage::StorageS3Args;

    use super::*;
    use crate::messengers::MessengerType;

    /// A driver with no publisher, service, or subscriber at all, used to
    /// exercise the `*Unsupported` error paths.
    struct NullMessenger;

    #[async_trait]
    impl Messenger for NullMessenger {
        fn messenger_type(&self) -> MessengerType {
            MessengerType::Nats
        }

        async fn publisher(
            &self,
            _topic: Name,
            _reply: Option<Name>,
        ) -> Result<Option<Arc<dyn Publisher>>> {
            Ok(None)
        }

        async fn service(
            &self,
            _topic: Name,
            _timeout: Option<Duration>,
        ) -> Result<Option<Arc<dyn Service>>> {
            Ok(None)
        }

        async fn subscriber(
            &self,
            _topic: Name,
            _queue: Option<Name>,
        ) -> Result<Option<Box<dyn Subscriber>>> {
            Ok(None)
        }
    }

    fn test_channel() -> ModelChannel {
        let name: Name = "test-model".parse().unwrap();
        let s3_args = StorageS3Args::try_parse_from([
            "test",
            "--access-key",
            "key",
            "--secret-key",
            "secret",
            "--s3-endpoint",
            "http://localhost:9000",
        ])
        .unwrap();
        let model = Model::new(name, "tester".to_string(), s3_args).unwrap();
        ModelChannel::new(model, Arc::new(NullMessenger), Codec::Json, false)
    }

    #[tokio::test]
    async fn publish_without_publisher_is_unsupported() {
        let channel = test_channel();
        let result = channel.publish(DynValue::Null, Vec::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn request_without_service_is_unsupported() {
        let channel = test_channel();
        let result = channel.request(DynValue::Null, Vec::new(), true).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn next_without_subscriber_is_unsupported() {
        let channel = test_channel();
        let result = channel.next().await;
        assert!(result.is_err());
    }
}

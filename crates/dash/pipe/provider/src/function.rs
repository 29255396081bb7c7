use std::{sync::Arc, time::Duration};

use anyhow::Result;
use ark_core_k8s::data::Name;
use tracing::{instrument, Level};

use crate::{
    channel::ModelChannel,
    message::{Codec, DynValue, PipeMessage},
    messengers::Messenger,
    model::{Model, Payloads},
};

/// A callable backed by a pair of Model Channels (spec.md §3 "Function",
/// §4.6): `input` is the publish/request side, `output` exists so callers
/// may also subscribe to the function's reply stream out of band. Invoking
/// a `Function` is exactly `input.request(value, payloads, load_payloads)`.
pub struct Function {
    name: Name,
    input: ModelChannel,
    output: ModelChannel,
}

impl Function {
    pub fn new(
        name: Name,
        input: Model,
        output: Model,
        messenger: Arc<dyn Messenger>,
        codec: Codec,
        timeout: Duration,
    ) -> Self {
        Self {
            name,
            input: ModelChannel::with_timeout(input, messenger.clone(), codec, false, Some(timeout)),
            output: ModelChannel::with_timeout(output, messenger, codec, false, Some(timeout)),
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn input(&self) -> &ModelChannel {
        &self.input
    }

    pub fn output(&self) -> &ModelChannel {
        &self.output
    }

    /// Request-reply invocation (spec.md §8 scenario S2). Fails with the
    /// same `ServiceUnsupported`/`Timeout`-shaped errors as
    /// `ModelChannel::request`.
    #[instrument(level = Level::INFO, skip(self, value, payloads), err(Display))]
    pub async fn invoke(
        &self,
        value: DynValue,
        payloads: Payloads,
        load_payloads: bool,
    ) -> Result<PipeMessage> {
        self.input.request(value, payloads, load_payloads).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use clap::Parser;
    use dash_pipe_api::storage::StorageS3Args;

    use super::*;
    use crate::messengers::{MessengerType, Publisher, Service, Subscriber};

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

    fn test_model(name: &str) -> Model {
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
        Model::new(name.parse().unwrap(), "tester".to_string(), s3_args).unwrap()
    }

    #[tokio::test]
    async fn invoke_without_service_is_unsupported() {
        let function = Function::new(
            "question-answering".parse().unwrap(),
            test_model("qa.in"),
            test_model("qa.out"),
            Arc::new(NullMessenger),
            Codec::Json,
            Duration::from_secs(10),
        );

        let result = function.invoke(DynValue::Null, Vec::new(), true).await;
        assert!(result.is_err());
    }
}

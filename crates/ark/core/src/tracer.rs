use std::sync::Once;

use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

static INIT: Once = Once::new();

/// Initializes the global tracing subscriber exactly once per process.
///
/// Safe to call multiple times (e.g. from both a binary's `main` and a
/// library's `Infer::infer`); only the first call takes effect.
pub fn init_once() {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter);

        let registry = tracing_subscriber::registry().with(fmt_layer);

        #[cfg(feature = "otlp")]
        {
            registry.with(self::otlp::layer()).init();
        }
        #[cfg(not(feature = "otlp"))]
        {
            registry.init();
        }
    })
}

#[cfg(feature = "otlp")]
mod otlp {
    use opentelemetry::trace::TracerProvider;
    use opentelemetry_sdk::runtime::Tokio;
    use tracing_opentelemetry::OpenTelemetryLayer;
    use tracing_subscriber::registry::Registry;

    /// Builds the OTLP tracing layer from `OTEL_EXPORTER_OTLP_ENDPOINT` (and
    /// friends), falling back to a no-op tracer if the collector is
    /// unreachable at startup so that local runs never hard-fail on a
    /// missing sidecar.
    pub(super) fn layer() -> OpenTelemetryLayer<Registry, opentelemetry_sdk::trace::Tracer> {
        let exporter = ::opentelemetry_otlp::new_exporter().tonic();
        let provider = ::opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .install_batch(Tokio)
            .map(|tracer| tracer.provider().expect("tracer provider"))
            .unwrap_or_else(|error| {
                ::tracing::warn!("failed to install OTLP tracer, falling back to noop: {error}");
                ::opentelemetry_sdk::trace::TracerProvider::builder().build()
            });

        let tracer = provider.tracer("ark-core");
        ::opentelemetry::global::set_tracer_provider(provider);
        tracing_opentelemetry::layer().with_tracer(tracer)
    }
}

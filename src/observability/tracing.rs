use anyhow::{Context, Error, Result};
use once_cell::sync::OnceCell;
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracer, SdkTracerProvider},
};
use tracing::{Subscriber, info, warn};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{
    EnvFilter, Registry, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt,
};

use super::structured_log::StageEventLayer;

const SERVICE_NAME: &str = "catalog-etl";

static TRACING_INIT: OnceCell<()> = OnceCell::new();

type OtelLayer = OpenTelemetryLayer<Registry, SdkTracer>;

/// Installs the global subscriber once.
///
/// Logs go to stdout as JSON and stage transitions to stderr. When
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans are also exported over OTLP;
/// an exporter that cannot be built is reported and skipped.
///
/// # Errors
/// Returns an error if a global subscriber was already installed elsewhere.
pub fn init() -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();

        let (otel_layer, exporter_error) = match endpoint.as_deref().map(init_tracer) {
            Some(Ok(tracer)) => (Some(tracing_opentelemetry::layer().with_tracer(tracer)), None),
            Some(Err(error)) => (None, Some(error)),
            None => (None, None),
        };

        build_subscriber(env_filter, std::io::stderr, otel_layer)
            .try_init()
            .context("failed to install global tracing subscriber")?;

        match (endpoint, exporter_error) {
            (Some(endpoint), None) => {
                info!(otel_enabled = true, endpoint = %endpoint, "tracing initialized");
            }
            (Some(endpoint), Some(error)) => warn!(
                otel_enabled = false,
                endpoint = %endpoint,
                error = %error,
                "OTLP exporter unavailable, tracing initialized without it"
            ),
            (None, _) => info!(otel_enabled = false, "tracing initialized"),
        }

        Ok::<(), Error>(())
    })?;
    Ok(())
}

/// Layers every sink onto one registry. The stage audit layer is present
/// whether or not spans are exported.
fn build_subscriber<W>(
    env_filter: EnvFilter,
    stage_writer: W,
    otel_layer: Option<OtelLayer>,
) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(otel_layer)
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).json())
        .with(StageEventLayer::new(stage_writer))
}

/// Builds an OTLP tracer. `OTEL_SAMPLING_RATIO` controls sampling (default 1.0).
fn init_tracer(endpoint: &str) -> Result<SdkTracer> {
    let sampling_ratio = std::env::var("OTEL_SAMPLING_RATIO")
        .ok()
        .and_then(|raw| raw.parse::<f64>().ok())
        .unwrap_or(1.0);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to build OTLP span exporter")?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::TraceIdRatioBased(sampling_ratio))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(
            Resource::builder()
                .with_attributes([
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])
                .build(),
        )
        .build();

    let tracer = provider.tracer(SERVICE_NAME);
    global::set_tracer_provider(provider);
    Ok(tracer)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct CapturedLines(Arc<Mutex<Vec<u8>>>);

    impl CapturedLines {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().expect("capture lock").clone()).expect("utf8 output")
        }
    }

    impl io::Write for CapturedLines {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("capture lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'w> MakeWriter<'w> for CapturedLines {
        type Writer = Self;

        fn make_writer(&'w self) -> Self::Writer {
            self.clone()
        }
    }

    fn emit_stage_events() {
        let span = tracing::info_span!("enrichment", run_id = "r-1");
        let _entered = span.enter();
        tracing::info!(stage = "looking_up", names = 3_u64, "stage transition");
        tracing::info!(names = 3_u64, "no stage field here");
    }

    #[test]
    fn stage_lines_are_written_when_spans_are_exported() {
        let captured = CapturedLines::default();
        let tracer = SdkTracerProvider::builder().build().tracer("catalog-etl-test");
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        let subscriber = build_subscriber(EnvFilter::new("info"), captured.clone(), Some(otel_layer));

        tracing::subscriber::with_default(subscriber, emit_stage_events);

        let output = captured.contents();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 1, "{output}");
        let entry: serde_json::Value = serde_json::from_str(lines[0]).expect("json line");
        assert_eq!(entry["catalog.stage"], "looking_up");
        assert_eq!(entry["message"], "stage transition");
        assert_eq!(entry["fields"]["names"], 3);
    }

    #[test]
    fn stage_lines_are_written_without_an_exporter() {
        let captured = CapturedLines::default();
        let subscriber = build_subscriber(EnvFilter::new("info"), captured.clone(), None);

        tracing::subscriber::with_default(subscriber, emit_stage_events);

        assert_eq!(captured.contents().lines().count(), 1);
    }

    #[test]
    fn filtered_out_stage_events_are_not_written() {
        let captured = CapturedLines::default();
        let subscriber = build_subscriber(EnvFilter::new("warn"), captured.clone(), None);

        tracing::subscriber::with_default(subscriber, emit_stage_events);

        assert!(captured.contents().is_empty());
    }
}

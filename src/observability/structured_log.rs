//! Stage-transition audit lines.
use std::io::Write;

use serde_json::json;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;

/// Writes one compact JSON line for every event that carries a `stage` field,
/// so a run's state machine can be followed without the full log.
pub(crate) struct StageEventLayer<W> {
    make_writer: W,
}

impl<W> StageEventLayer<W>
where
    W: for<'w> MakeWriter<'w> + 'static,
{
    pub(crate) fn new(make_writer: W) -> Self {
        Self { make_writer }
    }
}

impl<S, W> Layer<S> for StageEventLayer<W>
where
    S: Subscriber,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Some(entry) = stage_entry(event) else {
            return;
        };
        let Ok(line) = serde_json::to_string(&entry) else {
            return;
        };
        let mut writer = self.make_writer.make_writer();
        let _ = writeln!(writer, "{line}");
    }
}

fn stage_entry(event: &Event<'_>) -> Option<serde_json::Value> {
    use tracing::field::Visit;

    struct JsonVisitor {
        values: serde_json::Map<String, serde_json::Value>,
    }

    impl Visit for JsonVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.values
                .insert(field.name().to_string(), json!(format!("{value:?}")));
        }

        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            self.values.insert(field.name().to_string(), json!(value));
        }

        fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
            self.values.insert(field.name().to_string(), json!(value));
        }

        fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
            self.values.insert(field.name().to_string(), json!(value));
        }

        fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
            self.values.insert(field.name().to_string(), json!(value));
        }
    }

    let mut visitor = JsonVisitor {
        values: serde_json::Map::new(),
    };
    event.record(&mut visitor);

    let stage = visitor.values.remove("stage")?;
    let message = visitor
        .values
        .remove("message")
        .unwrap_or(serde_json::Value::Null);

    Some(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "level": event.metadata().level().as_str(),
        "catalog.stage": stage,
        "message": message,
        "fields": visitor.values,
    }))
}

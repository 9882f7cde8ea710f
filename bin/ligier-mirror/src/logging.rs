//! Logging.

use std::fmt;

use anyhow::{anyhow, Error};
use chrono::Local;
use tracing::{field, level_filters::LevelFilter, Event, Level, Subscriber};
use tracing_subscriber::{
    field::VisitOutput,
    fmt::{
        format::Writer,
        writer::{BoxMakeWriter, MakeWriterExt as _},
        FmtContext, FormatEvent, FormatFields, Layer,
    },
    layer::SubscriberExt as _,
    registry::LookupSpan,
    util::SubscriberInitExt as _,
    EnvFilter, Layer as _,
};

const LOG_LEVEL_ENV_VAR: &str = "LIGIER_MIRROR_LOG_LEVEL";
const LOG_FORMAT_JSON_ENV_VAR: &str = "LIGIER_MIRROR_LOG_FORMAT_JSON";
const APP_NAME: &str = "LIGIERMIRROR";

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) -> ! {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Initializes the logging subsystem for `tracing`.
///
/// `default_level` is used unless the `LIGIER_MIRROR_LOG_LEVEL` environment variable holds filtering directives, in
/// which case those take precedence. When `LIGIER_MIRROR_LOG_FORMAT_JSON` is set to `true` (or `1`), logs are written
/// as JSON; otherwise, a human-readable format is used.
///
/// Warnings and errors are written to standard error, everything else to standard output.
///
/// # Errors
///
/// If the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging(default_level: Option<LevelFilter>) -> Result<(), Error> {
    let is_json = std::env::var(LOG_FORMAT_JSON_ENV_VAR)
        .map(|s| s.trim().to_lowercase())
        .map(|s| s == "true" || s == "1")
        .unwrap_or(false);

    let level_filter = EnvFilter::builder()
        .with_default_directive(default_level.unwrap_or(LevelFilter::INFO).into())
        .with_env_var(LOG_LEVEL_ENV_VAR)
        .from_env_lossy();

    let writer = BoxMakeWriter::new(std::io::stderr.with_max_level(Level::WARN).or_else(std::io::stdout));
    let layer = if is_json {
        Layer::new()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_writer(writer)
            .boxed()
    } else {
        Layer::new().event_format(MirrorFormatter).with_writer(writer).boxed()
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(level_filter))
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}

/// Human-readable event formatter.
///
/// Events are written as `<timestamp> | LIGIERMIRROR | <level> | <fields> | <message>`, where the fields section is
/// omitted when the event carries no structured fields.
struct MirrorFormatter;

impl<S, N> FormatEvent<S, N> for MirrorFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, _ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        write!(
            writer,
            "{} | {} | {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            APP_NAME,
            event.metadata().level()
        )?;

        let mut v = FieldVisitor::new(writer.by_ref());
        event.record(&mut v);
        v.finish()?;

        writeln!(writer)
    }
}

/// Writes structured fields as comma-separated `key:value` pairs, and holds back the message until the end.
struct FieldVisitor<'writer> {
    writer: Writer<'writer>,
    fields_written: usize,
    message: String,
    last_result: fmt::Result,
}

impl<'writer> FieldVisitor<'writer> {
    fn new(writer: Writer<'writer>) -> Self {
        Self {
            writer,
            fields_written: 0,
            message: String::new(),
            last_result: Ok(()),
        }
    }

    fn try_write(&mut self, field: &field::Field, f: impl FnOnce(&mut dyn fmt::Write) -> fmt::Result) {
        if self.last_result.is_err() {
            return;
        }

        if field.name() == "message" {
            self.last_result = f(&mut self.message);
        } else {
            let separator = if self.fields_written == 0 { " | " } else { "," };
            self.last_result = write!(self.writer, "{}{}:", separator, field.name());
            if self.last_result.is_err() {
                return;
            }

            self.last_result = f(&mut self.writer);
            if self.last_result.is_ok() {
                self.fields_written += 1;
            }
        }
    }
}

impl field::Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        self.try_write(field, |w| {
            if field.name() == "message" {
                write!(w, "{:?}", value)
            } else {
                write!(w, "\"{:?}\"", value)
            }
        });
    }

    fn record_str(&mut self, field: &field::Field, value: &str) {
        self.try_write(field, |w| {
            if field.name() == "message" {
                w.write_str(value)
            } else {
                write!(w, "\"{}\"", value)
            }
        });
    }

    fn record_f64(&mut self, field: &field::Field, value: f64) {
        self.try_write(field, |w| write!(w, "{}", value));
    }

    fn record_i64(&mut self, field: &field::Field, value: i64) {
        self.try_write(field, |w| write!(w, "{}", value));
    }

    fn record_u64(&mut self, field: &field::Field, value: u64) {
        self.try_write(field, |w| write!(w, "{}", value));
    }

    fn record_bool(&mut self, field: &field::Field, value: bool) {
        self.try_write(field, |w| write!(w, "{}", value));
    }
}

impl VisitOutput<fmt::Result> for FieldVisitor<'_> {
    fn finish(self) -> fmt::Result {
        self.last_result?;

        let mut writer = self.writer;
        if !self.message.is_empty() {
            write!(writer, " | {}", self.message)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use tracing::{info, warn};

    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_with<F: FnOnce()>(f: F) -> String {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .event_format(MirrorFormatter)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, f);
        capture.contents()
    }

    #[test]
    fn formats_message_only() {
        let output = capture_with(|| info!("Message rate: {:.2} Hz", 12.5));

        let line = output.lines().next().expect("should have logged a line");
        assert!(line.ends_with(" | LIGIERMIRROR | INFO | Message rate: 12.50 Hz"), "{}", line);
    }

    #[test]
    fn formats_fields_before_message() {
        let output = capture_with(|| warn!(peer = "localhost:5553", size = 42u64, "Something happened."));

        let line = output.lines().next().expect("should have logged a line");
        assert!(
            line.ends_with(" | LIGIERMIRROR | WARN | peer:\"localhost:5553\",size:42 | Something happened."),
            "{}",
            line
        );
    }
}

//! A `tracing_subscriber::Layer` that writes events in `logfmt` (`key=value`) form, one line per
//! event, with the span stack folded into the line's `target`/`context` fields.
//!
//! This is deliberately small: no JSON, no color, no multi-line formatting. Operators grep for
//! `key=value` with `awk`/`grep` in production, so the wire format stays flat and predictable.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

use observability_deps::tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use std::{
    fmt::{self, Write as _},
    io::Write as IoWrite,
    sync::Mutex,
};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

/// A [`Layer`] that formats events as `logfmt` lines and writes them to `writer`.
#[derive(Debug)]
pub struct LogFmtLayer<W> {
    writer: Mutex<W>,
}

impl<W> LogFmtLayer<W>
where
    W: IoWrite + Send + Sync + 'static,
{
    /// Create a new layer writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for LogFmtLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: IoWrite + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut line = String::new();
        let meta = event.metadata();

        write_kv(&mut line, "level", level_str(*meta.level()));
        write_kv(&mut line, "target", meta.target());

        if let Some(scope) = ctx.event_scope(event) {
            let mut spans = String::new();
            for span in scope.from_root() {
                if !spans.is_empty() {
                    spans.push(':');
                }
                spans.push_str(span.name());
            }
            if !spans.is_empty() {
                write_kv(&mut line, "span", &spans);
            }
        }

        let mut visitor = FieldVisitor { line: &mut line };
        event.record(&mut visitor);

        line.push('\n');
        if let Ok(mut w) = self.writer.lock() {
            let _ = w.write_all(line.as_bytes());
        }
    }
}

fn level_str(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

fn write_kv(line: &mut String, key: &str, value: &str) {
    if !line.is_empty() {
        line.push(' ');
    }
    let _ = write!(line, "{key}=");
    write_value(line, value);
}

fn write_value(line: &mut String, value: &str) {
    if value.contains(' ') || value.contains('=') || value.contains('"') {
        line.push('"');
        for c in value.chars() {
            if c == '"' || c == '\\' {
                line.push('\\');
            }
            line.push(c);
        }
        line.push('"');
    } else {
        line.push_str(value);
    }
}

struct FieldVisitor<'a> {
    line: &'a mut String,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        write_kv(self.line, field.name(), value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        write_kv(self.line, field.name(), &format!("{value:?}"));
    }
}

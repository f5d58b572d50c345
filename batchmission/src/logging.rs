// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Subscriber setup for the `batchmission` binary.
//!
//! Log lines go to stderr so reports printed on stdout stay parseable.
//! `BATCHMISSION_LOG` overrides the filter, `BATCHMISSION_LOG_FORMAT` picks
//! json, pretty or compact output, `BATCHMISSION_LOG_SPAN_EVENTS` enables span
//! lifecycle events and `BATCHMISSION_LOG_FILE` adds a plain-text file sink.

use std::env;
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{EnvFilter, Layer, Registry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV: &str = "BATCHMISSION_LOG";
const LOG_FORMAT_ENV: &str = "BATCHMISSION_LOG_FORMAT";
const LOG_SPAN_EVENTS_ENV: &str = "BATCHMISSION_LOG_SPAN_EVENTS";
const LOG_FILE_ENV: &str = "BATCHMISSION_LOG_FILE";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
    Compact,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub fn init(verbose: bool) {
    let filter = build_filter(env::var(LOG_ENV).ok().as_deref(), verbose);
    let format = parse_format(env_value(LOG_FORMAT_ENV).as_deref());
    let span_events = parse_span_events(env_value(LOG_SPAN_EVENTS_ENV).as_deref());

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(format, span_events.clone(), None)];
    if let Some((writer, guard)) = build_file_writer() {
        layers.push(fmt_layer(format, span_events, Some(writer)));
        let _ = FILE_GUARD.set(guard);
    }

    Registry::default()
        .with(layers)
        .with(filter)
        .with(tracing_error::ErrorLayer::default())
        .init();
}

fn fmt_layer(format: LogFormat, span_events: FmtSpan, file: Option<NonBlocking>) -> BoxedLayer {
    let ansi = file.is_none();
    let base = tracing_subscriber::fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_span_events(span_events)
        .with_ansi(ansi);
    match (format, file) {
        (LogFormat::Json, Some(writer)) => base.json().with_writer(writer).boxed(),
        (LogFormat::Json, None) => base.json().with_writer(std::io::stderr).boxed(),
        (LogFormat::Pretty, Some(writer)) => base.pretty().with_writer(writer).boxed(),
        (LogFormat::Pretty, None) => base.pretty().with_writer(std::io::stderr).boxed(),
        (LogFormat::Compact, Some(writer)) => base.compact().with_writer(writer).boxed(),
        (LogFormat::Compact, None) => base.compact().with_writer(std::io::stderr).boxed(),
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
}

fn build_filter(directives: Option<&str>, verbose: bool) -> EnvFilter {
    match directives {
        Some(value) => EnvFilter::new(value),
        None if verbose => EnvFilter::new("debug"),
        // dependencies only speak up when something is wrong
        None => EnvFilter::new("warn,batchmission=info"),
    }
}

fn parse_format(value: Option<&str>) -> LogFormat {
    match value {
        Some("json") => LogFormat::Json,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::Compact,
    }
}

fn parse_span_events(value: Option<&str>) -> FmtSpan {
    match value {
        Some("new") => FmtSpan::NEW,
        Some("enter") => FmtSpan::ENTER,
        Some("exit") => FmtSpan::EXIT,
        Some("close") => FmtSpan::CLOSE,
        Some("full") => FmtSpan::FULL,
        _ => FmtSpan::NONE,
    }
}

fn build_file_writer() -> Option<(NonBlocking, WorkerGuard)> {
    let file_path = env::var(LOG_FILE_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;

    let path = Path::new(&file_path);
    let file_name = path.file_name()?.to_string_lossy().to_string();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}

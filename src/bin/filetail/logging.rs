// SPDX-License-Identifier: Apache-2.0

use std::io::{self, IsTerminal};

use clap::ValueEnum;
use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::BoxError;

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

/// Install the global subscriber. Diagnostics go to stderr so stdout only
/// carries records. Keep the guard alive until exit to flush buffered lines.
pub fn setup(log_format: LogFormatArg) -> Result<WorkerGuard, BoxError> {
    LogTracer::init()?;

    let (writer, guard) = tracing_appender::non_blocking(io::stderr());
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    let json = log_format == LogFormatArg::Json;
    let bunyan = json.then(|| {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        BunyanFormattingLayer::new(app_name, writer.clone())
    });
    let compact = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer.clone())
            .with_target(false)
            .with_ansi(io::stderr().is_terminal())
            .compact()
    });

    let subscriber = Registry::default()
        .with(filter)
        .with(json.then_some(JsonStorageLayer))
        .with(bunyan)
        .with(compact);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}

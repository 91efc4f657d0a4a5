// SPDX-License-Identifier: Apache-2.0

mod logging;

use std::process::ExitCode;

use clap::Parser;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};

use filetail::init::args::{DecoderArg, TailArgs};
use filetail::sources::file::{
    Decoder, FileSource, FileSourceConfig, JsonDecoder, SourceId, TextDecoder,
};
use logging::LogFormatArg;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Tail a file and print each decoded record to stdout
#[derive(Debug, Parser)]
#[command(name = "filetail", version, about, long_about = None)]
struct Arguments {
    /// Log format for diagnostics
    #[arg(value_enum, long, env = "FILETAIL_LOG_FORMAT", default_value = "text")]
    log_format: LogFormatArg,

    #[command(flatten)]
    tail: TailArgs,
}

fn main() -> ExitCode {
    let args = Arguments::parse();

    let _guard = match logging::setup(args.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run(args.tail) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = e, "Tailer exited with an error.");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run(args: TailArgs) -> Result<(), BoxError> {
    let config = FileSourceConfig::from(&args);

    match args.decoder {
        DecoderArg::Text => {
            let source = FileSource::new(config, TextDecoder)?;
            tail_until_shutdown(source, |id: &SourceId, line: &String| {
                println!("{}\t{}", id, line)
            })
            .await
        }
        DecoderArg::Json => {
            let source = FileSource::new(config, JsonDecoder)?;
            tail_until_shutdown(source, |id: &SourceId, value: &serde_json::Value| {
                println!("{}\t{}", id, value)
            })
            .await
        }
    }
}

async fn tail_until_shutdown<D, F>(mut source: FileSource<D>, print: F) -> Result<(), BoxError>
where
    D: Decoder,
    F: Fn(&SourceId, &D::Output) + Send + Sync + 'static,
{
    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    source.attach(print)?;
    source.start()?;

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
    info!("Shutdown signal received.");

    source.stop().await?;
    Ok(())
}

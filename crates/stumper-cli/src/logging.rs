//! Tracing setup.
//!
//! RUST_LOG wins when set; otherwise `info`, or `debug` with `--verbose`.
//! Logs go to stderr so stdout carries only the report.

use tracing_subscriber::EnvFilter;

use crate::args::LogFormat;

pub fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "debug,hyper=info,reqwest=info,rustls=info"
        } else {
            "info"
        })
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

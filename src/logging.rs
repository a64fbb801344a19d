use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sets up tracing with a console layer and a daily-rolling JSON file in
/// `logs/`. `verbose` raises this crate's default level to debug; a
/// RUST_LOG directive still overrides either way.
pub fn init_logging(verbose: bool) {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "leads.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_directive = if verbose {
        "leads_scraper=debug"
    } else {
        "leads_scraper=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(default_directive.parse().unwrap()))
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();

    // The guard must outlive the process or buffered file logs are lost.
    std::mem::forget(guard);
}

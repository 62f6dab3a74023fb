use std::path::Path;

use dotenv::dotenv;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::{AppError, AppResult};
use crate::diagnostics::DUMP_TARGET;

const TIMER_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Maps a `-v` count onto a default filter directive. `RUST_LOG` wins when set.
pub fn verbosity_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// `RUST_LOG` or `default_directive`, plus `framelink::dump=info` when
/// dumping is on so dumps survive a quiet default level.
pub fn env_filter(default_directive: &str, dump_enabled: bool) -> EnvFilter {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    if !dump_enabled {
        return filter;
    }
    match format!("{}=info", DUMP_TARGET).parse::<Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Console-only logging.
pub fn setup_local_tracing(default_directive: &str, dump_enabled: bool) -> AppResult<()> {
    dotenv().ok();
    let timer = ChronoLocal::new(TIMER_FORMAT.to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_line_number(true);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter(default_directive, dump_enabled))
        .try_init()
        .map_err(|e| AppError::IllegalStateError(format!("tracing init: {}", e)))?;
    Ok(())
}

/// Console logging teed into an hourly rolling file under `log_dir`.
///
/// Frame dumps are emitted through `tracing`, so this is also where the dump
/// log file ends up. Keep the returned guard alive for the lifetime of the
/// process or buffered lines are lost.
pub fn setup_tracing<P: AsRef<Path>>(
    log_dir: P,
    default_directive: &str,
    dump_enabled: bool,
) -> AppResult<WorkerGuard> {
    dotenv().ok();
    let file_appender = tracing_appender::rolling::hourly(log_dir, "framelink.log");
    let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
    let writer = non_blocking.and(std::io::stdout);

    let timer = ChronoLocal::new(TIMER_FORMAT.to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter(default_directive, dump_enabled))
        .try_init()
        .map_err(|e| AppError::IllegalStateError(format!("tracing init: {}", e)))?;

    Ok(worker_guard)
}

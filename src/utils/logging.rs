use crate::config::LoggingSettings;
use std::fs;
use std::io;
use std::sync::Arc;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Build the filter: `RUST_LOG` wins, otherwise the configured level
pub fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let own_level = if settings.verbose { "debug" } else { settings.level.as_str() };
        let directives = format!("{},skinmotion={}", settings.level, own_level);
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Initialize logging: console layer plus an optional plain-text file layer.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging(settings: &LoggingSettings) {
    let file_layer = settings.file.as_ref().and_then(|path| {
        // session-based: a fresh file per start
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                eprintln!("Warning: Failed to remove existing {}: {}", path.display(), e);
            }
        }
        match fs::File::create(path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_span_events(FmtSpan::CLOSE)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_ansi(false)
                    .boxed(),
            ),
            Err(e) => {
                eprintln!("Warning: Failed to create log file {}: {}", path.display(), e);
                None
            }
        }
    });

    let result = tracing_subscriber::registry()
        .with(build_filter(settings))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_file(settings.verbose)
                .with_line_number(settings.verbose),
        )
        .with(file_layer)
        .try_init();
    if result.is_err() {
        return;
    }

    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!("Panic occurred: {}", panic_info);

        if let Some(location) = panic_info.location() {
            tracing::error!(
                "Panic location: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
    }));

    tracing::info!("Logging initialized with level: {}", settings.level);
    if let Some(path) = &settings.file {
        tracing::info!("File logging enabled: {}", path.display());
    }
}

/// Log runtime information for debugging
pub fn log_system_info() {
    tracing::info!("=== System Information ===");
    tracing::info!("OS: {}", std::env::consts::OS);
    tracing::info!("Architecture: {}", std::env::consts::ARCH);
    tracing::info!("SkinMotion Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("CPUs: {}", num_cpus::get());
    tracing::info!("==========================");
}

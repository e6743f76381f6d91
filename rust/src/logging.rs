/// Logging initialization.
///
/// Human-readable output goes to stderr; a plain-text copy is appended to
/// `<data_dir>/alertchat.log` so logs can be pulled off a device after the fact.
/// `RUST_LOG` overrides the default filter.
///
/// Called once at the start of `FfiApp::new()`. Later calls are no-ops.
pub fn init_logging(data_dir: &str) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "alertchat_core=debug,info".into());

    let log_path = std::path::Path::new(data_dir).join("alertchat.log");
    let _ = std::fs::create_dir_all(data_dir);
    let file_layer = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
        });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}

use tracing_subscriber::EnvFilter;

pub fn set_up() {
    #[cfg(debug_assertions)]
    let level = tracing::Level::TRACE;

    #[cfg(not(debug_assertions))]
    let level = tracing::Level::INFO;

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("a global subscriber is already set");
        return;
    }
    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::warn!("log records won't be captured: {e}");
    }

    tracing::debug!("logging set-up!")
}

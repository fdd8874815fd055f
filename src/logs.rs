use super::*;

/// Installs the global subscriber. Output goes to stderr through a
/// non-blocking writer that flushes when the returned guard drops.
pub(crate) fn init() -> WorkerGuard {
    let (writer, guard) = non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(writer)
                .with_filter(EnvFilter::from_default_env()),
        )
        .init();

    guard
}

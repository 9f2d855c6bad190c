use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber. `RUST_LOG` refines the INFO default.
/// Calling it twice is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. The filter comes from `RUST_LOG` and
/// falls back to `info`. Fails if a subscriber is already installed.
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_an_error() {
        // Another test may have installed one already; either way the last
        // call must fail.
        let _ = init_tracing();
        assert!(init_tracing().is_err());
    }
}

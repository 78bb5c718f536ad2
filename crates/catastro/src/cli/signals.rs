//! Ctrl-C / SIGTERM handling for long conversions.

use anyhow::{Context, Result};
use catastro_worker::CancellationToken;
use tracing::warn;

use super::EXIT_CANCELLED;

/// Cancel `token` on the first SIGINT/SIGTERM. A second signal exits
/// immediately.
pub fn install(token: &CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
        let token = token.clone();
        std::thread::Builder::new()
            .name("catastro-signals".to_string())
            .spawn(move || {
                for sig in signals.forever() {
                    if token.is_cancelled() {
                        std::process::exit(i32::from(EXIT_CANCELLED));
                    }
                    warn!("Received signal {}, cancelling conversion...", sig);
                    token.cancel();
                }
            })
            .context("Failed to spawn signal thread")?;
    }

    #[cfg(windows)]
    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            if token.is_cancelled() {
                std::process::exit(i32::from(EXIT_CANCELLED));
            }
            warn!("Received Ctrl+C, cancelling conversion...");
            token.cancel();
        })
        .context("Failed to register Ctrl+C handler")?;
    }

    Ok(())
}

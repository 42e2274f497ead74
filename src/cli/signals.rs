//! OS signal wiring
//!
//! SIGINT and SIGTERM cancel the root [`ShutdownToken`]; every session
//! started from that token winds down and salvages what it has.

use colored::Colorize;

use crate::application::ShutdownToken;

/// Exit status used when a second interrupt forces the process down
pub const EXIT_INTERRUPTED: i32 = 130;

/// Cancel `token` on the first SIGINT or SIGTERM. A second SIGINT exits
/// immediately.
pub fn install(token: ShutdownToken) -> Result<(), std::io::Error> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => eprintln!("\n{} Interrupted, finishing up", "↓".cyan()),
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            }
            token.cancel();

            if sigint.recv().await.is_some() {
                std::process::exit(EXIT_INTERRUPTED);
            }
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{} Interrupted, finishing up", "↓".cyan());
                token.cancel();
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(EXIT_INTERRUPTED);
            }
        });
    }

    Ok(())
}

//! Process-wide tracing subscriber.

use anyhow::Result;
use tracing::Level;

/// Install a stderr fmt subscriber at `level` (`trace`..`error`).
///
/// Logs go to stderr so command output on stdout stays machine-readable.
/// Calling this twice keeps the first subscriber.
pub fn init(level: &str) -> Result<()> {
    let level: Level = level
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown log level: '{}'", level))?;

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    Ok(())
}

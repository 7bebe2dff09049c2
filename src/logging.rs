use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

/// Installs the stderr subscriber: INFO by default, DEBUG with `verbose`.
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let _ = fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
    Ok(())
}

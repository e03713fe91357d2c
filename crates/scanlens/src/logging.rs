//! Tracing subscriber setup.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter for a configured level or directive string.
///
/// An unparseable directive falls back to `info` rather than failing startup.
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global fmt subscriber.
///
/// Returns `Ok(false)` when a subscriber is already installed (tests, or a
/// host that set up its own).
pub fn init(level: &str) -> Result<bool> {
    let installed = tracing_subscriber::registry()
        .with(filter(level))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level, "logging initialized");
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_levels() {
        use tracing_subscriber::filter::LevelFilter;

        assert_eq!(filter("debug").max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(
            filter("scanlens=notalevel").max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }

    #[test]
    fn test_init_twice() {
        init("warn").unwrap();
        assert!(!init("warn").unwrap());
    }
}

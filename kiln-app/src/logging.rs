// Copyright 2026 The Kiln Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Logging
//!
//! `env_logger` behind the `log` facade.  The library logs through a `FacadeSink`, so whatever is
//! installed here is what it writes to.

use std::sync::Once;

/// `env_filter` uses `env_logger` filter syntax, e.g. `"info"` or `"kiln_vulkan=debug,warn"`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

static INIT: Once = Once::new();

/// Install the global logger.  Later calls do nothing.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        if let Some(filter) = config.env_filter {
            builder.parse_filters(&filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.filter_level(log::LevelFilter::Info);
        }

        builder.write_style(config.write_style);
        // Another logger may already be installed, e.g. by a test harness.
        let _ = builder.try_init();

        log::debug!("logging initialized");
    });
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_init_twice() {
        init_logging(LoggingConfig {
            env_filter: Some("warn".to_owned()),
            ..Default::default()
        });
        init_logging(LoggingConfig::default());
        assert!(INIT.is_completed());
    }
}

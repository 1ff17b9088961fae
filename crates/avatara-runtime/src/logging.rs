//! Logging initialisation

use tracing_subscriber::{fmt, EnvFilter};

use avatara_core::{AvataraError, AvataraResult};

use crate::LoggingConfig;

/// Build the filter: `RUST_LOG` wins over the configured directive
pub fn env_filter(config: &LoggingConfig) -> AvataraResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| AvataraError::Config(format!("logging.filter: {}", e))),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> AvataraResult<()> {
    let builder = fmt().with_env_filter(env_filter(config)?).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| AvataraError::Config(format!("logging: {}", e)))?;

    tracing::debug!(filter = %config.filter, json = config.json, "logging initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_directive_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            filter: "avatara=loud".to_string(),
            json: false,
        };
        assert!(matches!(env_filter(&config), Err(AvataraError::Config(_))));
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}

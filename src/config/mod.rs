mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{BrokerSettings, ClientSettings, LogSettings, ServerSettings, Settings};

/// Prefix of environment variables read by [`load_config`].
pub const ENV_PREFIX: &str = "TOPICQ";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the server, broker, client and log configurations
///
/// Environment variables use `__` between nesting levels, so
/// `TOPICQ_BROKER__DELIVERY_BACKLOG=64` sets `broker.delivery_backlog`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;
    let settings = partial.merge_over(Settings::default());
    Ok(settings)
}

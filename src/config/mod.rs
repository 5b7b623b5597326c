mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    CloudSettings, LoggingSettings, PartitionedSettings, Settings, StreamingSettings,
};

/// Prefix of environment overrides, e.g. `PUBSUB_STREAMING__CLUSTER_ID`.
pub const ENV_PREFIX: &str = "PUBSUB";

/// Loads the configuration from `config/default` (any format the `config`
/// crate understands, optional), a `.env` file and environment variables,
/// then fills the gaps with default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();
    load_config_from(Path::new("config/default"))
}

/// Like [`load_config`], reading the file at `path` instead and skipping
/// `.env`.
pub fn load_config_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("partitioned.brokers"),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

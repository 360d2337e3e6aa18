mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    BrokerSettings, ClientSettings, LogSettings, PartialSettings, Settings,
};

/// Prefix for environment overrides, e.g. `POPSUB__BROKER__HOST`.
pub const ENV_PREFIX: &str = "POPSUB";

/// Loads the configuration from `config/default` (any format the `config`
/// crate understands, optional) and `POPSUB__*` environment variables, then
/// merges it over [`Settings::default`].
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

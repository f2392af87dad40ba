use config::load_config;
use config::shared::MergerConfig;

/// Loads and validates the merger configuration.
pub fn load_merger_config() -> anyhow::Result<MergerConfig> {
    let config = load_config::<MergerConfig>()?;
    config.validate()?;

    Ok(config)
}

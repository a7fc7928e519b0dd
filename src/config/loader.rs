use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use std::path::Path;

use super::schema::Config;
use crate::error::{ConfigError, Result};

pub fn load_from_env_or_file() -> Result<Config> {
    let config: Config = Figment::new()
        // Try to load from various config files
        .merge(Toml::file("httpspy.toml"))
        .merge(Json::file("httpspy.json"))
        .merge(Yaml::file("httpspy.yaml"))
        .merge(Yaml::file("httpspy.yml"))
        // Override with environment variables, e.g. HTTPSPY_PROXY__PORT.
        // A double underscore separates nesting levels so multi-word keys
        // such as connectTimeoutMs stay addressable.
        .merge(Env::prefixed("HTTPSPY_").split("__"))
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate(&config)?;

    Ok(config)
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new().merge(Toml::file(path)),
        Some("json") => Figment::new().merge(Json::file(path)),
        Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
        _ => {
            return Err(ConfigError::Parse(format!(
                "Unsupported config file format: {}",
                path.display()
            ))
            .into())
        }
    };

    let config: Config = figment
        .merge(Env::prefixed("HTTPSPY_").split("__"))
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate(&config)?;

    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.proxy.connect_timeout_ms == 0 {
        return Err(
            ConfigError::Validation("Connect timeout must be greater than 0".into()).into(),
        );
    }

    for method in &config.proxy.allowed_methods {
        if method.trim().is_empty() {
            return Err(
                ConfigError::Validation("Method filter entries must not be empty".into()).into(),
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Config;

    #[test]
    fn default_config_validates() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn zero_connect_timeout_is_rejected() {
        let mut config = Config::default();
        config.proxy.connect_timeout_ms = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn blank_filter_entry_is_rejected() {
        let mut config = Config::default();
        config.proxy.allowed_methods = vec!["GET".into(), "  ".into()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn env_overrides_reach_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("HTTPSPY_PROXY__PORT", "9191");
            jail.set_env("HTTPSPY_PROXY__CONNECTTIMEOUTMS", "250");
            jail.set_env("HTTPSPY_OUTPUT__SAVEPATH", "spool/out.csv");
            let config = load_from_env_or_file().map_err(|e| e.to_string())?;
            assert_eq!(config.proxy.port, 9191);
            assert_eq!(config.proxy.connect_timeout_ms, 250);
            assert_eq!(config.output.save_path, Path::new("spool/out.csv"));
            Ok(())
        });
    }
}

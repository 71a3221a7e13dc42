use super::types::SyncConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File};

/// Plain variables honoured for the two base URLs, mapped onto the nested keys
const URL_ALIASES: [(&str, &str); 2] = [
    ("WAF_API_URL", "WAF_SYNC_API__BASE_URL"),
    ("WAF_WS_URL", "WAF_SYNC_STREAM__BASE_URL"),
];

/// Values given on the command line, applied after every other source
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub log_level: Option<String>,
}

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    config_file: Option<String>,
    env: Option<config::Map<String, String>>,
    overrides: ConfigOverrides,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_file: None,
            env: None,
            overrides: ConfigOverrides::default(),
        }
    }

    /// Load configuration from file
    pub fn load_from_file(mut self, path: Option<&str>) -> Self {
        self.config_file = path.map(String::from);
        self
    }

    /// Load configuration from the process environment
    pub fn load_from_env(self) -> Self {
        let vars = std::env::vars().collect();
        self.load_from_env_map(vars)
    }

    /// Load configuration from an explicit variable map
    pub fn load_from_env_map(mut self, mut vars: config::Map<String, String>) -> Self {
        for (alias, key) in URL_ALIASES {
            if let Some(value) = vars.get(alias).cloned() {
                vars.entry(key.to_string()).or_insert(value);
            }
        }
        self.env = Some(vars);
        self
    }

    /// Apply command-line values
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<SyncConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&SyncConfig::default())?);

        if let Some(config_path) = &self.config_file {
            builder = builder.add_source(File::with_name(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::with_name("waf-sync").required(false))
                .add_source(File::with_name("config/waf-sync").required(false));
        }

        if let Some(vars) = self.env {
            builder = builder.add_source(
                Environment::with_prefix("WAF_SYNC")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars)),
            );
        }

        builder = builder
            .set_override_option("api.base_url", self.overrides.api_url)?
            .set_override_option("stream.base_url", self.overrides.ws_url)?
            .set_override_option("logging.level", self.overrides.log_level)?;

        let config: SyncConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate().context("Invalid configuration")?;

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

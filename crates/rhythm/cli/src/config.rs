//! Configuration for the rhythm CLI

use rhythm_domus::ClientConfig;
use rhythm_runtime::FilterConfig;
use serde::{Deserialize, Serialize};

/// Main CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Filter domain configuration
    #[serde(default)]
    pub filter: FilterConfig,

    /// Trusted-side client configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// HTTP misc data configuration
    #[serde(default)]
    pub misc: MiscConfig,
}

/// Where `get_misc_data` may reach when a fixture carries no inline entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiscConfig {
    /// URL prefixes the HTTP source will fetch from
    #[serde(default)]
    pub allowed_prefixes: Vec<String>,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_misc_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for MiscConfig {
    fn default() -> Self {
        Self {
            allowed_prefixes: Vec::new(),
            timeout_ms: default_misc_timeout_ms(),
        }
    }
}

fn default_misc_timeout_ms() -> u64 {
    5_000
}

impl CliConfig {
    /// Load configuration: defaults, then an optional file, then `RHYTHM__*`
    /// environment variables (`RHYTHM__FILTER__TIMING__ITEM_TIMEOUT_MS=500`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&CliConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("RHYTHM")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_load_without_a_file() {
        let config = CliConfig::load(None).unwrap();
        assert_eq!(config.filter.timing.kindred_timeout_ms, 10_000);
        assert_eq!(config.client.run_timeout_ms, 60_000);
        assert_eq!(config.misc.timeout_ms, 5_000);
        assert!(config.misc.allowed_prefixes.is_empty());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[filter.timing]
item_timeout_ms = 250

[filter.limits]
max_posts = 40

[misc]
allowed_prefixes = ["https://data.cobalt.example/"]
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.filter.timing.item_timeout_ms, 250);
        assert_eq!(config.filter.timing.kindred_timeout_ms, 10_000);
        assert_eq!(config.filter.limits.max_posts, 40);
        assert_eq!(config.misc.allowed_prefixes, vec!["https://data.cobalt.example/"]);
    }
}

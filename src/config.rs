use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::description::{AdditionalLink, default_additional_links};
use crate::domain::{IdType, VersionSelector};
use crate::error::DatamakerError;
use crate::workspace::DEFAULT_TIMEOUT_SECS;

pub const DEFAULT_CONFIG_FILE: &str = "mapdatamaker.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub id_type: Option<IdType>,
    #[serde(default)]
    pub default_version: Option<String>,
    #[serde(default)]
    pub additional_links: Option<Vec<AdditionalLink>>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub timeout_secs: u64,
    pub id_type: IdType,
    pub default_version: VersionSelector,
    pub additional_links: Vec<AdditionalLink>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            id_type: IdType::Url,
            default_version: VersionSelector::Latest,
            additional_links: default_additional_links(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// A named file must exist; the default `mapdatamaker.json` is optional.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, DatamakerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| DatamakerError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| DatamakerError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, DatamakerError> {
        let defaults = ResolvedConfig::default();
        let default_version = VersionSelector::from_option(config.default_version.as_deref())?;
        if config.timeout_secs == Some(0) {
            return Err(DatamakerError::ConfigParse(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
            id_type: config.id_type.unwrap_or(defaults.id_type),
            default_version,
            additional_links: config
                .additional_links
                .unwrap_or(defaults.additional_links),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(resolved.id_type, IdType::Url);
        assert_eq!(resolved.default_version, VersionSelector::Latest);
        assert_eq!(resolved.additional_links, default_additional_links());
    }
}

// Application configuration
// Layered: built-in defaults -> optional TOML file -> DIAGNOSTICO_* environment

use anyhow::Context;
use config::{Config, ConfigError, Environment, File, FileFormat};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::{Catalog, CatalogError};
use crate::contact::DEFAULT_WHATSAPP_NUMBER;
use crate::engine::attention::InactivityProfile;

pub const ENV_PREFIX: &str = "DIAGNOSTICO";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactConfig {
    pub whatsapp_number: String,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            whatsapp_number: DEFAULT_WHATSAPP_NUMBER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// External catalog file. The embedded catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
    pub contact: ContactConfig,
    pub inactivity: InactivityProfile,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
            catalog_path: None,
            contact: ContactConfig::default(),
            inactivity: InactivityProfile::default(),
        }
    }
}

impl AppConfig {
    /// Build the layered configuration. A missing file is not an error.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(file, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_from(file: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(path) = file {
            builder = builder.add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            env.prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// The configured catalog file, or the embedded one.
    pub fn load_catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.catalog_path {
            Some(path) => {
                info!(
                    "[PHASE: initialization] [STEP: catalog] Loading catalog from {:?}",
                    path
                );
                Catalog::from_path(path)
            }
            None => Catalog::builtin(),
        }
    }
}

/// Entry-point wrapper: config plus catalog, with context on failure.
pub fn load_all(file: Option<&Path>) -> anyhow::Result<(AppConfig, Catalog)> {
    let config = AppConfig::load(file).context("Failed to load configuration")?;
    let catalog = config
        .load_catalog()
        .context("Failed to load question catalog")?;
    Ok((config, catalog))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::attention::InactivityTiming;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::new()))
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let cfg = AppConfig::load_from(None, no_env()).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.contact.whatsapp_number, "51981577120");
        assert_eq!(cfg.inactivity.for_phase(1), InactivityTiming::new(30_000, 35));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_from(Some(&dir.path().join("nope.toml")), no_env()).unwrap();
        assert_eq!(cfg.api_base_url, "http://localhost:8000");
    }

    #[test]
    fn file_overrides_defaults_partially() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
api_base_url = "https://api.acme.pe"
request_timeout_secs = 5

[inactivity.phase2]
idle_delay_ms = 1000
countdown_secs = 3
"#
        )
        .unwrap();

        let cfg = AppConfig::load_from(Some(file.path()), no_env()).unwrap();
        assert_eq!(cfg.api_base_url, "https://api.acme.pe");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.inactivity.for_phase(2), InactivityTiming::new(1000, 3));
        assert_eq!(cfg.inactivity.for_phase(3), InactivityTiming::new(60_000, 50));
        assert_eq!(cfg.contact.whatsapp_number, "51981577120");
    }

    #[test]
    fn environment_overrides_file() {
        let env = Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::from([
            (
                "DIAGNOSTICO_API_BASE_URL".to_string(),
                "http://env:9000".to_string(),
            ),
            (
                "DIAGNOSTICO_CONTACT__WHATSAPP_NUMBER".to_string(),
                "51000000000".to_string(),
            ),
        ])));
        let cfg = AppConfig::load_from(None, env).unwrap();
        assert_eq!(cfg.api_base_url, "http://env:9000");
        assert_eq!(cfg.contact.whatsapp_number, "51000000000");
    }

    #[test]
    fn catalog_path_loads_external_catalog() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{}", crate::catalog::fixtures::SINGLE_PHASE).unwrap();

        let cfg = AppConfig {
            catalog_path: Some(file.path().to_path_buf()),
            ..AppConfig::default()
        };
        let catalog = cfg.load_catalog().unwrap();
        assert!(catalog.question("x").is_some());

        let missing = AppConfig {
            catalog_path: Some(PathBuf::from("/definitely/not/here.toml")),
            ..AppConfig::default()
        };
        assert!(matches!(
            missing.load_catalog(),
            Err(CatalogError::Io { .. })
        ));
    }

    #[test]
    fn embedded_catalog_is_the_default() {
        assert!(AppConfig::default().load_catalog().is_ok());
    }
}

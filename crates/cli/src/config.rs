//! Broker configuration: a TOML file overlaid with environment variables.
//!
//! The file is optional; every key has a default. Environment variables
//! win over the file so platform-injected credentials need no file edits.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use broker_core::settings::ServiceSettings;
use broker_core::{FeatureFlags, Settings};
use broker_engine::CredHubConfig;

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl std::fmt::Display) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Basic-auth user; auth is disabled when empty.
    pub user: String,
    pub password: String,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            user: String::new(),
            password: String::new(),
            tls_cert: None,
            tls_key: None,
        }
    }
}

/// Object-valued keys accept either an inline table or a JSON string.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub defaults: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub provision_defaults: Value,
    pub bind_defaults: Value,
    pub plans: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompatibilityConfig {
    pub enable_preview_services: bool,
    pub enable_unmaintained_services: bool,
    pub enable_eol_services: bool,
    pub enable_beta_services: bool,
    pub enable_deprecated_services: bool,
    pub enable_terraform_services: bool,
}

impl Default for CompatibilityConfig {
    fn default() -> Self {
        let flags = FeatureFlags::default();
        Self {
            enable_preview_services: flags.enable_preview_services,
            enable_unmaintained_services: flags.enable_unmaintained_services,
            enable_eol_services: flags.enable_eol_services,
            enable_beta_services: flags.enable_beta_services,
            enable_deprecated_services: flags.enable_deprecated_services,
            enable_terraform_services: flags.enable_terraform_services,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub property_validation_disabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Service definition files, JSON or TOML.
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub json: bool,
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub api: ApiConfig,
    pub provision: ProvisionConfig,
    pub service: BTreeMap<String, ServiceConfig>,
    pub compatibility: CompatibilityConfig,
    pub request: RequestConfig,
    pub credhub: CredHubConfig,
    pub catalog: CatalogConfig,
    pub log: LogConfig,
    /// The document as parsed, for the `config()` template function.
    #[serde(skip)]
    pub raw: Value,
}

impl BrokerConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: BrokerConfig = toml::from_str(text)?;
        config.raw = toml::from_str(text)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load `path` if given, then apply the process environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Overlay values found through `lookup`, keyed by environment variable name.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = get("SECURITY_USER_NAME") {
            self.api.user = v;
        }
        if let Some(v) = get("SECURITY_USER_PASSWORD") {
            self.api.password = v;
        }
        if let Some(v) = get("PORT") {
            self.api.port = v.parse().map_err(|e| ConfigError::invalid("PORT", e))?;
        }

        if let Some(v) = get("CH_CRED_HUB_URL") {
            self.credhub.url = v;
        }
        if let Some(v) = get("CH_UAA_URL") {
            self.credhub.uaa_url = v;
        }
        if let Some(v) = get("CH_UAA_CLIENT_NAME") {
            self.credhub.uaa_client_name = v;
        }
        if let Some(v) = get("CH_UAA_CLIENT_SECRET") {
            self.credhub.uaa_client_secret = v;
        }
        if let Some(v) = get("CH_SKIP_SSL_VALIDATION") {
            self.credhub.skip_ssl_validation = parse_bool("CH_SKIP_SSL_VALIDATION", &v)?;
        }
        if let Some(v) = get("CH_CA_CERT_FILE") {
            self.credhub.ca_cert_file = Some(PathBuf::from(v));
        }

        if let Some(v) = get("GSB_PROVISION_DEFAULTS") {
            self.provision.defaults = Value::String(v);
        }
        let compat = &mut self.compatibility;
        for (name, flag) in [
            ("GSB_COMPATIBILITY_ENABLE_PREVIEW_SERVICES", &mut compat.enable_preview_services),
            ("GSB_COMPATIBILITY_ENABLE_UNMAINTAINED_SERVICES", &mut compat.enable_unmaintained_services),
            ("GSB_COMPATIBILITY_ENABLE_EOL_SERVICES", &mut compat.enable_eol_services),
            ("GSB_COMPATIBILITY_ENABLE_BETA_SERVICES", &mut compat.enable_beta_services),
            ("GSB_COMPATIBILITY_ENABLE_DEPRECATED_SERVICES", &mut compat.enable_deprecated_services),
            ("GSB_COMPATIBILITY_ENABLE_TERRAFORM_SERVICES", &mut compat.enable_terraform_services),
        ] {
            if let Some(v) = get(name) {
                *flag = parse_bool(name, &v)?;
            }
        }
        if let Some(v) = get("GSB_REQUEST_PROPERTY_VALIDATION_DISABLED") {
            self.request.property_validation_disabled =
                parse_bool("GSB_REQUEST_PROPERTY_VALIDATION_DISABLED", &v)?;
        }
        Ok(())
    }

    pub fn flags(&self) -> FeatureFlags {
        let c = self.compatibility;
        FeatureFlags {
            enable_preview_services: c.enable_preview_services,
            enable_unmaintained_services: c.enable_unmaintained_services,
            enable_eol_services: c.enable_eol_services,
            enable_beta_services: c.enable_beta_services,
            enable_deprecated_services: c.enable_deprecated_services,
            enable_terraform_services: c.enable_terraform_services,
            property_validation_disabled: self.request.property_validation_disabled,
        }
    }

    /// The immutable settings handed to the registry and the engine.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let mut services = BTreeMap::new();
        for (name, svc) in &self.service {
            let key = |field: &str| format!("service.{name}.{field}");
            services.insert(
                name.clone(),
                ServiceSettings {
                    provision_defaults: object_value(&svc.provision_defaults, &key("provision_defaults"))?,
                    bind_defaults: object_value(&svc.bind_defaults, &key("bind_defaults"))?,
                    plans: array_value(&svc.plans, &key("plans"))?,
                },
            );
        }

        let raw = if self.raw.is_null() {
            None
        } else {
            Some(Arc::new(self.raw.clone()))
        };
        Ok(Settings {
            provision_defaults: object_value(&self.provision.defaults, "provision.defaults")?,
            services,
            flags: self.flags(),
            raw,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "t" | "yes" => Ok(true),
        "false" | "0" | "f" | "no" => Ok(false),
        other => Err(ConfigError::invalid(key, format!("expected a boolean, got {other:?}"))),
    }
}

/// A table, a JSON object string, or nothing.
fn object_value(value: &Value, key: &str) -> Result<Map<String, Value>, ConfigError> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        Value::String(s) if s.trim().is_empty() => Ok(Map::new()),
        Value::String(s) => serde_json::from_str(s).map_err(|e| ConfigError::invalid(key, e)),
        other => Err(ConfigError::invalid(key, format!("expected an object, got {other}"))),
    }
}

/// An array of tables, a JSON array string, or nothing.
fn array_value(value: &Value, key: &str) -> Result<Vec<Value>, ConfigError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::String(s) => serde_json::from_str(s).map_err(|e| ConfigError::invalid(key, e)),
        other => Err(ConfigError::invalid(key, format!("expected an array, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[api]
port = 9000
user = "broker"
password = "secret"

[provision]
defaults = '{"region": "eu"}'

[service.csb-db]
provision_defaults = { tier = "small" }
plans = '[{"name": "custom", "id": "7b0ac7e8-1e3a-4e2b-9a4d-6a3c8c9b2f11"}]'

[compatibility]
enable_eol_services = true

[credhub]
url = "https://credhub.example.com"
uaa_url = "https://uaa.example.com"

[catalog]
paths = ["services/db.json"]
"#;

    #[test]
    fn parses_file() {
        let config = BrokerConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.host, "0.0.0.0");
        assert!(config.credhub.is_configured());
        assert_eq!(config.catalog.paths, vec![PathBuf::from("services/db.json")]);
        assert_eq!(config.raw["api"]["user"], "broker");

        let settings = config.settings().unwrap();
        assert_eq!(settings.provision_defaults["region"], "eu");
        assert_eq!(settings.provision_default_overrides("csb-db")["tier"], "small");
        assert_eq!(settings.user_plans("csb-db")[0]["name"], "custom");
        assert!(settings.flags.enable_eol_services);
        assert!(settings.flags.enable_preview_services);
        assert!(!settings.flags.enable_terraform_services);
        assert!(settings.raw.is_some());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = BrokerConfig::from_toml("").unwrap();
        assert_eq!(config.api.port, DEFAULT_PORT);
        assert_eq!(config.log.level, "info");
        assert!(!config.credhub.is_configured());
        let settings = config.settings().unwrap();
        assert!(settings.provision_defaults.is_empty());
        assert_eq!(settings.flags, FeatureFlags::default());
    }

    #[test]
    fn environment_wins() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SECURITY_USER_NAME", "env-user"),
            ("PORT", "7070"),
            ("CH_SKIP_SSL_VALIDATION", "true"),
            ("GSB_PROVISION_DEFAULTS", r#"{"region": "us"}"#),
            ("GSB_COMPATIBILITY_ENABLE_BETA_SERVICES", "false"),
            ("GSB_REQUEST_PROPERTY_VALIDATION_DISABLED", "1"),
            ("CH_UAA_CLIENT_NAME", ""),
        ]);
        let mut config = BrokerConfig::from_toml(SAMPLE).unwrap();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api.user, "env-user");
        assert_eq!(config.api.password, "secret");
        assert_eq!(config.api.port, 7070);
        assert!(config.credhub.skip_ssl_validation);

        let settings = config.settings().unwrap();
        assert_eq!(settings.provision_defaults["region"], "us");
        assert!(!settings.flags.enable_beta_services);
        assert!(settings.flags.property_validation_disabled);
    }

    #[test]
    fn bad_values_name_their_key() {
        let mut config = BrokerConfig::default();
        let err = config
            .apply_env(|name| (name == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().starts_with("invalid value for PORT:"));

        let config =
            BrokerConfig::from_toml("[provision]\ndefaults = '[1, 2]'\n").unwrap();
        let err = config.settings().unwrap_err();
        assert!(err.to_string().starts_with("invalid value for provision.defaults:"));

        let config = BrokerConfig::from_toml("[provision]\ndefaults = 3\n").unwrap();
        assert_eq!(
            config.settings().unwrap_err().to_string(),
            "invalid value for provision.defaults: expected an object, got 3"
        );
        assert_eq!(object_value(&json!(""), "k").unwrap(), Map::new());
    }
}

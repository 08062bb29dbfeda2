//! Loads service definitions from JSON or TOML files into a registry.
//!
//! A file holds one definition, an array of them, or a table with a
//! `services` array.

use std::path::{Path, PathBuf};

use serde_json::Value;

use broker_core::validation::FieldError;
use broker_core::{BrokerRegistry, CatalogError, ServiceDefinition, Settings};

#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Register(#[from] CatalogError),

    #[error("service definitions conflict:\n{0}")]
    Conflict(FieldError),
}

pub fn load_registry(paths: &[PathBuf], settings: &Settings) -> Result<BrokerRegistry, CatalogLoadError> {
    let mut registry = BrokerRegistry::new();
    for path in paths {
        for service in read_definitions(path)? {
            tracing::info!(service = %service.name, path = %path.display(), "loading service definition");
            registry.register(service, settings)?;
        }
    }
    registry.validate().map_err(CatalogLoadError::Conflict)?;
    Ok(registry)
}

pub fn read_definitions(path: &Path) -> Result<Vec<ServiceDefinition>, CatalogLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| CatalogLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |message: String| CatalogLoadError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let is_toml = path.extension().and_then(|e| e.to_str()) == Some("toml");
    let document: Value = if is_toml {
        toml::from_str(&text).map_err(|e| parse_err(e.to_string()))?
    } else {
        serde_json::from_str(&text).map_err(|e| parse_err(e.to_string()))?
    };

    let entries = match document {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("services") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(parse_err("\"services\" must be an array".to_string())),
            None => vec![Value::Object(map)],
        },
        other => return Err(parse_err(format!("expected a service definition, got {other}"))),
    };

    entries
        .into_iter()
        .map(|entry| serde_json::from_value(entry).map_err(|e| parse_err(e.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DB_JSON: &str = r#"{
        "id": "0a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d",
        "name": "csb-db",
        "bindable": true,
        "plans": [{"id": "5e6f7a8b-9c0d-4e1f-8a2b-3c4d5e6f7a8b", "name": "small"}]
    }"#;

    const CACHE_TOML: &str = r#"
[[services]]
id = "1b2c3d4e-5f6a-4b7c-9d8e-0f1a2b3c4d5e"
name = "csb-cache"

[[services.plans]]
id = "6f7a8b9c-0d1e-4f2a-9b3c-4d5e6f7a8b9c"
name = "tiny"
"#;

    #[test]
    fn loads_json_and_toml() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db.json");
        let cache = dir.path().join("cache.toml");
        fs::write(&db, DB_JSON).unwrap();
        fs::write(&cache, CACHE_TOML).unwrap();

        let registry = load_registry(&[db, cache], &Settings::default()).unwrap();
        assert_eq!(registry.len(), 2);
        let cache = registry
            .get_service_by_id("1b2c3d4e-5f6a-4b7c-9d8e-0f1a2b3c4d5e")
            .unwrap();
        assert_eq!(cache.name, "csb-cache");
        assert_eq!(cache.plans[0].name, "tiny");
    }

    #[test]
    fn arrays_hold_many_definitions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("all.json");
        fs::write(&path, format!("[{DB_JSON}]")).unwrap();
        assert_eq!(read_definitions(&path).unwrap().len(), 1);
    }

    #[test]
    fn errors_name_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();
        let err = read_definitions(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            read_definitions(&missing),
            Err(CatalogLoadError::Read { .. })
        ));
    }

    #[test]
    fn ids_must_be_unique_across_files() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.toml");
        let second = dir.path().join("b.toml");
        fs::write(&first, CACHE_TOML).unwrap();
        fs::write(&second, CACHE_TOML.replace("csb-cache", "csb-cache-copy")).unwrap();

        let err = load_registry(&[first, second], &Settings::default()).unwrap_err();
        let CatalogLoadError::Conflict(conflict) = &err else {
            panic!("expected a conflict, got {err}");
        };
        let message = conflict.to_string();
        assert!(message.contains("1b2c3d4e-5f6a-4b7c-9d8e-0f1a2b3c4d5e"), "{message}");
        assert!(message.contains("6f7a8b9c-0d1e-4f2a-9b3c-4d5e6f7a8b9c"), "{message}");
    }

    #[test]
    fn invalid_definitions_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"id": "not-a-uuid", "name": "bad", "plans": [{"id": "also-bad", "name": "p"}]}"#).unwrap();
        let err = load_registry(&[path], &Settings::default()).unwrap_err();
        assert!(matches!(err, CatalogLoadError::Register(_)));
    }
}

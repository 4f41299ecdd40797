use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::AppConfig;
use super::validation::validate_config;
use crate::core::errors::ApiError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 10] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "access_key",
    "bearer",
    "jwt",
];

const SENSITIVE_WHITELIST: [&str; 2] = ["max_tokens", "tokens"];

/// Environment variables mapped onto config paths. Applied after the files.
const ENV_OVERRIDES: [(&str, &[&str]); 8] = [
    ("QDRANT_URL", &["vector_store", "url"]),
    ("QDRANT_API_KEY", &["vector_store", "api_key"]),
    ("RAGDESK_VECTOR_BACKEND", &["vector_store", "backend"]),
    ("OPENAI_API_KEY", &["llm", "api_key"]),
    ("OPENAI_BASE_URL", &["llm", "base_url"]),
    ("RAGDESK_API_KEY", &["auth", "api_key"]),
    ("RAGDESK_HOST", &["server", "host"]),
    ("PORT", &["server", "port"]),
];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("RAGDESK_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        self.paths.default_config_path()
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// Merged `config.yml` + `secrets.yaml` + environment overrides.
    pub fn load_config(&self) -> Result<Value, ApiError> {
        let public_config = load_yaml_file(&self.config_path())?;
        let secrets_config = load_yaml_file(&self.secrets_path())?;
        let mut merged = deep_merge(&public_config, &secrets_config);
        apply_env_overrides(&mut merged, |name| env::var(name).ok());
        Ok(merged)
    }

    pub fn load_app_config(&self) -> Result<AppConfig, ApiError> {
        parse_app_config(self.load_config()?)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

/// Validate and deserialize a merged config document.
pub fn parse_app_config(config: Value) -> Result<AppConfig, ApiError> {
    validate_config(&config)?;
    serde_json::from_value(config)
        .map_err(|e| ApiError::BadRequest(format!("Invalid config: {e}")))
}

fn load_yaml_file(path: &Path) -> Result<Value, ApiError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(ApiError::internal)?;
    let value = serde_yaml::from_str::<Value>(&contents).map_err(|e| {
        ApiError::BadRequest(format!("Invalid YAML in {}: {e}", path.display()))
    })?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(ApiError::BadRequest(format!(
            "Invalid config in {}: expected a mapping",
            path.display()
        ))),
    }
}

fn apply_env_overrides(config: &mut Value, lookup: impl Fn(&str) -> Option<String>) {
    for (name, path) in ENV_OVERRIDES {
        let Some(raw) = lookup(name).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        // numeric overrides stay strings when unparsable so validation reports them
        let value = raw
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or(Value::String(raw));
        set_path(config, path, value);
    }
}

fn set_path(config: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = config;
    for key in parents {
        let Some(map) = object_mut(cursor) else {
            return;
        };
        cursor = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(map) = object_mut(cursor) {
        map.insert(last.to_string(), value);
    }
}

/// Replace non-objects with an empty object and borrow it.
fn object_mut(value: &mut Value) -> Option<&mut Map<String, Value>> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::VectorStoreBackend;
    use crate::rag::SearchMode;
    use serde_json::json;

    #[test]
    fn deep_merge_lets_secrets_override_public_values() {
        let public_config = json!({
            "vector_store": { "url": "http://qdrant:6334", "api_key": null },
            "retrieval": { "top_k": 5 }
        });
        let secrets = json!({ "vector_store": { "api_key": "qd-secret" } });

        assert_eq!(
            deep_merge(&public_config, &secrets),
            json!({
                "vector_store": { "url": "http://qdrant:6334", "api_key": "qd-secret" },
                "retrieval": { "top_k": 5 }
            })
        );
    }

    #[test]
    fn env_overrides_create_missing_sections() {
        let mut config = json!({ "server": { "host": "127.0.0.1" } });
        apply_env_overrides(&mut config, |name| match name {
            "PORT" => Some("8080".to_string()),
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "QDRANT_URL" => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(config["server"]["port"], 8080);
        assert_eq!(config["server"]["host"], "127.0.0.1");
        assert_eq!(config["llm"]["api_key"], "sk-test");
        assert!(config.get("vector_store").is_none());
    }

    #[test]
    fn unparsable_port_fails_validation() {
        let mut config = json!({});
        apply_env_overrides(&mut config, |name| (name == "PORT").then(|| "eighty".to_string()));
        assert!(parse_app_config(config).is_err());
    }

    #[test]
    fn loads_yaml_files_with_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::at(dir.path());
        fs::write(
            paths.default_config_path(),
            "retrieval:\n  search_mode: similarity\nvector_store:\n  backend: memory\n",
        )
        .unwrap();
        fs::write(&paths.secrets_path, "llm:\n  api_key: sk-from-secrets\n").unwrap();

        let service = ConfigService::new(Arc::new(paths));
        let merged = deep_merge(
            &load_yaml_file(&service.paths().default_config_path()).unwrap(),
            &load_yaml_file(&service.secrets_path()).unwrap(),
        );
        let config = parse_app_config(merged).unwrap();

        assert_eq!(config.retrieval.search_mode, SearchMode::Similarity);
        assert_eq!(config.vector_store.backend, VectorStoreBackend::Memory);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-from-secrets"));
    }

    #[test]
    fn invalid_yaml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "server: [unclosed").unwrap();
        assert!(matches!(load_yaml_file(&path), Err(ApiError::BadRequest(_))));
        assert_eq!(load_yaml_file(&dir.path().join("missing.yml")).unwrap(), json!({}));
    }

    #[test]
    fn redact_sensitive_values_replaces_secrets_only() {
        let input = json!({
            "llm": { "api_key": "sk-live", "chat_model": "gpt-4o-mini" },
            "auth": { "api_key": null, "user_header": "x-user-id" },
            "limits": { "max_tokens": 42 }
        });

        assert_eq!(
            redact_sensitive_values(&input),
            json!({
                "llm": { "api_key": "****", "chat_model": "gpt-4o-mini" },
                "auth": { "api_key": null, "user_header": "x-user-id" },
                "limits": { "max_tokens": 42 }
            })
        );
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_DIMENSION: u32 = 2000;
pub const DEFAULT_MIN_DIMENSION: u32 = 50;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.30;
pub const DEFAULT_NUTRITION_TIMEOUT_SECS: u64 = 12;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value {value:?} for {var}")]
    InvalidVar { var: &'static str, value: String },
    #[error("failed to read model config {path}: {source}")]
    ModelConfigIo {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse model config {path}: {source}")]
    ModelConfigParse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("model config {path} has an empty label vocabulary")]
    EmptyLabels { path: String },
}

/// Which nutrition backend the resolver talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    CalorieNinjas,
    Usda,
}

impl FromStr for ProviderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "calorieninjas" => Ok(ProviderKind::CalorieNinjas),
            "usda" => Ok(ProviderKind::Usda),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::CalorieNinjas => write!(f, "calorieninjas"),
            ProviderKind::Usda => write!(f, "usda"),
        }
    }
}

/// Process-wide configuration, collected once at startup. Missing nutrition
/// credentials fail fast here instead of on the first request.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderKind,
    pub api_key: String,
    pub calorieninjas_url: String,
    pub usda_url: String,
    pub nutrition_timeout: Duration,
    pub max_upload_bytes: usize,
    pub max_dimension: u32,
    pub min_dimension: u32,
    pub confidence_threshold: f32,
    pub model_config_path: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source so tests do not have
    /// to mutate the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = get("NUTRITION_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingVar("NUTRITION_API_KEY"))?;

        let provider = match get("NUTRITION_PROVIDER") {
            None => ProviderKind::CalorieNinjas,
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidVar {
                    var: "NUTRITION_PROVIDER",
                    value: raw,
                })?,
        };

        Ok(Self {
            provider,
            api_key,
            calorieninjas_url: get("CALORIENINJAS_URL").unwrap_or_else(|| {
                crate::nutrition::calorieninjas::DEFAULT_URL.to_string()
            }),
            usda_url: get("USDA_URL")
                .unwrap_or_else(|| crate::nutrition::usda::DEFAULT_URL.to_string()),
            nutrition_timeout: Duration::from_secs(parse_or(
                &get,
                "NUTRITION_TIMEOUT_SECS",
                DEFAULT_NUTRITION_TIMEOUT_SECS,
            )?),
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            max_dimension: parse_or(&get, "MAX_DIMENSION", DEFAULT_MAX_DIMENSION)?,
            min_dimension: parse_or(&get, "MIN_DIMENSION", DEFAULT_MIN_DIMENSION)?,
            confidence_threshold: parse_or(
                &get,
                "CONFIDENCE_THRESHOLD",
                DEFAULT_CONFIDENCE_THRESHOLD,
            )?,
            model_config_path: get("MODEL_CONFIG").unwrap_or_else(default_model_config_path),
            port: parse_or(&get, "PORT", 8081)?,
        })
    }
}

fn default_model_config_path() -> String {
    match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(manifest_dir) => format!("{manifest_dir}/config/model.yaml"),
        Err(_) => "config/model.yaml".to_string(),
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar { var, value: raw }),
    }
}

/// Everything the classifier needs to know about its checkpoint: where the
/// TorchScript weights live, the input geometry, the normalization constants
/// and the fixed label vocabulary, in output-index order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub weights: String,
    pub image_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub labels: Vec<String>,
}

impl ModelConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ModelConfigIo {
            path: path.to_string(),
            source,
        })?;
        let config: ModelConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::ModelConfigParse {
                path: path.to_string(),
                source,
            })?;
        if config.labels.is_empty() {
            return Err(ConfigError::EmptyLabels {
                path: path.to_string(),
            });
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        |name| map.get(name).map(|v| v.to_string())
    }

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([("NUTRITION_API_KEY", "test-key")])
    }

    #[test]
    fn missing_api_key_fails_fast() {
        let err = AppConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("NUTRITION_API_KEY")));
    }

    #[test]
    fn blank_api_key_is_treated_as_missing() {
        let vars = HashMap::from([("NUTRITION_API_KEY", "   ")]);
        let err = AppConfig::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("NUTRITION_API_KEY")));
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let vars = base_vars();
        let config = AppConfig::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(config.provider, ProviderKind::CalorieNinjas);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.max_dimension, DEFAULT_MAX_DIMENSION);
        assert_eq!(config.min_dimension, DEFAULT_MIN_DIMENSION);
        assert_eq!(config.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(config.nutrition_timeout, Duration::from_secs(12));
        assert_eq!(config.port, 8081);
    }

    #[test]
    fn overrides_are_honored() {
        let mut vars = base_vars();
        vars.insert("NUTRITION_PROVIDER", "usda");
        vars.insert("MAX_DIMENSION", "1024");
        vars.insert("CONFIDENCE_THRESHOLD", "0.5");
        vars.insert("USDA_URL", "http://localhost:9999/fdc");
        let config = AppConfig::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(config.provider, ProviderKind::Usda);
        assert_eq!(config.max_dimension, 1024);
        assert_eq!(config.confidence_threshold, 0.5);
        assert_eq!(config.usda_url, "http://localhost:9999/fdc");
    }

    #[test]
    fn garbage_numeric_value_is_rejected() {
        let mut vars = base_vars();
        vars.insert("MAX_UPLOAD_BYTES", "lots");
        let err = AppConfig::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                var: "MAX_UPLOAD_BYTES",
                ..
            }
        ));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut vars = base_vars();
        vars.insert("NUTRITION_PROVIDER", "nutritionix");
        let err = AppConfig::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                var: "NUTRITION_PROVIDER",
                ..
            }
        ));
    }

    #[test]
    fn model_config_parses_yaml() {
        let yaml = r#"
weights: models/food101.pt
image_size: 224
mean: [0.5, 0.5, 0.5]
std: [0.5, 0.5, 0.5]
labels:
  - apple_pie
  - pizza
"#;
        let config: ModelConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.image_size, 224);
        assert_eq!(config.labels.len(), 2);
        assert_eq!(config.labels[1], "pizza");
    }
}

use crate::core::etl::EngineSettings;
use crate::core::pipeline::ImportSettings;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{validate_path, validate_positive_number, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub data: DataConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// GeoJSON feature collection with jurisdiction boundaries.
    pub boundaries: String,
    /// JSON map of jurisdiction name → tax record.
    pub jurisdictions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_concurrent_imports")]
    pub max_concurrent_imports: usize,
    #[serde(default)]
    pub has_headers: bool,
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_batch_size() -> usize {
    500
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_max_concurrent_imports() -> usize {
    4
}

fn default_max_file_size_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_output_path() -> String {
    "./output".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timeout_seconds: default_timeout_seconds(),
            max_concurrent_imports: default_max_concurrent_imports(),
            has_headers: false,
            max_file_size_bytes: default_max_file_size_bytes(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EtlError::MissingConfigError {
                field: path.as_ref().display().to_string(),
            },
            _ => EtlError::IoError(e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${DATA_DIR})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| {
            EtlError::ConfigValidationError {
                field: "env_substitution".to_string(),
                message: format!("Invalid substitution pattern: {}", e),
            }
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.into_owned())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            import: ImportSettings {
                batch_size: self.import.batch_size,
                timeout: Duration::from_secs(self.import.timeout_seconds),
                has_headers: self.import.has_headers,
            },
            max_concurrent_imports: self.import.max_concurrent_imports,
            max_file_size_bytes: self.import.max_file_size_bytes,
        }
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validate_path("data.boundaries", &self.data.boundaries)?;
        validate_path("data.jurisdictions", &self.data.jurisdictions)?;
        validate_path("output.path", &self.output.path)?;

        validate_positive_number("import.batch_size", self.import.batch_size, 1)?;
        validate_positive_number(
            "import.max_concurrent_imports",
            self.import.max_concurrent_imports,
            1,
        )?;
        validate_positive_number(
            "import.timeout_seconds",
            usize::try_from(self.import.timeout_seconds).unwrap_or(usize::MAX),
            1,
        )?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(EtlError::InvalidConfigValueError {
                field: "logging.level".to_string(),
                value: self.logging.level.clone(),
                reason: format!("Valid levels: {}", valid_levels.join(", ")),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[data]
boundaries = "counties.geojson"
jurisdictions = "jurisdictions.json"
"#;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = TomlConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.import.batch_size, 500);
        assert_eq!(config.import.timeout_seconds, 300);
        assert_eq!(config.import.max_concurrent_imports, 4);
        assert!(!config.import.has_headers);
        assert_eq!(config.output.path, "./output");
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_settings_mapping() {
        let toml_content = r#"
[data]
boundaries = "b.geojson"
jurisdictions = "j.json"

[import]
batch_size = 250
timeout_seconds = 30
max_concurrent_imports = 2
has_headers = true
max_file_size_bytes = 2048
"#;
        let settings = TomlConfig::from_toml_str(toml_content)
            .unwrap()
            .engine_settings();

        assert_eq!(settings.import.batch_size, 250);
        assert_eq!(settings.import.timeout, Duration::from_secs(30));
        assert!(settings.import.has_headers);
        assert_eq!(settings.max_concurrent_imports, 2);
        assert_eq!(settings.max_file_size_bytes, 2048);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("GEOTAX_TEST_DATA_DIR", "/srv/geo");

        let toml_content = r#"
[data]
boundaries = "${GEOTAX_TEST_DATA_DIR}/counties.geojson"
jurisdictions = "${GEOTAX_TEST_UNSET_VAR}/jurisdictions.json"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.data.boundaries, "/srv/geo/counties.geojson");
        assert_eq!(
            config.data.jurisdictions,
            "${GEOTAX_TEST_UNSET_VAR}/jurisdictions.json"
        );

        std::env::remove_var("GEOTAX_TEST_DATA_DIR");
    }

    #[test]
    fn test_config_validation() {
        let mut config = TomlConfig::from_toml_str(MINIMAL).unwrap();
        config.import.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = TomlConfig::from_toml_str(MINIMAL).unwrap();
        config.import.max_concurrent_imports = 0;
        assert!(config.validate().is_err());

        let mut config = TomlConfig::from_toml_str(MINIMAL).unwrap();
        config.data.boundaries = String::new();
        assert!(config.validate().is_err());

        let mut config = TomlConfig::from_toml_str(MINIMAL).unwrap();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_data_section_fails() {
        let result = TomlConfig::from_toml_str("[import]\nbatch_size = 10\n");
        assert!(matches!(result, Err(EtlError::ConfigValidationError { .. })));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.data.boundaries, "counties.geojson");
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = TomlConfig::from_file(dir.path().join("geotax.toml"));

        assert!(matches!(result, Err(EtlError::MissingConfigError { ref field }) if field.ends_with("geotax.toml")));
    }
}

//! Layered properties loading
//!
//! Properties come from files, then `XQSYNC_` environment variables, then
//! explicit overrides, each layer replacing keys set by the one before. Keys
//! are normalized to upper case.

use crate::{ConfigError, ConfigResult};
use config::{Environment, File, FileFormat};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of environment variables read as properties
pub const ENV_PREFIX: &str = "XQSYNC";

/// Output formats for [`render_properties`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertiesFormat {
    /// `KEY=value` lines
    Properties,
    /// YAML mapping
    Yaml,
    /// TOML table
    Toml,
    /// JSON object
    Json,
}

/// Builder collecting property sources
#[derive(Debug, Default)]
pub struct PropertiesLoader {
    files: Vec<(PathBuf, FileFormat)>,
    environment: bool,
    overrides: Vec<(String, String)>,
}

impl PropertiesLoader {
    /// Loader with no sources
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a properties file; the format follows its extension
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.files.push((path, format));
        self
    }

    /// Read `XQSYNC_*` environment variables
    pub fn with_environment(mut self) -> Self {
        self.environment = true;
        self
    }

    /// Set `key` regardless of files and environment
    pub fn set_override<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    /// Parse `KEY=VALUE` and add it as an override
    pub fn add_override_pair(self, pair: &str) -> ConfigResult<Self> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ConfigError::validation(format!("expected KEY=VALUE, got '{}'", pair)))?;
        if key.trim().is_empty() {
            return Err(ConfigError::validation(format!("empty key in '{}'", pair)));
        }
        Ok(self.set_override(key.trim(), value))
    }

    /// Merge every source into one property map
    pub fn load(self) -> ConfigResult<BTreeMap<String, String>> {
        let mut properties = BTreeMap::new();

        for (path, format) in &self.files {
            let layer = config::Config::builder()
                .add_source(File::from(path.clone()).format(*format).required(true))
                .build()
                .map_err(|e| ConfigError::Load {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            let values: HashMap<String, String> =
                layer.try_deserialize().map_err(|e| ConfigError::Load {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            debug!("Loaded {} properties from {}", values.len(), path.display());
            merge(&mut properties, values);
        }

        if self.environment {
            let layer = config::Config::builder()
                .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(false))
                .build()?;
            let values: HashMap<String, String> = layer.try_deserialize()?;
            debug!("Loaded {} properties from environment", values.len());
            merge(&mut properties, values);
        }

        merge(&mut properties, self.overrides);
        Ok(properties)
    }

    /// Detect file format from extension
    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Ini,
        }
    }
}

fn merge<I>(properties: &mut BTreeMap<String, String>, values: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in values {
        properties.insert(key.trim().to_ascii_uppercase(), value);
    }
}

/// Render properties in `format`
pub fn render_properties(
    properties: &BTreeMap<String, String>,
    format: PropertiesFormat,
) -> ConfigResult<String> {
    match format {
        PropertiesFormat::Properties => Ok(properties
            .iter()
            .map(|(key, value)| format!("{}={}\n", key, value))
            .collect()),
        PropertiesFormat::Yaml => Ok(serde_yaml::to_string(properties)?),
        PropertiesFormat::Toml => Ok(toml::to_string(properties)?),
        PropertiesFormat::Json => Ok(serde_json::to_string_pretty(properties)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("sync.properties", "INPUT_PATH=/in\nthreads=4\n")]
    #[case("sync.yaml", "INPUT_PATH: /in\nthreads: 4\n")]
    #[case("sync.toml", "INPUT_PATH = \"/in\"\nthreads = 4\n")]
    #[case("sync.json", "{\"INPUT_PATH\": \"/in\", \"threads\": 4}")]
    fn test_load_file_formats(#[case] name: &str, #[case] body: &str) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();

        let properties = PropertiesLoader::new().add_file(&path).load().unwrap();
        assert_eq!(properties.get("INPUT_PATH").map(String::as_str), Some("/in"));
        assert_eq!(properties.get("THREADS").map(String::as_str), Some("4"));
    }

    #[test]
    fn test_overrides_win() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.properties");
        std::fs::write(&path, "OUTPUT_PATH=/from-file\n").unwrap();

        let properties = PropertiesLoader::new()
            .add_file(&path)
            .add_override_pair("output_path=/from-cli")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(properties["OUTPUT_PATH"], "/from-cli");
    }

    #[test]
    fn test_override_keeps_value_verbatim() {
        let properties = PropertiesLoader::new()
            .add_override_pair("OUTPUT_URI_PREFIX= /a b=c")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(properties["OUTPUT_URI_PREFIX"], " /a b=c");
    }

    #[test]
    fn test_environment_layer() {
        std::env::set_var("XQSYNC_LOADER_TEST_ONLY_KEY", "from-env");
        let properties = PropertiesLoader::new().with_environment().load().unwrap();
        assert_eq!(properties["LOADER_TEST_ONLY_KEY"], "from-env");
        std::env::remove_var("XQSYNC_LOADER_TEST_ONLY_KEY");
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = PropertiesLoader::new()
            .add_file("/definitely/not/here.properties")
            .load();
        assert!(matches!(result, Err(ConfigError::Load { .. })));
    }

    #[test]
    fn test_bad_override_pair() {
        assert!(PropertiesLoader::new().add_override_pair("NOEQUALS").is_err());
        assert!(PropertiesLoader::new().add_override_pair("=value").is_err());
    }

    #[test]
    fn test_render_properties() {
        let mut properties = BTreeMap::new();
        properties.insert("A".to_string(), "1".to_string());
        properties.insert("B".to_string(), "x y".to_string());

        assert_eq!(
            render_properties(&properties, PropertiesFormat::Properties).unwrap(),
            "A=1\nB=x y\n"
        );
        let json = render_properties(&properties, PropertiesFormat::Json).unwrap();
        assert!(json.contains("\"B\": \"x y\""));
    }
}

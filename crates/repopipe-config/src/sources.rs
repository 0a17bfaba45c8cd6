// Parameter sources.
//
// Two sources feed the resolver:
// 1. Overrides (CLI flags and --context key=value pairs), highest priority
// 2. The sectioned config file (`parameters.toml`)
//
// The process environment is consulted only as a last resort for the
// deployment account and region (see resolve.rs).

use crate::error::{ConfigError, Result};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::Path;

pub const ENV_PREFIX: &str = "REPOPIPE_";

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "parameters.toml";

/// Name of the section holding the default env/app/user
pub const DEFAULT_SECTION: &str = "default";

/// Runtime parameter injection point. Values returned here win over the
/// config file.
pub trait OverrideSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Abstraction over environment-variable lookups so tests can supply their
/// own values.
pub trait EnvSource {
    /// Get an environment variable with the REPOPIPE_ prefix applied
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the REPOPIPE_ prefix
    /// Used for AWS standard variables (AWS_REGION, etc.)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Overrides collected from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    values: HashMap<String, String>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` unless `value` is `None`.
    pub fn set(&mut self, key: &str, value: Option<String>) -> &mut Self {
        if let Some(value) = value {
            self.values.insert(key.to_string(), value);
        }
        self
    }

    /// Parse a `key=value` context pair. The value may itself contain `=`.
    pub fn parse_pair(pair: &str) -> Result<(String, String)> {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            ConfigError::invalid_value("--context", pair, "expected key=value")
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::invalid_value(
                "--context",
                pair,
                "context key must not be empty",
            ));
        }
        Ok((key.to_string(), value.to_string()))
    }

    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = Self::new();
        for pair in pairs {
            let (key, value) = Self::parse_pair(pair.as_ref())?;
            overrides.values.insert(key, value);
        }
        Ok(overrides)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl OverrideSource for Overrides {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl OverrideSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// One named table of the config file. Values are kept as strings; TOML
/// booleans and integers are stringified on load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    name: String,
    values: BTreeMap<String, String>,
}

impl Section {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// The file-based default source: a TOML document whose top-level tables are
/// sections (`[default]`, `[demo-dev]`, ...).
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    origin: String,
    sections: BTreeMap<String, Section>,
}

impl ConfigFile {
    /// Read and parse a config file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse config file contents. `origin` is used in diagnostics only.
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self> {
        let table: toml::Table =
            content
                .parse()
                .map_err(|e: toml::de::Error| ConfigError::Parse {
                    origin: origin.to_string(),
                    message: e.message().to_string(),
                })?;

        let mut sections = BTreeMap::new();
        for (name, value) in table {
            let toml::Value::Table(entries) = value else {
                return Err(ConfigError::Parse {
                    origin: origin.to_string(),
                    message: format!("top-level key '{}' is not a section", name),
                });
            };

            let mut values = BTreeMap::new();
            for (key, value) in entries {
                let value = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Boolean(b) => b.to_string(),
                    toml::Value::Integer(i) => i.to_string(),
                    other => {
                        return Err(ConfigError::invalid_value(
                            &format!("{}.{}", name, key),
                            other.type_str(),
                            "expected a string, boolean or integer",
                        ))
                    }
                };
                values.insert(key, value);
            }
            sections.insert(name.clone(), Section { name, values });
        }

        Ok(Self {
            origin: origin.to_string(),
            sections,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }
}

/// Process environment
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_read_as_strings() {
        let file = ConfigFile::from_toml_str(
            r#"
            [default]
            env = "dev"
            app = "demo"

            [demo-dev]
            createGitUser = true
            logRetentionDays = 14
            "#,
            "inline",
        )
        .unwrap();

        let section = file.section("demo-dev").unwrap();
        assert_eq!(section.get("createGitUser"), Some("true"));
        assert_eq!(section.get("logRetentionDays"), Some("14"));
        assert_eq!(file.section("default").unwrap().get("env"), Some("dev"));
        assert!(file.section("demo-prod").is_none());
    }

    #[test]
    fn top_level_scalar_is_rejected() {
        let err = ConfigFile::from_toml_str("env = \"dev\"\n", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("not a section"));
    }

    #[test]
    fn nested_arrays_are_rejected() {
        let err = ConfigFile::from_toml_str("[demo-dev]\nawsRegion = [\"a\"]\n", "inline")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn context_pairs_split_on_first_equals() {
        let overrides = Overrides::from_pairs(["env=prod", "appDesc=a=b"]).unwrap();
        assert_eq!(overrides.get("env").as_deref(), Some("prod"));
        assert_eq!(overrides.get("appDesc").as_deref(), Some("a=b"));
        assert!(Overrides::from_pairs(["novalue"]).is_err());
        assert!(Overrides::from_pairs(["=x"]).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigFile::load(dir.path().join("nope.toml")).unwrap_err();
        assert_eq!(err.code(), "C004");
    }
}

// ⚙️ Configuration
// Defaults → JSON file → environment → CLI flags (last wins)

use crate::classifier::RollClassifier;
use crate::courses::CourseCatalog;
use crate::rules::PrefixTable;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_DB: &str = "ROLL_SYNC_DB";
pub const ENV_RULES: &str = "ROLL_SYNC_RULES";
pub const ENV_COURSES: &str = "ROLL_SYNC_COURSES";

pub const DEFAULT_DB_PATH: &str = "students.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// SQLite database file
    pub database: PathBuf,

    /// Optional prefix rule file; built-in table when absent
    pub prefix_rules: Option<PathBuf>,

    /// Optional course catalog file; built-in catalog when absent
    pub courses: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database: PathBuf::from(DEFAULT_DB_PATH),
            prefix_rules: None,
            courses: None,
        }
    }
}

impl AppConfig {
    /// Read a JSON config file. Missing keys fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))
    }

    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    /// Environment overrides, with the lookup injected for testability
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DB).filter(|v| !v.is_empty()) {
            self.database = PathBuf::from(db);
        }
        if let Some(rules) = lookup(ENV_RULES).filter(|v| !v.is_empty()) {
            self.prefix_rules = Some(PathBuf::from(rules));
        }
        if let Some(courses) = lookup(ENV_COURSES).filter(|v| !v.is_empty()) {
            self.courses = Some(PathBuf::from(courses));
        }
        self
    }

    pub fn prefix_table(&self) -> Result<PrefixTable> {
        match &self.prefix_rules {
            Some(path) => PrefixTable::from_file(path),
            None => Ok(PrefixTable::default()),
        }
    }

    pub fn classifier(&self) -> Result<RollClassifier> {
        Ok(RollClassifier::new(self.prefix_table()?))
    }

    pub fn course_catalog(&self) -> Result<CourseCatalog> {
        match &self.courses {
            Some(path) => CourseCatalog::from_file(path),
            None => Ok(CourseCatalog::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.database, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.prefix_table().unwrap(), PrefixTable::default());
    }

    #[test]
    fn test_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"database": "/srv/campus.db"}}"#).unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database, PathBuf::from("/srv/campus.db"));
        assert_eq!(config.prefix_rules, None);

        let env: HashMap<&str, &str> = [(ENV_DB, "/tmp/override.db"), (ENV_RULES, "")].into();
        let config = config.with_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.prefix_rules, None);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"databse": "typo.db"}}"#).unwrap();

        assert!(AppConfig::from_file(file.path()).is_err());
    }
}

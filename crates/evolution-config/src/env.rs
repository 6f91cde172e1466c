//! Required environment settings, validated once at startup.

use crate::ConfigError;
use log::{debug, warn};
use std::path::PathBuf;

/// Variables that must be present before any turn runs.
pub const REQUIRED_ENV_VARS: &[&str] = &["OPENAI_API_KEY", "DATABASE_URL"];

/// Credentials and endpoints read from the process environment.
#[derive(Clone)]
pub struct EnvSettings {
    pub openai_api_key: String,
    pub database_url: String,
    pub openai_base_url: Option<String>,
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<String>,
}

impl std::fmt::Debug for EnvSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvSettings")
            .field("openai_api_key", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .field("openai_base_url", &self.openai_base_url)
            .field("qdrant_url", &self.qdrant_url)
            .field("qdrant_api_key", &self.qdrant_api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl EnvSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary lookup.
    ///
    /// Empty values count as missing. On failure the error lists exactly the
    /// missing required names, in declaration order.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let missing: Vec<String> = REQUIRED_ENV_VARS
            .iter()
            .filter(|name| read(**name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            warn!("required environment missing (names={})", missing.join(","));
            return Err(ConfigError::MissingEnv(missing));
        }

        let settings = Self {
            openai_api_key: read("OPENAI_API_KEY").unwrap_or_default(),
            database_url: read("DATABASE_URL").unwrap_or_default(),
            openai_base_url: read("OPENAI_BASE_URL"),
            qdrant_url: read("QDRANT_URL"),
            qdrant_api_key: read("QDRANT_API_KEY"),
        };
        debug!("environment validated (database_url={})", settings.database_url);
        Ok(settings)
    }

    /// Resolve `DATABASE_URL` into a SQLite location.
    pub fn database_location(&self) -> Result<DatabaseLocation, ConfigError> {
        DatabaseLocation::parse(&self.database_url)
    }
}

/// Where the session database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// Transient in-process database.
    Memory,
    /// Database file on disk.
    File(PathBuf),
}

impl DatabaseLocation {
    /// Parse `sqlite://path`, `sqlite:path`, `sqlite::memory:` or a bare path.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let url = url.trim();
        let rest = if let Some(rest) = url.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = url.strip_prefix("sqlite:") {
            rest
        } else if url.contains("://") {
            return Err(ConfigError::UnsupportedDatabaseUrl(url.to_string()));
        } else {
            url
        };
        let rest = rest.split('?').next().unwrap_or_default();
        match rest {
            "" => Err(ConfigError::UnsupportedDatabaseUrl(url.to_string())),
            ":memory:" => Ok(DatabaseLocation::Memory),
            path => Ok(DatabaseLocation::File(PathBuf::from(path))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DatabaseLocation, EnvSettings};
    use crate::ConfigError;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_settings_are_listed_exactly() {
        let err = EnvSettings::from_lookup(lookup(&[])).unwrap_err();
        match err {
            ConfigError::MissingEnv(names) => {
                assert_eq!(names, vec!["OPENAI_API_KEY", "DATABASE_URL"])
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = EnvSettings::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap_err();
        match err {
            ConfigError::MissingEnv(names) => assert_eq!(names, vec!["DATABASE_URL"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = EnvSettings::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "  "),
            ("DATABASE_URL", "sqlite::memory:"),
        ]))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required environment variables: OPENAI_API_KEY"
        );
    }

    #[test]
    fn complete_settings_are_accepted() {
        let settings = EnvSettings::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("DATABASE_URL", "sqlite:///tmp/evolution.db"),
            ("QDRANT_URL", "http://localhost:6333"),
        ]))
        .expect("settings");
        assert_eq!(settings.qdrant_url.as_deref(), Some("http://localhost:6333"));
        assert_eq!(
            settings.database_location().expect("location"),
            DatabaseLocation::File(PathBuf::from("/tmp/evolution.db"))
        );
        assert!(!format!("{settings:?}").contains("sk-test"));
    }

    #[test]
    fn database_urls_resolve_to_sqlite_locations() {
        assert_eq!(
            DatabaseLocation::parse("sqlite::memory:").expect("memory"),
            DatabaseLocation::Memory
        );
        assert_eq!(
            DatabaseLocation::parse("sqlite:data/app.db?mode=rwc").expect("relative"),
            DatabaseLocation::File(PathBuf::from("data/app.db"))
        );
        assert_eq!(
            DatabaseLocation::parse("./local.db").expect("bare"),
            DatabaseLocation::File(PathBuf::from("./local.db"))
        );
        assert!(DatabaseLocation::parse("postgres://localhost/db").is_err());
        assert!(DatabaseLocation::parse("sqlite://").is_err());
    }
}

//! Configuration document loading and profile selection.
//!
//! The configuration is a YAML document with a single recognized root key:
//!
//! ```yaml
//! pgscout:
//!   default: dev
//!   datasources:
//!     dev:
//!       host: localhost
//!       port: 5432
//!       dbname: app
//!       user: app
//!       password_env: PG_DEV_PASSWORD
//!     prod:
//!       url_env: PG_PROD_URL
//! ```
//!
//! Loading is side-effect free: no secrets are resolved here, and the
//! document is read once per invocation and treated as immutable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PgScoutError, Result};

/// Environment variable overriding the configuration file path.
pub const CONFIG_ENV_VAR: &str = "PGSCOUT_CONFIG";

/// Default configuration file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "env.yaml";

/// Required root key of the configuration document.
pub const CONFIG_ROOT_KEY: &str = "pgscout";

/// A named datasource profile.
///
/// A profile is either *field-based* (`host`/`port`/`dbname`/`user` plus
/// optional password fields) or *URL-based* (`url` or `url_env`). Mixing the
/// two shapes is a configuration error, enforced when connection parameters
/// are built.
///
/// # Security
/// `password_env` and `url_env` hold environment-variable *names*, never
/// secret values. The `Debug` impl redacts `password` and `url` so a dumped
/// profile can be shared safely.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSourceProfile {
    /// Database host address or Unix socket directory
    pub host: Option<String>,
    /// Port number
    pub port: Option<u16>,
    /// Database name
    pub dbname: Option<String>,
    /// Role to connect as
    pub user: Option<String>,
    /// Plaintext password literal (discouraged; prefer `password_env`)
    pub password: Option<String>,
    /// Name of an environment variable holding the password
    pub password_env: Option<String>,
    /// Full DSN literal; must contain `://`
    pub url: Option<String>,
    /// Name of an environment variable holding the DSN
    pub url_env: Option<String>,
    /// libpq `sslmode` setting passed through to the client
    pub sslmode: Option<String>,
    /// Connection timeout in seconds
    pub connect_timeout: Option<u64>,
}

impl std::fmt::Debug for DataSourceProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("password_env", &self.password_env)
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("url_env", &self.url_env)
            .field("sslmode", &self.sslmode)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Parsed configuration under the `pgscout` root key.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Profile selected when no explicit name is given
    pub default: Option<String>,
    /// Named datasource profiles (names unique, order irrelevant)
    pub datasources: BTreeMap<String, DataSourceProfile>,
}

/// Top-level document wrapper. Other tools may share the same file, so
/// unknown root keys are ignored.
#[derive(Deserialize)]
struct ConfigDocument {
    #[serde(rename = "pgscout")]
    pgscout: Option<Config>,
}

/// Resolves the configuration file path.
///
/// Precedence: explicit path argument, then the [`CONFIG_ENV_VAR`]
/// environment variable, then [`DEFAULT_CONFIG_PATH`].
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR)
        && !env_path.is_empty()
    {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Loads and validates the configuration document at `path`.
///
/// # Errors
/// Returns a configuration error if the file does not exist, cannot be
/// parsed, or lacks the `pgscout` root key. No secrets are resolved.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(PgScoutError::configuration(format!(
            "Config not found: {}. Create one, set {}, or pass --config.",
            path.display(),
            CONFIG_ENV_VAR
        )));
    }

    let text = std::fs::read_to_string(path)
        .map_err(|e| PgScoutError::io(format!("Failed to read config: {}", path.display()), e))?;

    let document: ConfigDocument = serde_yaml::from_str(&text).map_err(|e| {
        PgScoutError::configuration(format!("Malformed config {}: {}", path.display(), e))
    })?;

    document.pgscout.ok_or_else(|| {
        PgScoutError::configuration(format!(
            "Invalid config {}: missing required root key '{}'",
            path.display(),
            CONFIG_ROOT_KEY
        ))
    })
}

impl Config {
    /// Selects a profile by precedence rule.
    ///
    /// An explicit name wins; otherwise the document's `default` key is
    /// used. The returned name is carried into diagnostics and reports.
    ///
    /// # Errors
    /// Returns a configuration error if the explicit name is unknown, or if
    /// neither an explicit name nor a `default` key is available.
    pub fn select_profile(&self, explicit: Option<&str>) -> Result<(&str, &DataSourceProfile)> {
        let selected = match explicit {
            Some(name) => name,
            None => self.default.as_deref().ok_or_else(|| {
                PgScoutError::configuration(
                    "No profile selected: pass --profile or set top-level 'default'",
                )
            })?,
        };

        match self.datasources.get_key_value(selected) {
            Some((name, profile)) => Ok((name.as_str(), profile)),
            None => {
                let available: Vec<&str> = self.datasources.keys().map(String::as_str).collect();
                Err(PgScoutError::configuration(format!(
                    "Unknown profile: {} (available: {})",
                    selected,
                    available.join(", ")
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(yaml: &str) -> Result<Config> {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(yaml.as_bytes()).expect("write config");
        load_config(file.path())
    }

    const BASIC: &str = r"
pgscout:
  default: dev
  datasources:
    dev:
      host: localhost
      port: 5432
      dbname: app
      user: app
    staging:
      url_env: PG_STAGING_URL
";

    #[test]
    fn loads_basic_document() {
        let config = parse(BASIC).expect("valid config");
        assert_eq!(config.default.as_deref(), Some("dev"));
        assert_eq!(config.datasources.len(), 2);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load_config(Path::new("/nonexistent/pgscout/env.yaml"))
            .expect_err("missing file");
        assert!(matches!(err, PgScoutError::Config { .. }));
        assert!(err.to_string().contains("Config not found"));
    }

    #[test]
    fn missing_root_key_is_config_error() {
        let err = parse("other-tool:\n  default: dev\n").expect_err("no root key");
        assert!(err.to_string().contains("missing required root key 'pgscout'"));
    }

    #[test]
    fn malformed_document_is_config_error() {
        let err = parse("pgscout: [not, a, mapping\n").expect_err("bad yaml");
        assert!(err.to_string().contains("Malformed config"));
    }

    #[test]
    fn unknown_profile_key_is_rejected() {
        let err = parse(
            "pgscout:\n  default: dev\n  datasources:\n    dev:\n      hostname: localhost\n",
        )
        .expect_err("typoed key");
        assert!(matches!(err, PgScoutError::Config { .. }));
    }

    #[test]
    fn explicit_profile_wins_over_default() {
        let config = parse(BASIC).expect("valid config");
        let (name, _) = config.select_profile(Some("staging")).expect("known profile");
        assert_eq!(name, "staging");
    }

    #[test]
    fn default_profile_used_when_no_explicit_name() {
        let config = parse(BASIC).expect("valid config");
        let (name, profile) = config.select_profile(None).expect("default set");
        assert_eq!(name, "dev");
        assert_eq!(profile.host.as_deref(), Some("localhost"));
    }

    #[test]
    fn unknown_explicit_profile_lists_available() {
        let config = parse(BASIC).expect("valid config");
        let err = config.select_profile(Some("prod")).expect_err("unknown");
        let text = err.to_string();
        assert!(text.contains("Unknown profile: prod"));
        assert!(text.contains("dev, staging"));
    }

    #[test]
    fn no_default_and_no_explicit_name_fails() {
        let config = parse(
            "pgscout:\n  datasources:\n    dev:\n      url_env: PG_URL\n",
        )
        .expect("valid config");
        let err = config.select_profile(None).expect_err("no default");
        assert!(err.to_string().contains("No profile selected"));
    }

    #[test]
    fn config_path_precedence() {
        temp_env::with_var(CONFIG_ENV_VAR, Some("/tmp/override.yaml"), || {
            assert_eq!(
                resolve_config_path(Some(Path::new("/tmp/explicit.yaml"))),
                PathBuf::from("/tmp/explicit.yaml")
            );
            assert_eq!(
                resolve_config_path(None),
                PathBuf::from("/tmp/override.yaml")
            );
        });
        temp_env::with_var_unset(CONFIG_ENV_VAR, || {
            assert_eq!(resolve_config_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));
        });
    }

    #[test]
    fn profile_debug_redacts_secrets() {
        let config = parse(
            "pgscout:\n  default: dev\n  datasources:\n    dev:\n      url: postgres://u:sekret@h/db\n",
        )
        .expect("valid config");
        let (_, profile) = config.select_profile(None).expect("default set");
        let debug = format!("{:?}", profile);
        assert!(!debug.contains("sekret"));
        assert!(debug.contains("[REDACTED]"));
    }
}

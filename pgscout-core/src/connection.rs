//! Connection parameter building for the external client.
//!
//! Turns a selected [`DataSourceProfile`] into an ephemeral
//! [`ResolvedConnection`]: the client argument vector plus the environment
//! overrides the `psql` subprocess needs. Secret indirection is resolved
//! here, through [`SecretSource`], and nowhere else.
//!
//! # Security
//! A `ResolvedConnection` lives in memory for one invocation and is then
//! dropped. It is never serialized, and every diagnostic path goes through
//! [`ResolvedConnection::redacted`] or [`ResolvedConnection::redact_text`].

use zeroize::Zeroizing;

use crate::config::DataSourceProfile;
use crate::error::{PgScoutError, Result, redact_database_url};
use crate::secret::SecretSource;

/// Application name reported to the server for every client session.
pub const APPLICATION_NAME: &str = "pgscout";

/// Placeholder substituted for secret values in scrubbed diagnostics.
pub const REDACTED: &str = "****";

/// Connection target: a full DSN or discrete libpq fields.
enum Target {
    Dsn(Zeroizing<String>),
    Fields {
        host: String,
        port: u16,
        dbname: String,
        user: String,
    },
}

/// Concrete, ephemeral connection parameters for one invocation.
pub struct ResolvedConnection {
    target: Target,
    password: Option<Zeroizing<String>>,
    sslmode: Option<String>,
    connect_timeout: Option<u64>,
}

/// Builds connection parameters from a profile, resolving secrets.
///
/// Shape is determined first: a profile with `url` or `url_env` is
/// URL-based, otherwise field-based. Mixing `host`/`dbname` with a URL
/// field is rejected as ambiguous. A password source, when present, is
/// resolved for either shape and passed to the client via `PGPASSWORD`
/// (a DSN may omit its embedded password).
///
/// # Errors
/// - ambiguous shape, malformed literal `url` (no `://`), or missing
///   required field keys → configuration error
/// - referenced environment variable absent or empty → secret-resolution
///   error naming the variable
/// - `database_override` with a URL-based profile → configuration error
///   (the database name must live inside the DSN)
pub fn build_connection(
    profile: &DataSourceProfile,
    database_override: Option<&str>,
) -> Result<ResolvedConnection> {
    let url_based = profile.url.is_some() || profile.url_env.is_some();
    if url_based && (profile.host.is_some() || profile.dbname.is_some()) {
        return Err(PgScoutError::configuration(
            "Ambiguous profile shape: host/dbname cannot be combined with url/url_env",
        ));
    }

    let password = password_source(profile)
        .map(|source| source.resolve())
        .transpose()?;

    let target = if url_based {
        if let Some(name) = database_override {
            return Err(PgScoutError::configuration(format!(
                "Cannot override database '{}' for a URL-based profile; set the database inside the DSN",
                name
            )));
        }
        Target::Dsn(url_source(profile)?.resolve()?)
    } else {
        match (
            profile.host.clone(),
            profile.port,
            profile.dbname.clone(),
            profile.user.clone(),
        ) {
            (Some(host), Some(port), Some(dbname), Some(user)) => Target::Fields {
                host,
                port,
                dbname: database_override.map_or(dbname, str::to_string),
                user,
            },
            _ => {
                let mut missing = Vec::new();
                if profile.host.is_none() {
                    missing.push("host");
                }
                if profile.port.is_none() {
                    missing.push("port");
                }
                if profile.dbname.is_none() {
                    missing.push("dbname");
                }
                if profile.user.is_none() {
                    missing.push("user");
                }
                return Err(PgScoutError::configuration(format!(
                    "Profile is missing required keys: {} (or provide url/url_env)",
                    missing.join(", ")
                )));
            }
        }
    };

    Ok(ResolvedConnection {
        target,
        password,
        sslmode: profile.sslmode.clone(),
        connect_timeout: profile.connect_timeout,
    })
}

/// The profile's URL source: `url_env` takes precedence over a literal
/// `url`, and a literal must contain a scheme delimiter.
fn url_source(profile: &DataSourceProfile) -> Result<SecretSource> {
    if let Some(variable) = &profile.url_env {
        return Ok(SecretSource::EnvRef(variable.clone()));
    }
    match &profile.url {
        Some(url) if url.contains("://") => Ok(SecretSource::Literal(url.clone())),
        Some(_) => Err(PgScoutError::configuration(
            "Invalid 'url': it must be a full DSN containing '://'. \
             To reference an environment variable, use 'url_env'.",
        )),
        // Unreachable: callers check url/url_env presence first.
        None => Err(PgScoutError::configuration("Profile has no url or url_env")),
    }
}

/// The profile's password source: `password_env` takes precedence over a
/// literal `password`; neither means passwordless/socket auth.
fn password_source(profile: &DataSourceProfile) -> Option<SecretSource> {
    if let Some(variable) = &profile.password_env {
        return Some(SecretSource::EnvRef(variable.clone()));
    }
    profile
        .password
        .as_ref()
        .map(|password| SecretSource::Literal(password.clone()))
}

impl ResolvedConnection {
    /// Client argument vector selecting the connection target.
    pub fn client_args(&self) -> Vec<String> {
        match &self.target {
            Target::Dsn(dsn) => vec!["-d".to_string(), dsn.as_str().to_string()],
            Target::Fields {
                host,
                port,
                dbname,
                user,
            } => vec![
                "-h".to_string(),
                host.clone(),
                "-p".to_string(),
                port.to_string(),
                "-U".to_string(),
                user.clone(),
                "-d".to_string(),
                dbname.clone(),
            ],
        }
    }

    /// Environment overrides for the client subprocess.
    ///
    /// Sets `PGAPPNAME`, and `PGPASSWORD`/`PGSSLMODE`/`PGCONNECT_TIMEOUT`
    /// when configured.
    pub fn env_overrides(&self) -> Vec<(String, String)> {
        let mut env = vec![(String::from("PGAPPNAME"), APPLICATION_NAME.to_string())];
        if let Some(password) = &self.password {
            env.push((String::from("PGPASSWORD"), password.as_str().to_string()));
        }
        if let Some(sslmode) = &self.sslmode {
            env.push((String::from("PGSSLMODE"), sslmode.clone()));
        }
        if let Some(timeout) = self.connect_timeout {
            env.push((String::from("PGCONNECT_TIMEOUT"), timeout.to_string()));
        }
        env
    }

    /// Configured connection timeout in seconds, if any.
    pub fn connect_timeout(&self) -> Option<u64> {
        self.connect_timeout
    }

    /// Safe, loggable description of the connection target.
    ///
    /// Never contains a password or a raw DSN.
    pub fn redacted(&self) -> String {
        match &self.target {
            Target::Dsn(dsn) => redact_database_url(dsn),
            Target::Fields {
                host,
                port,
                dbname,
                user,
            } => format!("{}:{}/{} (user {})", host, port, dbname, user),
        }
    }

    /// Scrubs secret values out of arbitrary diagnostic text.
    ///
    /// Client stderr is surfaced verbatim to the caller except that the
    /// resolved password and DSN are replaced with a fixed placeholder.
    pub fn redact_text(&self, text: &str) -> String {
        let mut scrubbed = text.to_string();
        if let Some(password) = &self.password {
            scrubbed = scrubbed.replace(password.as_str(), REDACTED);
        }
        if let Target::Dsn(dsn) = &self.target {
            scrubbed = scrubbed.replace(dsn.as_str(), REDACTED);
            if let Some(password) = url::Url::parse(dsn).ok().and_then(|u| {
                u.password().map(str::to_string)
            }) {
                scrubbed = scrubbed.replace(&password, REDACTED);
            }
        }
        scrubbed
    }
}

impl std::fmt::Debug for ResolvedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResolvedConnection({})", self.redacted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_profile() -> DataSourceProfile {
        DataSourceProfile {
            host: Some("/tmp".to_string()),
            port: Some(5432),
            dbname: Some("d".to_string()),
            user: Some("u".to_string()),
            password: None,
            password_env: None,
            url: None,
            url_env: None,
            sslmode: None,
            connect_timeout: None,
        }
    }

    fn url_profile(url: &str) -> DataSourceProfile {
        DataSourceProfile {
            host: None,
            port: None,
            dbname: None,
            user: None,
            password: None,
            password_env: None,
            url: Some(url.to_string()),
            url_env: None,
            sslmode: None,
            connect_timeout: None,
        }
    }

    #[test]
    fn mixed_shape_is_ambiguous() {
        let mut profile = field_profile();
        profile.url = Some("postgres://h/db".to_string());
        let err = build_connection(&profile, None).expect_err("ambiguous");
        assert!(err.to_string().contains("Ambiguous profile shape"));
    }

    #[test]
    fn literal_url_without_scheme_is_rejected() {
        let profile = url_profile("PG_PROD_URL");
        let err = build_connection(&profile, None).expect_err("no scheme");
        assert!(err.to_string().contains("must be a full DSN"));
    }

    #[test]
    fn database_override_rejected_for_url_profile() {
        let profile = url_profile("postgres://u@h:5432/db");
        let err = build_connection(&profile, Some("other")).expect_err("override");
        assert!(err.to_string().contains("URL-based profile"));
    }

    #[test]
    fn database_override_replaces_dbname_for_field_profile() {
        let conn = build_connection(&field_profile(), Some("other")).expect("resolves");
        let args = conn.client_args();
        assert!(args.windows(2).any(|w| w[0] == "-d" && w[1] == "other"));
    }

    #[test]
    fn missing_field_keys_are_listed() {
        let mut profile = field_profile();
        profile.port = None;
        profile.user = None;
        let err = build_connection(&profile, None).expect_err("incomplete");
        let text = err.to_string();
        assert!(text.contains("port"));
        assert!(text.contains("user"));
    }

    #[test]
    fn missing_password_env_names_the_variable() {
        temp_env::with_var_unset("P", || {
            let mut profile = field_profile();
            profile.password_env = Some("P".to_string());
            let err = build_connection(&profile, None).expect_err("P unset");
            assert!(matches!(
                err,
                PgScoutError::SecretResolution { ref variable } if variable == "P"
            ));
        });
    }

    #[test]
    fn resolved_password_reaches_env_but_not_diagnostics() {
        temp_env::with_var("P", Some("secret"), || {
            let mut profile = field_profile();
            profile.password_env = Some("P".to_string());
            let conn = build_connection(&profile, None).expect("resolves");

            let env = conn.env_overrides();
            assert!(env.contains(&("PGPASSWORD".to_string(), "secret".to_string())));

            assert!(!conn.redacted().contains("secret"));
            assert!(!format!("{:?}", conn).contains("secret"));
            let scrubbed = conn.redact_text("auth failed for password secret");
            assert!(!scrubbed.contains("secret"));
            assert!(scrubbed.contains(REDACTED));
        });
    }

    #[test]
    fn password_env_wins_over_literal() {
        temp_env::with_var("P", Some("from-env"), || {
            let mut profile = field_profile();
            profile.password_env = Some("P".to_string());
            profile.password = Some("from-literal".to_string());
            let conn = build_connection(&profile, None).expect("resolves");
            assert!(conn
                .env_overrides()
                .contains(&("PGPASSWORD".to_string(), "from-env".to_string())));
        });
    }

    #[test]
    fn url_env_wins_over_literal_url() {
        temp_env::with_var("PG_URL", Some("postgres://u@h/env"), || {
            let mut profile = url_profile("postgres://u@h/literal");
            profile.url_env = Some("PG_URL".to_string());
            let conn = build_connection(&profile, None).expect("resolves");
            assert!(conn.client_args().contains(&"postgres://u@h/env".to_string()));
        });
    }

    #[test]
    fn dsn_password_is_scrubbed_from_text() {
        let profile = url_profile("postgres://u:dsnpw@h:5432/db");
        let conn = build_connection(&profile, None).expect("resolves");
        assert!(!conn.redacted().contains("dsnpw"));
        let scrubbed = conn.redact_text("could not connect as u with dsnpw");
        assert!(!scrubbed.contains("dsnpw"));
    }

    #[test]
    fn timeout_and_sslmode_flow_into_env() {
        let mut profile = field_profile();
        profile.sslmode = Some("require".to_string());
        profile.connect_timeout = Some(7);
        let conn = build_connection(&profile, None).expect("resolves");
        let env = conn.env_overrides();
        assert!(env.contains(&("PGSSLMODE".to_string(), "require".to_string())));
        assert!(env.contains(&("PGCONNECT_TIMEOUT".to_string(), "7".to_string())));
        assert_eq!(conn.connect_timeout(), Some(7));
    }
}

//! External SQL client interface.
//!
//! Connection execution is delegated to the external `psql` client; this
//! module models that collaborator as a narrow trait so everything above it
//! (guard, introspector, report) is testable against a scripted fake.
//!
//! # Security
//! `PsqlClient` scrubs resolved secrets out of client stderr at this
//! boundary, before any diagnostic text can reach errors or logs. The
//! client never prompts for a password (`-w`): a missing secret fails fast
//! instead of hanging a non-interactive run.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::connection::ResolvedConnection;
use crate::error::PgScoutError;

/// How the client should format result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Human-readable aligned table (client default)
    #[default]
    Aligned,
    /// Unaligned tuples-only rows, tab-separated, no footer
    Tuples,
}

/// Per-execution options for the client.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Result formatting mode
    pub mode: OutputMode,
    /// `name=value` variables interpolated by the client (`-v`)
    pub variables: Vec<(String, String)>,
    /// Statement timeout passed through to the server, if any
    pub statement_timeout: Option<Duration>,
}

impl ExecOptions {
    /// Options for machine-readable tab-separated rows.
    pub fn tuples() -> Self {
        Self {
            mode: OutputMode::Tuples,
            ..Self::default()
        }
    }

    /// Adds a client variable binding.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.push((name.into(), value.into()));
        self
    }

    /// Sets a statement timeout.
    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }
}

/// Failure reported by the external client.
///
/// Diagnostic text carried here has already been scrubbed of secrets.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client binary could not be launched at all
    #[error("Failed to run {binary}: {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The client ran and reported a failure
    #[error("{stderr}")]
    Failed {
        status: Option<i32>,
        stderr: String,
    },
}

impl ClientError {
    /// The scrubbed client diagnostic, if the client ran at all.
    pub fn diagnostic(&self) -> &str {
        match self {
            ClientError::Launch { .. } => "",
            ClientError::Failed { stderr, .. } => stderr,
        }
    }

    /// Translates this failure into the connection-error taxonomy.
    pub fn into_connection_error(self) -> PgScoutError {
        PgScoutError::connection_failed(self.to_string())
    }
}

/// Narrow interface to the external SQL client.
///
/// One call executes one statement or batch against a resolved connection
/// and returns the client's stdout. Substitutable by a scripted fake in
/// tests; no real database required to exercise the core logic.
pub trait SqlClient: Send + Sync {
    /// Executes `sql` and returns the client's stdout on success.
    ///
    /// # Errors
    /// Returns [`ClientError`] if the client cannot be launched or exits
    /// unsuccessfully. Implementations must scrub secrets from diagnostics.
    fn execute(
        &self,
        conn: &ResolvedConnection,
        sql: &str,
        opts: &ExecOptions,
    ) -> Result<String, ClientError>;
}

/// `psql`-backed client implementation.
#[derive(Debug, Clone)]
pub struct PsqlClient {
    binary: PathBuf,
}

impl Default for PsqlClient {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("psql"),
        }
    }
}

impl PsqlClient {
    /// Creates a client invoking `psql` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client invoking a specific binary path.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl SqlClient for PsqlClient {
    fn execute(
        &self,
        conn: &ResolvedConnection,
        sql: &str,
        opts: &ExecOptions,
    ) -> Result<String, ClientError> {
        let mut command = Command::new(&self.binary);
        // -w: never prompt for a password (fail fast in non-interactive runs)
        command.args(["-X", "-w", "-v", "ON_ERROR_STOP=1", "-P", "pager=off"]);
        command.args(conn.client_args());
        if opts.mode == OutputMode::Tuples {
            command.args(["-qAt", "-F", "\t", "-P", "footer=off"]);
        }
        for (name, value) in &opts.variables {
            command.arg("-v").arg(format!("{}={}", name, value));
        }
        for (name, value) in conn.env_overrides() {
            command.env(name, value);
        }
        if let Some(timeout) = opts.statement_timeout {
            command.env(
                "PGOPTIONS",
                format!("-c statement_timeout={}", timeout.as_millis()),
            );
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Running client against {}", conn.redacted());

        let launch_failed = |source: std::io::Error| ClientError::Launch {
            binary: self.binary.display().to_string(),
            source,
        };

        let mut child = command.spawn().map_err(launch_failed)?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(sql.as_bytes()).map_err(launch_failed)?;
        }
        let output = child.wait_with_output().map_err(launch_failed)?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            Err(ClientError::Failed {
                status: output.status.code(),
                stderr: conn.redact_text(stderr.trim()),
            })
        }
    }
}

/// Parses tuples-mode output into rows of tab-separated fields.
pub fn parse_tsv(output: &str) -> Vec<Vec<String>> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}

/// Maps common client diagnostics to remediation hints for the operator.
///
/// Best-effort string matching over libpq error text; an unrecognized
/// diagnostic simply yields no hints.
pub fn failure_hints(diagnostic: &str) -> Vec<String> {
    let lower = diagnostic.to_lowercase();
    let mut hints = Vec::new();

    if lower.contains("no password supplied") || lower.contains("fe_sendauth") {
        hints.push(
            "No password was supplied: if the profile sets 'password_env', export that \
             variable first. The client runs with -w and never prompts."
                .to_string(),
        );
    }
    if lower.contains("password authentication failed") {
        hints.push(
            "Password authentication failed: check that the variable named by 'password_env' \
             is exported and that user/password are correct."
                .to_string(),
        );
    }
    if lower.contains("does not exist") && lower.contains("database") {
        hints.push(
            "The database does not exist: check the profile's 'dbname', or create it first."
                .to_string(),
        );
    }
    if lower.contains("does not exist") && lower.contains("role") {
        hints.push(
            "The role does not exist: check the profile's 'user', or create the role first."
                .to_string(),
        );
    }
    if lower.contains("no pg_hba.conf entry") {
        hints.push(
            "pg_hba.conf rejected the connection: the server must allow this source, user, \
             database, and SSL mode."
                .to_string(),
        );
    }
    if lower.contains("connection refused") {
        hints.push(
            "Connection refused: check that the server is running, the port is right, and it \
             listens on the target address."
                .to_string(),
        );
    }
    if lower.contains("timeout expired") {
        hints.push(
            "Connection timed out: check host/port reachability, or raise 'connect_timeout'."
                .to_string(),
        );
    }
    if lower.contains("is the server running locally") {
        hints.push(
            "Unix socket not found: if the profile's 'host' is a socket directory, confirm the \
             server actually puts its socket there (common alternatives: /tmp, \
             /var/run/postgresql)."
                .to_string(),
        );
    }

    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tsv_splits_rows_and_fields() {
        let rows = parse_tsv("a\tb\tc\n\nx\ty\tz\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["a", "b", "c"]);
        assert_eq!(rows[1], vec!["x", "y", "z"]);
    }

    #[test]
    fn parse_tsv_keeps_empty_fields() {
        let rows = parse_tsv("a\t\tc\n");
        assert_eq!(rows[0], vec!["a", "", "c"]);
    }

    #[test]
    fn hints_cover_common_auth_failures() {
        let hints = failure_hints("fe_sendauth: no password supplied");
        assert!(!hints.is_empty());
        assert!(hints[0].contains("password_env"));

        assert!(failure_hints("FATAL: password authentication failed for user \"u\"")
            .iter()
            .any(|h| h.contains("authentication failed")));
    }

    #[test]
    fn hints_cover_unreachable_servers() {
        assert!(!failure_hints("could not connect to server: Connection refused").is_empty());
        assert!(!failure_hints("connection to server failed: timeout expired").is_empty());
        assert!(failure_hints("select 1 returned nothing of note").is_empty());
    }

    #[test]
    fn exec_options_builders_compose() {
        let opts = ExecOptions::tuples()
            .with_variable("schema", "public")
            .with_statement_timeout(Duration::from_secs(30));
        assert_eq!(opts.mode, OutputMode::Tuples);
        assert_eq!(opts.variables.len(), 1);
        assert_eq!(opts.statement_timeout, Some(Duration::from_secs(30)));
    }
}

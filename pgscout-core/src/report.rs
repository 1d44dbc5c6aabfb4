//! Combined diagnostic report over a fixed check battery.
//!
//! Each check runs independently through the external client: one failing
//! check (say, a size query rejected for privileges) produces a failed
//! section but never hides the remaining checks. This bounds the number of
//! invocations an operator needs to diagnose a half-broken connection.

use chrono::Utc;

use crate::client::{ExecOptions, SqlClient, parse_tsv};
use crate::connection::ResolvedConnection;
use crate::introspect::SchemaIntrospector;
use crate::models::{Report, ReportSection, SectionOutcome};

const VERSION_SQL: &str = "select version();";

const UPTIME_SQL: &str =
    "select date_trunc('second', now() - pg_postmaster_start_time())::text;";

const CONNECTIONS_SQL: &str = "select count(*) from pg_stat_activity;";

const DATABASE_SIZE_SQL: &str =
    "select pg_size_pretty(pg_database_size(current_database()));";

const DATABASE_LIST_SQL: &str =
    "select datname from pg_database where datistemplate = false order by datname;";

const ROLE_COUNT_SQL: &str = "select count(*) from pg_roles;";

/// Output language for the rendered report text.
///
/// Presentation-only: section names and the JSON form are stable across
/// languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    /// English
    #[default]
    En,
    /// Chinese
    Zh,
}

/// Options for a report run.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Schema to summarize, if any
    pub schema: Option<String>,
    /// Attach instance-wide database list and role count
    pub include_databases: bool,
}

/// Runs the diagnostic check battery against one resolved connection.
pub struct ReportAggregator<'a> {
    client: &'a dyn SqlClient,
    conn: &'a ResolvedConnection,
}

impl<'a> ReportAggregator<'a> {
    /// Creates an aggregator over a client and resolved connection.
    pub fn new(client: &'a dyn SqlClient, conn: &'a ResolvedConnection) -> Self {
        Self { client, conn }
    }

    /// Runs every check, tolerating partial failure.
    ///
    /// The report is `ok` only if every attempted section succeeded.
    pub fn run(&self, profile: &str, opts: &ReportOptions) -> Report {
        let mut sections = vec![
            self.scalar_check("version", VERSION_SQL),
            self.scalar_check("uptime", UPTIME_SQL),
            self.scalar_check("connections", CONNECTIONS_SQL),
            self.scalar_check("database_size", DATABASE_SIZE_SQL),
        ];

        if let Some(schema) = &opts.schema {
            sections.push(self.schema_summary(schema));
        }

        if opts.include_databases {
            sections.push(self.database_list());
            sections.push(self.scalar_check("roles", ROLE_COUNT_SQL));
        }

        let ok = sections.iter().all(ReportSection::is_ok);
        Report {
            profile: profile.to_string(),
            generated_at: Utc::now(),
            sections,
            ok,
        }
    }

    /// Runs a single-value check, mapping failure to a failed section.
    fn scalar_check(&self, name: &str, sql: &str) -> ReportSection {
        match self.client.execute(self.conn, sql, &ExecOptions::tuples()) {
            Ok(output) => {
                let value = parse_tsv(&output)
                    .into_iter()
                    .next()
                    .and_then(|row| row.into_iter().next())
                    .unwrap_or_default();
                ReportSection::ok(name, value)
            }
            Err(err) => ReportSection::failed(name, err.to_string()),
        }
    }

    fn schema_summary(&self, schema: &str) -> ReportSection {
        let introspector = SchemaIntrospector::new(self.client, self.conn);
        match introspector.introspect(schema, false) {
            Ok(snapshot) => ReportSection::ok(
                "schema_summary",
                format!(
                    "{} tables/views in schema '{}'",
                    snapshot.tables.len(),
                    snapshot.schema
                ),
            ),
            Err(err) => ReportSection::failed("schema_summary", err.to_string()),
        }
    }

    fn database_list(&self) -> ReportSection {
        match self
            .client
            .execute(self.conn, DATABASE_LIST_SQL, &ExecOptions::tuples())
        {
            Ok(output) => {
                let names: Vec<String> = parse_tsv(&output)
                    .into_iter()
                    .filter_map(|row| row.into_iter().next())
                    .collect();
                ReportSection::ok("databases", names.join(", "))
            }
            Err(err) => ReportSection::failed("databases", err.to_string()),
        }
    }
}

/// Renders a report as human-readable text in the requested language.
pub fn render(report: &Report, lang: Lang) -> String {
    let mut lines = Vec::new();
    match lang {
        Lang::En => lines.push(format!("Profile: {}", report.profile)),
        Lang::Zh => lines.push(format!("配置档：{}", report.profile)),
    }

    for section in &report.sections {
        let label = section_label(&section.name, lang);
        let line = match (&section.outcome, lang) {
            (SectionOutcome::Ok { value }, Lang::En) => format!("- {}: {}", label, value),
            (SectionOutcome::Ok { value }, Lang::Zh) => format!("- {}：{}", label, value),
            (SectionOutcome::Failed { reason }, Lang::En) => {
                format!("- {}: FAILED: {}", label, reason)
            }
            (SectionOutcome::Failed { reason }, Lang::Zh) => {
                format!("- {}：失败：{}", label, reason)
            }
        };
        lines.push(line);
    }

    match (report.ok, lang) {
        (true, Lang::En) => lines.push("Overall: OK".to_string()),
        (false, Lang::En) => lines.push("Overall: FAILED".to_string()),
        (true, Lang::Zh) => lines.push("总体状态：通过".to_string()),
        (false, Lang::Zh) => lines.push("总体状态：存在失败项".to_string()),
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn section_label(name: &str, lang: Lang) -> String {
    let label = match (name, lang) {
        ("version", Lang::En) => "server version",
        ("version", Lang::Zh) => "服务器版本",
        ("uptime", Lang::En) => "uptime",
        ("uptime", Lang::Zh) => "运行时长",
        ("connections", Lang::En) => "active sessions",
        ("connections", Lang::Zh) => "活动会话数",
        ("database_size", Lang::En) => "database size",
        ("database_size", Lang::Zh) => "数据库大小",
        ("schema_summary", Lang::En) => "schema summary",
        ("schema_summary", Lang::Zh) => "Schema 概况",
        ("databases", Lang::En) => "databases (non-template)",
        ("databases", Lang::Zh) => "非模板数据库",
        ("roles", Lang::En) => "roles count",
        ("roles", Lang::Zh) => "角色数量",
        (other, _) => other,
    };
    label.to_string()
}

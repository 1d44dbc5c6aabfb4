//! Profile-driven PostgreSQL connectivity, query, and diagnostics tool.
//!
//! This binary resolves a named datasource profile from a YAML
//! configuration document, derives connection parameters for the external
//! `psql` client, and mediates ad-hoc SQL execution through a read-only
//! safety guard.
//!
//! # Security Guarantees
//! - Secrets are read from the environment, never from flags
//! - Resolved passwords and DSNs never appear in logs or errors
//! - Ad-hoc SQL is read-only unless --allow-write is passed

use clap::{Args, Parser, Subcommand, ValueEnum};
use pgscout_core::{
    ExecOptions, Lang, PgScoutError, PsqlClient, QueryRequest, ReportAggregator, ReportOptions,
    Result, SchemaIntrospector, SqlClient,
    client::{failure_hints, parse_tsv},
    guard, init_logging, load_config, report, resolve_config_path,
};
use std::path::PathBuf;
use tracing::{info, warn};

const CHECK_SQL: &str = "select current_database(), current_user, version();";

#[derive(Parser)]
#[command(name = "pgscout")]
#[command(about = "Profile-driven PostgreSQL connectivity, query, and diagnostics tool")]
#[command(version)]
#[command(long_about = "
pgscout - profile-driven PostgreSQL access via psql

Profiles live in a YAML document (default ./env.yaml, or $PGSCOUT_CONFIG):

  pgscout:
    default: dev
    datasources:
      dev:
        host: localhost
        port: 5432
        dbname: app
        user: app
        password_env: PG_DEV_PASSWORD
      prod:
        url_env: PG_PROD_URL

SECURITY FEATURES:
- Secrets are referenced by environment-variable name, never inlined
- Connection diagnostics are scrubbed of passwords and DSNs
- Ad-hoc SQL is read-only unless --allow-write is passed

EXAMPLES:
  pgscout check
  pgscout --profile prod query --sql 'select now()'
  pgscout introspect --schema public
  pgscout report --include-databases --lang en
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Configuration document path
    #[arg(
        long,
        env = "PGSCOUT_CONFIG",
        help = "Path to the config document (default resolution uses PGSCOUT_CONFIG, then ./env.yaml)"
    )]
    config: Option<PathBuf>,

    /// Datasource profile name
    #[arg(long, help = "Profile name (defaults to the document's 'default' key)")]
    profile: Option<String>,

    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check connectivity for the selected profile
    Check,
    /// Run ad-hoc SQL (read-only by default)
    Query(QueryArgs),
    /// Introspect a schema and print a JSON snapshot
    Introspect(IntrospectArgs),
    /// Run the diagnostic report battery
    Report(ReportArgs),
}

#[derive(Args)]
struct QueryArgs {
    /// SQL to run
    #[arg(long, help = "SQL text to run")]
    sql: Option<String>,

    /// Read SQL from a file
    #[arg(long, help = "Read SQL from a file")]
    sql_file: Option<PathBuf>,

    /// Read SQL from stdin
    #[arg(long, help = "Read SQL from stdin")]
    sql_stdin: bool,

    /// Allow mutating statements
    #[arg(long, help = "Allow potentially mutating/DDL SQL")]
    allow_write: bool,

    /// Statement timeout in seconds
    #[arg(long, help = "Server-side statement timeout in seconds")]
    statement_timeout: Option<u64>,

    /// Result format
    #[arg(long, value_enum, default_value_t = QueryFormat::Table)]
    format: QueryFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum QueryFormat {
    /// Aligned table output
    Table,
    /// Tab-separated rows
    Tsv,
}

#[derive(Args)]
struct IntrospectArgs {
    /// Schema to introspect
    #[arg(long, default_value = "public", help = "Schema name to introspect")]
    schema: String,

    /// Attach instance-wide extras
    #[arg(long, help = "Include the instance's database list and role count")]
    include_databases: bool,
}

#[derive(Args)]
struct ReportArgs {
    /// Schema to summarize
    #[arg(long, default_value = "public", help = "Schema name for the summary section")]
    schema: String,

    /// Target database override
    #[arg(long, help = "Override the target database (field-based profiles only)")]
    database: Option<String>,

    /// Attach instance-wide sections
    #[arg(long, help = "Include the instance's database list and role count")]
    include_databases: bool,

    /// Output language
    #[arg(long, value_enum, default_value_t = LangArg::En)]
    lang: LangArg,

    /// Output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LangArg {
    /// English
    En,
    /// Chinese
    Zh,
}

impl From<LangArg> for Lang {
    fn from(lang: LangArg) -> Self {
        match lang {
            LangArg::En => Lang::En,
            LangArg::Zh => Lang::Zh,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("Error: {}", err);
        std::process::exit(err.exit_code());
    }
}

fn run(cli: &Cli) -> Result<()> {
    init_logging(cli.global.verbose, cli.global.quiet)?;

    let config_path = resolve_config_path(cli.global.config.as_deref());
    let config = load_config(&config_path)?;
    let (profile_name, profile) = config.select_profile(cli.global.profile.as_deref())?;
    info!("Using profile '{}' from {}", profile_name, config_path.display());

    if profile.password.is_some() {
        warn!(
            "Profile '{}' uses a plaintext 'password' in {}; keep the file out of version \
             control and restrict its permissions",
            profile_name,
            config_path.display()
        );
    }

    let database_override = match &cli.command {
        Command::Report(args) => args.database.as_deref(),
        _ => None,
    };
    let conn = pgscout_core::build_connection(profile, database_override)?;
    info!("Target: {}", conn.redacted());

    let client = PsqlClient::new();
    match &cli.command {
        Command::Check => check(&client, &conn, profile_name),
        Command::Query(args) => query(&client, &conn, args),
        Command::Introspect(args) => introspect(&client, &conn, args),
        Command::Report(args) => run_report(&client, &conn, profile_name, args),
    }
}

/// Probes connectivity and prints the server identity.
fn check(
    client: &dyn SqlClient,
    conn: &pgscout_core::ResolvedConnection,
    profile_name: &str,
) -> Result<()> {
    match client.execute(conn, CHECK_SQL, &ExecOptions::tuples()) {
        Ok(output) => {
            let rows = parse_tsv(&output);
            let row = rows.first().map(Vec::as_slice).unwrap_or_default();
            println!("OK");
            println!("- profile: {}", profile_name);
            println!("- database: {}", row.first().map_or("?", String::as_str));
            println!("- user: {}", row.get(1).map_or("?", String::as_str));
            println!("- version: {}", row.get(2).map_or("?", String::as_str));
            Ok(())
        }
        Err(err) => {
            let hints = failure_hints(err.diagnostic());
            if !hints.is_empty() {
                eprintln!("Suggested checks:");
                for hint in hints {
                    eprintln!("- {}", hint);
                }
            }
            Err(err.into_connection_error())
        }
    }
}

/// Runs guarded ad-hoc SQL and prints the client output.
fn query(
    client: &dyn SqlClient,
    conn: &pgscout_core::ResolvedConnection,
    args: &QueryArgs,
) -> Result<()> {
    let sql = read_sql(args)?;
    if sql.trim().is_empty() {
        return Err(PgScoutError::configuration("SQL is empty"));
    }

    let request = QueryRequest {
        sql,
        allow_write: args.allow_write,
    };
    guard::ensure_allowed(&request)?;

    let mut opts = match args.format {
        QueryFormat::Table => ExecOptions::default(),
        QueryFormat::Tsv => ExecOptions::tuples(),
    };
    if let Some(secs) = args.statement_timeout {
        opts = opts.with_statement_timeout(std::time::Duration::from_secs(secs));
    }
    let output = client
        .execute(conn, &request.sql, &opts)
        .map_err(pgscout_core::ClientError::into_connection_error)?;
    print!("{}", output);
    Ok(())
}

/// Selects the single SQL source for a query invocation.
fn read_sql(args: &QueryArgs) -> Result<String> {
    let sources =
        usize::from(args.sql.is_some()) + usize::from(args.sql_file.is_some()) + usize::from(args.sql_stdin);
    if sources != 1 {
        return Err(PgScoutError::configuration(
            "Provide exactly one of: --sql, --sql-file, --sql-stdin",
        ));
    }

    if let Some(sql) = &args.sql {
        return Ok(sql.clone());
    }
    if let Some(path) = &args.sql_file {
        return std::fs::read_to_string(path)
            .map_err(|e| PgScoutError::io(format!("Failed to read {}", path.display()), e));
    }
    std::io::read_to_string(std::io::stdin())
        .map_err(|e| PgScoutError::io("Failed to read SQL from stdin", e))
}

/// Prints a schema snapshot as pretty JSON.
fn introspect(
    client: &dyn SqlClient,
    conn: &pgscout_core::ResolvedConnection,
    args: &IntrospectArgs,
) -> Result<()> {
    let introspector = SchemaIntrospector::new(client, conn);
    let snapshot = introspector.introspect(&args.schema, args.include_databases)?;
    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| PgScoutError::Serialization {
        context: "Failed to serialize schema snapshot".to_string(),
        source: e,
    })?;
    println!("{}", json);
    Ok(())
}

/// Runs the report battery and prints it as text or JSON.
fn run_report(
    client: &dyn SqlClient,
    conn: &pgscout_core::ResolvedConnection,
    profile_name: &str,
    args: &ReportArgs,
) -> Result<()> {
    let aggregator = ReportAggregator::new(client, conn);
    let opts = ReportOptions {
        schema: Some(args.schema.clone()),
        include_databases: args.include_databases,
    };
    let output = aggregator.run(profile_name, &opts);

    match args.format {
        ReportFormat::Text => print!("{}", report::render(&output, args.lang.into())),
        ReportFormat::Json => {
            let json =
                serde_json::to_string_pretty(&output).map_err(|e| PgScoutError::Serialization {
                    context: "Failed to serialize report".to_string(),
                    source: e,
                })?;
            println!("{}", json);
        }
    }

    if !output.ok {
        warn!("Report completed with failed sections");
    }
    Ok(())
}

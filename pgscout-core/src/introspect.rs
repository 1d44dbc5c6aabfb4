//! Read-only schema introspection via catalog queries.
//!
//! The introspector issues a fixed, ordered sequence of catalog queries
//! through the external client and assembles a [`SchemaSnapshot`]: a
//! schema-existence probe, the table list, then one column query per table
//! in table-list order. It aborts on the first failure; there is no partial
//! snapshot.

use std::sync::OnceLock;

use regex::Regex;

use crate::client::{ClientError, ExecOptions, SqlClient, parse_tsv};
use crate::connection::ResolvedConnection;
use crate::error::{IntrospectionKind, PgScoutError, Result};
use crate::models::{ColumnInfo, SchemaSnapshot, TableInfo};

const SCHEMA_EXISTS_SQL: &str =
    "select 1 from information_schema.schemata where schema_name = :'schema';";

const TABLE_LIST_SQL: &str = "select table_name \
     from information_schema.tables \
     where table_schema = :'schema' and table_type in ('BASE TABLE', 'VIEW') \
     order by table_name;";

const COLUMN_LIST_SQL: &str = "select column_name, data_type, is_nullable \
     from information_schema.columns \
     where table_schema = :'schema' and table_name = :'tbl' \
     order by ordinal_position;";

const DATABASE_LIST_SQL: &str =
    "select datname from pg_database where datistemplate = false order by datname;";

const ROLE_COUNT_SQL: &str = "select count(*) from pg_roles;";

/// Validates that a name is a simple SQL identifier.
///
/// Catalog queries bind the schema name as a client variable, but only
/// plain identifiers are accepted in the first place so a snapshot is
/// always addressable without quoting.
///
/// # Errors
/// Returns a configuration error for anything but `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(name: &str) -> Result<()> {
    static IDENT_RE: OnceLock<Regex> = OnceLock::new();
    let pattern = match IDENT_RE.get() {
        Some(pattern) => pattern,
        None => {
            let compiled = Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").map_err(|e| {
                PgScoutError::configuration(format!("Invalid identifier pattern: {}", e))
            })?;
            IDENT_RE.get_or_init(|| compiled)
        }
    };
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(PgScoutError::configuration(format!(
            "'{}' is not a simple identifier (letters, digits, underscore)",
            name
        )))
    }
}

/// Assembles structured schema snapshots through the external client.
pub struct SchemaIntrospector<'a> {
    client: &'a dyn SqlClient,
    conn: &'a ResolvedConnection,
}

impl<'a> SchemaIntrospector<'a> {
    /// Creates an introspector over a client and resolved connection.
    pub fn new(client: &'a dyn SqlClient, conn: &'a ResolvedConnection) -> Self {
        Self { client, conn }
    }

    /// Introspects `schema`, optionally attaching instance-wide extras
    /// (database list and role count).
    ///
    /// # Errors
    /// - schema absent from the catalog → introspection error
    ///   (schema-not-found)
    /// - a catalog query rejected for privileges → introspection error
    ///   (permission-denied)
    /// - any other client failure → connection error
    pub fn introspect(&self, schema: &str, instance_wide: bool) -> Result<SchemaSnapshot> {
        validate_identifier(schema)?;

        let schema_scoped = || ExecOptions::tuples().with_variable("schema", schema);

        let exists = self.query(SCHEMA_EXISTS_SQL, &schema_scoped())?;
        if exists.is_empty() {
            return Err(PgScoutError::introspection(
                IntrospectionKind::SchemaNotFound,
                format!("schema '{}' does not exist in the target database", schema),
            ));
        }

        let mut tables = Vec::new();
        for row in self.query(TABLE_LIST_SQL, &schema_scoped())? {
            let Some(name) = row.into_iter().next() else {
                continue;
            };
            let columns = self
                .query(COLUMN_LIST_SQL, &schema_scoped().with_variable("tbl", name.as_str()))?
                .into_iter()
                .filter_map(|fields| {
                    let mut fields = fields.into_iter();
                    let name = fields.next()?;
                    let data_type = fields.next()?;
                    let nullable = fields.next()? == "YES";
                    Some(ColumnInfo {
                        name,
                        data_type,
                        nullable,
                    })
                })
                .collect();
            tables.push(TableInfo { name, columns });
        }

        let (databases, roles) = if instance_wide {
            let databases = self
                .query(DATABASE_LIST_SQL, &ExecOptions::tuples())?
                .into_iter()
                .filter_map(|row| row.into_iter().next())
                .collect();
            (Some(databases), Some(self.role_count()?))
        } else {
            (None, None)
        };

        Ok(SchemaSnapshot {
            schema: schema.to_string(),
            tables,
            databases,
            roles,
        })
    }

    fn role_count(&self) -> Result<u64> {
        let rows = self.query(ROLE_COUNT_SQL, &ExecOptions::tuples())?;
        rows.first()
            .and_then(|row| row.first())
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| {
                PgScoutError::connection_failed("Unexpected client output for role count")
            })
    }

    fn query(&self, sql: &str, opts: &ExecOptions) -> Result<Vec<Vec<String>>> {
        self.client
            .execute(self.conn, sql, opts)
            .map(|output| parse_tsv(&output))
            .map_err(classify_client_error)
    }
}

/// Maps a catalog-query failure to the introspection taxonomy.
///
/// A diagnostic naming a permission problem becomes a permission-denied
/// introspection error; anything else stays a connection error.
fn classify_client_error(err: ClientError) -> PgScoutError {
    if err.diagnostic().to_lowercase().contains("permission denied") {
        PgScoutError::introspection(
            IntrospectionKind::PermissionDenied,
            err.diagnostic().to_string(),
        )
    } else {
        err.into_connection_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_identifiers_pass() {
        for name in ["public", "app_v2", "_private", "S1"] {
            assert!(validate_identifier(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn quoted_or_hostile_identifiers_fail() {
        for name in ["", "1abc", "pg catalog", "a;b", "x'y", "a-b"] {
            assert!(validate_identifier(name).is_err(), "{}", name);
        }
    }

    #[test]
    fn permission_diagnostics_classify_as_introspection_errors() {
        let err = classify_client_error(ClientError::Failed {
            status: Some(1),
            stderr: "ERROR:  permission denied for table pg_authid".to_string(),
        });
        assert!(matches!(
            err,
            PgScoutError::Introspection {
                kind: IntrospectionKind::PermissionDenied,
                ..
            }
        ));

        let err = classify_client_error(ClientError::Failed {
            status: Some(2),
            stderr: "could not connect to server".to_string(),
        });
        assert!(matches!(err, PgScoutError::Connection { .. }));
    }
}

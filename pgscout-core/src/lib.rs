//! Core profile resolution, query guarding, and introspection for pgscout.
//!
//! This crate provides the logic behind the `pgscout` binary: loading a
//! multi-environment datasource configuration, resolving one named profile
//! into concrete connection parameters (with indirect secret lookup), and
//! mediating execution of ad-hoc SQL through a read-only safety guard.
//! Connection execution itself is delegated to the external `psql` client
//! behind the narrow [`client::SqlClient`] interface.
//!
//! # Security Guarantees
//! - Secrets enter only through the environment and live in zeroizing
//!   buffers for the duration of one invocation
//! - Resolved passwords and DSNs never appear in logs, errors, or output
//! - Ad-hoc SQL is read-only unless explicitly overridden
//!
//! # Architecture
//! - Tagged secret indirection resolved at a single point (`secret`)
//! - A trait seam in front of the external client, so every component
//!   above it is testable against a scripted fake (`client`)
//! - One error taxonomy with scrubbed diagnostics (`error`)

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod guard;
pub mod introspect;
pub mod logging;
pub mod models;
pub mod report;
pub mod secret;

// Re-export commonly used types
pub use client::{ClientError, ExecOptions, OutputMode, PsqlClient, SqlClient};
pub use config::{Config, DataSourceProfile, load_config, resolve_config_path};
pub use connection::{ResolvedConnection, build_connection};
pub use error::{IntrospectionKind, PgScoutError, Result};
pub use guard::{QueryRequest, SafetyVerdict};
pub use introspect::SchemaIntrospector;
pub use logging::init_logging;
pub use models::{Report, ReportSection, SchemaSnapshot};
pub use report::{Lang, ReportAggregator, ReportOptions};
pub use secret::SecretSource;

//! Data models for introspection snapshots and diagnostic reports.
//!
//! All models serialize to JSON and never carry credentials: snapshots and
//! reports describe the *server*, not the connection used to reach it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A column within an introspected table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Database type name as reported by the catalog
    pub data_type: String,
    /// Whether the column accepts NULL
    pub nullable: bool,
}

/// A table (or view) within an introspected schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name
    pub name: String,
    /// Columns in ordinal order
    pub columns: Vec<ColumnInfo>,
}

/// Structured snapshot of one schema, plus optional instance-wide extras.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Schema name the snapshot describes
    pub schema: String,
    /// Tables in name order, each with ordered columns
    pub tables: Vec<TableInfo>,
    /// Non-template databases on the instance (instance-wide runs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub databases: Option<Vec<String>>,
    /// Role count on the instance (instance-wide runs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<u64>,
}

/// Result of one independent diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SectionOutcome {
    /// The check succeeded with this value
    Ok {
        /// Human-readable check result
        value: String,
    },
    /// The check failed; later checks still ran
    Failed {
        /// Scrubbed failure diagnostic
        reason: String,
    },
}

/// A named diagnostic check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    /// Stable section name (e.g. `version`, `database_size`)
    pub name: String,
    /// Outcome of the check
    #[serde(flatten)]
    pub outcome: SectionOutcome,
}

impl ReportSection {
    /// Creates a succeeded section.
    pub fn ok(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: SectionOutcome::Ok {
                value: value.into(),
            },
        }
    }

    /// Creates a failed section.
    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: SectionOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    /// True if the check succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, SectionOutcome::Ok { .. })
    }
}

/// Combined diagnostic report over a fixed battery of checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Name of the profile the report ran against
    pub profile: String,
    /// When the report was generated
    pub generated_at: DateTime<Utc>,
    /// Ordered section results
    pub sections: Vec<ReportSection>,
    /// True only if every attempted section succeeded
    pub ok: bool,
}

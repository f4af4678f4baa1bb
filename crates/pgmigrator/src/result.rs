//! Types shared by the engine's public API: the per-version bookkeeping
//! status and the result stream produced by `up`/`down`/`redo`.

use std::fmt;

/// Durable status of a version row in the bookkeeping table.
///
/// Encoded as `smallint` on the wire: `1 = Processing`, `2 = Success`,
/// `3 = Error` (see the `dbmigrator_version.status` column comment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum VersionStatus {
    Processing = 1,
    Success = 2,
    Error = 3,
}

impl VersionStatus {
    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            1 => Some(Self::Processing),
            2 => Some(Self::Success),
            3 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Processing => "Processing",
            Self::Success => "Success",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Direction a migration was run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "Up",
            Self::Down => "Down",
        })
    }
}

/// Outcome of executing (or skipping) a single version in one direction.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub direction: Direction,
    pub version: i64,
    /// Source of the payload: a file path for disk migrations, or a
    /// registration identity for in-process (`go`-type) migrations.
    pub file: Option<String>,
    /// The SQL text actually submitted.
    pub sql: String,
    pub status: VersionStatus,
    /// Populated iff `status == Error`.
    pub err: Option<String>,
}

impl MigrationResult {
    pub fn success(direction: Direction, version: i64, file: Option<String>, sql: String) -> Self {
        Self {
            direction,
            version,
            file,
            sql,
            status: VersionStatus::Success,
            err: None,
        }
    }

    pub fn error(direction: Direction, version: i64, file: Option<String>, sql: String, err: String) -> Self {
        Self {
            direction,
            version,
            file,
            sql,
            status: VersionStatus::Error,
            err: Some(err),
        }
    }

    /// Renders `<version>|<status-name>`, the wire format of `up`/`down`/`redo` result lines.
    pub fn line(&self) -> String {
        format!("{}|{}", self.version, self.status)
    }
}

/// A row as read back from the bookkeeping table via `list_all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRow {
    pub version: i64,
    pub status: VersionStatus,
    /// Nulled for `Processing` rows on read, even if stored non-null,
    /// to match display semantics (a row only has a meaningful
    /// "last executed" timestamp once it reaches a terminal status).
    pub executed_at: Option<chrono::DateTime<chrono::Utc>>,
}

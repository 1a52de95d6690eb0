//! Data environments for reference resolution
//!
//! An [`Environment`] answers `name[rank].field` lookups. Two strategies are
//! provided: a declarative [`QueryTable`] of ranked rows, and [`QueryFn`],
//! which wraps a host closure. Evaluation goes through [`resolve_query`],
//! which turns every miss into the empty string.

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::errors::{CpeError, CpeResult};
use crate::evaluator::value::{Rendered, Value};

/// Why a lookup found nothing. Always recoverable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    #[error("unknown data source '{0}'")]
    UnknownSource(String),

    #[error("rank {rank} is out of range for '{name}' ({rows} rows)")]
    RankOutOfRange { name: String, rank: i64, rows: usize },

    #[error("'{name}[{rank}]' has no field '{field}'")]
    MissingField {
        name: String,
        rank: i64,
        field: String,
    },

    #[error("{0}")]
    Custom(String),
}

/// A read-only source of ranked rows
pub trait Environment {
    /// Look up one field of one row. `rank` is 1-based.
    fn lookup(&self, name: &str, rank: i64, field: &str) -> Result<Value, LookupError>;
}

/// Resolve a reference to a renderable value.
///
/// Non-positive ranks, lookup errors and values that are neither numbers nor
/// strings all resolve to the empty string. Nothing is cached.
pub fn resolve_query(env: &dyn Environment, name: &str, rank: i64, field: &str) -> Rendered {
    if rank < 1 {
        log::trace!("{}[{}].{}: rank is not positive", name, rank, field);
        return Rendered::empty();
    }

    match env.lookup(name, rank, field) {
        Ok(value) => value.as_rendered().unwrap_or_else(|| {
            log::trace!(
                "{}[{}].{}: {} value does not render",
                name,
                rank,
                field,
                value.type_name()
            );
            Rendered::empty()
        }),
        Err(err) => {
            log::trace!("{}[{}].{}: {}", name, rank, field, err);
            Rendered::empty()
        }
    }
}

/// Environment with no data sources: every reference renders empty
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyEnvironment;

impl Environment for EmptyEnvironment {
    fn lookup(&self, name: &str, _rank: i64, _field: &str) -> Result<Value, LookupError> {
        Err(LookupError::UnknownSource(name.to_string()))
    }
}

/// One row of a data source
pub type Row = IndexMap<String, Value>;

/// Declarative environment: data-source name to an ordered list of rows
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct QueryTable {
    sources: IndexMap<String, Vec<Row>>,
}

impl QueryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a data source
    pub fn insert(&mut self, name: impl Into<String>, rows: Vec<Row>) {
        self.sources.insert(name.into(), rows);
    }

    /// Builder-style [`QueryTable::insert`]
    pub fn with_source(mut self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.insert(name, rows);
        self
    }

    /// Rows of a data source
    pub fn rows(&self, name: &str) -> Option<&[Row]> {
        self.sources.get(name).map(Vec::as_slice)
    }

    /// Data-source names, in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Build a table from JSON shaped `{ "<name>": [ { "<field>": value } ] }`
    pub fn from_json(json: serde_json::Value) -> CpeResult<Self> {
        serde_json::from_value(json).map_err(|e| CpeError::environment_error(e.to_string()))
    }
}

impl Environment for QueryTable {
    fn lookup(&self, name: &str, rank: i64, field: &str) -> Result<Value, LookupError> {
        let rows = self
            .rows(name)
            .ok_or_else(|| LookupError::UnknownSource(name.to_string()))?;

        let row = rank
            .checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| rows.get(index))
            .ok_or_else(|| LookupError::RankOutOfRange {
                name: name.to_string(),
                rank,
                rows: rows.len(),
            })?;

        row.get(field)
            .cloned()
            .ok_or_else(|| LookupError::MissingField {
                name: name.to_string(),
                rank,
                field: field.to_string(),
            })
    }
}

/// Environment backed by a host closure
pub struct QueryFn<F>(F);

impl<F> QueryFn<F>
where
    F: Fn(&str, i64, &str) -> Result<Value, LookupError>,
{
    pub fn new(resolver: F) -> Self {
        Self(resolver)
    }
}

impl<F> Environment for QueryFn<F>
where
    F: Fn(&str, i64, &str) -> Result<Value, LookupError>,
{
    fn lookup(&self, name: &str, rank: i64, field: &str) -> Result<Value, LookupError> {
        (self.0)(name, rank, field)
    }
}

/// Format of an environment file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvFormat {
    Json,
    Yaml,
}

impl EnvFormat {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(EnvFormat::Json),
            "yaml" | "yml" => Some(EnvFormat::Yaml),
            _ => None,
        }
    }

    /// Guess from a file extension, defaulting to JSON
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(EnvFormat::parse)
            .unwrap_or(EnvFormat::Json)
    }
}

/// On-disk environment: `{ "queries": { ... } }`
#[derive(Debug, Deserialize)]
struct EnvironmentFile {
    #[serde(default)]
    queries: QueryTable,
}

/// Load the `queries` table from environment file contents
pub fn load_environment(content: &str, format: EnvFormat) -> CpeResult<QueryTable> {
    let file: EnvironmentFile = match format {
        EnvFormat::Json => {
            serde_json::from_str(content).map_err(|e| CpeError::environment_error(e.to_string()))?
        }
        EnvFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| CpeError::environment_error(e.to_string()))?
        }
    };
    Ok(file.queries)
}

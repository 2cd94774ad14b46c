use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::catalog::{Catalog, Ontology};
use crate::options::{default_config_path, AdapterOptions};
use crate::schema::{self, quote_ident};
use crate::types::{GraphId, RdfError};
use crate::vtab::register;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Generic error message.
    #[error("{0}")]
    Message(String),
    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ReadConfig {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Configuration file is not valid TOML for [`AdapterOptions`].
    #[error("failed to parse config {path}: {source}")]
    ParseConfig {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// Adapter error.
    #[error(transparent)]
    Store(#[from] RdfError),
    /// SQLite error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Loads adapter options from `explicit`, or the per-user config file when present.
pub fn load_options(explicit: Option<&Path>) -> Result<AdapterOptions, CliError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(AdapterOptions::default()),
        },
    };
    let contents = fs::read_to_string(&path).map_err(|source| CliError::ReadConfig {
        path: path.clone(),
        source,
    })?;
    let options: AdapterOptions =
        toml::from_str(&contents).map_err(|source| CliError::ParseConfig { path, source })?;
    options.validate()?;
    Ok(options)
}

/// `NAME=PATH` pair naming a graph schema and the database file backing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphAttachment {
    /// Schema name, as stored in the graph registry.
    pub name: String,
    /// Database file; `:memory:` is accepted.
    pub path: PathBuf,
}

impl FromStr for GraphAttachment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (name, path) = value
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=PATH, got '{value}'"))?;
        if name.is_empty() || path.is_empty() {
            return Err(format!("expected NAME=PATH, got '{value}'"));
        }
        Ok(Self {
            name: name.to_string(),
            path: PathBuf::from(path),
        })
    }
}

fn attach(conn: &Connection, graph: &GraphAttachment) -> Result<(), CliError> {
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {}", quote_ident(&graph.name)),
        [graph.path.to_string_lossy().into_owned()],
    )?;
    Ok(())
}

/// Summary of an `init` run.
#[derive(Debug, Serialize)]
pub struct InitReport {
    /// Database path.
    pub database: String,
    /// Configured layout.
    pub generation: String,
    /// Classes found in the ontology tables.
    pub classes: usize,
    /// Properties found in the ontology tables.
    pub properties: usize,
    /// Named graphs attached or registered during the run.
    pub graphs: Vec<String>,
}

/// Creates the registry and ontology tables, then the physical tables of every graph.
///
/// Idempotent: run it again after populating the ontology tables to create the property and
/// class tables they describe. Graphs not yet in the registry are registered with the next
/// free id.
pub fn init_store(
    db: &Path,
    options: &AdapterOptions,
    graphs: &[GraphAttachment],
) -> Result<InitReport, CliError> {
    let conn = Connection::open(db)?;
    schema::create_registry(&conn, options)?;
    let ontology = Ontology::load(&conn, options.generation, options)?;
    schema::create_graph_tables(&conn, &ontology, None)?;

    let registered = ontology.graphs(&conn)?;
    let mut next_id = registered.iter().map(|g| g.id.0).max().unwrap_or(0) + 1;
    let mut names = Vec::with_capacity(graphs.len());
    for graph in graphs {
        let known = registered
            .iter()
            .any(|g| g.name.as_deref() == Some(graph.name.as_str()));
        if known {
            attach(&conn, graph)?;
            schema::create_graph_tables(&conn, &ontology, Some(&graph.name))?;
        } else {
            schema::attach_graph(
                &conn,
                &ontology,
                options,
                GraphId(next_id),
                &graph.name,
                &graph.path.to_string_lossy(),
            )?;
            next_id += 1;
        }
        names.push(graph.name.clone());
    }

    info!(
        db = %db.display(),
        properties = ontology.properties().len(),
        graphs = names.len(),
        "cli.init"
    );
    Ok(InitReport {
        database: db.display().to_string(),
        generation: options.generation.to_string(),
        classes: ontology.classes().len(),
        properties: ontology.properties().len(),
        graphs: names,
    })
}

/// An open database with the triples table registered.
pub struct Store {
    conn: Connection,
    ontology: Arc<Ontology>,
    options: AdapterOptions,
}

impl Store {
    /// Opens `db`, attaches `graphs`, loads the ontology, and registers the triples table.
    pub fn open(
        db: &Path,
        options: AdapterOptions,
        graphs: &[GraphAttachment],
    ) -> Result<Self, CliError> {
        if !db.exists() {
            return Err(CliError::Message(format!(
                "database {} does not exist; run `rdftab init` first",
                db.display()
            )));
        }
        let conn = Connection::open(db)?;
        for graph in graphs {
            attach(&conn, graph)?;
        }
        let ontology = Arc::new(Ontology::load(&conn, options.generation, &options)?);
        register(&conn, Arc::clone(&ontology) as Arc<dyn Catalog>, options.clone())?;
        Ok(Self {
            conn,
            ontology,
            options,
        })
    }
}

/// Result of an ad-hoc SQL statement.
#[derive(Debug, Serialize)]
pub struct QueryReport {
    /// Result column names.
    pub columns: Vec<String>,
    /// Result rows, one JSON value per column.
    pub rows: Vec<Vec<serde_json::Value>>,
}

fn json_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(v) => v.into(),
        ValueRef::Real(v) => serde_json::Number::from_f64(v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned().into(),
        ValueRef::Blob(bytes) => format!("<{} bytes>", bytes.len()).into(),
    }
}

/// Runs a single SQL statement and collects its rows.
pub fn run_query(store: &Store, sql: &str) -> Result<QueryReport, CliError> {
    let mut stmt = store.conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
    let width = columns.len();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(json_value(row.get_ref(idx)?));
        }
        out.push(values);
    }
    Ok(QueryReport { columns, rows: out })
}

/// Optional restrictions for [`scan_triples`].
#[derive(Clone, Debug, Default)]
pub struct TripleFilter {
    /// `graph = ?`; 0 selects the default graph.
    pub graph: Option<i64>,
    /// `subject = ?`
    pub subject: Option<i64>,
    /// `predicate = ?`
    pub predicate: Option<i64>,
    /// `predicate != ?`
    pub not_predicate: Option<i64>,
}

/// One triple as printed by the CLI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TripleRow {
    /// Graph id; `None` for the default graph.
    pub graph: Option<i64>,
    /// Subject id.
    pub subject: i64,
    /// Predicate id.
    pub predicate: i64,
    /// Canonical object text.
    pub object: Option<String>,
    /// Object type tag.
    pub object_type: i64,
}

/// Scans the triples table with the given restrictions.
pub fn scan_triples(store: &Store, filter: &TripleFilter) -> Result<Vec<TripleRow>, CliError> {
    let mut clauses = Vec::new();
    let mut args = Vec::new();
    let bound = [
        ("graph = ?", filter.graph),
        ("subject = ?", filter.subject),
        ("predicate = ?", filter.predicate),
        ("predicate != ?", filter.not_predicate),
    ];
    for (clause, value) in bound {
        if let Some(value) = value {
            clauses.push(clause);
            args.push(value);
        }
    }
    let mut sql = format!(
        "SELECT graph, subject, predicate, object, object_type FROM temp.{}",
        quote_ident(&store.options.table_name)
    );
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    let mut stmt = store.conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), |row| {
        Ok(TripleRow {
            graph: row.get(0)?,
            subject: row.get(1)?,
            predicate: row.get(2)?,
            object: row.get(3)?,
            object_type: row.get(4)?,
        })
    })?;
    let triples = rows.collect::<Result<Vec<_>, _>>()?;
    info!(
        rows = triples.len(),
        properties = store.ontology.properties().len(),
        "cli.triples"
    );
    Ok(triples)
}

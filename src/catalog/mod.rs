#![forbid(unsafe_code)]

//! Ontology and graph-registry access consumed by the triples adapter.
//!
//! The adapter never writes to the catalog. Property and class descriptors are treated as a
//! stable snapshot for the duration of a scan; the graph registry is re-read from the host
//! database every time a scan starts.

mod ontology;

use std::fmt;
use std::sync::Arc;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::schema::quote_ident;
use crate::types::{ClassId, GraphId, PropertyId, RdfError, Result};

pub use ontology::{Ontology, OntologyBuilder};

/// Declared value type of a property.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DataType {
    /// Type not known to the ontology.
    Unknown,
    /// Plain string literal.
    String,
    /// `xsd:boolean`, stored as 0/1.
    Boolean,
    /// `xsd:integer`.
    Integer,
    /// `xsd:double`.
    Double,
    /// `xsd:date`, stored as epoch seconds.
    Date,
    /// `xsd:dateTime`, stored as epoch seconds or canonical text.
    DateTime,
    /// Reference to another resource, stored as its numeric id.
    Resource,
    /// Language-tagged string.
    LangString,
}

impl DataType {
    /// Every data type, in tag order.
    pub const ALL: [DataType; 9] = [
        DataType::Unknown,
        DataType::String,
        DataType::Boolean,
        DataType::Integer,
        DataType::Double,
        DataType::Date,
        DataType::DateTime,
        DataType::Resource,
        DataType::LangString,
    ];

    /// Numeric tag surfaced through the `object_type` column.
    pub const fn code(self) -> i64 {
        match self {
            DataType::Unknown => 0,
            DataType::String => 1,
            DataType::Boolean => 2,
            DataType::Integer => 3,
            DataType::Double => 4,
            DataType::Date => 5,
            DataType::DateTime => 6,
            DataType::Resource => 7,
            DataType::LangString => 8,
        }
    }

    /// Inverse of [`DataType::code`]; unrecognised tags map to `Unknown`.
    pub fn from_code(code: i64) -> Self {
        Self::ALL
            .into_iter()
            .find(|ty| ty.code() == code)
            .unwrap_or(DataType::Unknown)
    }

    /// SQLite column affinity used when creating physical tables.
    pub fn affinity(self) -> &'static str {
        match self {
            DataType::String | DataType::LangString => "TEXT",
            DataType::Double => "REAL",
            DataType::Unknown => "",
            _ => "INTEGER",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Physical layout the catalog describes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaGeneration {
    /// Single-valued properties are columns of their owning class's table.
    ClassGrouped,
    /// Every property has its own `(ID, value)` table.
    PerProperty,
}

/// Property descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    /// Ontology identifier; surfaced as the `predicate` column.
    pub id: PropertyId,
    /// Full property URI.
    pub uri: String,
    /// Name of the physical table (per-property layout) or column (class layout).
    pub storage_name: String,
    /// Declared value type.
    pub data_type: DataType,
    /// Whether the property may hold more than one value per subject.
    pub multi_valued: bool,
    /// Class whose table holds the property when it is single-valued.
    pub owning_class: Option<ClassId>,
}

impl Property {
    /// Whether the property is stored as a column of its class table in the given layout.
    pub fn is_class_column(&self, generation: SchemaGeneration) -> bool {
        generation == SchemaGeneration::ClassGrouped
            && !self.multi_valued
            && self.owning_class.is_some()
    }
}

/// Class descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Class {
    /// Ontology identifier.
    pub id: ClassId,
    /// Full class URI.
    pub uri: String,
    /// Name of the class table.
    pub storage_name: String,
}

/// Graph registry entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Graph {
    /// Graph identifier; `GraphId::DEFAULT` for the default graph.
    pub id: GraphId,
    /// Schema the graph's tables live in; `None` for the default graph.
    pub name: Option<String>,
}

impl SchemaGeneration {
    /// Layout name as written in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaGeneration::ClassGrouped => "class-grouped",
            SchemaGeneration::PerProperty => "per-property",
        }
    }
}

impl fmt::Display for SchemaGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Graph {
    /// The implicit default graph.
    pub fn default_graph() -> Self {
        Self {
            id: GraphId::DEFAULT,
            name: None,
        }
    }
}

/// Read-only view of the ontology and graph registry.
pub trait Catalog: Send + Sync {
    /// Physical layout of the described store.
    fn generation(&self) -> SchemaGeneration;
    /// All properties, in stable catalog order.
    fn properties(&self) -> &[Arc<Property>];
    /// Looks up a property by identifier.
    fn property(&self, id: PropertyId) -> Option<Arc<Property>>;
    /// Resolves a physical column/table name back to its property.
    fn property_by_column(&self, name: &str) -> Option<Arc<Property>>;
    /// Looks up a class by identifier.
    fn class(&self, id: ClassId) -> Option<Arc<Class>>;
    /// Reads the registered named graphs, excluding the default graph.
    fn graphs(&self, conn: &Connection) -> Result<Vec<Graph>>;
    /// Table mapping resource ids to URIs.
    fn resource_table(&self) -> &str;
}

/// Host table listing named graphs as `(ID, Name)` rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphRegistry {
    table: String,
}

impl GraphRegistry {
    /// Registry backed by `main.<table>`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Reads the registry ordered by graph id.
    pub fn read(&self, conn: &Connection) -> Result<Vec<Graph>> {
        let sql = format!(
            "SELECT ID, Name FROM \"main\".{} ORDER BY ID",
            quote_ident(&self.table)
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        let mut graphs = Vec::new();
        for row in rows {
            let (id, name) = row?;
            if id == GraphId::DEFAULT.0 {
                return Err(RdfError::Corruption(format!(
                    "graph registry uses reserved id {id}"
                )));
            }
            let Some(name) = name else {
                return Err(RdfError::Corruption(format!("graph {id} has no schema name")));
            };
            graphs.push(Graph {
                id: GraphId(id),
                name: Some(name),
            });
        }
        trace!(count = graphs.len(), "catalog.graphs.read");
        Ok(graphs)
    }
}

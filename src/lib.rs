//! RDF triples over relational storage.
//!
//! Properties and classes of an ontology are stored as ordinary SQLite tables, one per property
//! or one per class depending on the [`catalog::SchemaGeneration`], and partitioned into named
//! graphs living in attached schemas. This crate exposes that layout to SQL as a single virtual
//! table of `(graph, subject, predicate, object, object_type)` rows:
//!
//! ```no_run
//! use std::sync::Arc;
//! use rdftab::{register, AdapterOptions, Ontology};
//!
//! # fn main() -> rdftab::Result<()> {
//! let conn = rusqlite::Connection::open("store.db")?;
//! let options = AdapterOptions::default();
//! let ontology = Ontology::load(&conn, options.generation, &options)?;
//! register(&conn, Arc::new(ontology), options)?;
//! let _stmt = conn.prepare("SELECT subject, object FROM triples WHERE predicate = ?1")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Ontology descriptors and the graph registry.
pub mod catalog;
/// Operations behind the command-line tool.
pub mod cli;
/// Adapter configuration.
pub mod options;
/// Planning and execution of triple scans.
pub mod query;
/// DDL for registry, ontology and graph tables.
pub mod schema;
/// Identifier types and errors.
pub mod types;
/// SQLite virtual-table module.
pub mod vtab;

pub use catalog::{Catalog, DataType, Graph, Ontology, SchemaGeneration};
pub use options::AdapterOptions;
pub use types::{GraphId, PropertyId, RdfError, Result};
pub use vtab::register;

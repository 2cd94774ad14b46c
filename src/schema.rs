#![forbid(unsafe_code)]

//! DDL for the host tables the adapter reads.
//!
//! These helpers create the registry tables, the ontology tables, and the physical per-graph
//! layout for either schema generation. The adapter itself only ever reads them.

use rusqlite::{params, Connection};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::catalog::{Catalog, Ontology, Property};
use crate::options::AdapterOptions;
use crate::types::{ClassId, GraphId, RdfError, Result};

/// Quotes an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for ch in name.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Schema-qualified table reference; unqualified when `schema` is `None`.
pub fn qualified(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
        None => quote_ident(table),
    }
}

/// Creates the resource, graph-registry and ontology tables in `main`.
pub fn create_registry(conn: &Connection, opts: &AdapterOptions) -> Result<()> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS \"main\".{resource} (ID INTEGER PRIMARY KEY, Uri TEXT UNIQUE);
         CREATE TABLE IF NOT EXISTS \"main\".{graph} (ID INTEGER PRIMARY KEY, Name TEXT NOT NULL UNIQUE);
         CREATE TABLE IF NOT EXISTS \"main\".{class} (ID INTEGER PRIMARY KEY, Uri TEXT NOT NULL, Name TEXT NOT NULL);
         CREATE TABLE IF NOT EXISTS \"main\".{property} (
             ID INTEGER PRIMARY KEY,
             Uri TEXT NOT NULL,
             Name TEXT NOT NULL UNIQUE,
             DataType INTEGER NOT NULL,
             MultiValued INTEGER NOT NULL DEFAULT 0,
             Class INTEGER
         );",
        resource = quote_ident(&opts.resource_table),
        graph = quote_ident(&opts.graph_table),
        class = quote_ident(&opts.class_table),
        property = quote_ident(&opts.property_table),
    );
    conn.execute_batch(&sql)?;
    debug!(graph_table = %opts.graph_table, "schema.registry.created");
    Ok(())
}

/// Persists the ontology's descriptors into the ontology tables.
pub fn store_ontology(conn: &Connection, ontology: &Ontology, opts: &AdapterOptions) -> Result<()> {
    let mut insert_class = conn.prepare(&format!(
        "INSERT OR REPLACE INTO \"main\".{} (ID, Uri, Name) VALUES (?1, ?2, ?3)",
        quote_ident(&opts.class_table)
    ))?;
    for class in ontology.classes() {
        insert_class.execute(params![class.id.0, class.uri, class.storage_name])?;
    }
    let mut insert_prop = conn.prepare(&format!(
        "INSERT OR REPLACE INTO \"main\".{} (ID, Uri, Name, DataType, MultiValued, Class)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        quote_ident(&opts.property_table)
    ))?;
    for prop in ontology.properties() {
        insert_prop.execute(params![
            prop.id.0,
            prop.uri,
            prop.storage_name,
            prop.data_type.code(),
            prop.multi_valued,
            prop.owning_class.map(|c| c.0),
        ])?;
    }
    Ok(())
}

/// Physical DDL statements for one graph's tables.
pub fn graph_table_ddl(catalog: &dyn Catalog, schema: Option<&str>) -> Result<Vec<String>> {
    let generation = catalog.generation();
    let mut statements = Vec::new();
    let mut seen_classes: FxHashSet<ClassId> = FxHashSet::default();
    let mut class_order = Vec::new();

    for prop in catalog.properties() {
        if prop.is_class_column(generation) {
            if let Some(class) = prop.owning_class {
                if seen_classes.insert(class) {
                    class_order.push(class);
                }
            }
            continue;
        }
        statements.push(property_table_ddl(prop, schema));
    }

    for class_id in class_order {
        let class = catalog
            .class(class_id)
            .ok_or_else(|| RdfError::Corruption(format!("unknown class {class_id}")))?;
        let columns: Vec<String> = catalog
            .properties()
            .iter()
            .filter(|p| p.is_class_column(generation) && p.owning_class == Some(class_id))
            .map(|p| column_def(p))
            .collect();
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (ID INTEGER PRIMARY KEY, {})",
            qualified(schema, &class.storage_name),
            columns.join(", ")
        ));
    }
    Ok(statements)
}

fn property_table_ddl(prop: &Property, schema: Option<&str>) -> String {
    let table = qualified(schema, &prop.storage_name);
    if prop.multi_valued {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (ID INTEGER NOT NULL, {}, UNIQUE (ID, {}))",
            column_def(prop),
            quote_ident(&prop.storage_name)
        )
    } else {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (ID INTEGER PRIMARY KEY, {})",
            column_def(prop)
        )
    }
}

fn column_def(prop: &Property) -> String {
    let affinity = prop.data_type.affinity();
    if affinity.is_empty() {
        quote_ident(&prop.storage_name)
    } else {
        format!("{} {affinity}", quote_ident(&prop.storage_name))
    }
}

/// Creates the physical tables of one graph.
pub fn create_graph_tables(
    conn: &Connection,
    catalog: &dyn Catalog,
    schema: Option<&str>,
) -> Result<()> {
    for statement in graph_table_ddl(catalog, schema)? {
        conn.execute(&statement, [])?;
    }
    debug!(
        schema = schema.unwrap_or("main"),
        generation = %catalog.generation(),
        "schema.graph_tables.created"
    );
    Ok(())
}

/// Attaches `path` as the schema of a new named graph, registers it, and creates its tables.
///
/// `path` may be `":memory:"`.
pub fn attach_graph(
    conn: &Connection,
    catalog: &dyn Catalog,
    opts: &AdapterOptions,
    id: GraphId,
    name: &str,
    path: &str,
) -> Result<()> {
    if id.is_default() {
        return Err(RdfError::Invalid("graph id 0 is reserved for the default graph"));
    }
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {}", quote_ident(name)),
        [path],
    )?;
    conn.execute(
        &format!(
            "INSERT INTO \"main\".{} (ID, Name) VALUES (?1, ?2)",
            quote_ident(&opts.graph_table)
        ),
        params![id.0, name],
    )?;
    create_graph_tables(conn, catalog, Some(name))
}

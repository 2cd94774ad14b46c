use std::sync::Arc;

use rusqlite::Connection;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{Catalog, Class, DataType, Graph, GraphRegistry, Property, SchemaGeneration};
use crate::options::AdapterOptions;
use crate::schema::quote_ident;
use crate::types::{ClassId, PropertyId, RdfError, Result};

/// In-memory ontology snapshot implementing [`Catalog`].
#[derive(Debug)]
pub struct Ontology {
    generation: SchemaGeneration,
    properties: Vec<Arc<Property>>,
    classes: Vec<Arc<Class>>,
    by_id: FxHashMap<PropertyId, usize>,
    by_column: FxHashMap<String, usize>,
    class_by_id: FxHashMap<ClassId, usize>,
    registry: GraphRegistry,
    resource_table: String,
}

impl Ontology {
    /// Starts an empty ontology for the given layout.
    pub fn builder(generation: SchemaGeneration) -> OntologyBuilder {
        OntologyBuilder {
            generation,
            properties: Vec::new(),
            classes: Vec::new(),
            graph_table: AdapterOptions::default().graph_table,
            resource_table: AdapterOptions::default().resource_table,
        }
    }

    /// Loads class and property descriptors from the ontology tables named in `opts`.
    ///
    /// Properties keep the order of their ids, which fixes the scan order of the adapter.
    pub fn load(
        conn: &Connection,
        generation: SchemaGeneration,
        opts: &AdapterOptions,
    ) -> Result<Self> {
        let mut builder = Self::builder(generation)
            .graph_table(opts.graph_table.clone())
            .resource_table(opts.resource_table.clone());

        let mut stmt = conn.prepare(&format!(
            "SELECT ID, Uri, Name FROM \"main\".{} ORDER BY ID",
            quote_ident(&opts.class_table)
        ))?;
        let classes = stmt.query_map([], |row| {
            Ok(Class {
                id: ClassId(row.get(0)?),
                uri: row.get(1)?,
                storage_name: row.get(2)?,
            })
        })?;
        for class in classes {
            builder = builder.class(class?);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT ID, Uri, Name, DataType, MultiValued, Class FROM \"main\".{} ORDER BY ID",
            quote_ident(&opts.property_table)
        ))?;
        let properties = stmt.query_map([], |row| {
            Ok(Property {
                id: PropertyId(row.get(0)?),
                uri: row.get(1)?,
                storage_name: row.get(2)?,
                data_type: DataType::from_code(row.get(3)?),
                multi_valued: row.get(4)?,
                owning_class: row.get::<_, Option<i64>>(5)?.map(ClassId),
            })
        })?;
        for property in properties {
            builder = builder.property(property?);
        }
        builder.build()
    }
}

impl Catalog for Ontology {
    fn generation(&self) -> SchemaGeneration {
        self.generation
    }

    fn properties(&self) -> &[Arc<Property>] {
        &self.properties
    }

    fn property(&self, id: PropertyId) -> Option<Arc<Property>> {
        self.by_id.get(&id).map(|&idx| Arc::clone(&self.properties[idx]))
    }

    fn property_by_column(&self, name: &str) -> Option<Arc<Property>> {
        self.by_column
            .get(name)
            .map(|&idx| Arc::clone(&self.properties[idx]))
    }

    fn class(&self, id: ClassId) -> Option<Arc<Class>> {
        self.class_by_id
            .get(&id)
            .map(|&idx| Arc::clone(&self.classes[idx]))
    }

    fn graphs(&self, conn: &Connection) -> Result<Vec<Graph>> {
        self.registry.read(conn)
    }

    fn resource_table(&self) -> &str {
        &self.resource_table
    }
}

impl Ontology {
    /// Classes in catalog order.
    pub fn classes(&self) -> &[Arc<Class>] {
        &self.classes
    }
}

/// Builder for [`Ontology`].
#[derive(Debug)]
pub struct OntologyBuilder {
    generation: SchemaGeneration,
    properties: Vec<Property>,
    classes: Vec<Class>,
    graph_table: String,
    resource_table: String,
}

impl OntologyBuilder {
    /// Registers a class.
    pub fn class(mut self, class: Class) -> Self {
        self.classes.push(class);
        self
    }

    /// Registers a property.
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Overrides the graph registry table.
    pub fn graph_table(mut self, table: impl Into<String>) -> Self {
        self.graph_table = table.into();
        self
    }

    /// Overrides the resource table.
    pub fn resource_table(mut self, table: impl Into<String>) -> Self {
        self.resource_table = table.into();
        self
    }

    /// Validates identifiers and builds the lookup indexes.
    pub fn build(self) -> Result<Ontology> {
        let mut class_by_id = FxHashMap::default();
        let mut classes = Vec::with_capacity(self.classes.len());
        for class in self.classes {
            if class_by_id.insert(class.id, classes.len()).is_some() {
                return Err(RdfError::Corruption(format!("duplicate class id {}", class.id)));
            }
            classes.push(Arc::new(class));
        }

        let mut by_id = FxHashMap::default();
        let mut by_column = FxHashMap::default();
        let mut properties = Vec::with_capacity(self.properties.len());
        for property in self.properties {
            if let Some(class) = property.owning_class {
                if !class_by_id.contains_key(&class) {
                    return Err(RdfError::Corruption(format!(
                        "property {} references unknown class {class}",
                        property.uri
                    )));
                }
            }
            let idx = properties.len();
            if by_id.insert(property.id, idx).is_some() {
                return Err(RdfError::Corruption(format!(
                    "duplicate property id {}",
                    property.id
                )));
            }
            if by_column.insert(property.storage_name.clone(), idx).is_some() {
                return Err(RdfError::Corruption(format!(
                    "duplicate storage name {}",
                    property.storage_name
                )));
            }
            properties.push(Arc::new(property));
        }
        debug!(
            classes = classes.len(),
            properties = properties.len(),
            generation = ?self.generation,
            "catalog.ontology.built"
        );
        Ok(Ontology {
            generation: self.generation,
            properties,
            classes,
            by_id,
            by_column,
            class_by_id,
            registry: GraphRegistry::new(self.graph_table),
            resource_table: self.resource_table,
        })
    }
}

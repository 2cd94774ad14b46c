//! Candidate enumeration: which graphs and which physical tables a scan visits.

use std::sync::Arc;

use rusqlite::Connection;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::catalog::{Catalog, Class, Graph, Property, SchemaGeneration};
use crate::types::{ClassId, GraphId, PropertyId, RdfError, Result};

/// Bound value on the `graph` or `predicate` column.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KeyFilter {
    /// Bound id; a NULL argument binds as 0, the default graph's id.
    pub value: i64,
    /// `!=` / `IS NOT NULL`.
    pub negated: bool,
}

impl KeyFilter {
    /// Whether `candidate` survives the filter.
    ///
    /// A candidate is dropped exactly when `(candidate == value) == negated`, which keeps only
    /// the match for `=` and everything but the match for `!=`.
    pub fn keeps(&self, candidate: i64) -> bool {
        (candidate == self.value) != self.negated
    }
}

/// Bound value on the `subject` column.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SubjectFilter {
    /// Bound id; `None` for a NULL argument.
    pub value: Option<i64>,
    /// `!=` / `IS NOT NULL`.
    pub negated: bool,
}

/// Lists the graphs a scan visits: the default graph first, then the registry in id order.
pub fn collect_graphs(
    conn: &Connection,
    catalog: &dyn Catalog,
    filter: Option<KeyFilter>,
) -> Result<Vec<Graph>> {
    let mut graphs = Vec::new();
    for graph in std::iter::once(Graph::default_graph()).chain(catalog.graphs(conn)?) {
        if filter.map_or(true, |f| f.keeps(graph.id.0)) {
            graphs.push(graph);
        }
    }
    trace!(graphs = ?graph_ids(&graphs), filter = ?filter, "triples.collect.graphs");
    Ok(graphs)
}

/// One physical table a scan reads.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanTarget {
    /// Class table; one value column per single-valued property of the class.
    Class {
        /// The class whose table is read.
        class: Arc<Class>,
        /// Value columns, in catalog order.
        columns: Vec<Arc<Property>>,
    },
    /// Per-property table holding `(ID, value)` rows.
    Property(Arc<Property>),
}

impl ScanTarget {
    /// Physical table name.
    pub fn table(&self) -> &str {
        match self {
            ScanTarget::Class { class, .. } => &class.storage_name,
            ScanTarget::Property(property) => &property.storage_name,
        }
    }
}

/// Strategy turning catalog properties into scan targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Selector {
    /// Legacy layout: single-valued properties are read through their class table.
    ClassGrouped,
    /// Current layout: every property is read from its own table.
    PerProperty,
}

impl Selector {
    /// Strategy matching the catalog's layout.
    pub fn for_generation(generation: SchemaGeneration) -> Self {
        match generation {
            SchemaGeneration::ClassGrouped => Selector::ClassGrouped,
            SchemaGeneration::PerProperty => Selector::PerProperty,
        }
    }

    fn generation(self) -> SchemaGeneration {
        match self {
            Selector::ClassGrouped => SchemaGeneration::ClassGrouped,
            Selector::PerProperty => SchemaGeneration::PerProperty,
        }
    }

    /// Lists targets for an optional predicate filter.
    ///
    /// Under `predicate != P` a class target still selects `P`'s column; the cursor skips it
    /// while walking the row. A class whose only column is `P` is dropped outright.
    pub fn select(self, catalog: &dyn Catalog, filter: Option<KeyFilter>) -> Result<Vec<ScanTarget>> {
        let targets = match filter {
            Some(f) if !f.negated => self.select_single(catalog, PropertyId(f.value))?,
            _ => self.select_all(catalog, filter.map(|f| PropertyId(f.value)))?,
        };
        trace!(
            count = targets.len(),
            selector = ?self,
            filter = ?filter,
            "triples.collect.targets"
        );
        Ok(targets)
    }

    fn select_single(self, catalog: &dyn Catalog, id: PropertyId) -> Result<Vec<ScanTarget>> {
        let Some(property) = catalog.property(id) else {
            return Ok(Vec::new());
        };
        if property.is_class_column(self.generation()) {
            let class = owning_class(catalog, &property)?;
            return Ok(vec![ScanTarget::Class {
                class,
                columns: vec![property],
            }]);
        }
        Ok(vec![ScanTarget::Property(property)])
    }

    fn select_all(
        self,
        catalog: &dyn Catalog,
        excluded: Option<PropertyId>,
    ) -> Result<Vec<ScanTarget>> {
        let generation = self.generation();
        let mut targets = Vec::new();
        let mut class_slots: FxHashMap<ClassId, usize> = FxHashMap::default();

        for property in catalog.properties() {
            if !property.is_class_column(generation) {
                if excluded != Some(property.id) {
                    targets.push(ScanTarget::Property(Arc::clone(property)));
                }
                continue;
            }
            let class = owning_class(catalog, property)?;
            let slot = *class_slots.entry(class.id).or_insert_with(|| {
                targets.push(ScanTarget::Class {
                    class: Arc::clone(&class),
                    columns: Vec::new(),
                });
                targets.len() - 1
            });
            if let ScanTarget::Class { columns, .. } = &mut targets[slot] {
                columns.push(Arc::clone(property));
            }
        }

        if let Some(excluded) = excluded {
            targets.retain(|target| match target {
                ScanTarget::Class { columns, .. } => {
                    columns.iter().any(|column| column.id != excluded)
                }
                ScanTarget::Property(_) => true,
            });
        }
        Ok(targets)
    }
}

fn owning_class(catalog: &dyn Catalog, property: &Property) -> Result<Arc<Class>> {
    property
        .owning_class
        .and_then(|id| catalog.class(id))
        .ok_or_else(|| {
            RdfError::Corruption(format!(
                "property {} has no resolvable owning class",
                property.uri
            ))
        })
}

/// Ids of the graphs in `graphs`, for diagnostics.
pub fn graph_ids(graphs: &[Graph]) -> Vec<GraphId> {
    graphs.iter().map(|g| g.id).collect()
}

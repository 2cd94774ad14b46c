//! SQL synthesis for physical scans.
//!
//! Every physical select has the same shape: the graph id literal, the subject `ID`, then one
//! or more value columns, each rendered to canonical text by [`value_expr`] and aliased with
//! the property's storage name so the cursor can map it back to the catalog.

use smallvec::SmallVec;

use crate::catalog::{DataType, Graph, Property};
use crate::query::collect::{ScanTarget, SubjectFilter};
use crate::schema::{qualified, quote_ident};

/// Alias of the physical table inside synthesized statements.
const TABLE_ALIAS: &str = "t";

/// Index of the first value column in a synthesized select.
pub const FIRST_VALUE_COLUMN: usize = 2;

/// Prefix of synthesized blank-node identifiers.
pub const BNODE_PREFIX: &str = "urn:bnode:";

/// SQL expression rendering `column` as the canonical object text for `data_type`.
///
/// `column` must already be a valid SQL column reference. Resource ids resolve to their URI
/// via `resource_table`, falling back to a blank-node identifier.
pub fn value_expr(data_type: DataType, column: &str, resource_table: &str) -> String {
    match data_type {
        DataType::String
        | DataType::LangString
        | DataType::Integer
        | DataType::Double
        | DataType::Unknown => format!("CAST({column} AS TEXT)"),
        DataType::Resource => format!(
            "COALESCE((SELECT r.\"Uri\" FROM \"main\".{} AS r WHERE r.\"ID\" = {column}), \
             '{BNODE_PREFIX}' || {column})",
            quote_ident(resource_table)
        ),
        DataType::Boolean => {
            format!("CASE {column} WHEN 1 THEN 'true' WHEN 0 THEN 'false' ELSE NULL END")
        }
        DataType::Date => format!(
            "CASE typeof({column}) WHEN 'integer' THEN strftime('%Y-%m-%d', {column}, 'unixepoch') \
             WHEN 'real' THEN strftime('%Y-%m-%d', {column}, 'unixepoch') \
             ELSE CAST({column} AS TEXT) END"
        ),
        DataType::DateTime => format!(
            "CASE typeof({column}) WHEN 'integer' THEN strftime('%Y-%m-%dT%H:%M:%SZ', {column}, 'unixepoch') \
             WHEN 'real' THEN strftime('%Y-%m-%dT%H:%M:%SZ', {column}, 'unixepoch') \
             ELSE CAST({column} AS TEXT) END"
        ),
    }
}

/// Subject restriction appended to a physical select.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SubjectClause {
    /// `ID = ?`
    Equal(i64),
    /// `ID != ?`
    NotEqual(i64),
    /// `ID IS NULL`
    IsNull,
    /// `ID IS NOT NULL`
    IsNotNull,
}

impl SubjectClause {
    /// Clause for a bound subject; a NULL value turns into the null test.
    pub fn from_filter(filter: SubjectFilter) -> Self {
        match (filter.value, filter.negated) {
            (Some(id), false) => SubjectClause::Equal(id),
            (Some(id), true) => SubjectClause::NotEqual(id),
            (None, false) => SubjectClause::IsNull,
            (None, true) => SubjectClause::IsNotNull,
        }
    }

    fn fragment(self) -> (&'static str, Option<i64>) {
        match self {
            SubjectClause::Equal(id) => ("ID = ?1", Some(id)),
            SubjectClause::NotEqual(id) => ("ID != ?1", Some(id)),
            SubjectClause::IsNull => ("ID IS NULL", None),
            SubjectClause::IsNotNull => ("ID IS NOT NULL", None),
        }
    }
}

/// Statement text plus positional integer bindings (`?1`, `?2`, …).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltSelect {
    /// SQL text.
    pub sql: String,
    /// Values for `?1..?n`, in order.
    pub bindings: SmallVec<[i64; 1]>,
}

/// Incremental builder for one physical select.
#[derive(Clone, Debug)]
pub struct SelectBuilder {
    graph_literal: String,
    from: String,
    values: Vec<String>,
    subject: Option<SubjectClause>,
}

impl SelectBuilder {
    /// Starts a select over `table` in `graph`'s schema.
    pub fn new(graph: &Graph, table: &str) -> Self {
        let graph_literal = if graph.id.is_default() {
            "NULL".to_owned()
        } else {
            graph.id.0.to_string()
        };
        Self {
            graph_literal,
            from: qualified(graph.name.as_deref(), table),
            values: Vec::new(),
            subject: None,
        }
    }

    /// Adds a value column for `property`, decoded according to its data type.
    pub fn value(mut self, property: &Property, resource_table: &str) -> Self {
        let column = format!("{TABLE_ALIAS}.{}", quote_ident(&property.storage_name));
        self.values.push(format!(
            "{} AS {}",
            value_expr(property.data_type, &column, resource_table),
            quote_ident(&property.storage_name)
        ));
        self
    }

    /// Restricts the subject.
    pub fn subject(mut self, clause: Option<SubjectClause>) -> Self {
        self.subject = clause;
        self
    }

    /// Renders the statement.
    pub fn build(self) -> BuiltSelect {
        let mut sql = format!(
            "SELECT {}, {TABLE_ALIAS}.ID",
            self.graph_literal
        );
        for value in &self.values {
            sql.push_str(", ");
            sql.push_str(value);
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.from);
        sql.push_str(" AS ");
        sql.push_str(TABLE_ALIAS);
        let mut bindings = SmallVec::new();
        if let Some(clause) = self.subject {
            let (fragment, binding) = clause.fragment();
            sql.push_str(" WHERE ");
            sql.push_str(TABLE_ALIAS);
            sql.push('.');
            sql.push_str(fragment);
            bindings.extend(binding);
        }
        BuiltSelect { sql, bindings }
    }
}

/// Builds the physical select for one `(graph, target)` combination.
pub fn target_select(
    graph: &Graph,
    target: &ScanTarget,
    subject: Option<SubjectFilter>,
    resource_table: &str,
) -> BuiltSelect {
    let builder = match target {
        ScanTarget::Class { class, columns } => columns.iter().fold(
            SelectBuilder::new(graph, &class.storage_name),
            |builder, property| builder.value(property, resource_table),
        ),
        ScanTarget::Property(property) => {
            SelectBuilder::new(graph, &property.storage_name).value(property, resource_table)
        }
    };
    builder.subject(subject.map(SubjectClause::from_filter)).build()
}

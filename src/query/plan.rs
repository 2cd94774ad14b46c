//! Access-path planning for the triples relation.
//!
//! The planner claims equality, inequality and null tests on the `graph`, `subject` and
//! `predicate` columns. Everything else on `object`, `object_type`, or the synthetic `id` is
//! left for the engine to evaluate after the value has been decoded to text.

use std::fmt;

use smallvec::SmallVec;
use tracing::trace;

use crate::catalog::SchemaGeneration;
use crate::types::{RdfError, Result};

/// Logical column of the triples relation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TripleColumn {
    /// Synthetic per-scan row id (current generation only).
    Id,
    /// Graph id; NULL for the default graph.
    Graph,
    /// Subject resource id.
    Subject,
    /// Predicate (property) id.
    Predicate,
    /// Object rendered as canonical text.
    Object,
    /// Numeric data-type tag of the object.
    ObjectType,
}

const CURRENT_COLUMNS: [TripleColumn; 6] = [
    TripleColumn::Id,
    TripleColumn::Graph,
    TripleColumn::Subject,
    TripleColumn::Predicate,
    TripleColumn::Object,
    TripleColumn::ObjectType,
];

const LEGACY_COLUMNS: [TripleColumn; 5] = [
    TripleColumn::Graph,
    TripleColumn::Subject,
    TripleColumn::Predicate,
    TripleColumn::Object,
    TripleColumn::ObjectType,
];

impl TripleColumn {
    /// Columns in declaration order for the given layout.
    pub fn schema(generation: SchemaGeneration) -> &'static [TripleColumn] {
        match generation {
            SchemaGeneration::PerProperty => &CURRENT_COLUMNS,
            SchemaGeneration::ClassGrouped => &LEGACY_COLUMNS,
        }
    }

    /// Maps an engine column index to a logical column; `None` for the rowid pseudo-column.
    pub fn from_index(generation: SchemaGeneration, index: i32) -> Option<TripleColumn> {
        let index = usize::try_from(index).ok()?;
        Self::schema(generation).get(index).copied()
    }

    /// Column name as declared to the engine.
    pub fn name(self) -> &'static str {
        match self {
            TripleColumn::Id => "id",
            TripleColumn::Graph => "graph",
            TripleColumn::Subject => "subject",
            TripleColumn::Predicate => "predicate",
            TripleColumn::Object => "object",
            TripleColumn::ObjectType => "object_type",
        }
    }

    fn declaration(self) -> &'static str {
        match self {
            TripleColumn::Id => "id INTEGER",
            TripleColumn::Graph => "graph INTEGER",
            TripleColumn::Subject => "subject INTEGER NOT NULL",
            TripleColumn::Predicate => "predicate INTEGER",
            TripleColumn::Object => "object TEXT",
            TripleColumn::ObjectType => "object_type INTEGER",
        }
    }

    /// `CREATE TABLE` statement declaring the logical schema.
    pub fn create_table_sql(generation: SchemaGeneration) -> String {
        let columns: Vec<&str> = Self::schema(generation)
            .iter()
            .map(|col| col.declaration())
            .collect();
        format!("CREATE TABLE x({})", columns.join(", "))
    }

    /// The planner-constrainable key this column corresponds to, if any.
    pub fn key(self) -> Option<KeyColumn> {
        match self {
            TripleColumn::Graph => Some(KeyColumn::Graph),
            TripleColumn::Subject => Some(KeyColumn::Subject),
            TripleColumn::Predicate => Some(KeyColumn::Predicate),
            _ => None,
        }
    }
}

impl fmt::Display for TripleColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Columns the planner can claim constraints on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KeyColumn {
    /// `graph`
    Graph = 0,
    /// `subject`
    Subject = 1,
    /// `predicate`
    Predicate = 2,
}

impl KeyColumn {
    /// All key columns in bit order.
    pub const ALL: [KeyColumn; 3] = [KeyColumn::Graph, KeyColumn::Subject, KeyColumn::Predicate];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Divisor contribution when this column is constrained.
    const fn weight(self) -> f64 {
        match self {
            KeyColumn::Subject => 8.0,
            KeyColumn::Predicate => 4.0,
            KeyColumn::Graph => 2.0,
        }
    }

    fn column(self) -> TripleColumn {
        match self {
            KeyColumn::Graph => TripleColumn::Graph,
            KeyColumn::Subject => TripleColumn::Subject,
            KeyColumn::Predicate => TripleColumn::Predicate,
        }
    }
}

/// Constraint operator as reported by the engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConstraintOp {
    /// `=`
    Equal,
    /// `!=` / `<>`
    NotEqual,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
    /// LIMIT/OFFSET pushdown; never claimed.
    Pseudo,
    /// Any other operator, by name.
    Unsupported(String),
}

impl ConstraintOp {
    fn negated(&self) -> bool {
        matches!(self, ConstraintOp::NotEqual | ConstraintOp::IsNotNull)
    }

    fn supported(&self) -> bool {
        matches!(
            self,
            ConstraintOp::Equal
                | ConstraintOp::NotEqual
                | ConstraintOp::IsNull
                | ConstraintOp::IsNotNull
        )
    }
}

impl fmt::Display for ConstraintOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintOp::Equal => f.write_str("="),
            ConstraintOp::NotEqual => f.write_str("!="),
            ConstraintOp::IsNull => f.write_str("IS NULL"),
            ConstraintOp::IsNotNull => f.write_str("IS NOT NULL"),
            ConstraintOp::Pseudo => f.write_str("LIMIT/OFFSET"),
            ConstraintOp::Unsupported(name) => f.write_str(name),
        }
    }
}

/// One constraint offered to the planner.
#[derive(Clone, Debug)]
pub struct ConstraintInput {
    /// Target column; `None` for the engine's rowid pseudo-column.
    pub column: Option<TripleColumn>,
    /// Comparison operator.
    pub op: ConstraintOp,
    /// Whether the engine can supply the right-hand value at filter time.
    pub usable: bool,
}

/// Highest argument slot representable in the plan encoding.
pub const MAX_ARG_SLOT: u8 = 14;

const SLOT_SHIFT: u32 = 8;
const SLOT_BITS: u32 = 4;
const SLOT_MASK: i32 = (1 << SLOT_BITS) - 1;
const NEGATED_SHIFT: u32 = 3;
const FLAG_MASK: i32 = 0b111;

/// Which key columns are constrained, whether each is negated, and where its value arrives.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Plan {
    constrained: u8,
    negated: u8,
    slots: [Option<u8>; 3],
}

impl Plan {
    /// Unconstrained full scan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constraint on `column` whose value arrives in argument `slot`.
    pub fn constrain(mut self, column: KeyColumn, negated: bool, slot: u8) -> Result<Self> {
        if slot > MAX_ARG_SLOT {
            return Err(RdfError::Planning(format!(
                "argument slot {slot} for {} exceeds plan encoding limit {MAX_ARG_SLOT}",
                column.column()
            )));
        }
        self.constrained |= column.bit();
        if negated {
            self.negated |= column.bit();
        } else {
            self.negated &= !column.bit();
        }
        self.slots[column as usize] = Some(slot);
        Ok(self)
    }

    /// Whether `column` carries a constraint.
    pub fn is_constrained(&self, column: KeyColumn) -> bool {
        self.constrained & column.bit() != 0
    }

    /// Whether the constraint on `column` is `!=` or `IS NOT NULL`.
    pub fn is_negated(&self, column: KeyColumn) -> bool {
        self.negated & column.bit() != 0
    }

    /// Runtime argument slot holding the value for `column`.
    pub fn slot(&self, column: KeyColumn) -> Option<u8> {
        self.slots[column as usize]
    }

    /// Number of constrained columns.
    pub fn constrained_count(&self) -> u32 {
        self.constrained.count_ones()
    }

    /// Packs the plan into the engine's integer plan id.
    pub fn encode(&self) -> i32 {
        let mut out = i32::from(self.constrained) | (i32::from(self.negated) << NEGATED_SHIFT);
        for column in KeyColumn::ALL {
            if let Some(slot) = self.slots[column as usize] {
                let shift = SLOT_SHIFT + SLOT_BITS * column as u32;
                out |= (i32::from(slot) + 1) << shift;
            }
        }
        out
    }

    /// Unpacks and validates an encoded plan.
    pub fn decode(encoded: i32) -> Result<Self> {
        let used_bits = SLOT_SHIFT + SLOT_BITS * KeyColumn::ALL.len() as u32;
        if encoded < 0 || encoded >> used_bits != 0 {
            return Err(RdfError::Corruption(format!("plan id {encoded:#x} out of range")));
        }
        let constrained = (encoded & FLAG_MASK) as u8;
        let negated = ((encoded >> NEGATED_SHIFT) & FLAG_MASK) as u8;
        if negated & !constrained != 0 {
            return Err(RdfError::Corruption(format!(
                "plan id {encoded:#x} negates an unconstrained column"
            )));
        }
        let mut plan = Plan::new();
        for column in KeyColumn::ALL {
            let shift = SLOT_SHIFT + SLOT_BITS * column as u32;
            let raw = (encoded >> shift) & SLOT_MASK;
            let has_bit = constrained & column.bit() != 0;
            match (raw, has_bit) {
                (0, false) => {}
                (0, true) | (_, false) => {
                    return Err(RdfError::Corruption(format!(
                        "plan id {encoded:#x} has inconsistent slot for {}",
                        column.column()
                    )))
                }
                (raw, true) => {
                    plan = plan.constrain(column, negated & column.bit() != 0, raw as u8 - 1)?;
                }
            }
        }
        Ok(plan)
    }

    /// Divisor applied to the base cost; larger when more selective columns are bound.
    pub fn cost_weight(&self) -> f64 {
        1.0 + KeyColumn::ALL
            .into_iter()
            .filter(|col| self.is_constrained(*col))
            .map(KeyColumn::weight)
            .sum::<f64>()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constrained == 0 {
            return f.write_str("full scan");
        }
        let mut first = true;
        for column in KeyColumn::ALL {
            let Some(slot) = self.slot(column) else {
                continue;
            };
            if !first {
                f.write_str(" AND ")?;
            }
            first = false;
            let op = if self.is_negated(column) { "!=" } else { "=" };
            write!(f, "{} {op} ?{}", column.column(), u32::from(slot) + 1)?;
        }
        Ok(())
    }
}

/// Planner result handed back to the engine.
#[derive(Clone, Debug)]
pub struct PlanOutput {
    /// The chosen plan.
    pub plan: Plan,
    /// Per input constraint, the argument slot it was assigned, if claimed.
    pub argv_slots: SmallVec<[Option<u8>; 8]>,
    /// Estimated cost of executing the plan.
    pub estimated_cost: f64,
}

/// Chooses an access path for the offered constraints.
///
/// Fails when a usable constraint on a key column uses an operator other than `=`, `!=`,
/// `IS NULL` or `IS NOT NULL`; no fallback plan is produced in that case.
pub fn build(constraints: &[ConstraintInput], base_cost: f64) -> Result<PlanOutput> {
    let mut plan = Plan::new();
    let mut argv_slots = SmallVec::with_capacity(constraints.len());
    let mut next_slot: u8 = 0;

    for constraint in constraints {
        let key = match (&constraint.op, constraint.column.and_then(TripleColumn::key)) {
            (ConstraintOp::Pseudo, _) | (_, None) => None,
            _ if !constraint.usable => None,
            (op, Some(key)) if !op.supported() => {
                return Err(RdfError::Planning(format!(
                    "unsupported constraint {} {op}",
                    key.column()
                )));
            }
            (_, Some(key)) if plan.is_constrained(key) => None,
            (_, Some(key)) => Some(key),
        };
        let Some(key) = key else {
            argv_slots.push(None);
            continue;
        };
        plan = plan.constrain(key, constraint.op.negated(), next_slot)?;
        argv_slots.push(Some(next_slot));
        next_slot += 1;
    }

    let estimated_cost = base_cost / plan.cost_weight();
    trace!(plan = %plan, estimated_cost, "triples.best_index");
    Ok(PlanOutput {
        plan,
        argv_slots,
        estimated_cost,
    })
}

//! Scan cursor: the lazy graph × target × row × column walk behind the triples relation.
//!
//! A cursor is driven entirely by the engine: `filter` starts a scan, then `next`/`column`/`eof`
//! are pulled until the scan is exhausted, then `close`. At most one physical statement is open
//! per cursor at any time; moving to the next `(graph, target)` combination drops the previous
//! statement first.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::{debug, trace};

use crate::catalog::{Catalog, Graph, Property};
use crate::query::collect::{collect_graphs, KeyFilter, ScanTarget, Selector, SubjectFilter};
use crate::query::plan::{KeyColumn, Plan, TripleColumn};
use crate::query::sql::{target_select, FIRST_VALUE_COLUMN};
use crate::query::stmt::PhysicalStatement;
use crate::types::{RdfError, Result};

/// Position of a cursor in its lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScanPhase {
    /// Opened, never filtered.
    Created,
    /// Inside `filter`, before the first row is located.
    Planning,
    /// Positioned on a row.
    Scanning,
    /// No more rows.
    Exhausted,
    /// Closed; no further calls are accepted.
    Closed,
}

/// Per-scan counters, reset by every `filter`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanStats {
    /// Physical statements prepared.
    pub statements: u64,
    /// Combinations whose statement produced no rows.
    pub empty_combinations: u64,
    /// Logical rows surfaced.
    pub rows: u64,
}

impl fmt::Display for ScanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} statements, {} empty, {} rows",
            self.statements, self.empty_combinations, self.rows
        )
    }
}

struct ActiveScan {
    stmt: PhysicalStatement,
    /// Current value column; always `>= FIRST_VALUE_COLUMN`.
    column: usize,
    /// Properties of value columns, resolved on first use.
    properties: Vec<Option<Arc<Property>>>,
}

impl ActiveScan {
    fn new(stmt: PhysicalStatement) -> Self {
        let width = stmt.column_count();
        Self {
            stmt,
            column: FIRST_VALUE_COLUMN,
            properties: vec![None; width],
        }
    }

    fn property(&mut self, catalog: &dyn Catalog, column: usize) -> Result<Arc<Property>> {
        if let Some(Some(property)) = self.properties.get(column) {
            return Ok(Arc::clone(property));
        }
        let name = self.stmt.column_name(column).ok_or_else(|| {
            RdfError::Corruption(format!("value column {column} is out of range"))
        })?;
        let property = catalog.property_by_column(name).ok_or_else(|| {
            RdfError::Corruption(format!("column {name:?} does not name a known property"))
        })?;
        if let Some(slot) = self.properties.get_mut(column) {
            *slot = Some(Arc::clone(&property));
        }
        Ok(property)
    }
}

struct ScanState {
    phase: ScanPhase,
    graph: Option<KeyFilter>,
    subject: Option<SubjectFilter>,
    predicate: Option<KeyFilter>,
    graphs: Vec<Graph>,
    targets: Vec<ScanTarget>,
    next_combination: usize,
    active: Option<ActiveScan>,
    rowid: i64,
    stats: ScanStats,
}

impl ScanState {
    fn new() -> Self {
        Self {
            phase: ScanPhase::Created,
            graph: None,
            subject: None,
            predicate: None,
            graphs: Vec::new(),
            targets: Vec::new(),
            next_combination: 0,
            active: None,
            rowid: 0,
            stats: ScanStats::default(),
        }
    }

    /// Finalizes the statement and drops every bound value and candidate list.
    fn release(&mut self) {
        self.active = None;
        self.graph = None;
        self.subject = None;
        self.predicate = None;
        self.graphs.clear();
        self.targets.clear();
        self.next_combination = 0;
    }

    fn close(&mut self) {
        if self.phase == ScanPhase::Closed {
            return;
        }
        self.release();
        self.phase = ScanPhase::Closed;
        debug!(stats = %self.stats, "triples.cursor.closed");
    }

    /// Walks forward to the next surfaced `(row, column)` or to exhaustion.
    fn advance(&mut self, conn: &Connection, catalog: &dyn Catalog) -> Result<()> {
        let excluded = self.predicate.filter(|f| f.negated).map(|f| f.value);
        loop {
            if let Some(active) = self.active.as_mut() {
                while active.column < active.stmt.column_count() {
                    let column = active.column;
                    if !active.stmt.is_null(column) {
                        let skip = match excluded {
                            Some(id) => active.property(catalog, column)?.id.0 == id,
                            None => false,
                        };
                        if !skip {
                            self.rowid += 1;
                            self.stats.rows += 1;
                            self.phase = ScanPhase::Scanning;
                            return Ok(());
                        }
                    }
                    active.column += 1;
                }
                if active.stmt.step()? {
                    active.column = FIRST_VALUE_COLUMN;
                    continue;
                }
                self.active = None;
            }
            if !self.open_next(conn, catalog)? {
                self.phase = ScanPhase::Exhausted;
                debug!(stats = %self.stats, rowid = self.rowid, "triples.scan.exhausted");
                return Ok(());
            }
        }
    }

    /// Opens the next combination that yields at least one row.
    fn open_next(&mut self, conn: &Connection, catalog: &dyn Catalog) -> Result<bool> {
        debug_assert!(self.active.is_none());
        let width = self.targets.len();
        let total = self.graphs.len() * width;
        while self.next_combination < total {
            let graph = &self.graphs[self.next_combination / width];
            let target = &self.targets[self.next_combination % width];
            self.next_combination += 1;

            let built = target_select(graph, target, self.subject, catalog.resource_table());
            trace!(graph = %graph.id, table = target.table(), sql = %built.sql, "triples.scan.prepare");
            let mut stmt = PhysicalStatement::prepare(conn, &built.sql, &built.bindings)?;
            self.stats.statements += 1;
            if stmt.step()? {
                self.active = Some(ActiveScan::new(stmt));
                return Ok(true);
            }
            self.stats.empty_combinations += 1;
        }
        Ok(false)
    }
}

/// Handle to a cursor's state, used by the owning table to force-close stragglers.
#[derive(Clone)]
pub struct CursorHandle {
    state: Rc<RefCell<ScanState>>,
}

impl CursorHandle {
    /// Closes the cursor if it is still open; returns whether anything was closed.
    pub fn force_close(&self) -> bool {
        match self.state.try_borrow_mut() {
            Ok(mut state) if state.phase != ScanPhase::Closed => {
                state.close();
                true
            }
            _ => false,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ScanPhase {
        self.state
            .try_borrow()
            .map(|state| state.phase)
            .unwrap_or(ScanPhase::Planning)
    }
}

impl fmt::Debug for CursorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorHandle")
            .field("phase", &self.phase())
            .finish()
    }
}

/// A single scan over the triples relation.
pub struct ScanCursor<'a> {
    conn: &'a Connection,
    catalog: &'a dyn Catalog,
    selector: Selector,
    state: Rc<RefCell<ScanState>>,
}

impl<'a> ScanCursor<'a> {
    /// Opens an unfiltered cursor.
    pub fn new(conn: &'a Connection, catalog: &'a dyn Catalog) -> Self {
        Self {
            conn,
            catalog,
            selector: Selector::for_generation(catalog.generation()),
            state: Rc::new(RefCell::new(ScanState::new())),
        }
    }

    /// Handle sharing this cursor's state.
    pub fn handle(&self) -> CursorHandle {
        CursorHandle {
            state: Rc::clone(&self.state),
        }
    }

    /// Starts (or restarts) a scan for `plan`, reading bound values from `args`.
    pub fn filter(&mut self, plan: &Plan, args: &[Value]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.phase == ScanPhase::Closed {
            return Err(RdfError::Invalid("filter on a closed cursor"));
        }
        state.release();
        state.rowid = 0;
        state.stats = ScanStats::default();
        state.phase = ScanPhase::Planning;
        debug!(plan = %plan, args = args.len(), "triples.filter.start");

        let started = self.start(&mut state, plan, args);
        if started.is_err() {
            state.release();
            state.phase = ScanPhase::Exhausted;
        }
        started
    }

    fn start(&self, state: &mut ScanState, plan: &Plan, args: &[Value]) -> Result<()> {
        state.graph = bound(plan, KeyColumn::Graph, args)?.map(|(value, negated)| KeyFilter {
            value: coerce_id(value).unwrap_or(0),
            negated,
        });
        state.predicate = bound(plan, KeyColumn::Predicate, args)?.map(|(value, negated)| {
            KeyFilter {
                value: coerce_id(value).unwrap_or(0),
                negated,
            }
        });
        state.subject = bound(plan, KeyColumn::Subject, args)?.map(|(value, negated)| {
            SubjectFilter {
                value: coerce_id(value),
                negated,
            }
        });

        state.graphs = collect_graphs(self.conn, self.catalog, state.graph)?;
        state.targets = self.selector.select(self.catalog, state.predicate)?;
        trace!(
            graphs = state.graphs.len(),
            targets = state.targets.len(),
            "triples.filter.candidates"
        );
        state.advance(self.conn, self.catalog)
    }

    /// Moves to the next triple.
    pub fn next(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.phase != ScanPhase::Scanning {
            return Ok(());
        }
        if let Some(active) = state.active.as_mut() {
            active.column += 1;
        }
        let advanced = state.advance(self.conn, self.catalog);
        if advanced.is_err() {
            state.release();
            state.phase = ScanPhase::Exhausted;
        }
        advanced
    }

    /// True unless positioned on a row.
    pub fn eof(&self) -> bool {
        self.phase() != ScanPhase::Scanning
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ScanPhase {
        self.state.borrow().phase
    }

    /// Synthetic row id of the current row.
    pub fn rowid(&self) -> i64 {
        self.state.borrow().rowid
    }

    /// Counters for the current scan.
    pub fn stats(&self) -> ScanStats {
        self.state.borrow().stats
    }

    /// Whether a physical statement is currently open.
    pub fn has_open_statement(&self) -> bool {
        self.state.borrow().active.is_some()
    }

    /// Value of `column` for the current row.
    pub fn column(&self, column: TripleColumn) -> Result<Value> {
        let mut state = self.state.borrow_mut();
        let rowid = state.rowid;
        let active = match (state.phase, state.active.as_mut()) {
            (ScanPhase::Scanning, Some(active)) => active,
            _ => return Err(RdfError::Invalid("cursor is not positioned on a row")),
        };
        let value = match column {
            TripleColumn::Id => Value::Integer(rowid),
            TripleColumn::Graph => active.stmt.int64(0).map_or(Value::Null, Value::Integer),
            TripleColumn::Subject => active.stmt.int64(1).map_or(Value::Null, Value::Integer),
            TripleColumn::Predicate => {
                let property = active.property(self.catalog, active.column)?;
                Value::Integer(property.id.0)
            }
            TripleColumn::Object => active
                .stmt
                .text(active.column)
                .map_or(Value::Null, Value::Text),
            TripleColumn::ObjectType => {
                let property = active.property(self.catalog, active.column)?;
                Value::Integer(property.data_type.code())
            }
        };
        Ok(value)
    }

    /// Finalizes the open statement and releases bound values. Idempotent.
    pub fn close(&mut self) {
        self.state.borrow_mut().close();
    }
}

impl Drop for ScanCursor<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.close();
        }
    }
}

fn bound<'v>(
    plan: &Plan,
    column: KeyColumn,
    args: &'v [Value],
) -> Result<Option<(&'v Value, bool)>> {
    if !plan.is_constrained(column) {
        return Ok(None);
    }
    let slot = plan.slot(column).ok_or_else(|| {
        RdfError::Corruption(format!("plan constrains {column:?} without an argument slot"))
    })?;
    let value = args.get(usize::from(slot)).ok_or_else(|| {
        RdfError::Corruption(format!("missing argument {} for {column:?}", slot + 1))
    })?;
    Ok(Some((value, plan.is_negated(column))))
}

/// Integer view of a bound value, following the engine's integer coercion; `None` for NULL.
fn coerce_id(value: &Value) -> Option<i64> {
    match value {
        Value::Null => None,
        Value::Integer(v) => Some(*v),
        Value::Real(v) => Some(*v as i64),
        Value::Text(text) => Some(leading_integer(text)),
        Value::Blob(bytes) => Some(leading_integer(&String::from_utf8_lossy(bytes))),
    }
}

/// Leading decimal integer of `text`, saturating at the i64 bounds; 0 when there are no digits.
fn leading_integer(text: &str) -> i64 {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, byte| {
            let digit = i64::from(byte - b'0');
            if negative {
                acc.saturating_mul(10).saturating_sub(digit)
            } else {
                acc.saturating_mul(10).saturating_add(digit)
            }
        })
}

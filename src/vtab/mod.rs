#![allow(unsafe_code)]

//! SQLite virtual-table module exposing the triples relation.
//!
//! [`register`] installs the module on a connection and creates the table in the `temp`
//! schema. Each table instance keeps an arena of its open cursors so teardown can close any
//! that the engine left behind.

mod registry;

use std::cell::RefCell;
use std::ffi::c_int;
use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::vtab::{
    read_only_module, Context, CreateVTab, IndexConstraintOp, IndexInfo, VTab, VTabConnection,
    VTabCursor, VTabKind, Values,
};
use rusqlite::{ffi, Connection};
use tracing::{debug, error, warn};

use crate::catalog::Catalog;
use crate::options::AdapterOptions;
use crate::query::plan::{self, ConstraintInput, ConstraintOp, Plan, TripleColumn};
use crate::query::ScanCursor;
use crate::schema::quote_ident;
use crate::types::{RdfError, Result};

pub use registry::{CursorKey, CursorRegistry};

/// Catalog and options shared by every table instance of a registered module.
pub struct TripleAdapter {
    catalog: Arc<dyn Catalog>,
    options: AdapterOptions,
}

/// Registers the triples module on `conn` and creates `temp.<table_name>`.
///
/// The catalog's layout decides the declared columns: the per-property layout exposes the
/// synthetic `id` column, the class-grouped layout does not.
pub fn register(conn: &Connection, catalog: Arc<dyn Catalog>, options: AdapterOptions) -> Result<()> {
    options.validate()?;
    let module_name = options.module_name.clone();
    let table_name = options.table_name.clone();
    let generation = catalog.generation();
    let adapter = Arc::new(TripleAdapter { catalog, options });
    conn.create_module(
        module_name.as_str(),
        read_only_module::<TriplesTable>(),
        Some(adapter),
    )?;
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS temp.{} USING {module_name}",
        quote_ident(&table_name)
    ))?;
    debug!(module = %module_name, table = %table_name, generation = %generation, "triples.registered");
    Ok(())
}

fn constraint_op(op: IndexConstraintOp) -> ConstraintOp {
    match op {
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ => ConstraintOp::Equal,
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_NE => ConstraintOp::NotEqual,
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_ISNULL => ConstraintOp::IsNull,
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_ISNOTNULL => ConstraintOp::IsNotNull,
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LIMIT
        | IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_OFFSET => ConstraintOp::Pseudo,
        other => ConstraintOp::Unsupported(format!("{other:?}")),
    }
}

/// Errors from `xColumn` keep their code only when no message is attached.
fn column_error(err: RdfError) -> rusqlite::Error {
    match err {
        RdfError::Corruption(msg) => {
            error!(%msg, "triples.column.corruption");
            rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_CORRUPT), None)
        }
        other => other.into(),
    }
}

/// One instance of the triples virtual table.
#[repr(C)]
pub struct TriplesTable {
    base: ffi::sqlite3_vtab,
    adapter: Arc<TripleAdapter>,
    conn: Connection,
    cursors: RefCell<CursorRegistry>,
}

unsafe impl<'vtab> VTab<'vtab> for TriplesTable {
    type Aux = Arc<TripleAdapter>;
    type Cursor = TriplesCursor<'vtab>;

    fn connect(
        db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        _args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let adapter = aux.cloned().ok_or_else(|| {
            rusqlite::Error::ModuleError("triples module registered without an adapter".into())
        })?;
        // SAFETY: the handle belongs to the connection that owns this table and outlives it;
        // `from_handle` does not close the connection on drop.
        let conn = unsafe { Connection::from_handle(db.handle()) }?;
        let schema = TripleColumn::create_table_sql(adapter.catalog.generation());
        debug!(schema = %schema, "triples.connect");
        Ok((
            schema,
            TriplesTable {
                base: ffi::sqlite3_vtab::default(),
                adapter,
                conn,
                cursors: RefCell::new(CursorRegistry::default()),
            },
        ))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let generation = self.adapter.catalog.generation();
        let inputs: Vec<ConstraintInput> = info
            .constraints()
            .map(|constraint| ConstraintInput {
                column: TripleColumn::from_index(generation, constraint.column()),
                op: constraint_op(constraint.operator()),
                usable: constraint.is_usable(),
            })
            .collect();
        let output = plan::build(&inputs, self.adapter.options.base_cost)?;
        for (idx, slot) in output.argv_slots.iter().enumerate() {
            if let Some(slot) = slot {
                let mut usage = info.constraint_usage(idx);
                usage.set_argv_index(c_int::from(*slot) + 1);
                usage.set_omit(true);
            }
        }
        info.set_idx_num(output.plan.encode());
        info.set_estimated_cost(output.estimated_cost);
        Ok(())
    }

    fn open(&'vtab mut self) -> rusqlite::Result<TriplesCursor<'vtab>> {
        let table: &'vtab TriplesTable = self;
        let scan = ScanCursor::new(&table.conn, table.adapter.catalog.as_ref());
        let key = table.cursors.borrow_mut().insert(scan.handle());
        Ok(TriplesCursor {
            base: ffi::sqlite3_vtab_cursor::default(),
            table,
            scan,
            key,
        })
    }
}

impl<'vtab> CreateVTab<'vtab> for TriplesTable {
    const KIND: VTabKind = VTabKind::Default;
}

impl Drop for TriplesTable {
    fn drop(&mut self) {
        let cursors = self.cursors.get_mut();
        debug!(open = cursors.len(), "triples.disconnect");
        let stragglers = cursors.drain();
        let closed = stragglers.iter().filter(|handle| handle.force_close()).count();
        if closed > 0 {
            warn!(closed, "triples.teardown.forced_close");
        }
    }
}

/// Engine-facing cursor wrapping a [`ScanCursor`].
#[repr(C)]
pub struct TriplesCursor<'vtab> {
    base: ffi::sqlite3_vtab_cursor,
    table: &'vtab TriplesTable,
    scan: ScanCursor<'vtab>,
    key: CursorKey,
}

impl TriplesCursor<'_> {
    fn decode_args(args: &Values<'_>) -> rusqlite::Result<Vec<Value>> {
        (0..args.len()).map(|idx| args.get::<Value>(idx)).collect()
    }
}

unsafe impl VTabCursor for TriplesCursor<'_> {
    fn filter(
        &mut self,
        idx_num: c_int,
        _idx_str: Option<&str>,
        args: &Values<'_>,
    ) -> rusqlite::Result<()> {
        let plan = Plan::decode(idx_num)?;
        let args = Self::decode_args(args)?;
        Ok(self.scan.filter(&plan, &args)?)
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        Ok(self.scan.next()?)
    }

    fn eof(&self) -> bool {
        self.scan.eof()
    }

    fn column(&self, ctx: &mut Context, i: c_int) -> rusqlite::Result<()> {
        let generation = self.table.adapter.catalog.generation();
        let column = TripleColumn::from_index(generation, i)
            .ok_or(RdfError::Invalid("column index out of range"))?;
        let value = self.scan.column(column).map_err(column_error)?;
        ctx.set_result(&value)
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.scan.rowid())
    }
}

impl Drop for TriplesCursor<'_> {
    fn drop(&mut self) {
        self.scan.close();
        self.table.cursors.borrow_mut().remove(self.key);
    }
}

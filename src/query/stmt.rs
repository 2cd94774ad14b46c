#![allow(unsafe_code)]

//! Owned prepared statement used by scan cursors.
//!
//! `rusqlite::Rows` borrows its `Statement`, which a cursor that lives across engine callbacks
//! cannot hold. This wrapper owns the raw handle instead and finalizes it on drop.

use std::ffi::{c_int, CStr};
use std::ptr::{self, NonNull};

use rusqlite::{ffi, Connection};

use crate::types::{RdfError, Result};

/// A prepared, bound statement stepping over one physical table.
#[derive(Debug)]
pub struct PhysicalStatement {
    raw: NonNull<ffi::sqlite3_stmt>,
    db: *mut ffi::sqlite3,
    columns: Vec<String>,
}

impl PhysicalStatement {
    /// Prepares `sql` on `conn` and binds `bindings` to `?1..?n`.
    pub fn prepare(conn: &Connection, sql: &str, bindings: &[i64]) -> Result<Self> {
        let len = c_int::try_from(sql.len())
            .map_err(|_| RdfError::Invalid("statement text exceeds engine limit"))?;
        // SAFETY: the handle stays valid for as long as `conn`, which outlives every cursor.
        let db = unsafe { conn.handle() };
        let mut raw = ptr::null_mut();
        // SAFETY: `sql` is valid for `len` bytes; no trailing NUL is required with an explicit length.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(db, sql.as_ptr().cast(), len, &mut raw, ptr::null_mut())
        };
        if rc != ffi::SQLITE_OK {
            return Err(engine_error(db, rc));
        }
        let raw = NonNull::new(raw).ok_or(RdfError::Invalid("statement text is empty"))?;
        let mut stmt = Self {
            raw,
            db,
            columns: Vec::new(),
        };
        for (idx, value) in bindings.iter().enumerate() {
            let position = c_int::try_from(idx + 1)
                .map_err(|_| RdfError::Invalid("too many statement bindings"))?;
            // SAFETY: `raw` is a live statement owned by `stmt`.
            let rc = unsafe { ffi::sqlite3_bind_int64(stmt.raw.as_ptr(), position, *value) };
            if rc != ffi::SQLITE_OK {
                return Err(engine_error(db, rc));
            }
        }
        stmt.columns = stmt.read_column_names();
        Ok(stmt)
    }

    fn read_column_names(&self) -> Vec<String> {
        // SAFETY: `raw` is live; names are copied out before any further call on the statement.
        unsafe {
            let count = ffi::sqlite3_column_count(self.raw.as_ptr());
            (0..count)
                .map(|idx| {
                    let name = ffi::sqlite3_column_name(self.raw.as_ptr(), idx);
                    if name.is_null() {
                        String::new()
                    } else {
                        CStr::from_ptr(name).to_string_lossy().into_owned()
                    }
                })
                .collect()
        }
    }

    /// Advances to the next row; `false` once the statement is done.
    pub fn step(&mut self) -> Result<bool> {
        // SAFETY: `raw` is live and exclusively borrowed.
        let rc = unsafe { ffi::sqlite3_step(self.raw.as_ptr()) };
        match rc {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            rc => Err(engine_error(self.db, rc)),
        }
    }

    /// Number of result columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Declared name (alias) of result column `idx`.
    pub fn column_name(&self, idx: usize) -> Option<&str> {
        self.columns.get(idx).map(String::as_str)
    }

    fn checked_index(&self, idx: usize) -> Option<c_int> {
        if idx < self.columns.len() {
            c_int::try_from(idx).ok()
        } else {
            None
        }
    }

    /// Whether column `idx` of the current row is NULL (or out of range).
    pub fn is_null(&self, idx: usize) -> bool {
        let Some(col) = self.checked_index(idx) else {
            return true;
        };
        // SAFETY: `raw` is live and positioned on a row.
        unsafe { ffi::sqlite3_column_type(self.raw.as_ptr(), col) == ffi::SQLITE_NULL }
    }

    /// Integer value of column `idx`; `None` when NULL.
    pub fn int64(&self, idx: usize) -> Option<i64> {
        if self.is_null(idx) {
            return None;
        }
        let col = self.checked_index(idx)?;
        // SAFETY: `raw` is live and `col` is in range.
        Some(unsafe { ffi::sqlite3_column_int64(self.raw.as_ptr(), col) })
    }

    /// Text value of column `idx`; `None` when NULL.
    pub fn text(&self, idx: usize) -> Option<String> {
        if self.is_null(idx) {
            return None;
        }
        let col = self.checked_index(idx)?;
        // SAFETY: the text pointer is valid until the next step/reset/finalize, and the bytes
        // are copied out before returning. `column_bytes` is read after `column_text`.
        unsafe {
            let text = ffi::sqlite3_column_text(self.raw.as_ptr(), col);
            if text.is_null() {
                return None;
            }
            let len = usize::try_from(ffi::sqlite3_column_bytes(self.raw.as_ptr(), col)).ok()?;
            let bytes = std::slice::from_raw_parts(text, len);
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl Drop for PhysicalStatement {
    fn drop(&mut self) {
        // SAFETY: finalized exactly once; the handle is never used afterwards.
        unsafe {
            ffi::sqlite3_finalize(self.raw.as_ptr());
        }
    }
}

fn engine_error(db: *mut ffi::sqlite3, rc: c_int) -> RdfError {
    // SAFETY: `db` is a live connection handle; the message is copied immediately.
    let message = unsafe {
        let msg = ffi::sqlite3_errmsg(db);
        if msg.is_null() {
            None
        } else {
            Some(CStr::from_ptr(msg).to_string_lossy().into_owned())
        }
    };
    RdfError::Sqlite(rusqlite::Error::SqliteFailure(ffi::Error::new(rc), message))
}

//! Read-only result view: snapshots rows/fields out of a completed
//! `MYSQL_RES` while it is alive, then owns the data independently
//! (`original_source/MySQLImpl/MySQLResultImpl.{h,cpp}`, spec.md §4.9).
//!
//! Rather than hold the original's raw `(char**, unsigned long*)` row
//! pointers — which stay valid only as long as the owning `MYSQL_RES` does —
//! this copies each cell's bytes out during construction. That trades a
//! single extra allocation pass for a view with no lifetime tied to the C
//! library's resource, which is the more idiomatic shape for a Rust value
//! handed across callback boundaries.

use std::collections::HashMap;
use std::ffi::CStr;

use crate::error::RangeError;
use crate::mysql::sys;

type Row = Vec<Option<Vec<u8>>>;

/// A materialised query result: every row and column already copied out of
/// the driver's buffers.
#[derive(Debug, Clone, Default)]
pub struct ResultView {
    column_names: Vec<String>,
    column_index: HashMap<String, usize>,
    rows: Vec<Row>,
    affected_rows: u64,
    insert_id: u64,
}

impl ResultView {
    /// Builds a view from a completed `MYSQL_RES*`, or an empty view if
    /// `res` is null (a statement with no result set, e.g. an `UPDATE`).
    ///
    /// # Safety
    /// `res`, if non-null, must be a valid `MYSQL_RES*` produced by
    /// `mysql_store_result_cont`/`_start` that the caller has not yet freed;
    /// this function takes ownership of it (frees it via
    /// `mysql_free_result` before returning).
    #[must_use]
    pub unsafe fn from_raw(res: *mut sys::MYSQL_RES, affected_rows: u64, insert_id: u64) -> Self {
        if res.is_null() {
            return ResultView {
                affected_rows,
                insert_id,
                ..Default::default()
            };
        }
        // SAFETY: `res` is non-null and caller-guaranteed valid; freed at
        // the end of this block via the `_guard`.
        let _guard = FreeOnDrop(res);
        let field_count = unsafe { sys::mysql_num_fields(res) } as usize;
        let fields = unsafe { sys::mysql_fetch_fields(res) };

        let mut column_names = Vec::with_capacity(field_count);
        let mut column_index = HashMap::with_capacity(field_count);
        for i in 0..field_count {
            // SAFETY: `fields` has `field_count` valid entries per
            // `mysql_fetch_fields`'s contract.
            let field = unsafe { &*fields.add(i) };
            // SAFETY: MySQL field names are always NUL-terminated C strings.
            let name = unsafe { CStr::from_ptr(field.name) }
                .to_string_lossy()
                .into_owned();
            column_index.insert(name.to_ascii_lowercase(), i);
            column_names.push(name);
        }

        let mut rows = Vec::new();
        loop {
            // SAFETY: `res` remains valid until `_guard` drops.
            let mysql_row = unsafe { sys::mysql_fetch_row(res) };
            if mysql_row.is_null() {
                break;
            }
            // SAFETY: `mysql_fetch_lengths` is valid immediately after a
            // successful `mysql_fetch_row` on the same result set.
            let lengths = unsafe { sys::mysql_fetch_lengths(res) };
            let mut row = Vec::with_capacity(field_count);
            for i in 0..field_count {
                // SAFETY: `mysql_row` and `lengths` both have `field_count`
                // valid entries for the row just fetched.
                let cell_ptr = unsafe { *mysql_row.add(i) };
                if cell_ptr.is_null() {
                    row.push(None);
                } else {
                    let len = unsafe { *lengths.add(i) } as usize;
                    let bytes =
                        unsafe { std::slice::from_raw_parts(cell_ptr.cast::<u8>(), len) };
                    row.push(Some(bytes.to_vec()));
                }
            }
            rows.push(row);
        }

        ResultView {
            column_names,
            column_index,
            rows,
            affected_rows,
            insert_id,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn columns(&self) -> usize {
        self.column_names.len()
    }

    #[must_use]
    pub fn column_name(&self, index: usize) -> &str {
        &self.column_names[index]
    }

    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    #[must_use]
    pub fn insert_id(&self) -> u64 {
        self.insert_id
    }

    /// Looks up a column index by name, case-insensitively.
    ///
    /// # Errors
    /// Returns `RangeError` if no column has that name.
    pub fn column_number(&self, name: &str) -> Result<usize, RangeError> {
        self.column_index
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| RangeError(name.to_string()))
    }

    #[must_use]
    pub fn get_value(&self, row: usize, column: usize) -> Option<&[u8]> {
        self.rows[row][column].as_deref()
    }

    #[must_use]
    pub fn is_null(&self, row: usize, column: usize) -> bool {
        self.get_value(row, column).is_none()
    }

    #[must_use]
    pub fn get_length(&self, row: usize, column: usize) -> usize {
        self.get_value(row, column).map_or(0, <[u8]>::len)
    }
}

struct FreeOnDrop(*mut sys::MYSQL_RES);

impl Drop for FreeOnDrop {
    fn drop(&mut self) {
        // SAFETY: `self.0` came from `ResultView::from_raw`'s caller
        // contract — a valid, not-yet-freed `MYSQL_RES*`.
        unsafe { sys::mysql_free_result(self.0) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_view_from_null_result() {
        let view = unsafe { ResultView::from_raw(std::ptr::null_mut(), 3, 42) };
        assert_eq!(view.size(), 0);
        assert_eq!(view.columns(), 0);
        assert_eq!(view.affected_rows(), 3);
        assert_eq!(view.insert_id(), 42);
    }

    #[test]
    fn column_number_is_case_insensitive_and_errs_on_miss() {
        let view = ResultView {
            column_names: vec!["Id".to_string(), "Name".to_string()],
            column_index: HashMap::from([("id".to_string(), 0), ("name".to_string(), 1)]),
            rows: vec![vec![Some(b"1".to_vec()), Some(b"alice".to_vec())]],
            affected_rows: 0,
            insert_id: 0,
        };
        assert_eq!(view.column_number("NAME").unwrap(), 1);
        assert!(view.column_number("missing").is_err());
        assert_eq!(view.get_value(0, 0), Some(b"1".as_slice()));
        assert!(!view.is_null(0, 0));
    }
}

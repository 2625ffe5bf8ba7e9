//! Forward-only readers over procedure result sets

use crate::{DbType, Result, ResultSet, SprocError, Value};

/// Forward-only cursor over one or more result sets.
///
/// A fresh reader is positioned before the first row of the first set;
/// `read` advances within a set and `next_result` moves to the next set.
pub trait DataReader: Send {
    /// Number of columns in the current set
    fn field_count(&self) -> usize;

    /// Name of the column at `ordinal`
    fn field_name(&self, ordinal: usize) -> Result<&str>;

    /// Reported type of the column at `ordinal`, if known
    fn field_type(&self, ordinal: usize) -> Result<Option<DbType>>;

    /// Advance to the next row, returning false past the last row
    fn read(&mut self) -> Result<bool>;

    /// Whether the column at `ordinal` of the current row is NULL
    fn is_null(&self, ordinal: usize) -> Result<bool>;

    /// Value of the column at `ordinal` of the current row
    fn get_value(&self, ordinal: usize) -> Result<Value>;

    /// Move to the next result set, returning false when none remain
    fn next_result(&mut self) -> Result<bool>;

    /// Ordinal of the column named `name`, ignoring ASCII case
    fn ordinal(&self, name: &str) -> Option<usize> {
        (0..self.field_count()).find(|&idx| {
            self.field_name(idx)
                .map(|n| n.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
    }
}

/// A reader over result sets that were fully buffered by the driver
#[derive(Debug, Clone, Default)]
pub struct MaterializedReader {
    sets: Vec<ResultSet>,
    set: usize,
    row: Option<usize>,
}

impl MaterializedReader {
    pub fn new(sets: Vec<ResultSet>) -> Self {
        Self {
            sets,
            set: 0,
            row: None,
        }
    }

    /// Number of buffered result sets
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    fn current_set(&self) -> Option<&ResultSet> {
        self.sets.get(self.set)
    }

    fn current_value(&self, ordinal: usize) -> Result<&Value> {
        let set = self
            .current_set()
            .ok_or_else(|| SprocError::Internal("reader has no current result set".into()))?;
        let row_idx = self
            .row
            .ok_or_else(|| SprocError::Internal("reader is not positioned on a row".into()))?;
        let row = set
            .rows
            .get(row_idx)
            .ok_or_else(|| SprocError::Internal("reader is past the last row".into()))?;
        row.get(ordinal).ok_or_else(|| {
            SprocError::Internal(format!(
                "column ordinal {} is out of range for a row of {} values",
                ordinal,
                row.values.len()
            ))
        })
    }
}

impl DataReader for MaterializedReader {
    fn field_count(&self) -> usize {
        self.current_set().map(|s| s.columns.len()).unwrap_or(0)
    }

    fn field_name(&self, ordinal: usize) -> Result<&str> {
        self.current_set()
            .and_then(|s| s.columns.get(ordinal))
            .map(|c| c.name.as_str())
            .ok_or_else(|| SprocError::Internal(format!("no column at ordinal {}", ordinal)))
    }

    fn field_type(&self, ordinal: usize) -> Result<Option<DbType>> {
        self.current_set()
            .and_then(|s| s.columns.get(ordinal))
            .map(|c| c.db_type)
            .ok_or_else(|| SprocError::Internal(format!("no column at ordinal {}", ordinal)))
    }

    fn read(&mut self) -> Result<bool> {
        let Some(set) = self.current_set() else {
            return Ok(false);
        };
        let next = self.row.map(|r| r + 1).unwrap_or(0);
        if next < set.rows.len() {
            self.row = Some(next);
            Ok(true)
        } else {
            self.row = Some(set.rows.len());
            Ok(false)
        }
    }

    fn is_null(&self, ordinal: usize) -> Result<bool> {
        Ok(self.current_value(ordinal)?.is_null())
    }

    fn get_value(&self, ordinal: usize) -> Result<Value> {
        self.current_value(ordinal).cloned()
    }

    fn next_result(&mut self) -> Result<bool> {
        if self.set >= self.sets.len() {
            return Ok(false);
        }
        self.set += 1;
        self.row = None;
        Ok(self.set < self.sets.len())
    }
}

//! Core types for sproc

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Largest number of result sets a single procedure call can be mapped onto
pub const MAX_RESULT_SETS: usize = 7;

/// A database value that can represent any bindable SQL type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// 8-bit unsigned integer (tinyint)
    UInt8(u8),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// Decimal/Numeric (stored as string for precision)
    Decimal(String),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// UUID
    Uuid(Uuid),
    /// Date (year, month, day)
    Date(NaiveDate),
    /// Time (hour, minute, second, nanosecond)
    Time(NaiveTime),
    /// DateTime without timezone
    DateTime(NaiveDateTime),
    /// DateTime with timezone (UTC)
    DateTimeUtc(DateTime<Utc>),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::UInt8(v) => Some(*v as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The natural `DbType` of this value, `None` for NULL
    pub fn db_type(&self) -> Option<DbType> {
        let ty = match self {
            Value::Null => return None,
            Value::Bool(_) => DbType::Boolean,
            Value::UInt8(_) => DbType::Byte,
            Value::Int16(_) => DbType::Int16,
            Value::Int32(_) => DbType::Int32,
            Value::Int64(_) => DbType::Int64,
            Value::Float32(_) => DbType::Single,
            Value::Float64(_) => DbType::Double,
            Value::Decimal(_) => DbType::Decimal,
            Value::String(_) => DbType::String,
            Value::Bytes(_) => DbType::Binary,
            Value::Uuid(_) => DbType::Guid,
            Value::Date(_) => DbType::Date,
            Value::Time(_) => DbType::Time,
            Value::DateTime(_) => DbType::DateTime,
            Value::DateTimeUtc(_) => DbType::DateTimeOffset,
        };
        Some(ty)
    }

    /// Name of the variant, used in decode diagnostics
    pub fn type_name(&self) -> &'static str {
        match self.db_type() {
            Some(ty) => ty.name(),
            None => "NULL",
        }
    }

    /// Render the value the way it would appear as a T-SQL literal
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            Value::Bytes(v) => {
                let hex: String = v.iter().map(|b| format!("{:02X}", b)).collect();
                format!("0x{}", hex)
            }
            Value::UInt8(_)
            | Value::Int16(_)
            | Value::Int32(_)
            | Value::Int64(_)
            | Value::Float32(_)
            | Value::Float64(_)
            | Value::Decimal(_) => self.to_string(),
            other => format!("'{}'", other.to_string().replace('\'', "''")),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::DateTimeUtc(v) => write!(f, "{}", v),
        }
    }
}

/// Database type tag for a command parameter or result column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbType {
    Boolean,
    Byte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    String,
    Binary,
    Guid,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    /// A table-valued parameter
    Structured,
}

impl DbType {
    /// Short name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            DbType::Boolean => "Boolean",
            DbType::Byte => "Byte",
            DbType::Int16 => "Int16",
            DbType::Int32 => "Int32",
            DbType::Int64 => "Int64",
            DbType::Single => "Single",
            DbType::Double => "Double",
            DbType::Decimal => "Decimal",
            DbType::String => "String",
            DbType::Binary => "Binary",
            DbType::Guid => "Guid",
            DbType::Date => "Date",
            DbType::Time => "Time",
            DbType::DateTime => "DateTime",
            DbType::DateTimeOffset => "DateTimeOffset",
            DbType::Structured => "Structured",
        }
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A row from a result set
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column values
    pub values: Vec<Value>,
    /// Column names
    columns: Vec<String>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name. SQL Server identifiers are case-insensitive,
    /// so the lookup is too.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Get column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Convert to a HashMap
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.columns
            .iter()
            .zip(self.values.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name (empty for unnamed expressions)
    #[serde(default)]
    pub name: String,
    /// Data type reported by the driver, when known
    #[serde(default)]
    pub db_type: Option<DbType>,
    /// Column ordinal position (0-based)
    #[serde(default)]
    pub ordinal: usize,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, db_type: Option<DbType>, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            db_type,
            ordinal,
        }
    }
}

/// One materialized result set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column metadata
    pub columns: Vec<ColumnMeta>,
    /// Result rows
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Build a result set from column names and raw row values
    pub fn from_values(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let column_meta = names
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let db_type = rows
                    .iter()
                    .filter_map(|r| r.get(idx).and_then(Value::db_type))
                    .next();
                ColumnMeta::new(name.clone(), db_type, idx)
            })
            .collect();
        Self {
            columns: column_meta,
            rows: rows
                .into_iter()
                .map(|values| Row::new(names.clone(), values))
                .collect(),
        }
    }

    /// Check if the result has rows
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

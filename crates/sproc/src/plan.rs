//! Compiled call plans
//!
//! Plans are plain data: the executor interprets them, nothing is generated.
//! A plan is immutable once published and shared by every proxy of its contract.

use sproc_core::{DbType, ParameterDirection, quote_identifier};

use crate::describe::TableTypeName;

/// Name of the synthetic parameter bound to the procedure's return status
pub const RETURN_VALUE_PARAMETER: &str = "RETURN_VALUE";

/// Where a bound parameter takes its value from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSource {
    /// The whole argument at this position
    Argument(usize),
    /// One member of a record argument
    Member { argument: usize, member: usize },
    /// Nothing; the server fills it with the procedure's return status
    ReturnChannel,
}

/// Table type and row shape of a table-valued parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBinding {
    pub table_type: TableTypeName,
    /// Ordered column names and types of the table type
    pub columns: Vec<(String, DbType)>,
}

/// One parameter of the command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    pub name: String,
    pub direction: ParameterDirection,
    pub db_type: DbType,
    pub source: BindingSource,
    pub table: Option<TableBinding>,
}

/// Decodes the rows of one result set into values in member order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowDecoder {
    /// Reads the first column
    Scalar { db_type: DbType },
    /// Reads each named column, matched case-insensitively
    Record {
        type_name: String,
        columns: Vec<String>,
    },
}

/// What the executor reads after the command has run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultShape {
    Void,
    ReturnValue,
    SingleSet(RowDecoder),
    MultiSet(Vec<RowDecoder>),
}

impl ResultShape {
    /// Row decoders in statement order
    pub fn decoders(&self) -> &[RowDecoder] {
        match self {
            ResultShape::Void | ResultShape::ReturnValue => &[],
            ResultShape::SingleSet(decoder) => std::slice::from_ref(decoder),
            ResultShape::MultiSet(decoders) => decoders,
        }
    }

    /// Whether the command must be executed as a row-returning command
    pub fn returns_rows(&self) -> bool {
        !self.decoders().is_empty()
    }
}

/// Copies an output parameter back into the caller's argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBack {
    pub argument: usize,
    /// Index of the output's binding, which is also its parameter index
    pub binding: usize,
    pub parameter: String,
}

/// Everything needed to call one contract method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureCallPlan {
    pub contract: String,
    pub method: String,
    pub schema: String,
    pub name: String,
    pub bindings: Vec<ParameterBinding>,
    pub result_shape: ResultShape,
    pub is_async: bool,
    /// Applied in declaration order after a successful execution
    pub write_backs: Vec<WriteBack>,
    /// Number of arguments the method takes
    pub arity: usize,
}

impl ProcedureCallPlan {
    /// `[schema].[name]`, with closing brackets doubled
    pub fn command_text(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.name)
        )
    }

    /// Index and binding of the parameter that receives the return status
    pub fn return_binding(&self) -> Option<(usize, &ParameterBinding)> {
        self.bindings
            .iter()
            .enumerate()
            .find(|(_, b)| b.direction == ParameterDirection::ReturnValue)
    }
}

//! Stored-procedure commands and their parameters

use crate::{DataReader, DbType, Result, Value};
use async_trait::async_trait;
use std::time::Duration;

/// Default per-command timeout when a caller does not set one
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// How a parameter's value flows between caller and server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterDirection {
    /// Value sent to the server only
    Input,
    /// Value sent to the server and read back after execution
    InputOutput,
    /// Value only read back after execution
    Output,
    /// The procedure's integer return status
    ReturnValue,
}

impl ParameterDirection {
    /// Whether the driver must populate this parameter after execution
    pub fn is_output(&self) -> bool {
        !matches!(self, ParameterDirection::Input)
    }
}

/// Interpretation of the command text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandType {
    /// Command text is a (possibly qualified) procedure name
    #[default]
    StoredProcedure,
    /// Command text is a raw batch
    Text,
}

/// Rows bound to a table-valued parameter
#[derive(Debug, Clone, PartialEq)]
pub struct TableValue {
    /// Schema owning the server-side table type
    pub schema: String,
    /// Server-side table type name
    pub type_name: String,
    /// Ordered column names and types of the table type
    pub columns: Vec<(String, DbType)>,
    /// Row values, each as wide as `columns`
    pub rows: Vec<Vec<Value>>,
}

impl TableValue {
    /// Qualified `[schema].[name]` of the table type
    pub fn qualified_type_name(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.type_name)
        )
    }
}

/// Quote an identifier as `[name]`, doubling any closing bracket
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// A named command parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name without the leading `@`
    pub name: String,
    pub direction: ParameterDirection,
    pub db_type: DbType,
    /// Value to send, and after execution the value read back for output directions
    pub value: Value,
    /// Table rows for `DbType::Structured` parameters
    pub table: Option<TableValue>,
}

impl Parameter {
    /// Create an input parameter
    pub fn input(name: impl Into<String>, db_type: DbType, value: Value) -> Self {
        Self {
            name: name.into(),
            direction: ParameterDirection::Input,
            db_type,
            value,
            table: None,
        }
    }

    /// Create a parameter with an explicit direction
    pub fn with_direction(
        name: impl Into<String>,
        direction: ParameterDirection,
        db_type: DbType,
        value: Value,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            db_type,
            value,
            table: None,
        }
    }

    /// Create a table-valued parameter
    pub fn table(name: impl Into<String>, table: TableValue) -> Self {
        Self {
            name: name.into(),
            direction: ParameterDirection::Input,
            db_type: DbType::Structured,
            value: Value::Null,
            table: Some(table),
        }
    }
}

/// Mutable state every command implementation carries.
///
/// Drivers embed this and delegate the accessor half of [`Command`] to it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandState {
    pub text: String,
    pub command_type: CommandType,
    pub timeout: Duration,
    pub parameters: Vec<Parameter>,
}

impl Default for CommandState {
    fn default() -> Self {
        Self {
            text: String::new(),
            command_type: CommandType::StoredProcedure,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            parameters: Vec::new(),
        }
    }
}

impl CommandState {
    /// Store a value read back from the server on the named parameter
    pub fn set_output(&mut self, name: &str, value: Value) -> bool {
        match self
            .parameters
            .iter_mut()
            .find(|p| p.direction.is_output() && p.name.eq_ignore_ascii_case(name))
        {
            Some(param) => {
                param.value = value;
                true
            }
            None => false,
        }
    }
}

/// A command created from an open connection.
///
/// After a successful execution the driver writes every output, input/output
/// and return-value parameter's value back into [`Command::parameters`].
#[async_trait]
pub trait Command: Send {
    fn set_command_text(&mut self, text: &str);

    fn command_text(&self) -> &str;

    fn set_command_type(&mut self, command_type: CommandType);

    fn command_type(&self) -> CommandType;

    fn set_timeout(&mut self, timeout: Duration);

    fn timeout(&self) -> Duration;

    fn add_parameter(&mut self, parameter: Parameter);

    fn parameters(&self) -> &[Parameter];

    /// Look up a parameter by name, ignoring ASCII case
    fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters()
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Execute without reading rows, returning the affected row count
    fn execute_non_query(&mut self) -> Result<u64>;

    /// Async form of [`Command::execute_non_query`]
    async fn execute_non_query_async(&mut self) -> Result<u64>;

    /// Execute and open a reader positioned before the first row of the first set
    fn execute_reader(&mut self) -> Result<Box<dyn DataReader>>;

    /// Async form of [`Command::execute_reader`]
    async fn execute_reader_async(&mut self) -> Result<Box<dyn DataReader>>;
}

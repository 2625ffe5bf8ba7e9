//! Stored-procedure commands over a tiberius connection
//!
//! tiberius has no RPC call with output parameters, so a stored-procedure
//! command is lowered to one T-SQL batch:
//!
//! ```sql
//! DECLARE @__rv int, @__rows int;
//! DECLARE @__o0 bigint = @P2;
//! DECLARE @__t0 [sales].[OrderLineList];
//! INSERT INTO @__t0 ([sku], [quantity]) VALUES (@P3, @P4), (@P5, @P6);
//! EXEC @__rv = [dbo].[totals] @customer = @P1, @total = @__o0 OUTPUT, @lines = @__t0;
//! SET @__rows = @@ROWCOUNT;
//! SELECT @__rv AS [RETURN_VALUE], @__rows AS [ROWS_AFFECTED], @__o0 AS [total];
//! ```
//!
//! The trailing status row is split off the buffered result sets and written
//! back into the command's output and return-value parameters.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sproc_core::{
    Command, CommandState, CommandType, DataReader, DbType, MaterializedReader, Parameter,
    ParameterDirection, Result, ResultSet, SprocError, Value, quote_identifier,
};

use crate::connection::{MssqlConnection, TiberiusParam, value_to_tiberius_param};
use crate::runtime;

/// Most parameters SQL Server accepts in one request
pub const MAX_PARAMETERS: usize = 2100;

/// Most rows one `INSERT ... VALUES` accepts
const MAX_VALUES_ROWS: usize = 1000;

/// Column of the status row holding the procedure's return status
pub const STATUS_RETURN_COLUMN: &str = "RETURN_VALUE";

/// Column of the status row holding `@@ROWCOUNT` after the call
pub const STATUS_ROWS_COLUMN: &str = "ROWS_AFFECTED";

/// A command lowered to SQL text and positional parameters
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Batch {
    pub sql: String,
    pub params: Vec<TiberiusParam>,
    /// Whether the last result set is the status row
    pub has_status: bool,
    /// Indices into the command's parameters of the outputs selected after
    /// the two leading status columns, in column order
    pub outputs: Vec<usize>,
}

fn check_parameter_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '#' || c == '$');
    if valid {
        Ok(())
    } else {
        Err(SprocError::NotSupported(format!(
            "parameter name `{}` is not a valid T-SQL identifier",
            name
        )))
    }
}

/// T-SQL type used to declare a local variable of `db_type`
pub(crate) fn sql_type_name(db_type: DbType) -> Result<&'static str> {
    Ok(match db_type {
        DbType::Boolean => "bit",
        DbType::Byte => "tinyint",
        DbType::Int16 => "smallint",
        DbType::Int32 => "int",
        DbType::Int64 => "bigint",
        DbType::Single => "real",
        DbType::Double => "float",
        DbType::Decimal => "decimal(38, 10)",
        DbType::String => "nvarchar(max)",
        DbType::Binary => "varbinary(max)",
        DbType::Guid => "uniqueidentifier",
        DbType::Date => "date",
        DbType::Time => "time(7)",
        DbType::DateTime => "datetime2(7)",
        DbType::DateTimeOffset => "datetimeoffset(7)",
        DbType::Structured => {
            return Err(SprocError::NotSupported(
                "a table type cannot be declared as a scalar variable".to_string(),
            ));
        }
    })
}

struct BatchBuilder {
    params: Vec<TiberiusParam>,
}

impl BatchBuilder {
    fn bind(&mut self, value: &Value, db_type: DbType) -> Result<String> {
        if self.params.len() >= MAX_PARAMETERS {
            return Err(SprocError::NotSupported(format!(
                "command needs more than {} parameters",
                MAX_PARAMETERS
            )));
        }
        self.params.push(value_to_tiberius_param(value, db_type));
        Ok(format!("@P{}", self.params.len()))
    }
}

/// Lower a command into the batch sent to the server
pub(crate) fn build_batch(state: &CommandState) -> Result<Batch> {
    match state.command_type {
        CommandType::Text => build_text_batch(state),
        CommandType::StoredProcedure => build_procedure_batch(state),
    }
}

fn build_text_batch(state: &CommandState) -> Result<Batch> {
    let mut builder = BatchBuilder { params: Vec::new() };
    for parameter in &state.parameters {
        if parameter.direction != ParameterDirection::Input || parameter.table.is_some() {
            return Err(SprocError::NotSupported(
                "text commands only take scalar input parameters".to_string(),
            ));
        }
        builder.bind(&parameter.value, parameter.db_type)?;
    }
    Ok(Batch {
        sql: state.text.clone(),
        params: builder.params,
        has_status: false,
        outputs: Vec::new(),
    })
}

fn build_procedure_batch(state: &CommandState) -> Result<Batch> {
    if state.text.trim().is_empty() {
        return Err(SprocError::Internal(
            "stored procedure command has no procedure name".to_string(),
        ));
    }

    let mut builder = BatchBuilder { params: Vec::new() };
    let mut prologue = vec!["DECLARE @__rv int, @__rows int;".to_string()];
    let mut arguments = Vec::new();
    let mut status_columns = vec![
        format!("@__rv AS {}", quote_identifier(STATUS_RETURN_COLUMN)),
        format!("@__rows AS {}", quote_identifier(STATUS_ROWS_COLUMN)),
    ];
    let mut outputs = Vec::new();
    let mut tables = 0usize;

    for (index, parameter) in state.parameters.iter().enumerate() {
        check_parameter_name(&parameter.name)?;
        match (parameter.direction, &parameter.table) {
            (ParameterDirection::ReturnValue, _) => {}
            (ParameterDirection::Input, Some(table)) => {
                let variable = format!("@__t{}", tables);
                tables += 1;
                prologue.push(format!(
                    "DECLARE {} {};",
                    variable,
                    table.qualified_type_name()
                ));
                let column_list = table
                    .columns
                    .iter()
                    .map(|(name, _)| quote_identifier(name))
                    .collect::<Vec<_>>()
                    .join(", ");
                for chunk in table.rows.chunks(MAX_VALUES_ROWS) {
                    let mut tuples = Vec::with_capacity(chunk.len());
                    for row in chunk {
                        if row.len() != table.columns.len() {
                            return Err(SprocError::Internal(format!(
                                "row for {} has {} values, the table type has {} columns",
                                parameter.name,
                                row.len(),
                                table.columns.len()
                            )));
                        }
                        let placeholders = row
                            .iter()
                            .zip(&table.columns)
                            .map(|(value, (_, db_type))| builder.bind(value, *db_type))
                            .collect::<Result<Vec<_>>>()?;
                        tuples.push(format!("({})", placeholders.join(", ")));
                    }
                    prologue.push(format!(
                        "INSERT INTO {} ({}) VALUES {};",
                        variable,
                        column_list,
                        tuples.join(", ")
                    ));
                }
                arguments.push(format!("@{} = {}", parameter.name, variable));
            }
            (ParameterDirection::Input, None) => {
                let placeholder = builder.bind(&parameter.value, parameter.db_type)?;
                arguments.push(format!("@{} = {}", parameter.name, placeholder));
            }
            (ParameterDirection::InputOutput | ParameterDirection::Output, _) => {
                let variable = format!("@__o{}", outputs.len());
                outputs.push(index);
                let sql_type = sql_type_name(parameter.db_type)?;
                if parameter.direction == ParameterDirection::InputOutput {
                    let placeholder = builder.bind(&parameter.value, parameter.db_type)?;
                    prologue.push(format!("DECLARE {} {} = {};", variable, sql_type, placeholder));
                } else {
                    prologue.push(format!("DECLARE {} {};", variable, sql_type));
                }
                arguments.push(format!("@{} = {} OUTPUT", parameter.name, variable));
                status_columns.push(format!(
                    "{} AS {}",
                    variable,
                    quote_identifier(&parameter.name)
                ));
            }
        }
    }

    let mut sql = prologue.join("\n");
    sql.push('\n');
    if arguments.is_empty() {
        sql.push_str(&format!("EXEC @__rv = {};\n", state.text));
    } else {
        sql.push_str(&format!(
            "EXEC @__rv = {} {};\n",
            state.text,
            arguments.join(", ")
        ));
    }
    sql.push_str("SET @__rows = @@ROWCOUNT;\n");
    sql.push_str(&format!("SELECT {};", status_columns.join(", ")));

    Ok(Batch {
        sql,
        params: builder.params,
        has_status: true,
        outputs,
    })
}

/// Write the status row back into the command's parameters, returning the
/// affected row count.
///
/// Columns are routed by position: return status, row count, then one column
/// per entry of `outputs`. Names are never consulted, so a parameter called
/// `return_value` or `rows_affected` cannot be confused with the status.
pub(crate) fn apply_status(
    state: &mut CommandState,
    status: &ResultSet,
    outputs: &[usize],
) -> Result<u64> {
    let row = status.rows.first().ok_or_else(|| {
        SprocError::Driver("status row missing from stored procedure batch".to_string())
    })?;
    if row.values.len() != outputs.len() + 2 {
        return Err(SprocError::Driver(format!(
            "status row has {} columns, expected {}",
            row.values.len(),
            outputs.len() + 2
        )));
    }

    let return_status = &row.values[0];
    for parameter in state
        .parameters
        .iter_mut()
        .filter(|p| p.direction == ParameterDirection::ReturnValue)
    {
        parameter.value = return_status.clone();
    }

    for (&index, value) in outputs.iter().zip(&row.values[2..]) {
        if let Some(parameter) = state.parameters.get_mut(index) {
            parameter.value = value.clone();
        }
    }

    Ok(row.values[1].as_i64().unwrap_or(0).max(0) as u64)
}

/// Command issued on an [`MssqlConnection`]
pub struct MssqlCommand<'c> {
    connection: &'c MssqlConnection,
    state: CommandState,
}

impl<'c> MssqlCommand<'c> {
    pub(crate) fn new(connection: &'c MssqlConnection, state: CommandState) -> Self {
        Self { connection, state }
    }

    async fn run(&mut self) -> Result<(Vec<ResultSet>, u64)> {
        let batch = build_batch(&self.state)?;
        let timeout = self.state.timeout;
        let start = Instant::now();

        tracing::debug!(
            command = %self.state.text,
            parameters = batch.params.len(),
            timeout_ms = timeout.as_millis() as u64,
            "executing batch"
        );

        let mut sets = match tokio::time::timeout(
            timeout,
            self.connection.query_sets(&batch.sql, &batch.params),
        )
        .await
        {
            Ok(result) => result.map_err(|e| {
                tracing::error!(command = %self.state.text, error = %e, "batch failed");
                SprocError::from(e)
            })?,
            Err(_) => {
                tracing::error!(command = %self.state.text, "batch timed out");
                return Err(timeout_error(&self.state.text, timeout));
            }
        };

        let rows_affected = if batch.has_status {
            let status = sets.pop().ok_or_else(|| {
                SprocError::Driver("stored procedure batch returned no status row".to_string())
            })?;
            apply_status(&mut self.state, &status, &batch.outputs)?
        } else {
            0
        };

        tracing::debug!(
            command = %self.state.text,
            result_sets = sets.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "batch completed"
        );
        Ok((sets, rows_affected))
    }

    fn run_blocking(&mut self) -> Result<(Vec<ResultSet>, u64)> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(SprocError::NotSupported(
                "synchronous execution from inside an async runtime; use the async call"
                    .to_string(),
            ));
        }
        runtime::block_on_tokio(self.run())?
    }
}

fn timeout_error(command: &str, timeout: Duration) -> SprocError {
    SprocError::Timeout(format!(
        "{} did not complete within {} ms",
        command,
        timeout.as_millis()
    ))
}

#[async_trait]
impl Command for MssqlCommand<'_> {
    fn set_command_text(&mut self, text: &str) {
        self.state.text = text.to_string();
    }

    fn command_text(&self) -> &str {
        &self.state.text
    }

    fn set_command_type(&mut self, command_type: CommandType) {
        self.state.command_type = command_type;
    }

    fn command_type(&self) -> CommandType {
        self.state.command_type
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.state.timeout = timeout;
    }

    fn timeout(&self) -> Duration {
        self.state.timeout
    }

    fn add_parameter(&mut self, parameter: Parameter) {
        self.state.parameters.push(parameter);
    }

    fn parameters(&self) -> &[Parameter] {
        &self.state.parameters
    }

    fn execute_non_query(&mut self) -> Result<u64> {
        self.run_blocking().map(|(_, rows)| rows)
    }

    async fn execute_non_query_async(&mut self) -> Result<u64> {
        self.run().await.map(|(_, rows)| rows)
    }

    fn execute_reader(&mut self) -> Result<Box<dyn DataReader>> {
        let (sets, _) = self.run_blocking()?;
        Ok(Box::new(MaterializedReader::new(sets)))
    }

    async fn execute_reader_async(&mut self) -> Result<Box<dyn DataReader>> {
        let (sets, _) = self.run().await?;
        Ok(Box::new(MaterializedReader::new(sets)))
    }
}

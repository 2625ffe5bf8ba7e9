//! Plan execution
//!
//! Sync and async calls share every step except the execution primitive:
//! the command is built from the plan and the live arguments, run, its result
//! sets decoded in statement order and typed, and only then are outputs
//! written back. Outputs are located by binding position, never by name.

use std::fmt;
use std::time::{Duration, Instant};

use sproc_core::{
    Command, CommandType, Connection, DataReader, DecodeError, Parameter, ParameterDirection,
    Result, SprocError, TableValue, Value,
};

use crate::convert::{Arg, FromResult, ResultValue, Scalar};
use crate::plan::{BindingSource, ProcedureCallPlan, RowDecoder};

/// Run `plan` synchronously on the caller's thread
pub fn execute<T: FromResult>(
    plan: &ProcedureCallPlan,
    connection: &dyn Connection,
    timeout: Duration,
    args: &mut [Arg<'_>],
) -> Result<T> {
    let mut command = prepare(plan, connection, timeout, args)?;
    let start = Instant::now();

    let sets = if plan.result_shape.returns_rows() {
        let mut reader = command
            .execute_reader()
            .map_err(|e| log_failure(plan, e))?;
        Some(decode_sets(plan, reader.as_mut())?)
    } else {
        command
            .execute_non_query()
            .map_err(|e| log_failure(plan, e))?;
        None
    };

    finish(plan, command.as_ref(), sets, args, start)
}

/// Run `plan` on the host's executor
pub async fn execute_async<T: FromResult>(
    plan: &ProcedureCallPlan,
    connection: &dyn Connection,
    timeout: Duration,
    args: &mut [Arg<'_>],
) -> Result<T> {
    let mut command = prepare(plan, connection, timeout, args)?;
    let start = Instant::now();

    let sets = if plan.result_shape.returns_rows() {
        let mut reader = command
            .execute_reader_async()
            .await
            .map_err(|e| log_failure(plan, e))?;
        Some(decode_sets(plan, reader.as_mut())?)
    } else {
        command
            .execute_non_query_async()
            .await
            .map_err(|e| log_failure(plan, e))?;
        None
    };

    finish(plan, command.as_ref(), sets, args, start)
}

/// Render the command `plan` would issue for `args`, e.g.
/// `[dbo].[WithArgument](@name = 'foo')`
pub fn render_call(plan: &ProcedureCallPlan, args: &[Arg<'_>]) -> Result<String> {
    let parameters = bind_parameters(plan, args)?;
    Ok(BoundCommand::new(plan, &parameters).to_string())
}

/// A plan together with the parameters bound for one call
pub struct BoundCommand<'a> {
    plan: &'a ProcedureCallPlan,
    parameters: &'a [Parameter],
}

impl<'a> BoundCommand<'a> {
    pub fn new(plan: &'a ProcedureCallPlan, parameters: &'a [Parameter]) -> Self {
        Self { plan, parameters }
    }
}

impl fmt::Display for BoundCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.plan.command_text())?;
        let mut first = true;
        for (binding, parameter) in self.plan.bindings.iter().zip(self.parameters) {
            if binding.source == BindingSource::ReturnChannel {
                continue;
            }
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            match (parameter.direction, &parameter.table) {
                (_, Some(table)) => write!(
                    f,
                    "@{} = {} ({} rows)",
                    parameter.name,
                    table.qualified_type_name(),
                    table.rows.len()
                )?,
                (ParameterDirection::Input, None) => {
                    write!(f, "@{} = {}", parameter.name, parameter.value.to_sql_literal())?
                }
                (ParameterDirection::ReturnValue, None) => write!(f, "@{}", parameter.name)?,
                (ParameterDirection::InputOutput | ParameterDirection::Output, None) => {
                    write!(f, "[Out] @{}", parameter.name)?
                }
            }
        }
        f.write_str(")")
    }
}

fn prepare<'c>(
    plan: &ProcedureCallPlan,
    connection: &'c dyn Connection,
    timeout: Duration,
    args: &[Arg<'_>],
) -> Result<Box<dyn Command + 'c>> {
    let parameters = bind_parameters(plan, args)?;
    tracing::debug!(
        procedure = %plan.command_text(),
        method = %plan.method,
        parameters = %BoundCommand::new(plan, &parameters),
        timeout_ms = timeout.as_millis() as u64,
        "executing stored procedure"
    );

    let mut command = connection.create_command()?;
    command.set_command_text(&plan.command_text());
    command.set_command_type(CommandType::StoredProcedure);
    command.set_timeout(timeout);
    for parameter in parameters {
        command.add_parameter(parameter);
    }
    Ok(command)
}

fn log_failure(plan: &ProcedureCallPlan, error: SprocError) -> SprocError {
    tracing::error!(
        procedure = %plan.command_text(),
        error = %error,
        "stored procedure failed"
    );
    error
}

/// Lower live arguments into command parameters, one per binding
pub(crate) fn bind_parameters(plan: &ProcedureCallPlan, args: &[Arg<'_>]) -> Result<Vec<Parameter>> {
    if args.len() != plan.arity {
        return Err(SprocError::Internal(format!(
            "{} takes {} arguments, {} were supplied",
            plan.method,
            plan.arity,
            args.len()
        )));
    }

    let mismatch = |position: usize| {
        SprocError::Internal(format!(
            "argument {} of {} does not match its binding",
            position, plan.method
        ))
    };

    plan.bindings
        .iter()
        .map(|binding| {
            let value = match &binding.source {
                BindingSource::ReturnChannel => Value::Null,
                BindingSource::Argument(position) => match (&args[*position], &binding.table) {
                    (Arg::Rows(rows), Some(table)) => {
                        if let Some(row) = rows.iter().find(|r| r.len() != table.columns.len()) {
                            return Err(DecodeError::RowWidth {
                                expected: table.columns.len(),
                                found: row.len(),
                            }
                            .into());
                        }
                        return Ok(Parameter::table(
                            binding.name.clone(),
                            TableValue {
                                schema: table.table_type.schema.clone(),
                                type_name: table.table_type.name.clone(),
                                columns: table.columns.clone(),
                                rows: rows.clone(),
                            },
                        ));
                    }
                    (Arg::Value(value), None) => value.clone(),
                    (Arg::Output { current, .. }, None) => match binding.direction {
                        ParameterDirection::ReturnValue => Value::Null,
                        _ => current.clone(),
                    },
                    _ => return Err(mismatch(*position)),
                },
                BindingSource::Member { argument, member } => match &args[*argument] {
                    Arg::Members(values) => values
                        .get(*member)
                        .cloned()
                        .ok_or_else(|| mismatch(*argument))?,
                    _ => return Err(mismatch(*argument)),
                },
            };
            Ok(Parameter::with_direction(
                binding.name.clone(),
                binding.direction,
                binding.db_type,
                value,
            ))
        })
        .collect()
}

fn decode_sets(
    plan: &ProcedureCallPlan,
    reader: &mut dyn DataReader,
) -> Result<Vec<Vec<Vec<Value>>>> {
    let decoders = plan.result_shape.decoders();
    let mut sets = Vec::with_capacity(decoders.len());

    for (index, decoder) in decoders.iter().enumerate() {
        let missing = DecodeError::ResultSetCount {
            expected: decoders.len(),
            found: index,
        };
        if index > 0 && !reader.next_result()? {
            return Err(missing.into());
        }
        if reader.field_count() == 0 {
            return Err(missing.into());
        }

        let ordinals = resolve_ordinals(decoder, reader, index)?;
        let mut rows = Vec::new();
        while reader.read()? {
            let row = ordinals
                .iter()
                .map(|&ordinal| reader.get_value(ordinal))
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }
        tracing::trace!(set = index, row_count = rows.len(), "decoded result set");
        sets.push(rows);
    }

    Ok(sets)
}

fn resolve_ordinals(
    decoder: &RowDecoder,
    reader: &dyn DataReader,
    set: usize,
) -> Result<Vec<usize>> {
    match decoder {
        RowDecoder::Scalar { .. } => Ok(vec![0]),
        RowDecoder::Record { columns, .. } => columns
            .iter()
            .map(|column| {
                reader.ordinal(column).ok_or_else(|| {
                    SprocError::from(DecodeError::MissingColumn {
                        set,
                        column: column.clone(),
                    })
                })
            })
            .collect(),
    }
}

/// Type the result, then write outputs back.
///
/// Outputs are staged before decoding and committed after it, so a failed
/// conversion anywhere leaves every caller location untouched.
fn finish<T: FromResult>(
    plan: &ProcedureCallPlan,
    command: &dyn Command,
    sets: Option<Vec<Vec<Vec<Value>>>>,
    args: &mut [Arg<'_>],
    start: Instant,
) -> Result<T> {
    let result = match sets {
        Some(sets) => ResultValue::Sets(sets),
        None if plan.result_shape == crate::plan::ResultShape::ReturnValue => {
            ResultValue::ReturnValue(read_return_value(plan, command)?)
        }
        None => ResultValue::Void,
    };
    let row_count = match &result {
        ResultValue::Sets(sets) => sets.iter().map(Vec::len).sum::<usize>(),
        _ => 0,
    };

    stage_write_backs(plan, command, args)?;
    let value = T::from_result(result)?;
    commit_write_backs(plan, args);

    tracing::debug!(
        procedure = %plan.command_text(),
        duration_ms = start.elapsed().as_millis() as u64,
        row_count,
        "stored procedure completed"
    );
    Ok(value)
}

/// Parameter bound for `binding`; commands keep parameters in binding order
fn bound_parameter<'c>(
    plan: &ProcedureCallPlan,
    command: &'c dyn Command,
    binding: usize,
) -> Result<&'c Parameter> {
    let expected = plan.bindings.get(binding);
    command
        .parameters()
        .get(binding)
        .filter(|p| expected.is_some_and(|b| b.direction == p.direction))
        .ok_or_else(|| {
            let name = expected.map(|b| b.name.clone()).unwrap_or_default();
            DecodeError::MissingOutput(name).into()
        })
}

fn read_return_value(plan: &ProcedureCallPlan, command: &dyn Command) -> Result<i32> {
    let (index, binding) = plan
        .return_binding()
        .ok_or_else(|| SprocError::Internal(format!("{} has no return binding", plan.method)))?;
    let parameter = bound_parameter(plan, command, index)?;
    Ok(i32::from_value(parameter.value.clone(), &binding.name)?)
}

/// Convert every output into its caller's slot without publishing anything
fn stage_write_backs(
    plan: &ProcedureCallPlan,
    command: &dyn Command,
    args: &mut [Arg<'_>],
) -> Result<()> {
    for write_back in &plan.write_backs {
        let value = bound_parameter(plan, command, write_back.binding)?
            .value
            .clone();
        match args.get_mut(write_back.argument) {
            Some(Arg::Output {
                slot: Some(slot), ..
            }) => slot.stage(value, &write_back.parameter)?,
            Some(Arg::Output { slot: None, .. }) => {}
            _ => {
                return Err(SprocError::Internal(format!(
                    "argument {} of {} is not an output location",
                    write_back.argument, plan.method
                )));
            }
        }
    }
    Ok(())
}

fn commit_write_backs(plan: &ProcedureCallPlan, args: &mut [Arg<'_>]) {
    for write_back in &plan.write_backs {
        if let Some(Arg::Output {
            slot: Some(slot), ..
        }) = args.get_mut(write_back.argument)
        {
            slot.commit();
        }
    }
}

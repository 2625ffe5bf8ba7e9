//! Call plan compilation

use sproc_core::{DbType, ParameterDirection};

use crate::analyzer::{ElementShape, MethodContract, ParamDirection, ParamKind, ReturnShape};
use crate::plan::{
    BindingSource, ParameterBinding, ProcedureCallPlan, RETURN_VALUE_PARAMETER, ResultShape,
    RowDecoder, TableBinding, WriteBack,
};

/// Compile an analyzed method into a call plan.
///
/// Deterministic: the same contract always yields an equal plan.
pub fn compile(contract: &MethodContract) -> ProcedureCallPlan {
    let mut bindings = Vec::new();
    let mut write_backs = Vec::new();

    for param in &contract.parameters {
        match (&param.kind, param.direction) {
            (ParamKind::Record(columns), _) => {
                for (member, column) in columns.iter().enumerate() {
                    bindings.push(ParameterBinding {
                        name: column.name.clone(),
                        direction: ParameterDirection::Input,
                        db_type: column.db_type,
                        source: BindingSource::Member {
                            argument: param.position,
                            member,
                        },
                        table: None,
                    });
                }
            }
            (ParamKind::Table { table_type, columns }, _) => {
                bindings.push(ParameterBinding {
                    name: param.name.clone(),
                    direction: ParameterDirection::Input,
                    db_type: DbType::Structured,
                    source: BindingSource::Argument(param.position),
                    table: Some(TableBinding {
                        table_type: table_type.clone(),
                        columns: columns
                            .iter()
                            .map(|c| (c.name.clone(), c.db_type))
                            .collect(),
                    }),
                });
            }
            (ParamKind::Scalar(db_type), direction) => {
                let direction = match direction {
                    ParamDirection::Out => ParameterDirection::InputOutput,
                    ParamDirection::ReturnValue => ParameterDirection::ReturnValue,
                    ParamDirection::In | ParamDirection::TableValued => ParameterDirection::Input,
                };
                if direction.is_output() {
                    write_backs.push(WriteBack {
                        argument: param.position,
                        binding: bindings.len(),
                        parameter: param.name.clone(),
                    });
                }
                bindings.push(ParameterBinding {
                    name: param.name.clone(),
                    direction,
                    db_type: *db_type,
                    source: BindingSource::Argument(param.position),
                    table: None,
                });
            }
        }
    }

    let result_shape = match &contract.return_shape {
        ReturnShape::Void => ResultShape::Void,
        ReturnShape::ReturnValue => {
            bindings.push(ParameterBinding {
                name: RETURN_VALUE_PARAMETER.to_string(),
                direction: ParameterDirection::ReturnValue,
                db_type: DbType::Int32,
                source: BindingSource::ReturnChannel,
                table: None,
            });
            ResultShape::ReturnValue
        }
        ReturnShape::SingleSet(element) => ResultShape::SingleSet(decoder(element)),
        ReturnShape::MultiSet(elements) => {
            ResultShape::MultiSet(elements.iter().map(decoder).collect())
        }
    };

    ProcedureCallPlan {
        contract: contract.contract.clone(),
        method: contract.method.clone(),
        schema: contract.schema.clone(),
        name: contract.procedure.clone(),
        bindings,
        result_shape,
        is_async: contract.is_async,
        write_backs,
        arity: contract.parameters.len(),
    }
}

fn decoder(element: &ElementShape) -> RowDecoder {
    match element {
        ElementShape::Scalar(db_type) => RowDecoder::Scalar { db_type: *db_type },
        ElementShape::Record { type_name, columns } => RowDecoder::Record {
            type_name: type_name.clone(),
            columns: columns.clone(),
        },
    }
}

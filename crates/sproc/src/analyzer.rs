//! Type shape analysis
//!
//! Classifies each parameter and the return type of a contract method and
//! resolves the procedure identity. Everything rejected here is rejected once,
//! when the contract's dispatch table is built, never per call.

use std::collections::HashSet;

use sproc_core::{DbType, MAX_RESULT_SETS, ShapeError, ShapeErrorReason};

use crate::config::ProxyConfig;
use crate::describe::{
    ColumnDesc, ContractDescription, ContractKind, MethodSignature, ParamSignature, PassingMode,
    RETURN_VALUE_ATTRIBUTE, RecordDesc, TableTypeName, TypeDesc,
};

/// Direction tag of a contract parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    In,
    Out,
    ReturnValue,
    TableValued,
}

/// What a contract parameter lowers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// One bound value
    Scalar(DbType),
    /// One bound value per member, named after the member
    Record(Vec<ColumnDesc>),
    /// A table-valued parameter
    Table {
        table_type: TableTypeName,
        columns: Vec<ColumnDesc>,
    },
}

/// A classified contract parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractParameter {
    pub name: String,
    /// Position in the method's argument list
    pub position: usize,
    pub direction: ParamDirection,
    pub kind: ParamKind,
}

/// Element type of one result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementShape {
    /// Decoded from the single unnamed column
    Scalar(DbType),
    /// Decoded by member name
    Record {
        type_name: String,
        columns: Vec<String>,
    },
}

/// Classified return type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnShape {
    Void,
    ReturnValue,
    SingleSet(ElementShape),
    MultiSet(Vec<ElementShape>),
}

/// Immutable description of one operation, ready for compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodContract {
    pub contract: String,
    pub method: String,
    pub schema: String,
    pub procedure: String,
    pub parameters: Vec<ContractParameter>,
    pub return_shape: ReturnShape,
    pub is_async: bool,
}

/// Reject contracts that cannot be proxied at all
pub fn check_contract(description: &ContractDescription) -> Result<(), ShapeError> {
    match description.kind {
        ContractKind::Interface => Ok(()),
        ContractKind::Concrete => Err(ShapeError::new(
            description.name.clone(),
            String::new(),
            ShapeErrorReason::NotAnInterface,
        )),
    }
}

/// Analyze one method of `contract`
pub fn analyze(
    config: &ProxyConfig,
    contract: &str,
    method: &MethodSignature,
) -> Result<MethodContract, ShapeError> {
    let fail = |reason: ShapeErrorReason| ShapeError::new(contract, method.name.clone(), reason);

    if method.is_async {
        if let Some(out) = method
            .params
            .iter()
            .find(|p| p.mode == PassingMode::Reference)
        {
            return Err(fail(ShapeErrorReason::AsyncOutputParameter(
                out.name.clone(),
            )));
        }
    }

    let (schema, procedure) = resolve_identity(config, method).map_err(fail)?;

    let mut parameters = Vec::with_capacity(method.params.len());
    for (position, param) in method.params.iter().enumerate() {
        let is_last = position + 1 == method.params.len();
        parameters.push(classify_parameter(param, position, is_last).map_err(fail)?);
    }

    let return_shape = classify_return(&method.returns).map_err(fail)?;

    if return_shape == ReturnShape::ReturnValue {
        if let Some(explicit) = parameters
            .iter()
            .find(|p| p.direction == ParamDirection::ReturnValue)
        {
            return Err(fail(ShapeErrorReason::AmbiguousReturnValue(
                explicit.name.clone(),
            )));
        }
    }

    check_unique_names(&parameters).map_err(fail)?;

    Ok(MethodContract {
        contract: contract.to_string(),
        method: method.name.clone(),
        schema,
        procedure,
        parameters,
        return_shape,
        is_async: method.is_async,
    })
}

fn resolve_identity(
    config: &ProxyConfig,
    method: &MethodSignature,
) -> Result<(String, String), ShapeErrorReason> {
    let mut schema = config.default_schema().to_string();
    let mut name = if method.is_async {
        config.strip_async_suffix(&method.name).to_string()
    } else {
        method.name.clone()
    };

    for (key, value) in &method.annotations {
        match key.as_str() {
            "name" => name = value.clone(),
            "schema" => schema = value.clone(),
            other => return Err(ShapeErrorReason::UnknownAnnotation(other.to_string())),
        }
    }

    if name.trim().is_empty() {
        return Err(ShapeErrorReason::EmptyProcedureName);
    }
    Ok((schema, name))
}

fn classify_parameter(
    param: &ParamSignature,
    position: usize,
    is_last: bool,
) -> Result<ContractParameter, ShapeErrorReason> {
    if let Some(unknown) = param
        .attributes
        .iter()
        .find(|a| a.as_str() != RETURN_VALUE_ATTRIBUTE)
    {
        return Err(ShapeErrorReason::UnknownAnnotation(unknown.clone()));
    }

    let unsupported = || ShapeErrorReason::UnsupportedParameter {
        name: param.name.clone(),
        found: param.ty.display_name(),
    };

    let (direction, kind) = match (&param.ty, param.mode) {
        (TypeDesc::Scalar { db_type, .. }, PassingMode::Reference) => {
            if param.has_attribute(RETURN_VALUE_ATTRIBUTE) {
                if !is_last || !param.ty.is_return_code() {
                    return Err(ShapeErrorReason::InvalidReturnValueParameter(
                        param.name.clone(),
                    ));
                }
                (ParamDirection::ReturnValue, ParamKind::Scalar(*db_type))
            } else {
                (ParamDirection::Out, ParamKind::Scalar(*db_type))
            }
        }
        _ if param.has_attribute(RETURN_VALUE_ATTRIBUTE) => {
            return Err(ShapeErrorReason::InvalidReturnValueParameter(
                param.name.clone(),
            ));
        }
        (TypeDesc::Scalar { db_type, .. }, PassingMode::Value) => {
            (ParamDirection::In, ParamKind::Scalar(*db_type))
        }
        (TypeDesc::Record(record), PassingMode::Value) => {
            check_record_annotation(record)?;
            (ParamDirection::In, ParamKind::Record(record.columns.clone()))
        }
        (TypeDesc::Sequence(element), PassingMode::Value) => match element.as_ref() {
            TypeDesc::Record(RecordDesc {
                columns,
                table_type: Some(table_type),
                invalid_annotation,
                ..
            }) => {
                if let Some(key) = invalid_annotation {
                    return Err(ShapeErrorReason::UnknownAnnotation(key.clone()));
                }
                (
                    ParamDirection::TableValued,
                    ParamKind::Table {
                        table_type: table_type.clone(),
                        columns: columns.clone(),
                    },
                )
            }
            other => {
                return Err(ShapeErrorReason::MissingTableType {
                    name: param.name.clone(),
                    found: other.display_name(),
                });
            }
        },
        _ => return Err(unsupported()),
    };

    Ok(ContractParameter {
        name: param.name.clone(),
        position,
        direction,
        kind,
    })
}

fn check_record_annotation(record: &RecordDesc) -> Result<(), ShapeErrorReason> {
    match &record.invalid_annotation {
        Some(key) => Err(ShapeErrorReason::UnknownAnnotation(key.clone())),
        None => Ok(()),
    }
}

fn classify_return(returns: &TypeDesc) -> Result<ReturnShape, ShapeErrorReason> {
    match returns {
        TypeDesc::Unit => Ok(ReturnShape::Void),
        scalar @ TypeDesc::Scalar { .. } if scalar.is_return_code() => Ok(ReturnShape::ReturnValue),
        TypeDesc::Sequence(element) => element_shape(element)
            .map(ReturnShape::SingleSet)
            .ok_or_else(|| ShapeErrorReason::UnsupportedReturn(returns.display_name())),
        TypeDesc::Tuple(items) => {
            if items.len() > MAX_RESULT_SETS {
                return Err(ShapeErrorReason::TooManyResultSets(items.len()));
            }
            let mut shapes = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let shape = match item {
                    TypeDesc::Sequence(element) => element_shape(element),
                    _ => None,
                };
                match shape {
                    Some(shape) => shapes.push(shape),
                    None => {
                        return Err(ShapeErrorReason::MalformedTupleElement {
                            index,
                            found: item.display_name(),
                        });
                    }
                }
            }
            Ok(ReturnShape::MultiSet(shapes))
        }
        other => Err(ShapeErrorReason::UnsupportedReturn(other.display_name())),
    }
}

fn element_shape(element: &TypeDesc) -> Option<ElementShape> {
    match element {
        TypeDesc::Scalar { db_type, .. } => Some(ElementShape::Scalar(*db_type)),
        TypeDesc::Record(record) => Some(ElementShape::Record {
            type_name: record.type_name.clone(),
            columns: record.columns.iter().map(|c| c.name.clone()).collect(),
        }),
        _ => None,
    }
}

fn check_unique_names(parameters: &[ContractParameter]) -> Result<(), ShapeErrorReason> {
    let mut seen = HashSet::new();
    for param in parameters {
        let names: Vec<&str> = match &param.kind {
            ParamKind::Record(columns) => columns.iter().map(|c| c.name.as_str()).collect(),
            _ => vec![param.name.as_str()],
        };
        for name in names {
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(ShapeErrorReason::DuplicateParameter(name.to_string()));
            }
        }
    }
    Ok(())
}

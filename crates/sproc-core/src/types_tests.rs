//! Tests for core value types and command parameters

use crate::*;
use pretty_assertions::assert_eq;
use std::time::Duration;

// ============================================================================
// Value Tests
// ============================================================================

#[test]
fn test_value_is_null() {
    assert!(Value::Null.is_null());
    assert!(!Value::Int32(0).is_null());
}

#[test]
fn test_value_as_i64_widens_integers() {
    assert_eq!(Value::UInt8(7).as_i64(), Some(7));
    assert_eq!(Value::Int16(-3).as_i64(), Some(-3));
    assert_eq!(Value::Int32(42).as_i64(), Some(42));
    assert_eq!(Value::Int64(1 << 40).as_i64(), Some(1 << 40));
    assert_eq!(Value::String("42".into()).as_i64(), None);
}

#[test]
fn test_value_db_type() {
    assert_eq!(Value::Null.db_type(), None);
    assert_eq!(Value::Int32(1).db_type(), Some(DbType::Int32));
    assert_eq!(Value::String("x".into()).db_type(), Some(DbType::String));
    assert_eq!(Value::Bytes(vec![1]).db_type(), Some(DbType::Binary));
    assert_eq!(Value::Null.type_name(), "NULL");
    assert_eq!(Value::Float64(1.0).type_name(), "Double");
}

#[test]
fn test_value_to_sql_literal() {
    assert_eq!(Value::String("foo".into()).to_sql_literal(), "'foo'");
    assert_eq!(Value::String("o'neil".into()).to_sql_literal(), "'o''neil'");
    assert_eq!(Value::Int32(5).to_sql_literal(), "5");
    assert_eq!(Value::Bool(true).to_sql_literal(), "1");
    assert_eq!(Value::Null.to_sql_literal(), "NULL");
    assert_eq!(Value::Bytes(vec![0xAB, 0x01]).to_sql_literal(), "0xAB01");
}

// ============================================================================
// Row / ResultSet Tests
// ============================================================================

#[test]
fn test_row_get_by_name_ignores_case() {
    let row = Row::new(
        vec!["Id".into(), "Name".into()],
        vec![Value::Int32(1), Value::String("a".into())],
    );

    assert_eq!(row.get_by_name("id"), Some(&Value::Int32(1)));
    assert_eq!(row.get_by_name("NAME"), Some(&Value::String("a".into())));
    assert_eq!(row.get_by_name("missing"), None);
    assert_eq!(row.to_map().len(), 2);
}

#[test]
fn test_result_set_from_values_infers_column_types() {
    let set = ResultSet::from_values(
        &["id", "note"],
        vec![
            vec![Value::Int32(1), Value::Null],
            vec![Value::Int32(2), Value::String("b".into())],
        ],
    );

    assert_eq!(set.column_count(), 2);
    assert_eq!(set.row_count(), 2);
    assert!(set.has_rows());
    assert_eq!(set.columns[0].db_type, Some(DbType::Int32));
    assert_eq!(set.columns[1].db_type, Some(DbType::String));
    assert_eq!(set.columns[1].ordinal, 1);
}

// ============================================================================
// Parameter / CommandState Tests
// ============================================================================

#[test]
fn test_parameter_direction_is_output() {
    assert!(!ParameterDirection::Input.is_output());
    assert!(ParameterDirection::InputOutput.is_output());
    assert!(ParameterDirection::Output.is_output());
    assert!(ParameterDirection::ReturnValue.is_output());
}

#[test]
fn test_table_parameter_is_structured() {
    let table = TableValue {
        schema: "dbo".into(),
        type_name: "ItemList".into(),
        columns: vec![("Id".into(), DbType::Int32)],
        rows: vec![vec![Value::Int32(1)]],
    };
    let param = Parameter::table("items", table);

    assert_eq!(param.db_type, DbType::Structured);
    assert_eq!(param.direction, ParameterDirection::Input);
    assert_eq!(
        param.table.as_ref().map(|t| t.qualified_type_name()),
        Some("[dbo].[ItemList]".to_string())
    );
}

#[test]
fn test_command_state_defaults() {
    let state = CommandState::default();

    assert_eq!(state.command_type, CommandType::StoredProcedure);
    assert_eq!(state.timeout, Duration::from_secs(30));
    assert!(state.parameters.is_empty());
}

#[test]
fn test_command_state_set_output_only_touches_output_parameters() {
    let mut state = CommandState::default();
    state
        .parameters
        .push(Parameter::input("name", DbType::String, Value::String("a".into())));
    state.parameters.push(Parameter::with_direction(
        "Result",
        ParameterDirection::InputOutput,
        DbType::Int32,
        Value::Int32(0),
    ));

    assert!(state.set_output("result", Value::Int32(9)));
    assert!(!state.set_output("name", Value::String("b".into())));

    assert_eq!(state.parameters[0].value, Value::String("a".into()));
    assert_eq!(state.parameters[1].value, Value::Int32(9));
}

// ============================================================================
// Error Tests
// ============================================================================

#[test]
fn test_error_kind_classification() {
    let shape: SprocError =
        ShapeError::new("IStore", "Get", ShapeErrorReason::TooManyResultSets(8)).into();
    assert_eq!(shape.kind(), ErrorKind::ContractShape);

    let decode: SprocError = DecodeError::UnexpectedNull("Id".into()).into();
    assert_eq!(decode.kind(), ErrorKind::Decode);

    assert_eq!(
        SprocError::Precondition("no connection".into()).kind(),
        ErrorKind::Precondition
    );
    assert!(SprocError::Timeout("30s".into()).is_execution());
    assert!(SprocError::Driver("deadlock".into()).is_execution());
}

#[test]
fn test_shape_error_message_names_contract_and_method() {
    let err = ShapeError::new("IStore", "Get", ShapeErrorReason::TooManyResultSets(8));
    assert_eq!(
        err.to_string(),
        "IStore::Get: tuple of 8 result sets exceeds the supported maximum of 7"
    );
}

// ============================================================================
// ConnectionConfig Tests
// ============================================================================

#[test]
fn test_connection_config_get_string() {
    let config = ConnectionConfig::new_mssql("db.local", 1433, "shop", "sa")
        .with_password("secret")
        .with_param("trust_cert", true);

    assert_eq!(config.get_string("host"), Some("db.local".into()));
    assert_eq!(config.get_string("user"), Some("sa".into()));
    assert_eq!(config.get_string("database"), Some("shop".into()));
    assert_eq!(config.get_string("password"), Some("secret".into()));
    assert!(config.get_flag("trust_cert"));
    assert!(!config.get_flag("missing"));
}

#[test]
fn test_connection_config_empty_host_is_absent() {
    let config = ConnectionConfig::new("mssql");
    assert_eq!(config.get_string("host"), None);
}

#[test]
fn test_quote_identifier_doubles_closing_bracket() {
    assert_eq!(quote_identifier("Orders"), "[Orders]");
    assert_eq!(quote_identifier("odd]name"), "[odd]]name]");

    let table = TableValue {
        schema: "sales]x".to_string(),
        type_name: "Lines".to_string(),
        columns: Vec::new(),
        rows: Vec::new(),
    };
    assert_eq!(table.qualified_type_name(), "[sales]]x].[Lines]");
}

//! Tests for MS SQL Server value conversion and connection settings

use crate::connection::{
    ConnectSettings, DEFAULT_PORT, MssqlConnectionError, TiberiusParam, column_data_to_value,
    column_type_to_db_type, value_to_tiberius_param,
};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use sproc_core::{ConnectionConfig, DbType, ErrorKind, SprocError, Value};
use tiberius::{ColumnData, ColumnType, ToSql};

/// Detach chrono-encoded column data from the value it was built from
fn owned(data: ColumnData<'_>) -> ColumnData<'static> {
    match data {
        ColumnData::Date(v) => ColumnData::Date(v),
        ColumnData::Time(v) => ColumnData::Time(v),
        ColumnData::DateTime2(v) => ColumnData::DateTime2(v),
        ColumnData::DateTimeOffset(v) => ColumnData::DateTimeOffset(v),
        other => panic!("unexpected column data {:?}", other),
    }
}

// ============================================================================
// Column data
// ============================================================================

#[test]
fn test_scalar_column_data() {
    assert_eq!(
        column_data_to_value(ColumnData::I32(Some(42))).unwrap(),
        Value::Int32(42)
    );
    assert_eq!(
        column_data_to_value(ColumnData::U8(Some(7))).unwrap(),
        Value::UInt8(7)
    );
    assert_eq!(
        column_data_to_value(ColumnData::Bit(Some(true))).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        column_data_to_value(ColumnData::String(Some("bob".into()))).unwrap(),
        Value::String("bob".to_string())
    );
    assert_eq!(
        column_data_to_value(ColumnData::Binary(Some(vec![1u8, 2].into()))).unwrap(),
        Value::Bytes(vec![1, 2])
    );
}

#[test]
fn test_null_column_data() {
    assert_eq!(column_data_to_value(ColumnData::I64(None)).unwrap(), Value::Null);
    assert_eq!(
        column_data_to_value(ColumnData::String(None)).unwrap(),
        Value::Null
    );
    assert_eq!(column_data_to_value(ColumnData::Date(None)).unwrap(), Value::Null);
}

#[test]
fn test_date_round_trip() {
    for date in [
        NaiveDate::from_ymd_opt(1, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(1999, 12, 31).unwrap(),
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
    ] {
        let data = owned(date.to_sql());
        assert_eq!(column_data_to_value(data).unwrap(), Value::Date(date));
    }
}

#[test]
fn test_time_and_datetime2() {
    let time = NaiveTime::from_hms_micro_opt(13, 45, 10, 250_000).unwrap();
    assert_eq!(
        column_data_to_value(owned(time.to_sql())).unwrap(),
        Value::Time(time)
    );

    let stamp = NaiveDate::from_ymd_opt(2023, 6, 1)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap();
    assert_eq!(
        column_data_to_value(owned(stamp.to_sql())).unwrap(),
        Value::DateTime(stamp)
    );
}

#[test]
fn test_datetimeoffset_is_utc() {
    let stamp = Utc.with_ymd_and_hms(2022, 11, 5, 23, 59, 1).unwrap();
    assert_eq!(
        column_data_to_value(owned(stamp.to_sql())).unwrap(),
        Value::DateTimeUtc(stamp)
    );
}

#[test]
fn test_column_types() {
    assert_eq!(column_type_to_db_type(ColumnType::Int4), Some(DbType::Int32));
    assert_eq!(column_type_to_db_type(ColumnType::NVarchar), Some(DbType::String));
    assert_eq!(
        column_type_to_db_type(ColumnType::Datetime2),
        Some(DbType::DateTime)
    );
    assert_eq!(column_type_to_db_type(ColumnType::Null), None);
}

// ============================================================================
// Parameters
// ============================================================================

#[test]
fn test_value_to_param() {
    assert_eq!(
        value_to_tiberius_param(&Value::Int64(9), DbType::Int64),
        TiberiusParam::I64(9)
    );
    assert_eq!(
        value_to_tiberius_param(&Value::Decimal("1.50".into()), DbType::Decimal),
        TiberiusParam::String("1.50".to_string())
    );
    assert_eq!(
        value_to_tiberius_param(&Value::Null, DbType::Guid),
        TiberiusParam::Null(DbType::Guid)
    );
}

#[test]
fn test_typed_null_encoding() {
    assert!(matches!(
        TiberiusParam::Null(DbType::Int64).to_sql(),
        ColumnData::I64(None)
    ));
    assert!(matches!(
        TiberiusParam::Null(DbType::String).to_sql(),
        ColumnData::String(None)
    ));
    assert!(matches!(
        TiberiusParam::Null(DbType::DateTime).to_sql(),
        ColumnData::DateTime2(None)
    ));
}

// ============================================================================
// Errors and settings
// ============================================================================

#[test]
fn test_error_mapping() {
    let closed: SprocError = MssqlConnectionError::ConnectionClosed.into();
    assert!(matches!(closed, SprocError::Connection(_)));

    let failed: SprocError = MssqlConnectionError::QueryFailed("deadlock".into()).into();
    assert!(matches!(failed, SprocError::Driver(ref m) if m.contains("deadlock")));
    assert_eq!(failed.kind(), ErrorKind::Execution);
}

#[test]
fn test_connect_settings_from_fields() {
    let config = ConnectionConfig::new_mssql("db.internal", 0, "shop", "sa")
        .with_password("secret")
        .with_param("trust_cert", true);

    assert_eq!(
        ConnectSettings::from_config(&config),
        ConnectSettings {
            host: "db.internal".to_string(),
            port: DEFAULT_PORT,
            database: Some("shop".to_string()),
            username: Some("sa".to_string()),
            password: Some("secret".to_string()),
            trust_cert: true,
        }
    );
}

#[test]
fn test_connect_settings_defaults_and_overrides() {
    let defaults = ConnectSettings::from_config(&ConnectionConfig::new("mssql"));
    assert_eq!(defaults.host, "localhost");
    assert_eq!(defaults.port, 1433);
    assert_eq!(defaults.username, None);
    assert!(!defaults.trust_cert);

    let mut config = ConnectionConfig::new("mssql").with_param("user", "reporting");
    config.port = 14330;
    let settings = ConnectSettings::from_config(&config);
    assert_eq!(settings.username.as_deref(), Some("reporting"));
    assert_eq!(settings.port, 14330);
}

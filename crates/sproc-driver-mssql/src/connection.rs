//! MS SQL Server connection implementation using tiberius

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use sproc_core::{
    ColumnMeta, Command, CommandState, Connection, ConnectionConfig, DbType, Result, ResultSet,
    Row, SprocError, Value,
};
use tiberius::{
    AuthMethod, Client, ColumnData, ColumnType, Config, EncryptionLevel, QueryItem,
    Row as TiberiusRow,
};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::command::MssqlCommand;
use crate::runtime;

/// Default SQL Server port
pub const DEFAULT_PORT: u16 = 1433;

/// MS SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MssqlConnectionError> for SprocError {
    fn from(err: MssqlConnectionError) -> Self {
        match err {
            MssqlConnectionError::ConnectionFailed(_)
            | MssqlConnectionError::AuthenticationFailed(_)
            | MssqlConnectionError::ConnectionClosed
            | MssqlConnectionError::Io(_) => SprocError::Connection(err.to_string()),
            MssqlConnectionError::QueryFailed(_)
            | MssqlConnectionError::TypeConversion(_)
            | MssqlConnectionError::Tiberius(_) => SprocError::Driver(err.to_string()),
        }
    }
}

/// MS SQL Server connection using tiberius
pub struct MssqlConnection {
    client: Mutex<Client<Compat<TcpStream>>>,
    closed: AtomicBool,
    database: Option<String>,
}

impl MssqlConnection {
    /// Create a new MS SQL Server connection
    ///
    /// # Arguments
    /// * `host` - Server hostname
    /// * `port` - Server port (default 1433)
    /// * `database` - Database name (optional)
    /// * `username` - Username (None for Windows auth)
    /// * `password` - Password
    /// * `trust_cert` - Whether to trust server certificate (for dev/testing)
    #[tracing::instrument(skip(password))]
    pub async fn connect(
        host: &str,
        port: u16,
        database: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
        trust_cert: bool,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        tracing::debug!("connecting to MS SQL Server at {}:{}", host, port);

        let mut config = Config::new();
        config.host(host);
        config.port(port);

        if let Some(db) = database {
            config.database(db);
        }

        if trust_cert {
            config.trust_cert();
        }

        config.encryption(EncryptionLevel::Required);

        match (username, password) {
            (Some(user), pass) => {
                config.authentication(AuthMethod::sql_server(user, pass.unwrap_or("")));
            }
            (None, _) => {
                #[cfg(windows)]
                {
                    config.authentication(AuthMethod::Integrated);
                }
                #[cfg(not(windows))]
                {
                    return Err(MssqlConnectionError::AuthenticationFailed(
                        "Windows authentication is only supported on Windows".to_string(),
                    ));
                }
            }
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tcp.set_nodelay(true)?;
        let compat_stream = tcp.compat_write();

        let client = Client::connect(config, compat_stream)
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tracing::debug!("successfully connected to MS SQL Server");

        Ok(Self {
            client: Mutex::new(client),
            closed: AtomicBool::new(false),
            database: database.map(String::from),
        })
    }

    /// Create connection from config with standard keys
    pub async fn from_config(
        config: &ConnectionConfig,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        let settings = ConnectSettings::from_config(config);
        Self::connect(
            &settings.host,
            settings.port,
            settings.database.as_deref(),
            settings.username.as_deref(),
            settings.password.as_deref(),
            settings.trust_cert,
        )
        .await
    }

    /// Connect on the shared driver runtime, for callers without one of their own
    pub fn connect_blocking(config: &ConnectionConfig) -> Result<Self> {
        runtime::block_on_tokio(Self::from_config(config))?.map_err(SprocError::from)
    }

    /// Name of the database selected at connect time
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Mark the connection closed; commands created afterwards fail
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("MS SQL Server connection closed");
    }

    pub(crate) fn ensure_not_closed(&self) -> std::result::Result<(), MssqlConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MssqlConnectionError::ConnectionClosed);
        }
        Ok(())
    }

    /// Run one batch and buffer every result set it produces, in order
    pub(crate) async fn query_sets(
        &self,
        sql: &str,
        params: &[TiberiusParam],
    ) -> std::result::Result<Vec<ResultSet>, MssqlConnectionError> {
        self.ensure_not_closed()?;
        let mut client = self.client.lock().await;

        let param_refs: Vec<&dyn tiberius::ToSql> = params
            .iter()
            .map(|p| p as &dyn tiberius::ToSql)
            .collect();
        let mut stream = client.query(sql, &param_refs[..]).await?;

        let mut sets: Vec<ResultSet> = Vec::new();
        let mut column_names: Vec<String> = Vec::new();
        while let Some(item) = stream.try_next().await? {
            match item {
                QueryItem::Metadata(meta) => {
                    let columns: Vec<ColumnMeta> = meta
                        .columns()
                        .iter()
                        .enumerate()
                        .map(|(idx, col)| tiberius_column_to_meta(col, idx))
                        .collect();
                    column_names = columns.iter().map(|c| c.name.clone()).collect();
                    sets.push(ResultSet {
                        columns,
                        rows: Vec::new(),
                    });
                }
                QueryItem::Row(row) => {
                    let values = tiberius_row_to_values(row)?;
                    match sets.last_mut() {
                        Some(set) => set.rows.push(Row::new(column_names.clone(), values)),
                        None => {
                            return Err(MssqlConnectionError::QueryFailed(
                                "row received before result set metadata".to_string(),
                            ));
                        }
                    }
                }
            }
        }

        Ok(sets)
    }
}

/// Connection settings resolved from a [`ConnectionConfig`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConnectSettings {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub trust_cert: bool,
}

impl ConnectSettings {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            host: config
                .get_string("host")
                .unwrap_or_else(|| "localhost".to_string()),
            port: if config.port > 0 {
                config.port
            } else {
                DEFAULT_PORT
            },
            database: config.get_string("database"),
            username: config
                .get_string("user")
                .or_else(|| config.get_string("username")),
            password: config.get_string("password"),
            trust_cert: config.get_flag("trust_cert"),
        }
    }
}

impl Connection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    fn create_command(&self) -> Result<Box<dyn Command + '_>> {
        self.ensure_not_closed()?;
        Ok(Box::new(MssqlCommand::new(self, CommandState::default())))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("database", &self.database)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Convert a tiberius column to ColumnMeta
fn tiberius_column_to_meta(col: &tiberius::Column, ordinal: usize) -> ColumnMeta {
    ColumnMeta::new(col.name(), column_type_to_db_type(col.column_type()), ordinal)
}

/// Map a wire column type to a parameter type, when the mapping is unambiguous
pub(crate) fn column_type_to_db_type(column_type: ColumnType) -> Option<DbType> {
    match column_type {
        ColumnType::Bit | ColumnType::Bitn => Some(DbType::Boolean),
        ColumnType::Int1 => Some(DbType::Byte),
        ColumnType::Int2 => Some(DbType::Int16),
        ColumnType::Int4 => Some(DbType::Int32),
        ColumnType::Int8 => Some(DbType::Int64),
        ColumnType::Float4 => Some(DbType::Single),
        ColumnType::Float8 => Some(DbType::Double),
        ColumnType::Decimaln | ColumnType::Numericn | ColumnType::Money | ColumnType::Money4 => {
            Some(DbType::Decimal)
        }
        ColumnType::Guid => Some(DbType::Guid),
        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText
        | ColumnType::Xml => Some(DbType::String),
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => Some(DbType::Binary),
        ColumnType::Daten => Some(DbType::Date),
        ColumnType::Timen => Some(DbType::Time),
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2 => Some(DbType::DateTime),
        ColumnType::DatetimeOffsetn => Some(DbType::DateTimeOffset),
        _ => None,
    }
}

/// Convert a tiberius row to a vector of Values by consuming the row
fn tiberius_row_to_values(
    row: TiberiusRow,
) -> std::result::Result<Vec<Value>, MssqlConnectionError> {
    row.into_iter().map(column_data_to_value).collect()
}

fn days_after(
    year: i32,
    days: u64,
) -> std::result::Result<NaiveDate, MssqlConnectionError> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|base| base.checked_add_days(Days::new(days)))
        .ok_or_else(|| {
            MssqlConnectionError::TypeConversion(format!(
                "{} days after {}-01-01 is out of range",
                days, year
            ))
        })
}

fn time_from_increments(increments: u64, scale: u8) -> NaiveTime {
    let nanos = increments as u128 * 10u128.pow(9u32.saturating_sub(scale as u32));
    let secs = (nanos / 1_000_000_000) as u32;
    let nano = (nanos % 1_000_000_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nano).unwrap_or_default()
}

fn datetime2_to_naive(
    value: tiberius::time::DateTime2,
) -> std::result::Result<NaiveDateTime, MssqlConnectionError> {
    let date = days_after(1, value.date().days() as u64)?;
    let time = time_from_increments(value.time().increments(), value.time().scale());
    Ok(NaiveDateTime::new(date, time))
}

/// Convert tiberius ColumnData to a sproc Value
pub(crate) fn column_data_to_value(
    col_data: ColumnData<'static>,
) -> std::result::Result<Value, MssqlConnectionError> {
    let value = match col_data {
        ColumnData::Bit(None)
        | ColumnData::U8(None)
        | ColumnData::I16(None)
        | ColumnData::I32(None)
        | ColumnData::I64(None)
        | ColumnData::F32(None)
        | ColumnData::F64(None)
        | ColumnData::String(None)
        | ColumnData::Guid(None)
        | ColumnData::Binary(None)
        | ColumnData::Numeric(None)
        | ColumnData::DateTime(None)
        | ColumnData::SmallDateTime(None)
        | ColumnData::DateTime2(None)
        | ColumnData::DateTimeOffset(None)
        | ColumnData::Date(None)
        | ColumnData::Time(None)
        | ColumnData::Xml(None) => Value::Null,
        ColumnData::Bit(Some(v)) => Value::Bool(v),
        ColumnData::U8(Some(v)) => Value::UInt8(v),
        ColumnData::I16(Some(v)) => Value::Int16(v),
        ColumnData::I32(Some(v)) => Value::Int32(v),
        ColumnData::I64(Some(v)) => Value::Int64(v),
        ColumnData::F32(Some(v)) => Value::Float32(v),
        ColumnData::F64(Some(v)) => Value::Float64(v),
        ColumnData::String(Some(v)) => Value::String(v.into_owned()),
        ColumnData::Guid(Some(v)) => Value::Uuid(v),
        ColumnData::Binary(Some(v)) => Value::Bytes(v.into_owned()),
        ColumnData::Numeric(Some(v)) => Value::Decimal(v.to_string()),
        ColumnData::DateTime(Some(v)) => {
            let date = days_after(1900, v.days() as u64)?;
            // 1/300 second ticks
            let nanos = v.seconds_fragments() as u64 * 1_000_000_000 / 300;
            let time = NaiveTime::from_num_seconds_from_midnight_opt(
                (nanos / 1_000_000_000) as u32,
                (nanos % 1_000_000_000) as u32,
            )
            .unwrap_or_default();
            Value::DateTime(NaiveDateTime::new(date, time))
        }
        ColumnData::SmallDateTime(Some(v)) => {
            let date = days_after(1900, v.days() as u64)?;
            let time =
                NaiveTime::from_num_seconds_from_midnight_opt(v.seconds_fragments() as u32 * 60, 0)
                    .unwrap_or_default();
            Value::DateTime(NaiveDateTime::new(date, time))
        }
        ColumnData::DateTime2(Some(v)) => Value::DateTime(datetime2_to_naive(v)?),
        ColumnData::DateTimeOffset(Some(v)) => {
            let naive = datetime2_to_naive(v.datetime2())?;
            Value::DateTimeUtc(chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(
                naive,
                chrono::Utc,
            ))
        }
        ColumnData::Date(Some(v)) => Value::Date(days_after(1, v.days() as u64)?),
        ColumnData::Time(Some(v)) => Value::Time(time_from_increments(v.increments(), v.scale())),
        ColumnData::Xml(Some(v)) => Value::String(v.into_owned().into_string()),
    };
    Ok(value)
}

/// Container for tiberius parameter values
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TiberiusParam {
    /// A typed NULL
    Null(DbType),
    Bool(bool),
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
}

impl tiberius::ToSql for TiberiusParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            TiberiusParam::Null(db_type) => null_column(*db_type),
            TiberiusParam::Bool(v) => ColumnData::Bit(Some(*v)),
            TiberiusParam::U8(v) => ColumnData::U8(Some(*v)),
            TiberiusParam::I16(v) => ColumnData::I16(Some(*v)),
            TiberiusParam::I32(v) => ColumnData::I32(Some(*v)),
            TiberiusParam::I64(v) => ColumnData::I64(Some(*v)),
            TiberiusParam::F32(v) => ColumnData::F32(Some(*v)),
            TiberiusParam::F64(v) => ColumnData::F64(Some(*v)),
            TiberiusParam::String(v) => {
                ColumnData::String(Some(std::borrow::Cow::Borrowed(v.as_str())))
            }
            TiberiusParam::Bytes(v) => {
                ColumnData::Binary(Some(std::borrow::Cow::Borrowed(v.as_slice())))
            }
            TiberiusParam::Uuid(v) => ColumnData::Guid(Some(*v)),
            TiberiusParam::Date(v) => tiberius::ToSql::to_sql(v),
            TiberiusParam::Time(v) => tiberius::ToSql::to_sql(v),
            TiberiusParam::DateTime(v) => tiberius::ToSql::to_sql(v),
            TiberiusParam::DateTimeUtc(v) => tiberius::ToSql::to_sql(v),
        }
    }
}

fn null_column(db_type: DbType) -> ColumnData<'static> {
    match db_type {
        DbType::Boolean => ColumnData::Bit(None),
        DbType::Byte => ColumnData::U8(None),
        DbType::Int16 => ColumnData::I16(None),
        DbType::Int32 | DbType::Structured => ColumnData::I32(None),
        DbType::Int64 => ColumnData::I64(None),
        DbType::Single => ColumnData::F32(None),
        DbType::Double => ColumnData::F64(None),
        DbType::Decimal | DbType::String => ColumnData::String(None),
        DbType::Binary => ColumnData::Binary(None),
        DbType::Guid => ColumnData::Guid(None),
        DbType::Date => ColumnData::Date(None),
        DbType::Time => ColumnData::Time(None),
        DbType::DateTime => ColumnData::DateTime2(None),
        DbType::DateTimeOffset => ColumnData::DateTimeOffset(None),
    }
}

/// Convert a sproc Value to a tiberius parameter.
///
/// `db_type` types NULLs so the server sees the declared parameter type.
pub(crate) fn value_to_tiberius_param(value: &Value, db_type: DbType) -> TiberiusParam {
    match value {
        Value::Null => TiberiusParam::Null(db_type),
        Value::Bool(b) => TiberiusParam::Bool(*b),
        Value::UInt8(i) => TiberiusParam::U8(*i),
        Value::Int16(i) => TiberiusParam::I16(*i),
        Value::Int32(i) => TiberiusParam::I32(*i),
        Value::Int64(i) => TiberiusParam::I64(*i),
        Value::Float32(f) => TiberiusParam::F32(*f),
        Value::Float64(f) => TiberiusParam::F64(*f),
        Value::Decimal(d) => TiberiusParam::String(d.clone()),
        Value::String(s) => TiberiusParam::String(s.clone()),
        Value::Bytes(b) => TiberiusParam::Bytes(b.clone()),
        Value::Uuid(u) => TiberiusParam::Uuid(*u),
        Value::Date(d) => TiberiusParam::Date(*d),
        Value::Time(t) => TiberiusParam::Time(*t),
        Value::DateTime(dt) => TiberiusParam::DateTime(*dt),
        Value::DateTimeUtc(dt) => TiberiusParam::DateTimeUtc(*dt),
    }
}

//! Conversions between Rust values and driver values
//!
//! Contract methods only ever see Rust types; the executor only ever sees
//! [`Value`]s. The traits here sit between the two:
//!
//! - [`Scalar`] for single bindable values, including `Option<T>` for NULL
//! - [`Record`] for flat structs declared with `record!`
//! - [`SqlType`] / [`ParamType`] describe a type for the analyzer
//! - [`Argument`] turns a live argument into an [`Arg`]
//! - [`FromRow`] / [`FromResult`] turn decoded rows back into the return type

use crate::describe::{PassingMode, RecordDesc, TypeDesc};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sproc_core::{DbType, DecodeError, Result, SprocError, Value};
use uuid::Uuid;

/// Binary data bound as `varbinary`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Binary(pub Vec<u8>);

/// A single bindable value
pub trait Scalar: Sized + Send + 'static {
    fn db_type() -> DbType;

    fn type_name() -> &'static str;

    fn nullable() -> bool {
        false
    }

    fn to_value(&self) -> Value;

    fn from_value(value: Value, column: &str) -> std::result::Result<Self, DecodeError>;
}

/// A flat struct whose members are scalars
pub trait Record: Sized + Send + 'static {
    fn record_desc() -> RecordDesc;

    /// Member values in declaration order
    fn to_values(&self) -> Vec<Value>;
}

/// Describes a type used as a return type or sequence element
pub trait SqlType {
    fn describe() -> TypeDesc;
}

/// Describes a type used as a parameter
pub trait ParamType {
    fn param_desc() -> (TypeDesc, PassingMode);
}

/// Receives a value read back from the server into a caller's `&mut T`.
///
/// Write-back is two-phase so that a failed conversion of one output leaves
/// every caller location untouched.
pub trait OutputSlot {
    fn stage(&mut self, value: Value, column: &str) -> std::result::Result<(), DecodeError>;

    fn commit(&mut self);
}

/// A live argument, lowered to driver values
pub enum Arg<'a> {
    /// A scalar input
    Value(Value),
    /// A record input, one value per member
    Members(Vec<Value>),
    /// Rows for a table-valued parameter
    Rows(Vec<Vec<Value>>),
    /// A by-reference output with its current value
    Output {
        current: Value,
        slot: Option<Box<dyn OutputSlot + Send + 'a>>,
    },
}

impl std::fmt::Debug for Arg<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Arg::Members(v) => f.debug_tuple("Members").field(v).finish(),
            Arg::Rows(v) => f.debug_tuple("Rows").field(v).finish(),
            Arg::Output { current, slot } => f
                .debug_struct("Output")
                .field("current", current)
                .field("attached", &slot.is_some())
                .finish(),
        }
    }
}

/// Lowers a live argument for the executor
pub trait Argument<'a> {
    fn into_arg(self) -> Arg<'a>;

    /// Lower without keeping a borrow of the caller's output location
    fn into_detached(self) -> Arg<'static>;
}

/// Builds a row type from values in decode order
pub trait FromRow: Sized {
    fn from_row(values: Vec<Value>) -> std::result::Result<Self, DecodeError>;
}

/// What the executor produced for one call, before typing
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Void,
    ReturnValue(i32),
    /// Decoded rows per result set, each row in decode order
    Sets(Vec<Vec<Vec<Value>>>),
}

/// Builds a method's return type from a [`ResultValue`]
pub trait FromResult: Sized {
    fn from_result(value: ResultValue) -> Result<Self>;
}

fn mismatch<T: Scalar>(column: &str, found: &Value) -> DecodeError {
    if found.is_null() {
        DecodeError::UnexpectedNull(column.to_string())
    } else {
        DecodeError::TypeMismatch {
            column: column.to_string(),
            expected: T::type_name().to_string(),
            found: found.type_name().to_string(),
        }
    }
}

fn scalar_desc<T: Scalar>() -> TypeDesc {
    TypeDesc::Scalar {
        db_type: T::db_type(),
        name: T::type_name(),
        nullable: T::nullable(),
    }
}

/// Label used for the single unnamed column of a scalar row
pub const SCALAR_COLUMN: &str = "[0]";

fn scalar_from_row<T: Scalar>(values: Vec<Value>) -> std::result::Result<T, DecodeError> {
    let value = values.into_iter().next().unwrap_or(Value::Null);
    T::from_value(value, SCALAR_COLUMN)
}

macro_rules! scalar {
    ($ty:ty, $name:literal, $db:ident, |$this:ident| $to:expr, {$($pat:pat => $conv:expr),+ $(,)?}) => {
        impl Scalar for $ty {
            fn db_type() -> DbType {
                DbType::$db
            }

            fn type_name() -> &'static str {
                $name
            }

            fn to_value(&self) -> Value {
                let $this = self;
                $to
            }

            fn from_value(value: Value, column: &str) -> std::result::Result<Self, DecodeError> {
                match value {
                    $($pat => Ok($conv),)+
                    other => Err(mismatch::<Self>(column, &other)),
                }
            }
        }

        impl SqlType for $ty {
            fn describe() -> TypeDesc {
                scalar_desc::<$ty>()
            }
        }

        impl ParamType for $ty {
            fn param_desc() -> (TypeDesc, PassingMode) {
                (scalar_desc::<$ty>(), PassingMode::Value)
            }
        }

        impl<'a> Argument<'a> for $ty {
            fn into_arg(self) -> Arg<'a> {
                Arg::Value(Scalar::to_value(&self))
            }

            fn into_detached(self) -> Arg<'static> {
                Arg::Value(Scalar::to_value(&self))
            }
        }

        impl FromRow for $ty {
            fn from_row(values: Vec<Value>) -> std::result::Result<Self, DecodeError> {
                scalar_from_row(values)
            }
        }
    };
}

scalar!(bool, "bool", Boolean, |v| Value::Bool(*v), {
    Value::Bool(v) => v,
});
scalar!(u8, "u8", Byte, |v| Value::UInt8(*v), {
    Value::UInt8(v) => v,
});
scalar!(i16, "i16", Int16, |v| Value::Int16(*v), {
    Value::Int16(v) => v,
    Value::UInt8(v) => v as i16,
});
scalar!(i32, "i32", Int32, |v| Value::Int32(*v), {
    Value::Int32(v) => v,
    Value::Int16(v) => v as i32,
    Value::UInt8(v) => v as i32,
});
scalar!(i64, "i64", Int64, |v| Value::Int64(*v), {
    Value::Int64(v) => v,
    Value::Int32(v) => v as i64,
    Value::Int16(v) => v as i64,
    Value::UInt8(v) => v as i64,
});
scalar!(f32, "f32", Single, |v| Value::Float32(*v), {
    Value::Float32(v) => v,
});
scalar!(f64, "f64", Double, |v| Value::Float64(*v), {
    Value::Float64(v) => v,
    Value::Float32(v) => v as f64,
});
scalar!(String, "String", String, |v| Value::String(v.clone()), {
    Value::String(v) => v,
    Value::Decimal(v) => v,
});
scalar!(Binary, "Binary", Binary, |v| Value::Bytes(v.0.clone()), {
    Value::Bytes(v) => Binary(v),
});
scalar!(Uuid, "Uuid", Guid, |v| Value::Uuid(*v), {
    Value::Uuid(v) => v,
});
scalar!(NaiveDate, "NaiveDate", Date, |v| Value::Date(*v), {
    Value::Date(v) => v,
    Value::DateTime(v) => v.date(),
});
scalar!(NaiveTime, "NaiveTime", Time, |v| Value::Time(*v), {
    Value::Time(v) => v,
});
scalar!(NaiveDateTime, "NaiveDateTime", DateTime, |v| Value::DateTime(*v), {
    Value::DateTime(v) => v,
    Value::Date(v) => v.and_time(NaiveTime::default()),
});
scalar!(DateTime<Utc>, "DateTime<Utc>", DateTimeOffset, |v| Value::DateTimeUtc(*v), {
    Value::DateTimeUtc(v) => v,
});

impl<T: Scalar> Scalar for Option<T> {
    fn db_type() -> DbType {
        T::db_type()
    }

    fn type_name() -> &'static str {
        T::type_name()
    }

    fn nullable() -> bool {
        true
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value, column: &str) -> std::result::Result<Self, DecodeError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value, column).map(Some)
        }
    }
}

impl<T: Scalar> SqlType for Option<T> {
    fn describe() -> TypeDesc {
        scalar_desc::<Self>()
    }
}

impl<T: Scalar> ParamType for Option<T> {
    fn param_desc() -> (TypeDesc, PassingMode) {
        (scalar_desc::<Self>(), PassingMode::Value)
    }
}

impl<'a, T: Scalar> Argument<'a> for Option<T> {
    fn into_arg(self) -> Arg<'a> {
        Arg::Value(self.to_value())
    }

    fn into_detached(self) -> Arg<'static> {
        Arg::Value(self.to_value())
    }
}

impl<T: Scalar> FromRow for Option<T> {
    fn from_row(values: Vec<Value>) -> std::result::Result<Self, DecodeError> {
        scalar_from_row(values)
    }
}

impl ParamType for &str {
    fn param_desc() -> (TypeDesc, PassingMode) {
        (scalar_desc::<String>(), PassingMode::Value)
    }
}

impl<'a> Argument<'a> for &str {
    fn into_arg(self) -> Arg<'a> {
        Arg::Value(Value::String(self.to_string()))
    }

    fn into_detached(self) -> Arg<'static> {
        Arg::Value(Value::String(self.to_string()))
    }
}

struct ScalarSlot<'a, T> {
    target: &'a mut T,
    staged: Option<T>,
}

impl<T: Scalar> OutputSlot for ScalarSlot<'_, T> {
    fn stage(&mut self, value: Value, column: &str) -> std::result::Result<(), DecodeError> {
        self.staged = Some(T::from_value(value, column)?);
        Ok(())
    }

    fn commit(&mut self) {
        if let Some(value) = self.staged.take() {
            *self.target = value;
        }
    }
}

impl<T: Scalar> ParamType for &mut T {
    fn param_desc() -> (TypeDesc, PassingMode) {
        (scalar_desc::<T>(), PassingMode::Reference)
    }
}

impl<'a, T: Scalar> Argument<'a> for &'a mut T {
    fn into_arg(self) -> Arg<'a> {
        Arg::Output {
            current: self.to_value(),
            slot: Some(Box::new(ScalarSlot {
                target: self,
                staged: None,
            })),
        }
    }

    fn into_detached(self) -> Arg<'static> {
        Arg::Output {
            current: self.to_value(),
            slot: None,
        }
    }
}

impl<T: SqlType> SqlType for Vec<T> {
    fn describe() -> TypeDesc {
        TypeDesc::sequence(T::describe())
    }
}

impl<T: SqlType> ParamType for Vec<T> {
    fn param_desc() -> (TypeDesc, PassingMode) {
        (TypeDesc::sequence(T::describe()), PassingMode::Value)
    }
}

impl<'a, R: Record> Argument<'a> for Vec<R> {
    fn into_arg(self) -> Arg<'a> {
        Arg::Rows(self.iter().map(Record::to_values).collect())
    }

    fn into_detached(self) -> Arg<'static> {
        Arg::Rows(self.iter().map(Record::to_values).collect())
    }
}

impl SqlType for () {
    fn describe() -> TypeDesc {
        TypeDesc::Unit
    }
}

macro_rules! tuple_sql_type {
    ($($name:ident),+) => {
        impl<$($name: SqlType),+> SqlType for ($($name,)+) {
            fn describe() -> TypeDesc {
                TypeDesc::Tuple(vec![$($name::describe()),+])
            }
        }
    };
}

tuple_sql_type!(A);
tuple_sql_type!(A, B);
tuple_sql_type!(A, B, C);
tuple_sql_type!(A, B, C, D);
tuple_sql_type!(A, B, C, D, E);
tuple_sql_type!(A, B, C, D, E, F);
tuple_sql_type!(A, B, C, D, E, F, G);
tuple_sql_type!(A, B, C, D, E, F, G, H);

impl FromResult for ResultValue {
    fn from_result(value: ResultValue) -> Result<Self> {
        Ok(value)
    }
}

impl FromResult for () {
    fn from_result(value: ResultValue) -> Result<Self> {
        match value {
            ResultValue::Void => Ok(()),
            other => Err(unexpected_result("()", &other)),
        }
    }
}

impl FromResult for i32 {
    fn from_result(value: ResultValue) -> Result<Self> {
        match value {
            ResultValue::ReturnValue(v) => Ok(v),
            other => Err(unexpected_result("i32", &other)),
        }
    }
}

impl<T: FromRow> FromResult for Vec<T> {
    fn from_result(value: ResultValue) -> Result<Self> {
        let mut sets = expect_sets(value, 1)?.into_iter();
        decode_rows(sets.next().unwrap_or_default())
    }
}

macro_rules! tuple_from_result {
    ($count:literal; $($name:ident),+) => {
        impl<$($name: FromRow),+> FromResult for ($(Vec<$name>,)+) {
            fn from_result(value: ResultValue) -> Result<Self> {
                let mut sets = expect_sets(value, $count)?.into_iter();
                Ok(($(decode_rows::<$name>(sets.next().unwrap_or_default())?,)+))
            }
        }
    };
}

tuple_from_result!(1; A);
tuple_from_result!(2; A, B);
tuple_from_result!(3; A, B, C);
tuple_from_result!(4; A, B, C, D);
tuple_from_result!(5; A, B, C, D, E);
tuple_from_result!(6; A, B, C, D, E, F);
tuple_from_result!(7; A, B, C, D, E, F, G);

fn unexpected_result(expected: &str, found: &ResultValue) -> SprocError {
    SprocError::Internal(format!(
        "call plan produced {:?} for a method returning {}",
        found, expected
    ))
}

fn expect_sets(value: ResultValue, expected: usize) -> Result<Vec<Vec<Vec<Value>>>> {
    match value {
        ResultValue::Sets(sets) if sets.len() == expected => Ok(sets),
        ResultValue::Sets(sets) => Err(DecodeError::ResultSetCount {
            expected,
            found: sets.len(),
        }
        .into()),
        other => Err(unexpected_result("result sets", &other)),
    }
}

fn decode_rows<T: FromRow>(rows: Vec<Vec<Value>>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| T::from_row(row).map_err(SprocError::from))
        .collect()
}

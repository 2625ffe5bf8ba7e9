//! Typed proxies over stored procedures
//!
//! A stored-procedure surface is declared once as a Rust trait. Each method
//! is analyzed and compiled into a call plan the first time the contract is
//! used; proxies then forward every call through the cached plan:
//!
//! ```ignore
//! use sproc::{contract, record, ConnectionExt};
//!
//! record! {
//!     #[derive(Debug, Clone, PartialEq)]
//!     pub struct Customer {
//!         pub id: i32,
//!         pub name: String,
//!     }
//! }
//!
//! contract! {
//!     pub trait Customers {
//!         fn find_customers(&self, name: String) -> Vec<Customer>;
//!         async fn touch_async(&self, id: i32) -> i32;
//!     }
//! }
//!
//! let proxy = connection.generate_proxy::<dyn Customers>()?;
//! let found = proxy.find_customers("Ada".into())?;
//! ```

mod analyzer;
mod compiler;
mod config;
mod convert;
mod describe;
mod executor;
mod macros;
mod plan;
mod proxy;
mod registry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
mod analyzer_tests;
#[cfg(test)]
mod compiler_tests;
#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod convert_tests;
#[cfg(test)]
mod executor_tests;
#[cfg(test)]
mod registry_tests;

pub use analyzer::{
    ContractParameter, ElementShape, MethodContract, ParamDirection, ParamKind, ReturnShape,
    analyze, check_contract,
};
pub use compiler::compile;
pub use config::ProxyConfig;
pub use convert::{
    Arg, Argument, Binary, FromResult, FromRow, OutputSlot, ParamType, Record, ResultValue,
    SCALAR_COLUMN, Scalar, SqlType,
};
pub use describe::{
    ColumnDesc, Contract, ContractDescription, ContractKind, DEFAULT_SCHEMA, MethodSignature,
    ParamSignature, PassingMode, RETURN_VALUE_ATTRIBUTE, RecordDesc, TableTypeName, TypeDesc,
};
pub use executor::{BoundCommand, execute, execute_async, render_call};
pub use plan::{
    BindingSource, ParameterBinding, ProcedureCallPlan, RETURN_VALUE_PARAMETER, ResultShape,
    RowDecoder, TableBinding, WriteBack,
};
pub use proxy::{ConnectionExt, Proxy, ProxyFactory, generate_proxy};
pub use registry::{DispatchTable, PlanRegistry};

pub use futures::future::BoxFuture;
pub use sproc_core::{
    ColumnMeta, Command, CommandState, CommandType, Connection, ConnectionConfig,
    DEFAULT_COMMAND_TIMEOUT, DataReader, DbType, DecodeError, ErrorKind, MAX_RESULT_SETS,
    MaterializedReader, Parameter, ParameterDirection, Result, ResultSet, Row, ShapeError,
    ShapeErrorReason, SprocError, TableValue, Value,
};

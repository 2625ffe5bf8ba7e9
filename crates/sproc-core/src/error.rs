//! Error types for sproc

use thiserror::Error;

/// Core error type for stored-procedure proxy operations
#[derive(Error, Debug)]
pub enum SprocError {
    #[error("Contract shape error: {0}")]
    ContractShape(#[from] ShapeError),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`SprocError`].
///
/// Contract problems are detected once when a plan is compiled, precondition
/// problems before any plan work, and the remaining two per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The contract itself cannot be compiled into a call plan
    ContractShape,
    /// The proxy factory was handed unusable inputs
    Precondition,
    /// The driver failed while running the command
    Execution,
    /// A result row did not match the declared element type
    Decode,
}

impl SprocError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SprocError::ContractShape(_) => ErrorKind::ContractShape,
            SprocError::Precondition(_) | SprocError::Configuration(_) => ErrorKind::Precondition,
            SprocError::Decode(_) => ErrorKind::Decode,
            SprocError::Connection(_)
            | SprocError::Driver(_)
            | SprocError::Timeout(_)
            | SprocError::NotSupported(_)
            | SprocError::Internal(_) => ErrorKind::Execution,
        }
    }

    /// Whether this error was raised while a command was running
    pub fn is_execution(&self) -> bool {
        self.kind() == ErrorKind::Execution
    }
}

/// A contract method that cannot be turned into a call plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{contract}::{method}: {reason}")]
pub struct ShapeError {
    /// Contract (trait) name
    pub contract: String,
    /// Method name, empty when the whole contract is rejected
    pub method: String,
    /// What is wrong with the signature
    pub reason: ShapeErrorReason,
}

impl ShapeError {
    pub fn new(
        contract: impl Into<String>,
        method: impl Into<String>,
        reason: ShapeErrorReason,
    ) -> Self {
        Self {
            contract: contract.into(),
            method: method.into(),
            reason,
        }
    }
}

/// Reasons a contract method is rejected at compile time
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeErrorReason {
    #[error("can only generate a proxy for interface contracts")]
    NotAnInterface,

    #[error("can not return an output parameter from a stored procedure asynchronously (parameter `{0}`)")]
    AsyncOutputParameter(String),

    #[error("unsupported return type `{0}`")]
    UnsupportedReturn(String),

    #[error("can only return a tuple with every element being a sequence of one row type, element {index} is `{found}`")]
    MalformedTupleElement { index: usize, found: String },

    #[error("tuple of {0} result sets exceeds the supported maximum of {max}", max = crate::MAX_RESULT_SETS)]
    TooManyResultSets(usize),

    #[error("parameter `{name}` has unsupported type `{found}`")]
    UnsupportedParameter { name: String, found: String },

    #[error("sequence parameter `{name}` needs an element record with a table type annotation, found `{found}`")]
    MissingTableType { name: String, found: String },

    #[error("return value parameter `{0}` must be the last parameter, an output, and of type i32")]
    InvalidReturnValueParameter(String),

    #[error("method returns i32 and also declares return value parameter `{0}`")]
    AmbiguousReturnValue(String),

    #[error("unknown annotation `{0}`")]
    UnknownAnnotation(String),

    #[error("duplicate parameter name `{0}`")]
    DuplicateParameter(String),

    #[error("procedure name is empty")]
    EmptyProcedureName,
}

/// A result row or output value whose shape does not match the declared type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("result set {set} has no column `{column}`")]
    MissingColumn { set: usize, column: String },

    #[error("column `{column}` expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("column `{0}` is NULL but the target type is not optional")]
    UnexpectedNull(String),

    #[error("expected {expected} result sets, the procedure returned {found}")]
    ResultSetCount { expected: usize, found: usize },

    #[error("expected {expected} values in row, found {found}")]
    RowWidth { expected: usize, found: usize },

    #[error("output parameter `{0}` was not returned by the driver")]
    MissingOutput(String),
}

/// Result type alias for sproc operations
pub type Result<T> = std::result::Result<T, SprocError>;

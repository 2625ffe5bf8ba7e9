//! sproc core - driver-facing abstractions for stored-procedure proxies
//!
//! This crate defines the boundary between the contract compiler and the
//! database driver that actually talks to the server:
//!
//! - `Connection` - factory for commands scoped to an open connection
//! - `Command` - a stored-procedure command with parameters and sync/async execution
//! - `DataReader` - forward-only reader over one or more result sets
//! - Common types like `Value`, `DbType`, `Parameter`, `Row`, etc.
//! - `SprocError`, the error taxonomy shared by every crate in the workspace

mod command;
mod connection;
mod error;
mod reader;
mod types;

pub use command::*;
pub use connection::*;
pub use error::*;
pub use reader::*;
pub use types::*;

#[cfg(test)]
mod types_tests;

//! MS SQL Server driver for sproc
//!
//! Implements the `Connection`/`Command` pair from `sproc-core` over tiberius.
//! Stored-procedure commands are lowered to a single T-SQL batch that declares
//! local variables for output parameters, fills table-valued parameters, runs
//! `EXEC` and selects the return status and outputs as a trailing row.
//!
//! ```ignore
//! use std::sync::Arc;
//! use sproc::{Connection, ConnectionExt};
//! use sproc_driver_mssql::MssqlConnection;
//!
//! let connection: Arc<dyn Connection> = Arc::new(
//!     MssqlConnection::connect("localhost", 1433, Some("shop"), Some("sa"), Some("secret"), true)
//!         .await?,
//! );
//! let customers = connection.generate_proxy::<dyn Customers>()?;
//! let rows = customers.find_customers_async(filter).await?;
//! ```

mod command;
mod connection;
mod runtime;

#[cfg(test)]
mod command_tests;
#[cfg(test)]
mod connection_tests;

pub use command::{MAX_PARAMETERS, MssqlCommand, STATUS_RETURN_COLUMN, STATUS_ROWS_COLUMN};
pub use connection::{DEFAULT_PORT, MssqlConnection, MssqlConnectionError};
pub use runtime::{block_on_tokio, get_tokio_runtime};

//! Tokio runtime for synchronous command execution
//!
//! tiberius needs a Tokio reactor. Synchronous callers have none, so their
//! commands run on a small shared runtime owned by the driver.

use std::sync::LazyLock;

use sproc_core::{Result, SprocError};
use tokio::runtime::Runtime;

/// Shared Tokio runtime for blocking driver calls
static TOKIO_RUNTIME: LazyLock<std::result::Result<Runtime, String>> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("sproc-mssql-runtime")
        .build()
        .map_err(|e| e.to_string())
});

/// Get the shared Tokio runtime, creating it on first use
pub fn get_tokio_runtime() -> Result<&'static Runtime> {
    TOKIO_RUNTIME.as_ref().map_err(|e| {
        SprocError::Internal(format!("failed to create Tokio runtime for the driver: {}", e))
    })
}

/// Run a future to completion on the shared runtime.
///
/// Blocks the current thread; must not be called from inside another runtime.
pub fn block_on_tokio<F, T>(future: F) -> Result<T>
where
    F: std::future::Future<Output = T>,
{
    Ok(get_tokio_runtime()?.block_on(future))
}

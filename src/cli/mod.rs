//! Command implementations for the `insights` binary

pub mod index;
pub mod list;
pub mod report;
pub mod search;
pub mod stats;
pub mod sync;

use anyhow::Result;

/// Multi-threaded runtime for the commands that drive the sync controller
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

//! TFTP client implementation
//!
//! - `client`: Request delivery and the client side of both transfer kinds
//! - `config`: Client configuration

#[allow(clippy::module_inception)]
mod client;
mod config;

use std::sync::Arc;

use anyhow::Result;

use crate::logging::{LogFacade, Logger};
use crate::store::LocalStore;

// Public client types
pub use client::Client;
pub use config::ClientConfig;

/// What the client should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Direction {
    /// Download the remote file
    Read(String),
    /// Upload the local file
    Write(String),
}

/// Run one client transfer against the configured server
pub async fn run(config: ClientConfig, direction: Direction) -> Result<()> {
    let logger: Arc<dyn Logger> = Arc::new(LogFacade);
    let store = Arc::new(LocalStore::new(config.output_directory.clone()));
    let client = Client::new(config, store, logger);

    match direction {
        Direction::Read(path) => client.request_file(&path).await?,
        Direction::Write(path) => client.write_file(&path).await?,
    };
    Ok(())
}

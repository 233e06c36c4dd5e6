//! TFTP server implementation
//!
//! This module provides complete TFTP server functionality:
//! - `server`: Rendezvous socket and request dispatch
//! - `worker`: One task per transfer
//! - `config`: Server configuration

mod config;
#[allow(clippy::module_inception)]
mod server;
mod worker;

use std::sync::Arc;

use anyhow::Result;

use crate::logging::{LogFacade, Logger};
use crate::store::RootedStore;

// Public server types
pub use config::Config;
pub use server::Server;
pub use worker::{Request, Worker};

/// Run the TFTP server until Ctrl+C, then drain active transfers
pub async fn run(config: Config) -> Result<()> {
    let logger: Arc<dyn Logger> = Arc::new(LogFacade);

    logger.info(format_args!("Starting TFTP server on {}", config.bind_addr()));
    logger.info(format_args!("Serving files from: {}", config.send_directory.display()));
    logger.info(format_args!(
        "Storing uploads in: {}",
        config.receive_directory.display()
    ));
    logger.info(format_args!("Read-only mode: {}", config.read_only));

    for dir in [&config.send_directory, &config.receive_directory] {
        if !dir.is_dir() {
            logger.error(format_args!("Directory does not exist: {}", dir.display()));
            anyhow::bail!("Directory does not exist: {}", dir.display());
        }
    }

    let store = Arc::new(RootedStore::new(
        config.send_directory.clone(),
        config.receive_directory.clone(),
        config.overwrite,
    ));
    let server = Server::new(&config, store, Arc::clone(&logger)).await?;

    logger.info(format_args!("TFTP server listening, press Ctrl+C to stop"));
    let signal_logger = Arc::clone(&logger);
    server
        .listen(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                signal_logger.warn(format_args!("Failed to listen for Ctrl+C: {}", e));
                std::future::pending::<()>().await;
            }
        })
        .await
}

//! TFTP (Trivial File Transfer Protocol) implementation
//!
//! This crate implements TFTP as described in
//! [RFC 1350](https://www.rfc-editor.org/rfc/rfc1350), protocol version 2:
//! 512-byte blocks, one block in flight, lock-step acknowledgements. Option
//! negotiation (RFC 2347 and its extensions) is not supported, and every
//! transfer mode is carried as raw octets.
//!
//! ## Module Structure
//!
//! ```text
//! rtftp/
//! ├── core/           # Core protocol implementation
//! │   ├── packet      # Packet serialization/deserialization
//! │   ├── blocks      # Splitting content into blocks
//! │   ├── socket      # Per-transfer UDP endpoint
//! │   ├── transfer    # Source/sink state machines
//! │   └── tid         # Transfer identifier allocation
//! │
//! ├── server/         # TFTP server
//! │   ├── server      # Rendezvous socket and dispatch
//! │   ├── worker      # One task per transfer
//! │   └── config      # Server configuration
//! │
//! ├── client/         # TFTP client
//! ├── store           # Filesystem access
//! ├── logging         # Injected logging capability
//! ├── config          # TOML configuration file
//! └── cli             # Command-line flags
//! ```
//!
//! ## Usage Examples
//!
//! ### Start TFTP Server
//!
//! ```rust,no_run
//! use rtftp::server::{self, Config};
//! use std::path::PathBuf;
//!
//! # async fn start() -> anyhow::Result<()> {
//! let config = Config::new("0.0.0.0".parse()?, 69, PathBuf::from("/var/tftp"), false);
//! server::run(config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Download a file
//!
//! ```rust,no_run
//! use rtftp::client::{self, ClientConfig, Direction};
//!
//! # async fn fetch() -> anyhow::Result<()> {
//! let config = ClientConfig::new("192.168.1.100".parse()?, 69);
//! client::run(config, Direction::Read("pxelinux.0".to_string())).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod core;
pub mod logging;
pub mod server;
pub mod store;

//! TFTP core protocol implementation
//!
//! This module contains the pieces shared by server and client:
//! - `packet`: Packet serialization and deserialization
//! - `blocks`: Splitting content into 512-byte blocks
//! - `socket`: The per-transfer UDP endpoint
//! - `transfer`: Source and sink state machines
//! - `tid`: Transfer identifier (port) allocation
//! - `error`: Session failure taxonomy

pub mod blocks;
mod error;
mod packet;
mod socket;
pub mod tid;
mod transfer;

// Public core types
pub use blocks::BLOCK_SIZE;
pub use error::TransferError;
pub use packet::{ErrorCode, MAX_PACKET_SIZE, Packet, PacketError, TransferMode};
pub use socket::{RECV_BUFFER_SIZE, Socket};
pub use tid::{TidAllocator, TidLease};
pub use transfer::{Session, TransferConfig, TransferStats};

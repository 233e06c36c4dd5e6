use std::io;

use thiserror::Error;

use super::packet::{ErrorCode, PacketError};
use crate::store::StoreError;

/// Why a transfer session ended without completing
#[derive(Debug, Error)]
pub enum TransferError {
    /// A datagram could not be decoded
    #[error("malformed packet: {0}")]
    Packet(#[from] PacketError),

    /// Socket bind, send or receive failed
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// A well-formed packet that is not valid in the current state
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The peer aborted the transfer with an ERROR packet
    #[error("peer aborted with {code}: {msg}")]
    Peer { code: ErrorCode, msg: String },

    /// The filesystem collaborator failed
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// No reply after the last retransmission
    #[error("timed out after {retries} retransmissions")]
    Timeout { retries: u32 },
}

impl TransferError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        TransferError::Protocol(msg.into())
    }

    /// Code of the ERROR packet owed to the peer, if any.
    ///
    /// Peer aborts, timeouts and broken sockets end the session silently.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            TransferError::Packet(_) | TransferError::Protocol(_) => {
                Some(ErrorCode::IllegalOperation)
            }
            TransferError::Storage(err) => Some(err.error_code()),
            TransferError::Peer { .. } | TransferError::Transport(_) | TransferError::Timeout { .. } => {
                None
            }
        }
    }

    /// Failures caused by the remote side rather than by this host
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            TransferError::Peer { .. } | TransferError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_failures_owe_an_error_packet() {
        assert_eq!(
            TransferError::protocol("unexpected ACK 7").error_code(),
            Some(ErrorCode::IllegalOperation)
        );
        assert_eq!(
            TransferError::from(PacketError::UnknownOpcode(9)).error_code(),
            Some(ErrorCode::IllegalOperation)
        );
        assert_eq!(
            TransferError::from(StoreError::NotFound("x".into())).error_code(),
            Some(ErrorCode::FileNotFound)
        );
    }

    #[test]
    fn remote_failures_are_silent() {
        let peer = TransferError::Peer {
            code: ErrorCode::DiskFull,
            msg: "full".into(),
        };
        assert_eq!(peer.error_code(), None);
        assert!(peer.is_remote());
        assert_eq!(TransferError::Timeout { retries: 5 }.error_code(), None);
    }
}

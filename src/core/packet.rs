use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::blocks::BLOCK_SIZE;

const OPCODE_RRQ: u16 = 1;
const OPCODE_WRQ: u16 = 2;
const OPCODE_DATA: u16 = 3;
const OPCODE_ACK: u16 = 4;
const OPCODE_ERROR: u16 = 5;

/// Largest datagram a peer may legally send: a full DATA packet.
pub const MAX_PACKET_SIZE: usize = 4 + BLOCK_SIZE;

/// Errors produced while encoding or decoding a packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("packet too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("unknown opcode {0}")]
    UnknownOpcode(u16),

    #[error("{0} is not NUL-terminated")]
    MissingTerminator(&'static str),

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("{0} must not contain NUL bytes")]
    EmbeddedNul(&'static str),

    #[error("unsupported transfer mode '{0}'")]
    UnknownMode(String),

    #[error("data payload of {0} bytes exceeds the {BLOCK_SIZE}-byte block size")]
    PayloadTooLarge(usize),
}

/// Transfer mode named in a request.
///
/// Every mode is carried as a raw octet stream; netascii and mail are
/// accepted on the wire but no newline translation is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    Netascii,
    #[default]
    Octet,
    Mail,
}

impl TransferMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMode::Netascii => "netascii",
            TransferMode::Octet => "octet",
            TransferMode::Mail => "mail",
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferMode {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "netascii" => Ok(TransferMode::Netascii),
            "octet" => Ok(TransferMode::Octet),
            "mail" => Ok(TransferMode::Mail),
            _ => Err(PacketError::UnknownMode(s.to_string())),
        }
    }
}

/// Error codes carried by ERROR packets (RFC 1350, appendix)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotDefined,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTid,
    FileExists,
    NoSuchUser,
    /// A code outside the RFC table, kept as received
    Unassigned(u16),
}

impl From<u16> for ErrorCode {
    fn from(code: u16) -> Self {
        match code {
            0 => ErrorCode::NotDefined,
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFull,
            4 => ErrorCode::IllegalOperation,
            5 => ErrorCode::UnknownTid,
            6 => ErrorCode::FileExists,
            7 => ErrorCode::NoSuchUser,
            other => ErrorCode::Unassigned(other),
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::NotDefined => 0,
            ErrorCode::FileNotFound => 1,
            ErrorCode::AccessViolation => 2,
            ErrorCode::DiskFull => 3,
            ErrorCode::IllegalOperation => 4,
            ErrorCode::UnknownTid => 5,
            ErrorCode::FileExists => 6,
            ErrorCode::NoSuchUser => 7,
            ErrorCode::Unassigned(other) => other,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCode::NotDefined => "not defined",
            ErrorCode::FileNotFound => "file not found",
            ErrorCode::AccessViolation => "access violation",
            ErrorCode::DiskFull => "disk full or allocation exceeded",
            ErrorCode::IllegalOperation => "illegal TFTP operation",
            ErrorCode::UnknownTid => "unknown transfer ID",
            ErrorCode::FileExists => "file already exists",
            ErrorCode::NoSuchUser => "no such user",
            ErrorCode::Unassigned(code) => return write!(f, "unassigned code {}", code),
        };
        write!(f, "{} ({})", text, u16::from(*self))
    }
}

/// A TFTP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Read request (opcode 1)
    Rrq { filename: String, mode: TransferMode },
    /// Write request (opcode 2)
    Wrq { filename: String, mode: TransferMode },
    /// One block of file content (opcode 3)
    Data { block_num: u16, data: Vec<u8> },
    /// Acknowledgement of a block (opcode 4)
    Ack(u16),
    /// Transfer abort (opcode 5)
    Error { code: ErrorCode, msg: String },
}

impl Packet {
    /// Build an ERROR packet from a code and any displayable message
    pub fn error(code: ErrorCode, msg: impl fmt::Display) -> Self {
        Packet::Error {
            code,
            msg: msg.to_string().replace('\0', ""),
        }
    }

    pub fn opcode(&self) -> u16 {
        match self {
            Packet::Rrq { .. } => OPCODE_RRQ,
            Packet::Wrq { .. } => OPCODE_WRQ,
            Packet::Data { .. } => OPCODE_DATA,
            Packet::Ack(_) => OPCODE_ACK,
            Packet::Error { .. } => OPCODE_ERROR,
        }
    }

    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Rrq { .. } => "RRQ",
            Packet::Wrq { .. } => "WRQ",
            Packet::Data { .. } => "DATA",
            Packet::Ack(_) => "ACK",
            Packet::Error { .. } => "ERROR",
        }
    }

    /// Encode the packet into its wire representation
    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.opcode().to_be_bytes());

        match self {
            Packet::Rrq { filename, mode } | Packet::Wrq { filename, mode } => {
                put_string(&mut buf, filename, "filename")?;
                put_string(&mut buf, mode.as_str(), "mode")?;
            }
            Packet::Data { block_num, data } => {
                if data.len() > BLOCK_SIZE {
                    return Err(PacketError::PayloadTooLarge(data.len()));
                }
                buf.extend_from_slice(&block_num.to_be_bytes());
                buf.extend_from_slice(data);
            }
            Packet::Ack(block_num) => {
                buf.extend_from_slice(&block_num.to_be_bytes());
            }
            Packet::Error { code, msg } => {
                buf.extend_from_slice(&u16::from(*code).to_be_bytes());
                put_string(&mut buf, msg, "error message")?;
            }
        }

        Ok(buf)
    }

    /// Decode a packet from a received datagram
    pub fn deserialize(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < 2 {
            return Err(PacketError::TooShort {
                len: buf.len(),
                min: 2,
            });
        }

        let opcode = u16::from_be_bytes([buf[0], buf[1]]);
        let min = match opcode {
            OPCODE_RRQ | OPCODE_WRQ | OPCODE_DATA | OPCODE_ACK => 4,
            OPCODE_ERROR => 5,
            other => return Err(PacketError::UnknownOpcode(other)),
        };
        if buf.len() < min {
            return Err(PacketError::TooShort {
                len: buf.len(),
                min,
            });
        }

        let body = &buf[2..];
        match opcode {
            OPCODE_RRQ | OPCODE_WRQ => {
                let (filename, rest) = take_string(body, "filename")?;
                let (mode, _) = take_string(rest, "mode")?;
                let mode = mode.parse()?;
                if opcode == OPCODE_RRQ {
                    Ok(Packet::Rrq { filename, mode })
                } else {
                    Ok(Packet::Wrq { filename, mode })
                }
            }
            OPCODE_DATA => {
                let data = &body[2..];
                if data.len() > BLOCK_SIZE {
                    return Err(PacketError::PayloadTooLarge(data.len()));
                }
                Ok(Packet::Data {
                    block_num: u16::from_be_bytes([body[0], body[1]]),
                    data: data.to_vec(),
                })
            }
            OPCODE_ACK => Ok(Packet::Ack(u16::from_be_bytes([body[0], body[1]]))),
            _ => {
                let code = ErrorCode::from(u16::from_be_bytes([body[0], body[1]]));
                // Some stacks omit the trailing NUL on error messages.
                let raw = &body[2..];
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                Ok(Packet::Error {
                    code,
                    msg: String::from_utf8_lossy(&raw[..end]).into_owned(),
                })
            }
        }
    }

    fn encoded_len(&self) -> usize {
        2 + match self {
            Packet::Rrq { filename, mode } | Packet::Wrq { filename, mode } => {
                filename.len() + mode.as_str().len() + 2
            }
            Packet::Data { data, .. } => 2 + data.len(),
            Packet::Ack(_) => 2,
            Packet::Error { msg, .. } => 3 + msg.len(),
        }
    }
}

fn put_string(buf: &mut Vec<u8>, value: &str, field: &'static str) -> Result<(), PacketError> {
    if value.as_bytes().contains(&0) {
        return Err(PacketError::EmbeddedNul(field));
    }
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
    Ok(())
}

fn take_string<'a>(buf: &'a [u8], field: &'static str) -> Result<(String, &'a [u8]), PacketError> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(PacketError::MissingTerminator(field))?;
    let value = std::str::from_utf8(&buf[..end]).map_err(|_| PacketError::InvalidUtf8(field))?;
    Ok((value.to_string(), &buf[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: Packet) {
        let bytes = packet.serialize().unwrap();
        assert_eq!(Packet::deserialize(&bytes).unwrap(), packet);
    }

    #[test]
    fn every_variant_round_trips() {
        round_trip(Packet::Rrq {
            filename: "boot/pxelinux.0".to_string(),
            mode: TransferMode::Octet,
        });
        round_trip(Packet::Wrq {
            filename: "upload.bin".to_string(),
            mode: TransferMode::Netascii,
        });
        round_trip(Packet::Data {
            block_num: 65535,
            data: vec![0xAB; BLOCK_SIZE],
        });
        round_trip(Packet::Ack(0));
        round_trip(Packet::error(ErrorCode::FileNotFound, "no such file"));
        round_trip(Packet::error(ErrorCode::Unassigned(42), ""));
    }

    #[test]
    fn data_payload_keeps_zero_bytes() {
        let data = vec![0, 1, 0, 0, 2, 0];
        let bytes = Packet::Data {
            block_num: 1,
            data: data.clone(),
        }
        .serialize()
        .unwrap();
        assert_eq!(bytes.len(), 4 + data.len());

        match Packet::deserialize(&bytes).unwrap() {
            Packet::Data { block_num, data: got } => {
                assert_eq!(block_num, 1);
                assert_eq!(got, data);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn wire_layout_is_big_endian() {
        let bytes = Packet::Ack(0x0102).serialize().unwrap();
        assert_eq!(bytes, vec![0x00, 0x04, 0x01, 0x02]);

        let bytes = Packet::Rrq {
            filename: "a".to_string(),
            mode: TransferMode::Octet,
        }
        .serialize()
        .unwrap();
        assert_eq!(bytes, b"\x00\x01a\x00octet\x00".to_vec());

        let bytes = Packet::error(ErrorCode::IllegalOperation, "x").serialize().unwrap();
        assert_eq!(bytes, vec![0x00, 0x05, 0x00, 0x04, b'x', 0x00]);
    }

    #[test]
    fn short_inputs_are_rejected() {
        assert_eq!(
            Packet::deserialize(&[]),
            Err(PacketError::TooShort { len: 0, min: 2 })
        );
        assert_eq!(
            Packet::deserialize(&[0x00]),
            Err(PacketError::TooShort { len: 1, min: 2 })
        );
        assert_eq!(
            Packet::deserialize(&[0x00, 0x04, 0x01]),
            Err(PacketError::TooShort { len: 3, min: 4 })
        );
        assert_eq!(
            Packet::deserialize(&[0x00, 0x03, 0x00]),
            Err(PacketError::TooShort { len: 3, min: 4 })
        );
        assert_eq!(
            Packet::deserialize(&[0x00, 0x05, 0x00, 0x01]),
            Err(PacketError::TooShort { len: 4, min: 5 })
        );
        assert!(Packet::deserialize(&[0x00, 0x01, b'a']).is_err());
    }

    #[test]
    fn unknown_opcodes_are_rejected() {
        assert_eq!(
            Packet::deserialize(&[0x00, 0x06, 0x00, 0x00]),
            Err(PacketError::UnknownOpcode(6))
        );
        assert_eq!(
            Packet::deserialize(&[0x00, 0x00, 0x00, 0x00]),
            Err(PacketError::UnknownOpcode(0))
        );
    }

    #[test]
    fn request_needs_terminators_and_known_mode() {
        assert_eq!(
            Packet::deserialize(b"\x00\x01file\x00octet"),
            Err(PacketError::MissingTerminator("mode"))
        );
        assert_eq!(
            Packet::deserialize(b"\x00\x01file-without-nul"),
            Err(PacketError::MissingTerminator("filename"))
        );
        assert_eq!(
            Packet::deserialize(b"\x00\x02file\x00binary\x00"),
            Err(PacketError::UnknownMode("binary".to_string()))
        );
    }

    #[test]
    fn mode_is_case_insensitive() {
        let packet = Packet::deserialize(b"\x00\x01file\x00NetASCII\x00").unwrap();
        assert_eq!(
            packet,
            Packet::Rrq {
                filename: "file".to_string(),
                mode: TransferMode::Netascii,
            }
        );
    }

    #[test]
    fn error_message_without_terminator_is_accepted() {
        let packet = Packet::deserialize(b"\x00\x05\x00\x01gone").unwrap();
        assert_eq!(packet, Packet::error(ErrorCode::FileNotFound, "gone"));
    }

    #[test]
    fn oversized_payloads_are_rejected() {
        let packet = Packet::Data {
            block_num: 1,
            data: vec![0; BLOCK_SIZE + 1],
        };
        assert_eq!(
            packet.serialize(),
            Err(PacketError::PayloadTooLarge(BLOCK_SIZE + 1))
        );

        let mut raw = vec![0x00, 0x03, 0x00, 0x01];
        raw.extend(vec![7u8; BLOCK_SIZE + 1]);
        assert_eq!(
            Packet::deserialize(&raw),
            Err(PacketError::PayloadTooLarge(BLOCK_SIZE + 1))
        );
    }

    #[test]
    fn strings_with_nul_cannot_be_encoded() {
        let packet = Packet::Wrq {
            filename: "bad\0name".to_string(),
            mode: TransferMode::Octet,
        };
        assert_eq!(packet.serialize(), Err(PacketError::EmbeddedNul("filename")));
    }
}

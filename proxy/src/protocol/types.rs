use std::fmt;
use thiserror::Error;

pub const HEADER_LEN: usize = 4;

pub const COM_QUIT: u8 = 0x01;
pub const COM_QUERY: u8 = 0x03;
pub const COM_STMT_PREPARE: u8 = 0x16;
pub const ERR_PACKET: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficDirection {
    ClientToServer,
    ServerToClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Quit,
    Query,
    StmtPrepare,
    ErrResponse,
    Other(u8),
}

impl From<u8> for PacketKind {
    fn from(byte: u8) -> Self {
        match byte {
            COM_QUIT => PacketKind::Quit,
            COM_QUERY => PacketKind::Query,
            COM_STMT_PREPARE => PacketKind::StmtPrepare,
            ERR_PACKET => PacketKind::ErrResponse,
            other => PacketKind::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub payload_len: usize,
    pub sequence: u8,
}

impl PacketHeader {
    pub fn packet_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }
}

/// Decoded ERR packet sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrResponse {
    pub code: u16,
    pub sql_state: Option<String>,
    pub message: String,
}

impl fmt::Display for ErrResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql_state {
            Some(state) => write!(f, "ERROR {} ({}): {}", self.code, state, self.message),
            None => write!(f, "ERROR {}: {}", self.code, self.message),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet truncated")]
    Truncated,

    #[error("expected {expected:?} packet, found {found:?}")]
    UnexpectedKind {
        expected: PacketKind,
        found: PacketKind,
    },

    #[error("query text is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    Create,
    Drop,
    Alter,
    Transaction,
    Explain,
    Maintenance,  // OPTIMIZE, ANALYZE TABLE, etc.
    Load,
    Session,      // SET, SHOW, USE
    Other(String),
}

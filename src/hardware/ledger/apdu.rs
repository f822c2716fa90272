//! APDU (Application Protocol Data Unit) 命令处理
//!
//! Command/response codec for the Ledger Ethereum application.

use crate::core::errors::{Result, WalletsError};
use tracing::debug;

/// Largest data field a short APDU can carry.
pub const MAX_APDU_DATA: usize = 255;

/// First chunk of a multi-part command.
pub const P1_FIRST_CHUNK: u8 = 0x00;
/// Any later chunk.
pub const P1_MORE_CHUNKS: u8 = 0x80;

/// CLA shared by every Ledger application.
pub const CLA: u8 = 0xE0;

/// Ethereum app instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    /// 公钥、address和可选 chain code
    GetAddress = 0x02,
    SignTransaction = 0x04,
    /// EIP-191 personal message
    SignPersonalMessage = 0x08,
}

/// One short APDU addressed to the Ethereum app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    pub ins: Instruction,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl Apdu {
    pub fn new(ins: Instruction, data: Vec<u8>) -> Self {
        Self { ins, p1: 0, p2: 0, data }
    }

    pub fn params(mut self, p1: u8, p2: u8) -> Self {
        self.p1 = p1;
        self.p2 = p2;
        self
    }

    /// `CLA INS P1 P2 Lc data`
    pub fn encode(&self) -> Result<Vec<u8>> {
        let lc = u8::try_from(self.data.len()).map_err(|_| {
            WalletsError::invalid_argument(format!(
                "APDU data is {} bytes, at most {} fit one command",
                self.data.len(),
                MAX_APDU_DATA
            ))
        })?;
        debug!(ins = ?self.ins, p1 = self.p1, p2 = self.p2, lc, "APDU 命令");
        let header = [CLA, self.ins as u8, self.p1, self.p2, lc];
        Ok(header.iter().chain(self.data.iter()).copied().collect())
    }
}

/// Data budget per command for transactions carrying an EIP-155 tail.
pub const EIP155_CHUNK_SIZE: usize = 150;

/// Like [`chunk_payload`], but no command may end exactly at `tail_start`
/// (the `chainId, 0, 0` fields of a legacy transaction): the app would take
/// the bytes up to there as a complete pre-EIP-155 transaction. The command
/// that reaches the tail carries the rest of the payload.
pub fn chunk_payload_keeping_tail(header: &[u8], payload: &[u8], tail_start: usize) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut chunk = header.to_vec();
    let mut offset = 0;
    loop {
        let room = EIP155_CHUNK_SIZE.saturating_sub(chunk.len());
        let mut end = (offset + room).min(payload.len());
        if end >= tail_start {
            end = payload.len();
        }
        chunk.extend_from_slice(&payload[offset..end]);
        chunks.push(std::mem::take(&mut chunk));
        offset = end;
        if offset >= payload.len() {
            return chunks;
        }
    }
}

/// Split a payload into command data fields. The first field starts with
/// `header` (path, length prefix); each field fits one short APDU.
pub fn chunk_payload(header: &[u8], payload: &[u8]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let first_room = MAX_APDU_DATA.saturating_sub(header.len());
    let split = first_room.min(payload.len());

    let mut first = header.to_vec();
    first.extend_from_slice(&payload[..split]);
    chunks.push(first);

    for chunk in payload[split..].chunks(MAX_APDU_DATA) {
        chunks.push(chunk.to_vec());
    }
    chunks
}

pub const SW_OK: u16 = 0x9000;

/// Split a raw answer into its body and trailing status word.
pub fn split_status(raw: &[u8]) -> Result<(&[u8], u16), LedgerError> {
    let body_len = raw
        .len()
        .checked_sub(2)
        .ok_or_else(|| LedgerError::MalformedResponse(format!("{} byte answer", raw.len())))?;
    let (body, sw) = raw.split_at(body_len);
    Ok((body, u16::from_be_bytes([sw[0], sw[1]])))
}

/// Body of a `9000` answer; any other status word becomes an error.
pub fn response_body(raw: &[u8]) -> Result<Vec<u8>, LedgerError> {
    let (body, status) = split_status(raw)?;
    debug!("APDU 响应: SW={:04X} DataLen={}", status, body.len());
    match status {
        SW_OK => Ok(body.to_vec()),
        other => Err(LedgerError::from_status(other)),
    }
}

/// Status text as the Ledger transport reports it.
pub fn status_text(status: u16) -> &'static str {
    match status {
        0x9000 => "OK",
        0x6700 => "INCORRECT_LENGTH",
        0x6800 => "MISSING_CRITICAL_PARAMETER",
        0x6804 => "SECURITY_STATUS_NOT_SATISFIED",
        0x6982 => "SECURITY_STATUS_NOT_SATISFIED",
        0x6985 => "CONDITIONS_OF_USE_NOT_SATISFIED",
        0x6A80 => "INCORRECT_DATA",
        0x6A84 => "NOT_ENOUGH_MEMORY_SPACE",
        0x6A88 => "REFERENCED_DATA_NOT_FOUND",
        0x6A89 => "FILE_ALREADY_EXISTS",
        0x6B00 => "INCORRECT_P1_P2",
        0x6D00 => "INS_NOT_SUPPORTED",
        0x6E00 => "CLA_NOT_SUPPORTED",
        0x6F00 => "TECHNICAL_PROBLEM",
        0x6511 => "APP_NOT_OPEN",
        _ => "UNKNOWN_ERROR",
    }
}

/// Native Ledger failures, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Non-success status word.
    #[error("Ledger device: {text} (0x{status:04x})")]
    Status { status: u16, text: &'static str },
    /// U2F client error with its metadata code.
    #[error("{message}")]
    U2f { code: u32, message: String },
    #[error("U2F not supported")]
    U2fNotSupported,
    #[error("Malformed response from Ledger device: {0}")]
    MalformedResponse(String),
}

impl LedgerError {
    pub fn from_status(status: u16) -> Self {
        LedgerError::Status {
            status,
            text: status_text(status),
        }
    }
}

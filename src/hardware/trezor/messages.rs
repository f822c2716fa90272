//! Trezor wire messages
//!
//! Framing is `type (u16 BE) || length (u32 BE) || protobuf body`. Only the
//! handful of protobuf features the Ethereum messages use are implemented:
//! varint and length-delimited fields.

use super::client::TrezorFailure;

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    Initialize = 0,
    Success = 2,
    Failure = 3,
    GetPublicKey = 11,
    PublicKey = 12,
    Features = 17,
    PinMatrixRequest = 18,
    ButtonRequest = 26,
    ButtonAck = 27,
    PassphraseRequest = 41,
    EthereumGetAddress = 56,
    EthereumAddress = 57,
    EthereumSignTx = 58,
    EthereumTxRequest = 59,
    EthereumTxAck = 60,
    EthereumSignMessage = 64,
    EthereumMessageSignature = 66,
    EthereumSignTxEip1559 = 452,
}

impl MessageType {
    const KNOWN: [MessageType; 18] = [
        MessageType::Initialize,
        MessageType::Success,
        MessageType::Failure,
        MessageType::GetPublicKey,
        MessageType::PublicKey,
        MessageType::Features,
        MessageType::PinMatrixRequest,
        MessageType::ButtonRequest,
        MessageType::ButtonAck,
        MessageType::PassphraseRequest,
        MessageType::EthereumGetAddress,
        MessageType::EthereumAddress,
        MessageType::EthereumSignTx,
        MessageType::EthereumTxRequest,
        MessageType::EthereumTxAck,
        MessageType::EthereumSignMessage,
        MessageType::EthereumMessageSignature,
        MessageType::EthereumSignTxEip1559,
    ];
}

impl TryFrom<u16> for MessageType {
    type Error = TrezorFailure;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::KNOWN
            .into_iter()
            .find(|known| *known as u16 == value)
            .ok_or_else(|| malformed(&format!("unknown message type {}", value)))
    }
}

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrezorMessage {
    pub msg_type: MessageType,
    pub payload: Vec<u8>,
}

impl TrezorMessage {
    pub fn new(msg_type: MessageType, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_LEN + self.payload.len());
        frame.extend_from_slice(&(self.msg_type as u16).to_be_bytes());
        frame.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }

    pub fn deserialize(frame: &[u8]) -> Result<Self, TrezorFailure> {
        let header = frame
            .get(..HEADER_LEN)
            .ok_or_else(|| malformed("message too short"))?;
        let msg_type = MessageType::try_from(u16::from_be_bytes([header[0], header[1]]))?;
        let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
        let payload = frame
            .get(HEADER_LEN..HEADER_LEN + len)
            .ok_or_else(|| malformed("message truncated"))?
            .to_vec();

        Ok(Self { msg_type, payload })
    }
}

/// Bytes of `type || length` in front of every body.
pub const HEADER_LEN: usize = 6;

fn malformed(what: &str) -> TrezorFailure {
    TrezorFailure::new(&format!("Malformed Trezor message: {}", what), None)
}

const WIRE_VARINT: u64 = 0;
const WIRE_LEN: u64 = 2;

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Value and number of bytes consumed.
pub fn read_varint(data: &[u8]) -> Result<(u64, usize), TrezorFailure> {
    let mut value = 0u64;
    for (i, &byte) in data.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(malformed(if data.len() >= 10 { "varint overflow" } else { "varint truncated" }))
}

/// Protobuf body builder.
#[derive(Debug, Default)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `repeated uint32 address_n = 1`, shared by every Ethereum request.
    pub fn path(self, address_n: &[u32]) -> Self {
        address_n
            .iter()
            .fold(self, |writer, &index| writer.varint(1, u64::from(index)))
    }

    pub fn varint(mut self, field: u32, value: u64) -> Self {
        write_varint(&mut self.buf, (u64::from(field) << 3) | WIRE_VARINT);
        write_varint(&mut self.buf, value);
        self
    }

    pub fn flag(self, field: u32, value: bool) -> Self {
        self.varint(field, u64::from(value))
    }

    pub fn bytes(mut self, field: u32, value: &[u8]) -> Self {
        write_varint(&mut self.buf, (u64::from(field) << 3) | WIRE_LEN);
        write_varint(&mut self.buf, value.len() as u64);
        self.buf.extend_from_slice(value);
        self
    }

    pub fn string(self, field: u32, value: &str) -> Self {
        self.bytes(field, value.as_bytes())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// One decoded protobuf field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Varint(u64),
    Bytes(Vec<u8>),
}

/// Decoded message body, fields in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(Vec<(u32, FieldValue)>);

impl Fields {
    pub fn decode(mut data: &[u8]) -> Result<Self, TrezorFailure> {
        let mut fields = Vec::new();
        while !data.is_empty() {
            let (key, used) = read_varint(data)?;
            data = &data[used..];
            let field_num = (key >> 3) as u32;

            match key & 0x07 {
                WIRE_VARINT => {
                    let (value, used) = read_varint(data)?;
                    data = &data[used..];
                    fields.push((field_num, FieldValue::Varint(value)));
                }
                WIRE_LEN => {
                    let (len, used) = read_varint(data)?;
                    data = &data[used..];
                    let len = len as usize;
                    let value = data.get(..len).ok_or_else(|| malformed("field truncated"))?;
                    fields.push((field_num, FieldValue::Bytes(value.to_vec())));
                    data = &data[len..];
                }
                wire_type => {
                    return Err(malformed(&format!("unsupported wire type {}", wire_type)));
                }
            }
        }
        Ok(Self(fields))
    }

    pub fn varint(&self, field_num: u32) -> Option<u64> {
        self.0.iter().find_map(|(num, value)| match value {
            FieldValue::Varint(v) if *num == field_num => Some(*v),
            _ => None,
        })
    }

    pub fn bytes(&self, field_num: u32) -> Option<&[u8]> {
        self.0.iter().find_map(|(num, value)| match value {
            FieldValue::Bytes(v) if *num == field_num => Some(v.as_slice()),
            _ => None,
        })
    }

    pub fn string(&self, field_num: u32) -> Option<String> {
        self.bytes(field_num)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn require_bytes(&self, field_num: u32, name: &str) -> Result<&[u8], TrezorFailure> {
        self.bytes(field_num)
            .ok_or_else(|| malformed(&format!("missing {}", name)))
    }
}

/// `FailureType` enum names as reported by Trezor Connect.
pub fn failure_code_name(code: u64) -> String {
    let name = match code {
        1 => "UnexpectedMessage",
        2 => "ButtonExpected",
        3 => "DataError",
        4 => "ActionCancelled",
        5 => "PinExpected",
        6 => "PinCancelled",
        7 => "PinInvalid",
        8 => "InvalidSignature",
        9 => "ProcessError",
        10 => "NotEnoughFunds",
        11 => "NotInitialized",
        12 => "PinMismatch",
        13 => "WipeCodeMismatch",
        14 => "InvalidSession",
        99 => "FirmwareError",
        _ => return format!("Failure_{}", code),
    };
    format!("Failure_{}", name)
}

/// Decode a `Failure` body into the native error shape.
pub fn parse_failure(payload: &[u8]) -> TrezorFailure {
    match Fields::decode(payload) {
        Ok(fields) => {
            let code = fields.varint(1).map(failure_code_name);
            let message = fields.string(2).unwrap_or_else(|| "Failure".to_string());
            TrezorFailure::new(&message, code.as_deref())
        }
        Err(err) => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let frame = TrezorMessage::new(MessageType::EthereumSignTxEip1559, vec![0xAA, 0xBB, 0xCC]).serialize();
        assert_eq!(frame, vec![0x01, 0xC4, 0x00, 0x00, 0x00, 0x03, 0xAA, 0xBB, 0xCC]);

        let parsed = TrezorMessage::deserialize(&frame).unwrap();
        assert_eq!(parsed.msg_type, MessageType::EthereumSignTxEip1559);
        assert_eq!(parsed.payload, vec![0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let frame = [0x00, 0x39, 0x00, 0x00, 0x00, 0x01, 0x07, 0x00, 0x00];
        let parsed = TrezorMessage::deserialize(&frame).unwrap();
        assert_eq!(parsed.msg_type, MessageType::EthereumAddress);
        assert_eq!(parsed.payload, vec![0x07]);
    }

    #[test]
    fn test_bad_frames() {
        assert!(TrezorMessage::deserialize(&[0x00, 0x02, 0x00, 0x00, 0x00, 0x04, 0x01]).is_err());
        assert!(TrezorMessage::deserialize(&[0x00, 0x02]).is_err());
        assert!(TrezorMessage::deserialize(&[0x03, 0xE7, 0x00, 0x00, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_varints() {
        for (value, encoded) in [(0u64, vec![0x00]), (127, vec![0x7F]), (128, vec![0x80, 0x01]), (300, vec![0xAC, 0x02])] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            assert_eq!(buf, encoded);
            assert_eq!(read_varint(&encoded).unwrap(), (value, encoded.len()));
        }
        assert!(read_varint(&[0x80]).is_err());
        assert!(read_varint(&[0xFF; 11]).is_err());
    }

    #[test]
    fn test_path_field() {
        let body = FieldWriter::new().path(&[0x8000002C, 0]).finish();
        assert_eq!(body, vec![0x08, 0xAC, 0x80, 0x80, 0x80, 0x08, 0x08, 0x00]);
    }

    #[test]
    fn test_fields_decode() {
        let body = FieldWriter::new().varint(1, 5).string(2, "0xabc").flag(3, true).finish();
        let fields = Fields::decode(&body).unwrap();

        assert_eq!(fields.varint(1), Some(5));
        assert_eq!(fields.string(2).as_deref(), Some("0xabc"));
        assert_eq!(fields.varint(3), Some(1));
        assert_eq!(fields.bytes(4), None);
    }

    #[test]
    fn test_parse_failure() {
        let body = FieldWriter::new().varint(1, 4).string(2, "Action cancelled by user").finish();
        let failure = parse_failure(&body);

        assert_eq!(failure.error, "Action cancelled by user");
        assert_eq!(failure.code.as_deref(), Some("Failure_ActionCancelled"));
        assert_eq!(parse_failure(&[]).error, "Failure");
    }
}

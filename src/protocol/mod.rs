//! Length-prefixed binary framing over a blocking byte stream.
//!
//! Every frame is a 6-byte header — `u16` message type, `u32` payload size,
//! both little-endian — followed by exactly `size` payload bytes. The 1 MiB
//! payload bound is enforced identically on send and receive.

use std::io::{Read, Write};

pub mod messages;
mod wire;

pub use messages::{
    BroadcastMsg, ConnectAckMsg, ConnectMsg, ErrorMsg, HistoryEntry, InitMsg, SrpChallengeMsg,
    SrpInitMsg, SrpRegisterMsg, SrpResponseMsg, SrpSuccessMsg, TextMsg, UserJoinedMsg, UserLeftMsg,
    WireMessage,
};
pub use wire::{PayloadReader, PayloadWriter};

use crate::error::{ChatError, Result};

/// Frame header length: `u16` type + `u32` size.
pub const HEADER_SIZE: usize = 6;

/// Maximum accepted payload size.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Wire discriminants for every frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    Connect = 0,
    ConnectAck = 1,
    Init = 2,
    Message = 3,
    Broadcast = 4,
    UserJoined = 5,
    UserLeft = 6,
    Disconnect = 7,
    ErrorMsg = 8,
    SrpRegister = 9,
    SrpInit = 10,
    SrpChallenge = 11,
    SrpResponse = 12,
    SrpSuccess = 13,
    SrpFailure = 14,
    SrpUserNotFound = 15,
    SrpRegisterAck = 16,
}

impl TryFrom<u16> for MessageType {
    type Error = ChatError;

    fn try_from(value: u16) -> Result<Self> {
        Ok(match value {
            0 => Self::Connect,
            1 => Self::ConnectAck,
            2 => Self::Init,
            3 => Self::Message,
            4 => Self::Broadcast,
            5 => Self::UserJoined,
            6 => Self::UserLeft,
            7 => Self::Disconnect,
            8 => Self::ErrorMsg,
            9 => Self::SrpRegister,
            10 => Self::SrpInit,
            11 => Self::SrpChallenge,
            12 => Self::SrpResponse,
            13 => Self::SrpSuccess,
            14 => Self::SrpFailure,
            15 => Self::SrpUserNotFound,
            16 => Self::SrpRegisterAck,
            other => return Err(ChatError::frame(format!("unknown message type {other}"))),
        })
    }
}

/// Encodes a typed message into a complete frame (header + payload).
pub fn encode<M: WireMessage>(msg: &M) -> Vec<u8> {
    let mut writer = PayloadWriter::new();
    msg.write_payload(&mut writer);
    let payload = writer.into_bytes();

    let mut packet = Vec::with_capacity(HEADER_SIZE + payload.len());
    packet.extend_from_slice(&(M::TYPE as u16).to_le_bytes());
    packet.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    packet.extend_from_slice(&payload);
    packet
}

/// Encodes a frame with no payload.
pub fn encode_empty(msg_type: MessageType) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_SIZE);
    packet.extend_from_slice(&(msg_type as u16).to_le_bytes());
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet
}

/// Decodes a typed message from a frame payload.
pub fn decode<M: WireMessage>(payload: &[u8]) -> Result<M> {
    let mut reader = PayloadReader::new(payload);
    M::read_payload(&mut reader)
}

/// Writes a complete frame to the stream, enforcing the payload bound.
pub fn send_packet<W: Write>(writer: &mut W, packet: &[u8]) -> Result<()> {
    if packet.len() < HEADER_SIZE {
        return Err(ChatError::frame("packet shorter than header"));
    }
    if packet.len() - HEADER_SIZE > MAX_PAYLOAD_SIZE {
        return Err(ChatError::frame("payload exceeds maximum size"));
    }
    writer.write_all(packet)?;
    writer.flush()?;
    Ok(())
}

/// Reads exactly one frame from the stream: header first, then the payload.
pub fn receive_packet<R: Read>(reader: &mut R) -> Result<(MessageType, Vec<u8>)> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let msg_type = MessageType::try_from(u16::from_le_bytes([header[0], header[1]]))?;
    let size = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
    if size > MAX_PAYLOAD_SIZE {
        return Err(ChatError::frame("payload exceeds maximum size"));
    }

    let mut payload = vec![0u8; size];
    if size > 0 {
        reader.read_exact(&mut payload)?;
    }
    Ok((msg_type, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_send_receive_roundtrip() {
        let packet = encode(&TextMsg {
            text: "over the wire".into(),
        });

        let mut buffer = Vec::new();
        send_packet(&mut buffer, &packet).unwrap();

        let mut cursor = Cursor::new(buffer);
        let (msg_type, payload) = receive_packet(&mut cursor).unwrap();
        assert_eq!(msg_type, MessageType::Message);
        assert_eq!(decode::<TextMsg>(&payload).unwrap().text, "over the wire");
    }

    #[test]
    fn test_empty_frame_roundtrip() {
        let packet = encode_empty(MessageType::Disconnect);
        assert_eq!(packet.len(), HEADER_SIZE);

        let mut cursor = Cursor::new(packet);
        let (msg_type, payload) = receive_packet(&mut cursor).unwrap();
        assert_eq!(msg_type, MessageType::Disconnect);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_receive_rejects_oversized_payload() {
        let mut packet = Vec::new();
        packet.extend_from_slice(&(MessageType::Message as u16).to_le_bytes());
        packet.extend_from_slice(&((MAX_PAYLOAD_SIZE as u32) + 1).to_le_bytes());

        let mut cursor = Cursor::new(packet);
        assert!(matches!(
            receive_packet(&mut cursor),
            Err(ChatError::Frame(_))
        ));
    }

    #[test]
    fn test_send_rejects_oversized_payload() {
        let mut packet = vec![0u8; HEADER_SIZE + MAX_PAYLOAD_SIZE + 1];
        packet[0..2].copy_from_slice(&(MessageType::Message as u16).to_le_bytes());
        let mut sink = Vec::new();
        assert!(send_packet(&mut sink, &packet).is_err());
    }

    #[test]
    fn test_receive_rejects_unknown_type() {
        let mut packet = Vec::new();
        packet.extend_from_slice(&999u16.to_le_bytes());
        packet.extend_from_slice(&0u32.to_le_bytes());

        let mut cursor = Cursor::new(packet);
        assert!(receive_packet(&mut cursor).is_err());
    }

    #[test]
    fn test_receive_short_header() {
        let mut cursor = Cursor::new(vec![0u8; HEADER_SIZE - 1]);
        assert!(matches!(
            receive_packet(&mut cursor),
            Err(ChatError::Io(_))
        ));
    }

    #[test]
    fn test_discriminant_values_are_stable() {
        assert_eq!(MessageType::Connect as u16, 0);
        assert_eq!(MessageType::Broadcast as u16, 4);
        assert_eq!(MessageType::Disconnect as u16, 7);
        assert_eq!(MessageType::SrpRegister as u16, 9);
        assert_eq!(MessageType::SrpUserNotFound as u16, 15);
        assert_eq!(MessageType::SrpRegisterAck as u16, 16);
    }
}

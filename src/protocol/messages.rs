//! Typed wire messages and their payload codecs.
//!
//! A payload is the concatenation of the message's fields in declaration
//! order. Vector fields carry a `u32` element count, then each element as a
//! `u32` size prefix followed by exactly that many bytes; the inner prefix
//! lets a decoder skip elements it does not understand.

use super::wire::{PayloadReader, PayloadWriter};
use super::MessageType;
use crate::error::Result;
use crate::types::User;

/// A message that can be encoded into / decoded from a frame payload.
pub trait WireMessage: Sized {
    const TYPE: MessageType;

    fn write_payload(&self, writer: &mut PayloadWriter);
    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self>;
}

fn put_elements<T>(
    writer: &mut PayloadWriter,
    items: &[T],
    encode: impl Fn(&T, &mut PayloadWriter),
) {
    writer.put_u32(items.len() as u32);
    for item in items {
        let mut element = PayloadWriter::new();
        encode(item, &mut element);
        let bytes = element.into_bytes();
        writer.put_u32(bytes.len() as u32);
        writer.put_bytes(&bytes);
    }
}

fn get_elements<T>(
    reader: &mut PayloadReader<'_>,
    decode: impl Fn(&mut PayloadReader<'_>) -> Result<T>,
) -> Result<Vec<T>> {
    let count = reader.get_u32()? as usize;
    let mut items = Vec::new();
    for _ in 0..count {
        let size = reader.get_u32()? as usize;
        // consume exactly the declared element size, whatever the decoder reads
        let bytes = reader.get_bytes(size)?;
        let mut element = PayloadReader::new(bytes);
        items.push(decode(&mut element)?);
    }
    Ok(items)
}

/// History entry as serialised inside `INIT`: timestamps are dropped on the
/// wire and re-stamped by the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub username: String,
    pub text: String,
}

fn write_history_entry(entry: &HistoryEntry, writer: &mut PayloadWriter) {
    writer.put_string(&entry.username);
    writer.put_string(&entry.text);
}

fn read_history_entry(reader: &mut PayloadReader<'_>) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
        username: reader.get_string()?,
        text: reader.get_string()?,
    })
}

fn write_user(user: &User, writer: &mut PayloadWriter) {
    writer.put_string(&user.username);
    writer.put_string(&user.user_id);
}

fn read_user(reader: &mut PayloadReader<'_>) -> Result<User> {
    Ok(User {
        username: reader.get_string()?,
        user_id: reader.get_string()?,
    })
}

/// Legacy unauthenticated hello. Kept in the codec; the authenticated server
/// never accepts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectMsg {
    pub username: String,
}

impl WireMessage for ConnectMsg {
    const TYPE: MessageType = MessageType::Connect;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        writer.put_string(&self.username);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            username: reader.get_string()?,
        })
    }
}

/// Legacy acknowledgement for [`ConnectMsg`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAckMsg {
    pub user_id: String,
}

impl WireMessage for ConnectAckMsg {
    const TYPE: MessageType = MessageType::ConnectAck;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        writer.put_string(&self.user_id);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            user_id: reader.get_string()?,
        })
    }
}

/// Initial state snapshot sent after authentication.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InitMsg {
    pub messages: Vec<HistoryEntry>,
    pub users: Vec<User>,
}

impl WireMessage for InitMsg {
    const TYPE: MessageType = MessageType::Init;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        put_elements(writer, &self.messages, write_history_entry);
        put_elements(writer, &self.users, write_user);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            messages: get_elements(reader, read_history_entry)?,
            users: get_elements(reader, read_user)?,
        })
    }
}

/// Client → server chat text. After authentication, `text` carries the
/// base64 of an AEAD envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMsg {
    pub text: String,
}

impl WireMessage for TextMsg {
    const TYPE: MessageType = MessageType::Message;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        writer.put_string(&self.text);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            text: reader.get_string()?,
        })
    }
}

/// Server → client fan-out of a chat message; `text` is ciphertext base64
/// under the recipient's session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMsg {
    pub username: String,
    pub text: String,
    pub timestamp_ms: i64,
}

impl WireMessage for BroadcastMsg {
    const TYPE: MessageType = MessageType::Broadcast;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        writer.put_string(&self.username);
        writer.put_string(&self.text);
        writer.put_i64(self.timestamp_ms);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            username: reader.get_string()?,
            text: reader.get_string()?,
            timestamp_ms: reader.get_i64()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserJoinedMsg {
    pub username: String,
    pub user_id: String,
}

impl WireMessage for UserJoinedMsg {
    const TYPE: MessageType = MessageType::UserJoined;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        writer.put_string(&self.username);
        writer.put_string(&self.user_id);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            username: reader.get_string()?,
            user_id: reader.get_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLeftMsg {
    pub username: String,
}

impl WireMessage for UserLeftMsg {
    const TYPE: MessageType = MessageType::UserLeft;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        writer.put_string(&self.username);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            username: reader.get_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub error_msg: String,
}

impl WireMessage for ErrorMsg {
    const TYPE: MessageType = MessageType::ErrorMsg;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        writer.put_string(&self.error_msg);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            error_msg: reader.get_string()?,
        })
    }
}

/// Registration request carrying freshly generated credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpRegisterMsg {
    pub username: String,
    pub salt_b64: String,
    pub verifier_b64: String,
}

impl WireMessage for SrpRegisterMsg {
    const TYPE: MessageType = MessageType::SrpRegister;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        writer.put_string(&self.username);
        writer.put_string(&self.salt_b64);
        writer.put_string(&self.verifier_b64);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            username: reader.get_string()?,
            salt_b64: reader.get_string()?,
            verifier_b64: reader.get_string()?,
        })
    }
}

/// First handshake message: username and client public ephemeral `A`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpInitMsg {
    pub username: String,
    pub a_b64: String,
}

impl WireMessage for SrpInitMsg {
    const TYPE: MessageType = MessageType::SrpInit;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        writer.put_string(&self.username);
        writer.put_string(&self.a_b64);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            username: reader.get_string()?,
            a_b64: reader.get_string()?,
        })
    }
}

/// Server challenge: session id, public ephemeral `B`, the user salt, and
/// the room salt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpChallengeMsg {
    pub user_id: String,
    pub b_b64: String,
    pub salt_b64: String,
    pub room_salt_b64: String,
}

impl WireMessage for SrpChallengeMsg {
    const TYPE: MessageType = MessageType::SrpChallenge;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        writer.put_string(&self.user_id);
        writer.put_string(&self.b_b64);
        writer.put_string(&self.salt_b64);
        writer.put_string(&self.room_salt_b64);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            user_id: reader.get_string()?,
            b_b64: reader.get_string()?,
            salt_b64: reader.get_string()?,
            room_salt_b64: reader.get_string()?,
        })
    }
}

/// Client proof `M` for the identified session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpResponseMsg {
    pub user_id: String,
    pub m_b64: String,
}

impl WireMessage for SrpResponseMsg {
    const TYPE: MessageType = MessageType::SrpResponse;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        writer.put_string(&self.user_id);
        writer.put_string(&self.m_b64);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            user_id: reader.get_string()?,
            m_b64: reader.get_string()?,
        })
    }
}

/// Server proof plus the freshly generated channel key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpSuccessMsg {
    pub h_amk_b64: String,
    pub session_key_b64: String,
}

impl WireMessage for SrpSuccessMsg {
    const TYPE: MessageType = MessageType::SrpSuccess;

    fn write_payload(&self, writer: &mut PayloadWriter) {
        writer.put_string(&self.h_amk_b64);
        writer.put_string(&self.session_key_b64);
    }

    fn read_payload(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            h_amk_b64: reader.get_string()?,
            session_key_b64: reader.get_string()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode, encode, HEADER_SIZE};

    fn roundtrip<M: WireMessage + PartialEq + std::fmt::Debug + Clone>(msg: M) {
        let packet = encode(&msg);
        let header_type = u16::from_le_bytes([packet[0], packet[1]]);
        let header_size = u32::from_le_bytes([packet[2], packet[3], packet[4], packet[5]]);
        assert_eq!(header_type, M::TYPE as u16);
        assert_eq!(header_size as usize, packet.len() - HEADER_SIZE);

        let decoded: M = decode(&packet[HEADER_SIZE..]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_connect_roundtrip() {
        roundtrip(ConnectMsg {
            username: "alice|bob:test".into(),
        });
        roundtrip(ConnectAckMsg {
            user_id: "user_123".into(),
        });
    }

    #[test]
    fn test_text_and_broadcast_roundtrip() {
        roundtrip(TextMsg {
            text: "Line 1\nLine 2\nLine 3".into(),
        });
        roundtrip(BroadcastMsg {
            username: "alice".into(),
            text: "Hello!".into(),
            timestamp_ms: 1234567890123,
        });
    }

    #[test]
    fn test_presence_roundtrip() {
        roundtrip(UserJoinedMsg {
            username: "bob".into(),
            user_id: "user_456".into(),
        });
        roundtrip(UserLeftMsg {
            username: "charlie".into(),
        });
        roundtrip(ErrorMsg {
            error_msg: "Connection failed".into(),
        });
    }

    #[test]
    fn test_srp_messages_roundtrip() {
        roundtrip(SrpRegisterMsg {
            username: "alice".into(),
            salt_b64: "c2FsdA==".into(),
            verifier_b64: "dmVyaWZpZXI=".into(),
        });
        roundtrip(SrpInitMsg {
            username: "alice".into(),
            a_b64: "QQ==".into(),
        });
        roundtrip(SrpChallengeMsg {
            user_id: "user_0a1b2c3d".into(),
            b_b64: "Qg==".into(),
            salt_b64: "c2FsdA==".into(),
            room_salt_b64: "cm9vbQ==".into(),
        });
        roundtrip(SrpResponseMsg {
            user_id: "user_0a1b2c3d".into(),
            m_b64: "TQ==".into(),
        });
        roundtrip(SrpSuccessMsg {
            h_amk_b64: "SEFNSw==".into(),
            session_key_b64: "a2V5".into(),
        });
    }

    #[test]
    fn test_init_roundtrip() {
        roundtrip(InitMsg::default());
        roundtrip(InitMsg {
            messages: vec![
                HistoryEntry {
                    username: "alice".into(),
                    text: "hi".into(),
                },
                HistoryEntry {
                    username: "bob".into(),
                    text: "hey there".into(),
                },
            ],
            users: vec![
                User {
                    username: "alice".into(),
                    user_id: "user_00000001".into(),
                },
                User {
                    username: "bob".into(),
                    user_id: "user_00000002".into(),
                },
            ],
        });
    }

    #[test]
    fn test_element_size_prefix_allows_skipping_unknown_fields() {
        // encode a history entry with a trailing field a current decoder
        // does not know about
        let mut writer = PayloadWriter::new();
        let mut element = PayloadWriter::new();
        element.put_string("alice");
        element.put_string("hi");
        element.put_u32(0xFFFF_FFFF);
        let bytes = element.into_bytes();
        writer.put_u32(1);
        writer.put_u32(bytes.len() as u32);
        writer.put_bytes(&bytes);
        // second vector (users), empty
        writer.put_u32(0);
        let payload = writer.into_bytes();

        let decoded: InitMsg = decode(&payload).unwrap();
        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(decoded.messages[0].username, "alice");
        assert!(decoded.users.is_empty());
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let packet = encode(&BroadcastMsg {
            username: "alice".into(),
            text: "Hello!".into(),
            timestamp_ms: 42,
        });
        let payload = &packet[HEADER_SIZE..];
        assert!(decode::<BroadcastMsg>(&payload[..payload.len() - 1]).is_err());
        assert!(decode::<BroadcastMsg>(&[]).is_err());
    }
}

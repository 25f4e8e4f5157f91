//! Chat client: connect, authenticate, and exchange encrypted messages.
//!
//! The client runs two threads: the caller's (input / sending) and a receive
//! thread started by [`ChatClient::start_receive_loop`]. Rendering is
//! delegated to a [`ChatUi`] implementation so the core stays free of
//! terminal concerns.

use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::auth::{generate_credentials, SrpClient};
use crate::crypto;
use crate::error::{ChatError, Result};
use crate::protocol::{
    self, BroadcastMsg, ErrorMsg, HistoryEntry, InitMsg, MessageType, SrpChallengeMsg, SrpInitMsg,
    SrpRegisterMsg, SrpResponseMsg, SrpSuccessMsg, TextMsg, UserJoinedMsg, UserLeftMsg,
};
use crate::types::{ChatMessage, User};

/// Maximum messages retained client-side.
pub const HISTORY_LIMIT: usize = 50;

/// Rendering hooks implemented by the embedding UI.
pub trait ChatUi: Send + Sync {
    /// Full redraw with the current history and user list.
    fn render(&self, messages: &[ChatMessage], users: &[User]);
    /// Appends a single line (chat message or notice).
    fn print_line(&self, line: &str);
}

/// A UI that swallows all output; useful for tests and headless runs.
pub struct NullUi;

impl ChatUi for NullUi {
    fn render(&self, _messages: &[ChatMessage], _users: &[User]) {}
    fn print_line(&self, _line: &str) {}
}

struct ClientShared {
    messages: Mutex<Vec<ChatMessage>>,
    users: Mutex<Vec<User>>,
    running: AtomicBool,
    connected: AtomicBool,
}

/// An authenticated chat session.
pub struct ChatClient {
    stream: TcpStream,
    username: String,
    user_id: String,
    session_key: Zeroizing<[u8; 32]>,
    room_salt: Vec<u8>,
    shared: Arc<ClientShared>,
    receive_thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("username", &self.username)
            .field("user_id", &self.user_id)
            .field("session_key", &"<redacted>")
            .finish()
    }
}

impl ChatClient {
    /// Connects and authenticates.
    ///
    /// When the server does not know the username, `confirm_register` is
    /// consulted; returning true generates fresh credentials, registers
    /// them, and retries the handshake.
    pub fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        confirm_register: &mut dyn FnMut() -> bool,
    ) -> Result<Self> {
        let mut stream = TcpStream::connect((host, port))?;

        let mut srp = SrpClient::new(username);
        let a_pub = srp.start()?;
        send_srp_init(&mut stream, username, &a_pub)?;

        let (mut msg_type, mut payload) = protocol::receive_packet(&mut stream)?;

        if msg_type == MessageType::SrpUserNotFound {
            if !confirm_register() {
                return Err(ChatError::auth("authentication cancelled"));
            }
            register(&mut stream, username, password)?;

            // fresh attempt with a fresh ephemeral
            srp = SrpClient::new(username);
            let a_pub = srp.start()?;
            send_srp_init(&mut stream, username, &a_pub)?;
            let retry = protocol::receive_packet(&mut stream)?;
            msg_type = retry.0;
            payload = retry.1;
        }

        if msg_type == MessageType::ErrorMsg {
            let msg: ErrorMsg = protocol::decode(&payload)?;
            return Err(ChatError::auth(msg.error_msg));
        }
        if msg_type != MessageType::SrpChallenge {
            return Err(ChatError::protocol(format!(
                "expected SRP_CHALLENGE, got {msg_type:?}"
            )));
        }

        let challenge: SrpChallengeMsg = protocol::decode(&payload)?;
        let b_pub = decode_b64(&challenge.b_b64, "B")?;
        let salt = decode_b64(&challenge.salt_b64, "salt")?;
        let room_salt = decode_b64(&challenge.room_salt_b64, "room salt")?;

        let proof = srp.process_challenge(&b_pub, &salt, password)?;
        protocol::send_packet(
            &mut stream,
            &protocol::encode(&SrpResponseMsg {
                user_id: challenge.user_id.clone(),
                m_b64: BASE64.encode(proof),
            }),
        )?;

        let (msg_type, payload) = protocol::receive_packet(&mut stream)?;
        if msg_type == MessageType::ErrorMsg {
            let msg: ErrorMsg = protocol::decode(&payload)?;
            return Err(ChatError::auth(msg.error_msg));
        }
        if msg_type != MessageType::SrpSuccess {
            return Err(ChatError::protocol("expected SRP_SUCCESS"));
        }

        let success: SrpSuccessMsg = protocol::decode(&payload)?;
        let h_amk = decode_b64(&success.h_amk_b64, "H_AMK")?;
        if !srp.verify_server(&h_amk)? {
            return Err(ChatError::auth("server verification failed"));
        }

        // the AEAD channel key is the server-generated session key, not the
        // SRP shared key
        let key_bytes = decode_b64(&success.session_key_b64, "session key")?;
        let session_key: [u8; 32] = key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| ChatError::protocol("session key must be 32 bytes"))?;

        let (msg_type, payload) = protocol::receive_packet(&mut stream)?;
        if msg_type == MessageType::ErrorMsg {
            let msg: ErrorMsg = protocol::decode(&payload)?;
            return Err(ChatError::auth(msg.error_msg));
        }
        if msg_type != MessageType::Init {
            return Err(ChatError::protocol("expected INIT"));
        }
        let init: InitMsg = protocol::decode(&payload)?;

        let shared = Arc::new(ClientShared {
            messages: Mutex::new(install_history(init.messages)),
            users: Mutex::new(init.users),
            running: AtomicBool::new(true),
            connected: AtomicBool::new(true),
        });

        Ok(Self {
            stream,
            username: username.to_string(),
            user_id: challenge.user_id,
            session_key: Zeroizing::new(session_key),
            room_salt,
            shared,
            receive_thread: None,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Salt shared by every room member, from the challenge.
    pub fn room_salt(&self) -> &[u8] {
        &self.room_salt
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Snapshot of the local message history.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.shared.messages.lock().expect("messages poisoned").clone()
    }

    /// Snapshot of the known active users.
    pub fn users(&self) -> Vec<User> {
        self.shared.users.lock().expect("users poisoned").clone()
    }

    /// Spawns the receive thread dispatching server frames to `ui`.
    pub fn start_receive_loop(&mut self, ui: Arc<dyn ChatUi>) -> Result<()> {
        if self.receive_thread.is_some() {
            return Err(ChatError::protocol("receive loop already running"));
        }

        let stream = self.stream.try_clone()?;
        let shared = Arc::clone(&self.shared);
        let session_key = self.session_key.clone();
        let handle = std::thread::spawn(move || {
            receive_loop(stream, shared, session_key, ui);
        });
        self.receive_thread = Some(handle);
        Ok(())
    }

    /// Encrypts and sends one chat line.
    pub fn send_message(&mut self, text: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(ChatError::protocol("not connected"));
        }

        let envelope = crypto::encrypt(text.as_bytes(), &self.session_key[..], None)?;
        protocol::send_packet(
            &mut self.stream,
            &protocol::encode(&TextMsg {
                text: BASE64.encode(envelope),
            }),
        )
    }

    /// Clears the local history buffer.
    pub fn clear_history(&self) {
        self.shared.messages.lock().expect("messages poisoned").clear();
    }

    /// Sends `DISCONNECT`, closes the socket, and joins the receive thread.
    pub fn disconnect(&mut self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            let _ = protocol::send_packet(
                &mut self.stream,
                &protocol::encode_empty(MessageType::Disconnect),
            );
            let _ = self.stream.shutdown(Shutdown::Both);
            self.shared.connected.store(false, Ordering::SeqCst);
        }
        if let Some(handle) = self.receive_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn send_srp_init(stream: &mut TcpStream, username: &str, a_pub: &[u8]) -> Result<()> {
    protocol::send_packet(
        stream,
        &protocol::encode(&SrpInitMsg {
            username: username.to_string(),
            a_b64: BASE64.encode(a_pub),
        }),
    )
}

/// Generates fresh credentials and registers them with the server.
fn register(stream: &mut TcpStream, username: &str, password: &str) -> Result<()> {
    let creds = generate_credentials(username, password);
    protocol::send_packet(
        stream,
        &protocol::encode(&SrpRegisterMsg {
            username: username.to_string(),
            salt_b64: BASE64.encode(&creds.salt),
            verifier_b64: BASE64.encode(&creds.verifier),
        }),
    )?;

    let (msg_type, payload) = protocol::receive_packet(stream)?;
    match msg_type {
        MessageType::SrpRegisterAck => Ok(()),
        MessageType::ErrorMsg => {
            let msg: ErrorMsg = protocol::decode(&payload)?;
            Err(ChatError::registration(msg.error_msg))
        }
        _ => Err(ChatError::protocol("expected SRP_REGISTER_ACK")),
    }
}

fn decode_b64(value: &str, field: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|_| ChatError::protocol(format!("{field} is not valid base64")))
}

/// Replayed history has no wire timestamps; stamp it with the local clock.
fn install_history(entries: Vec<HistoryEntry>) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = entries
        .into_iter()
        .map(|entry| ChatMessage::new(entry.username, entry.text))
        .collect();
    if messages.len() > HISTORY_LIMIT {
        let excess = messages.len() - HISTORY_LIMIT;
        messages.drain(..excess);
    }
    messages
}

fn receive_loop(
    mut stream: TcpStream,
    shared: Arc<ClientShared>,
    session_key: Zeroizing<[u8; 32]>,
    ui: Arc<dyn ChatUi>,
) {
    while shared.running.load(Ordering::SeqCst) {
        let (msg_type, payload) = match protocol::receive_packet(&mut stream) {
            Ok(frame) => frame,
            Err(e) => {
                if shared.running.load(Ordering::SeqCst) {
                    ui.print_line("connection lost");
                    debug!("receive loop ended: {e}");
                }
                shared.connected.store(false, Ordering::SeqCst);
                break;
            }
        };

        match msg_type {
            MessageType::Broadcast => {
                if let Err(e) = handle_broadcast(&payload, &shared, &session_key, ui.as_ref()) {
                    warn!("discarding broadcast: {e}");
                    ui.print_line("[message discarded: decryption failed]");
                }
            }
            MessageType::UserJoined => {
                if let Ok(msg) = protocol::decode::<UserJoinedMsg>(&payload) {
                    let mut users = shared.users.lock().expect("users poisoned");
                    users.push(User {
                        username: msg.username.clone(),
                        user_id: msg.user_id,
                    });
                    drop(users);
                    ui.print_line(&format!("*** {} joined the chat ***", msg.username));
                }
            }
            MessageType::UserLeft => {
                if let Ok(msg) = protocol::decode::<UserLeftMsg>(&payload) {
                    let mut users = shared.users.lock().expect("users poisoned");
                    users.retain(|user| user.username != msg.username);
                    drop(users);
                    ui.print_line(&format!("*** {} left the chat ***", msg.username));
                }
            }
            MessageType::ErrorMsg => {
                if let Ok(msg) = protocol::decode::<ErrorMsg>(&payload) {
                    ui.print_line(&format!("error from server: {}", msg.error_msg));
                }
                shared.connected.store(false, Ordering::SeqCst);
                break;
            }
            other => debug!(?other, "ignoring unexpected frame"),
        }
    }
}

fn handle_broadcast(
    payload: &[u8],
    shared: &ClientShared,
    session_key: &[u8; 32],
    ui: &dyn ChatUi,
) -> Result<()> {
    let msg: BroadcastMsg = protocol::decode(payload)?;
    let envelope = BASE64
        .decode(&msg.text)
        .map_err(|_| ChatError::protocol("broadcast payload is not valid base64"))?;
    let plaintext = crypto::decrypt(&envelope, session_key, None)?;
    let text = String::from_utf8(plaintext)
        .map_err(|_| ChatError::protocol("broadcast is not valid UTF-8"))?;

    let timestamp = UNIX_EPOCH + std::time::Duration::from_millis(msg.timestamp_ms.max(0) as u64);
    {
        let mut messages = shared.messages.lock().expect("messages poisoned");
        messages.push(ChatMessage {
            username: msg.username.clone(),
            text: text.clone(),
            timestamp,
        });
        if messages.len() > HISTORY_LIMIT {
            let excess = messages.len() - HISTORY_LIMIT;
            messages.drain(..excess);
        }
    }

    ui.print_line(&format!(
        "[{}] {}: {}",
        format_timestamp(timestamp),
        msg.username,
        text
    ));
    Ok(())
}

/// `HH:MM:SS` in UTC, for chat line prefixes.
pub fn format_timestamp(timestamp: SystemTime) -> String {
    let seconds = timestamp
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let of_day = seconds % 86_400;
    format!(
        "{:02}:{:02}:{:02}",
        of_day / 3600,
        (of_day % 3600) / 60,
        of_day % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        let t = UNIX_EPOCH + std::time::Duration::from_secs(12 * 3600 + 34 * 60 + 56);
        assert_eq!(format_timestamp(t), "12:34:56");
        assert_eq!(format_timestamp(UNIX_EPOCH), "00:00:00");
    }

    #[test]
    fn test_install_history_caps_at_limit() {
        let entries: Vec<HistoryEntry> = (0..HISTORY_LIMIT + 20)
            .map(|i| HistoryEntry {
                username: "alice".into(),
                text: format!("message {i}"),
            })
            .collect();
        let installed = install_history(entries);
        assert_eq!(installed.len(), HISTORY_LIMIT);
        // oldest entries are the ones dropped
        assert_eq!(installed[0].text, "message 20");
    }
}

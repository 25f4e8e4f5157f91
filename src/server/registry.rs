//! Registry of authenticated connections.
//!
//! A single mutex guards the whole table, so broadcast fan-out is linearised
//! with joins and leaves: a session either sees a message or it was not yet
//! (or no longer) registered when the message went out.

use std::collections::HashMap;
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::Mutex;
use tracing::warn;
use zeroize::Zeroizing;

use crate::crypto;
use crate::protocol::{self, BroadcastMsg};
use crate::types::User;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

struct ActiveSession {
    stream: TcpStream,
    username: String,
    session_key: Zeroizing<[u8; 32]>,
}

/// Maps `user_id` to the connection handle, username, and channel key of an
/// authenticated session.
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<String, ActiveSession>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn add(
        &self,
        user_id: &str,
        username: &str,
        stream: TcpStream,
        session_key: Zeroizing<[u8; 32]>,
    ) {
        let mut sessions = self.inner.lock().expect("registry poisoned");
        sessions.insert(
            user_id.to_string(),
            ActiveSession {
                stream,
                username: username.to_string(),
                session_key,
            },
        );
    }

    /// Removes a session, closing its connection; the key is zeroised on
    /// drop.
    pub fn remove(&self, user_id: &str) {
        let mut sessions = self.inner.lock().expect("registry poisoned");
        if let Some(session) = sessions.remove(user_id) {
            let _ = session.stream.shutdown(Shutdown::Both);
        }
    }

    pub fn username_exists(&self, username: &str) -> bool {
        let sessions = self.inner.lock().expect("registry poisoned");
        sessions.values().any(|s| s.username == username)
    }

    pub fn username_by_id(&self, user_id: &str) -> Option<String> {
        let sessions = self.inner.lock().expect("registry poisoned");
        sessions.get(user_id).map(|s| s.username.clone())
    }

    pub fn session_key_by_id(&self, user_id: &str) -> Option<Zeroizing<[u8; 32]>> {
        let sessions = self.inner.lock().expect("registry poisoned");
        sessions.get(user_id).map(|s| s.session_key.clone())
    }

    /// Snapshot of the active user list.
    pub fn active_users(&self) -> Vec<User> {
        let sessions = self.inner.lock().expect("registry poisoned");
        sessions
            .iter()
            .map(|(user_id, session)| User {
                username: session.username.clone(),
                user_id: user_id.clone(),
            })
            .collect()
    }

    /// Sends a raw frame to one session. Returns false when the session is
    /// unknown or the write fails.
    pub fn send_to(&self, user_id: &str, packet: &[u8]) -> bool {
        let sessions = self.inner.lock().expect("registry poisoned");
        match sessions.get(user_id) {
            Some(session) => match (&session.stream).write_all(packet) {
                Ok(()) => true,
                Err(e) => {
                    warn!(user_id, "error sending packet: {e}");
                    false
                }
            },
            None => false,
        }
    }

    /// Sends a raw frame to every session except `exclude`. Failures are
    /// logged and skipped.
    pub fn broadcast(&self, packet: &[u8], exclude: Option<&str>) {
        let sessions = self.inner.lock().expect("registry poisoned");
        for (user_id, session) in sessions.iter() {
            if exclude == Some(user_id.as_str()) {
                continue;
            }
            if let Err(e) = (&session.stream).write_all(packet) {
                warn!(user_id = user_id.as_str(), "error broadcasting: {e}");
            }
        }
    }

    /// Fans a chat message out to every session, encrypting the plaintext
    /// under each recipient's own channel key.
    pub fn broadcast_message(&self, sender: &str, plaintext: &str, timestamp_ms: i64) {
        let sessions = self.inner.lock().expect("registry poisoned");
        for (user_id, session) in sessions.iter() {
            let envelope =
                match crypto::encrypt(plaintext.as_bytes(), &session.session_key[..], None) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(user_id = user_id.as_str(), "encrypt for recipient failed: {e}");
                        continue;
                    }
                };
            let packet = protocol::encode(&BroadcastMsg {
                username: sender.to_string(),
                text: BASE64.encode(envelope),
                timestamp_ms,
            });
            if let Err(e) = (&session.stream).write_all(&packet) {
                warn!(user_id = user_id.as_str(), "error broadcasting: {e}");
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

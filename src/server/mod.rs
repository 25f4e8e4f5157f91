//! Chat server: accept loop, per-connection authentication, and encrypted
//! broadcast fan-out.
//!
//! One OS thread per accepted connection. Each thread drives the SRP
//! handshake to completion, installs the session in the registry, then loops
//! on chat frames until disconnect. All cross-thread state (credentials,
//! in-flight SRP sessions, the registry, history) sits behind mutexes.

use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, error, info, warn};

use crate::auth::{SrpServer, UserCredentials};
use crate::error::{ChatError, Result};
use crate::protocol::{
    self, ErrorMsg, HistoryEntry, InitMsg, MessageType, SrpChallengeMsg, SrpInitMsg,
    SrpRegisterMsg, SrpResponseMsg, SrpSuccessMsg, TextMsg, UserJoinedMsg, UserLeftMsg,
};
use crate::types::ChatMessage;

mod registry;

pub use registry::ConnectionRegistry;

/// Maximum messages retained in the server-side history buffer.
pub const HISTORY_LIMIT: usize = 100;

/// Default credential file, relative to the working directory.
pub const DEFAULT_USER_DB: &str = "users.db";

struct ServerInner {
    listener: TcpListener,
    port: u16,
    srp: SrpServer,
    registry: ConnectionRegistry,
    history: Mutex<Vec<ChatMessage>>,
    running: AtomicBool,
    user_db: PathBuf,
}

/// The chat server. Bind first, then `run` until `stop`.
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Binds the listening socket. Port 0 asks the OS for a free port; see
    /// [`Server::local_port`].
    pub fn bind(port: u16) -> Result<Self> {
        Self::bind_with_user_db(port, DEFAULT_USER_DB)
    }

    /// Binds with an explicit credential file path.
    pub fn bind_with_user_db(port: u16, user_db: impl AsRef<Path>) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            inner: Arc::new(ServerInner {
                listener,
                port,
                srp: SrpServer::new(),
                registry: ConnectionRegistry::new(),
                history: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                user_db: user_db.as_ref().to_path_buf(),
            }),
        })
    }

    /// The actually bound port.
    pub fn local_port(&self) -> u16 {
        self.inner.port
    }

    /// Loads persisted credentials into the store.
    pub fn load_users(&self) -> Result<()> {
        self.inner.srp.load_users(&self.inner.user_db)
    }

    /// Registers credentials directly, bypassing the wire protocol.
    pub fn register_user(&self, creds: UserCredentials) -> bool {
        self.inner.srp.register_user(creds)
    }

    /// Accepts connections until [`Server::stop`] is called.
    pub fn run(&self) -> Result<()> {
        self.inner.running.store(true, Ordering::SeqCst);
        info!(port = self.inner.port, "server listening");

        loop {
            match self.inner.listener.accept() {
                Ok((stream, peer)) => {
                    if !self.inner.running.load(Ordering::SeqCst) {
                        break;
                    }
                    debug!(%peer, "new connection");
                    let inner = Arc::clone(&self.inner);
                    thread::spawn(move || inner.handle_connection(stream));
                }
                Err(e) => {
                    if !self.inner.running.load(Ordering::SeqCst) {
                        break;
                    }
                    error!("accept error: {e}");
                }
            }
        }

        info!("server stopped");
        Ok(())
    }

    /// Stops the accept loop. In-flight sessions drain as their clients
    /// disconnect.
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            // nudge the blocking accept so it observes the flag
            let _ = TcpStream::connect(("127.0.0.1", self.inner.port));
        }
    }
}

impl ServerInner {
    fn handle_connection(self: Arc<Self>, mut stream: TcpStream) {
        match self.authenticate(&mut stream) {
            Ok(Some((user_id, username))) => {
                self.chat_loop(&mut stream, &user_id, &username);
                self.finish_session(&user_id, &username);
            }
            Ok(None) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
            Err(e) => {
                debug!("handshake ended: {e}");
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
        }
    }

    /// Pre-auth loop: accepts registrations inline, then drives one SRP
    /// handshake to completion.
    ///
    /// `Ok(None)` means the connection was rejected and already answered
    /// with an `ERROR_MSG`.
    fn authenticate(&self, stream: &mut TcpStream) -> Result<Option<(String, String)>> {
        loop {
            let (msg_type, payload) = protocol::receive_packet(stream)?;

            match msg_type {
                MessageType::SrpRegister => {
                    self.handle_register(stream, &payload)?;
                }
                MessageType::SrpInit => {
                    let init: SrpInitMsg = match protocol::decode(&payload) {
                        Ok(init) => init,
                        Err(e) => {
                            self.send_error(stream, "Malformed SRP_INIT");
                            return Err(e);
                        }
                    };

                    let a_pub = match BASE64.decode(&init.a_b64) {
                        Ok(bytes) => bytes,
                        Err(_) => {
                            self.send_error(stream, "Malformed public ephemeral");
                            return Ok(None);
                        }
                    };

                    let challenge = match self.srp.init_authentication(&init.username, &a_pub) {
                        Ok(challenge) => challenge,
                        Err(ChatError::UserNotFound(_)) => {
                            debug!(username = init.username.as_str(), "unknown user");
                            protocol::send_packet(
                                stream,
                                &protocol::encode_empty(MessageType::SrpUserNotFound),
                            )?;
                            continue;
                        }
                        Err(e) => {
                            warn!("init_authentication failed: {e}");
                            self.send_error(stream, "Authentication failed");
                            return Ok(None);
                        }
                    };

                    return self.complete_handshake(stream, &init.username, challenge);
                }
                other => {
                    warn!(?other, "unexpected frame before authentication");
                    self.send_error(stream, "Expected SRP_INIT");
                    return Ok(None);
                }
            }
        }
    }

    fn complete_handshake(
        &self,
        stream: &mut TcpStream,
        username: &str,
        challenge: crate::auth::ChallengeReply,
    ) -> Result<Option<(String, String)>> {
        let user_id = challenge.user_id.clone();

        protocol::send_packet(
            stream,
            &protocol::encode(&SrpChallengeMsg {
                user_id: user_id.clone(),
                b_b64: BASE64.encode(&challenge.b_pub),
                salt_b64: BASE64.encode(&challenge.salt),
                room_salt_b64: BASE64.encode(&challenge.room_salt),
            }),
        )?;

        let (msg_type, payload) = protocol::receive_packet(stream)?;
        if msg_type != MessageType::SrpResponse {
            self.reject(stream, &user_id, "Expected SRP_RESPONSE");
            return Ok(None);
        }

        let response: SrpResponseMsg = match protocol::decode(&payload) {
            Ok(response) => response,
            Err(e) => {
                self.reject(stream, &user_id, "Malformed SRP_RESPONSE");
                return Err(e);
            }
        };
        if response.user_id != user_id {
            self.reject(stream, &user_id, "Unknown session");
            return Ok(None);
        }

        // one active session per username
        if self.registry.username_exists(username) {
            self.reject(stream, &user_id, "User already logged in");
            return Ok(None);
        }

        let proof = match BASE64.decode(&response.m_b64) {
            Ok(bytes) => bytes,
            Err(_) => {
                self.reject(stream, &user_id, "Malformed proof");
                return Ok(None);
            }
        };

        let verify = match self.srp.verify_authentication(&user_id, &proof) {
            Ok(verify) => verify,
            Err(e) => {
                warn!(username, "authentication failed: {e}");
                self.send_error(stream, "Authentication failed");
                return Ok(None);
            }
        };

        protocol::send_packet(
            stream,
            &protocol::encode(&SrpSuccessMsg {
                h_amk_b64: BASE64.encode(verify.h_amk),
                session_key_b64: BASE64.encode(&verify.session_key[..]),
            }),
        )?;

        self.registry
            .add(&user_id, username, stream.try_clone()?, verify.session_key);
        info!(username, user_id = user_id.as_str(), "user authenticated");

        let init_msg = {
            let history = self.history.lock().expect("history poisoned");
            InitMsg {
                messages: history
                    .iter()
                    .map(|m| HistoryEntry {
                        username: m.username.clone(),
                        text: m.text.clone(),
                    })
                    .collect(),
                users: self.registry.active_users(),
            }
        };
        protocol::send_packet(stream, &protocol::encode(&init_msg))?;

        self.registry.broadcast(
            &protocol::encode(&UserJoinedMsg {
                username: username.to_string(),
                user_id: user_id.clone(),
            }),
            Some(&user_id),
        );

        Ok(Some((user_id, username.to_string())))
    }

    /// Inline registration during the pre-auth loop. Failures answer with an
    /// `ERROR_MSG` but keep the connection alive so the client can retry.
    fn handle_register(&self, stream: &mut TcpStream, payload: &[u8]) -> Result<()> {
        // malformed registrations are answered but never kill the connection
        let register: SrpRegisterMsg = match protocol::decode(payload) {
            Ok(register) => register,
            Err(_) => {
                self.send_error(stream, "Malformed registration payload");
                return Ok(());
            }
        };

        if register.username.is_empty()
            || register.salt_b64.is_empty()
            || register.verifier_b64.is_empty()
        {
            self.send_error(stream, "Registration fields cannot be empty");
            return Ok(());
        }

        let decoded = BASE64
            .decode(&register.salt_b64)
            .ok()
            .zip(BASE64.decode(&register.verifier_b64).ok());
        let (salt, verifier) = match decoded {
            Some(pair) => pair,
            None => {
                self.send_error(stream, "Malformed registration payload");
                return Ok(());
            }
        };

        let registered = self.srp.register_user(UserCredentials {
            username: register.username.clone(),
            salt,
            verifier,
        });
        if !registered {
            self.send_error(stream, "Username already exists");
            return Ok(());
        }

        info!(username = register.username.as_str(), "user registered");
        protocol::send_packet(
            stream,
            &protocol::encode_empty(MessageType::SrpRegisterAck),
        )?;

        if let Err(e) = self.srp.save_users(&self.user_db) {
            error!("failed to persist user db: {e}");
        }
        Ok(())
    }

    fn chat_loop(&self, stream: &mut TcpStream, user_id: &str, username: &str) {
        loop {
            let (msg_type, payload) = match protocol::receive_packet(stream) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(username, "connection closed: {e}");
                    break;
                }
            };

            match msg_type {
                MessageType::Message => {
                    if let Err(e) = self.handle_message(user_id, username, &payload) {
                        warn!(username, "dropping message: {e}");
                    }
                }
                MessageType::Disconnect => break,
                other => warn!(username, ?other, "unexpected frame in chat loop"),
            }
        }
    }

    /// Decrypts an incoming chat message under the sender's key, records it,
    /// and fans it out re-encrypted per recipient.
    fn handle_message(&self, user_id: &str, username: &str, payload: &[u8]) -> Result<()> {
        let text_msg: TextMsg = protocol::decode(payload)?;
        let envelope = BASE64
            .decode(&text_msg.text)
            .map_err(|_| ChatError::protocol("message payload is not valid base64"))?;

        let key = self
            .registry
            .session_key_by_id(user_id)
            .ok_or_else(|| ChatError::protocol("sender has no active session"))?;
        let plaintext = crate::crypto::decrypt(&envelope, &key[..], None)?;
        let text = String::from_utf8(plaintext)
            .map_err(|_| ChatError::protocol("decrypted message is not valid UTF-8"))?;

        let now = SystemTime::now();
        let timestamp_ms = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        info!(username, "{text}");

        {
            let mut history = self.history.lock().expect("history poisoned");
            history.push(ChatMessage {
                username: username.to_string(),
                text: text.clone(),
                timestamp: now,
            });
            if history.len() > HISTORY_LIMIT {
                let excess = history.len() - HISTORY_LIMIT;
                history.drain(..excess);
            }
        }

        self.registry
            .broadcast_message(username, &text, timestamp_ms);
        Ok(())
    }

    fn finish_session(&self, user_id: &str, username: &str) {
        self.registry.remove(user_id);
        self.srp.clear_session(user_id);
        self.registry.broadcast(
            &protocol::encode(&UserLeftMsg {
                username: username.to_string(),
            }),
            None,
        );
        info!(username, "user disconnected");
    }

    fn send_error(&self, stream: &mut TcpStream, message: &str) {
        let _ = protocol::send_packet(
            stream,
            &protocol::encode(&ErrorMsg {
                error_msg: message.to_string(),
            }),
        );
    }

    fn reject(&self, stream: &mut TcpStream, user_id: &str, message: &str) {
        self.send_error(stream, message);
        self.srp.clear_session(user_id);
    }
}
